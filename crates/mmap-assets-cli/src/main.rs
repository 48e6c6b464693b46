use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use globset::{Glob, GlobSetBuilder};
use handlebars::Handlebars;
use indicatif::{ProgressBar, ProgressStyle};
use mmap_assets_core::config::{PipelineConfig, StripEncoding, checked_strip_height, parse_size};
use mmap_assets_core::header::{ReferenceContext, reference_context, render_c_header};
use mmap_assets_core::output::write_atomic;
use mmap_assets_core::pipeline::{check_partition, recommended_kib, run_pipeline};
use mmap_assets_core::splitter::{ImageStripEncoder, split_file};
use mmap_assets_core::{BundleBuilder, BundleView, to_json_manifest};
use serde::Deserialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "mmap-assets",
    about = "Split images into strip containers and pack asset folders into a flashable blob",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full build from an asset config: stage, convert, bundle, emit header
    Build(BuildArgs),
    /// Split one image (or every image in a directory) into strip containers
    Split(SplitArgs),
    /// Bundle files as they are, without staging or conversion
    Pack(PackArgs),
    /// List the entries of an existing blob and verify its checksum
    Inspect(InspectArgs),
}

#[derive(Parser, Debug, Clone)]
struct BuildArgs {
    /// Asset config (JSON or YAML, chosen by file suffix)
    #[arg(short, long, help_heading = "Input/Output")]
    config: PathBuf,
    /// Override split_height from the config
    #[arg(long, allow_negative_numbers = true, help_heading = "Overrides")]
    split_height: Option<i64>,
    /// Override the partition budget (bytes, decimal or 0x-hex)
    #[arg(long, value_parser = parse_size, help_heading = "Overrides")]
    partition_size: Option<u64>,
    /// Override the staging directory
    #[arg(long, help_heading = "Overrides")]
    staging_dir: Option<PathBuf>,
    /// JPEG quality for SJPG strips (1..=100)
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(1..=100), help_heading = "Encoding")]
    jpeg_quality: u8,
    /// Also write a JSON manifest of the bundle to this path
    #[arg(long, help_heading = "Export")]
    manifest: Option<PathBuf>,
    /// Print the effective config and exit: json|yaml
    #[arg(long, value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config: Option<String>,
}

#[derive(Parser, Debug, Clone)]
struct SplitArgs {
    /// Image file or directory of images
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory (defaults to the input's directory)
    #[arg(short, long, help_heading = "Input/Output")]
    out_dir: Option<PathBuf>,
    /// Include patterns (glob). If set, only files matching any pattern are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Files matching any pattern will be ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,
    /// Rows per strip; omit to keep each image as one strip
    #[arg(long, allow_negative_numbers = true, help_heading = "Encoding")]
    height: Option<i64>,
    /// Strip codec: jpeg|png|qoi
    #[arg(short, long, default_value = "jpeg", help_heading = "Encoding")]
    encoding: String,
    /// JPEG quality (1..=100)
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(1..=100), help_heading = "Encoding")]
    jpeg_quality: u8,
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    /// Directory (or single file) to bundle
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output blob path
    #[arg(short, long, default_value = "assets.bin", help_heading = "Input/Output")]
    out: PathBuf,
    /// Descend into subdirectories
    #[arg(short, long, default_value_t = false, help_heading = "Input/Output")]
    recursive: bool,
    /// Include patterns (glob). If set, only files matching any pattern are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Files matching any pattern will be ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,

    /// Fixed width of the name field in the index table
    #[arg(long, default_value_t = 32, help_heading = "Layout")]
    name_len: usize,
    /// Partition budget (bytes, decimal or 0x-hex); exceeding it fails the command
    #[arg(long, value_parser = parse_size, help_heading = "Layout")]
    partition_size: Option<u64>,

    /// Directory for the reference header (omit to skip the header)
    #[arg(long, help_heading = "Header")]
    header_dir: Option<PathBuf>,
    /// Symbol used in header names (defaults to the input directory name)
    #[arg(long, help_heading = "Header")]
    symbol: Option<String>,
    /// Include line written into the C header
    #[arg(long, help_heading = "Header")]
    header_include: Option<String>,
    /// Header flavor: c|rust|names
    #[arg(long, default_value = "c", help_heading = "Header")]
    header_format: String,
    /// Handlebars template rendered instead of the built-in header
    #[arg(long, help_heading = "Header")]
    header_template: Option<PathBuf>,

    /// Also write a JSON manifest of the bundle to this path
    #[arg(long, help_heading = "Export")]
    manifest: Option<PathBuf>,
    /// Compute and report the layout without writing anything
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
}

#[derive(Parser, Debug, Clone)]
struct InspectArgs {
    /// Blob produced by `build` or `pack`
    blob: PathBuf,
    /// Name field width the blob was built with
    #[arg(long, default_value_t = 32)]
    name_len: usize,
    /// Print the listing as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Write every entry's payload into this directory
    #[arg(long)]
    extract: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    let show_progress = cli.progress && !cli.quiet;
    match &cli.command {
        Commands::Build(args) => run_build(args, show_progress),
        Commands::Split(args) => run_split(args, show_progress),
        Commands::Pack(args) => run_pack(args),
        Commands::Inspect(args) => run_inspect(args),
    }
}

fn run_build(args: &BuildArgs, show_progress: bool) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.config)?;
    if args.split_height.is_some() {
        cfg.split_height = args.split_height;
    }
    if args.partition_size.is_some() {
        cfg.partition_size = args.partition_size;
    }
    if args.staging_dir.is_some() {
        cfg.staging_dir = args.staging_dir.clone();
    }

    if let Some(fmt) = &args.print_config {
        let text = match fmt.as_str() {
            "json" => serde_json::to_string_pretty(&cfg)?,
            _ => serde_yaml::to_string(&cfg)?,
        };
        println!("{text}");
        return Ok(());
    }

    let total = fs::read_dir(&cfg.assets_path)
        .with_context(|| format!("read assets dir {}", cfg.assets_path.display()))?
        .count();
    let bar = progress_bar(total as u64, "staging", show_progress)?;
    let encoder = ImageStripEncoder {
        jpeg_quality: args.jpeg_quality,
    };

    let result = run_pipeline(&cfg, &encoder, |p| {
        if let Some(b) = &bar {
            let msg = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
            b.set_message(msg.to_string());
            b.inc(1);
        }
    });
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    let report = result.context("asset build failed")?;

    for w in report.bundle.warnings() {
        warn!("{w}");
    }
    if let Some(path) = &args.manifest {
        write_manifest(path, &to_json_manifest(&report.bundle))?;
    }
    info!(
        blob = %report.blob_path.display(),
        header = %report.header_path.display(),
        files = report.bundle.file_count(),
        size = report.blob_size,
        checksum = %format!("0x{:04X}", report.bundle.checksum()),
        "build finished"
    );
    Ok(())
}

fn run_split(args: &SplitArgs, show_progress: bool) -> anyhow::Result<()> {
    let encoding: StripEncoding = args
        .encoding
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown encoding: {}", args.encoding))?;
    let strip_height = checked_strip_height(args.height)?;
    let encoder = ImageStripEncoder {
        jpeg_quality: args.jpeg_quality,
    };

    let paths = gather_paths(&args.input, &args.include, &args.exclude, true, is_image)?;
    if paths.is_empty() {
        anyhow::bail!("no images found under {}", args.input.display());
    }
    let bar = progress_bar(paths.len() as u64, "splitting", show_progress)?;
    let mut failed = 0usize;
    for p in &paths {
        if let Some(b) = &bar {
            let msg = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
            b.set_message(msg.to_string());
        }
        let out_dir = match &args.out_dir {
            Some(d) => d.clone(),
            None => p.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
        };
        match split_file(p, &out_dir, strip_height, encoding, &encoder) {
            Ok(dest) => info!(src = ?p, ?dest, "split"),
            Err(e) => {
                error!(?p, error = %e, "split failed");
                failed += 1;
            }
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} images failed to split", paths.len());
    }
    Ok(())
}

fn run_pack(args: &PackArgs) -> anyhow::Result<()> {
    let paths = gather_paths(
        &args.input,
        &args.include,
        &args.exclude,
        args.recursive,
        |_| true,
    )?;
    info!(files = paths.len(), input = ?args.input, "packing");

    let bundle = BundleBuilder::new(args.name_len).build_from_paths(&paths)?;
    for w in bundle.warnings() {
        warn!("{w}");
    }

    let symbol = args.symbol.clone().unwrap_or_else(|| {
        args.input
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "assets".into())
    });
    let ctx = reference_context(&bundle, &symbol, args.header_include.as_deref());
    let header = render_header(args, &ctx)?;

    if args.dry_run {
        println!(
            "{} files, {} bytes, checksum 0x{:04X}",
            bundle.file_count(),
            bundle.total_len(),
            bundle.checksum()
        );
        for (i, e) in bundle.entries().iter().enumerate() {
            println!(
                "{i:>4}  {:<w$}  off={:<8} size={:<8} {}x{}",
                e.name,
                e.offset,
                e.size,
                e.width,
                e.height,
                w = args.name_len
            );
        }
        return Ok(());
    }

    let size = bundle.write_to(&args.out)?;
    info!(out = ?args.out, size, checksum = %format!("0x{:04X}", bundle.checksum()), "blob written");

    if let Some(dir) = &args.header_dir {
        let name = header_output_name(&args.header_format, &symbol);
        let path = dir.join(name);
        write_atomic(&path, header.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        info!(?path, "header written");
    }
    if let Some(path) = &args.manifest {
        write_manifest(path, &to_json_manifest(&bundle))?;
    }

    if let Some(budget) = args.partition_size {
        if let Err(e) = check_partition(size, budget) {
            error!(
                given_kib = recommended_kib(budget),
                recommended_kib = recommended_kib(size),
                "partition size is smaller than the blob"
            );
            return Err(e.into());
        }
    }
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> anyhow::Result<()> {
    let bytes = fs::read(&args.blob).with_context(|| format!("read {}", args.blob.display()))?;
    let view = BundleView::parse(&bytes, args.name_len)
        .with_context(|| format!("parse {}", args.blob.display()))?;

    if args.json {
        let entries: Vec<_> = view
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| {
                serde_json::json!({
                    "index": i,
                    "name": e.name,
                    "offset": e.offset,
                    "size": e.size,
                    "width": e.width,
                    "height": e.height,
                })
            })
            .collect();
        let doc = serde_json::json!({
            "files": view.len(),
            "checksum": format!("0x{:04X}", view.checksum()),
            "entries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!(
            "{}: {} files, checksum 0x{:04X} (verified)",
            args.blob.display(),
            view.len(),
            view.checksum()
        );
        for (i, e) in view.entries().iter().enumerate() {
            println!(
                "{i:>4}  {:<w$}  off={:<8} size={:<8} {}x{}",
                e.name,
                e.offset,
                e.size,
                e.width,
                e.height,
                w = args.name_len
            );
        }
    }

    if let Some(dir) = &args.extract {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        for (i, e) in view.entries().iter().enumerate() {
            let (Some(data), Some(name)) = (view.data(i), Path::new(&e.name).file_name()) else {
                continue;
            };
            let path = dir.join(name);
            fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
        }
        info!(dir = ?dir, files = view.len(), "entries extracted");
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let cfg: PipelineConfig = if is_json {
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?
    } else {
        serde_yaml::from_str::<YamlConfig>(&text)
            .map(YamlConfig::into_pipeline_config)
            .with_context(|| format!("parse {}", path.display()))?
    };
    Ok(cfg)
}

/// YAML configs may wrap the settings in a top-level `assets:` table.
#[derive(Deserialize)]
#[serde(untagged)]
enum YamlConfig {
    Wrapped { assets: PipelineConfig },
    Flat(PipelineConfig),
}

impl YamlConfig {
    fn into_pipeline_config(self) -> PipelineConfig {
        match self {
            YamlConfig::Wrapped { assets } => assets,
            YamlConfig::Flat(cfg) => cfg,
        }
    }
}

fn render_header(args: &PackArgs, ctx: &ReferenceContext) -> anyhow::Result<String> {
    let tpl_owned_from_file: Option<String> = match &args.header_template {
        Some(path) => Some(
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?,
        ),
        None => None,
    };
    let tpl_ref: &str = if let Some(s) = &tpl_owned_from_file {
        s.as_str()
    } else {
        match args.header_format.to_ascii_lowercase().as_str() {
            "c" => return Ok(render_c_header(ctx)),
            "rust" => include_str!("templates/rust_consts.hbs"),
            "names" => include_str!("templates/manifest_c.hbs"),
            other => anyhow::bail!("unknown header format: {}", other),
        }
    };

    let mut reg = Handlebars::new();
    reg.set_strict_mode(true);
    reg.register_template_string("tpl", tpl_ref)?;
    Ok(reg.render("tpl", ctx)?)
}

fn header_output_name(format: &str, symbol: &str) -> String {
    match format.to_ascii_lowercase().as_str() {
        "rust" => format!("mmap_generate_{symbol}.rs"),
        "names" => format!("mmap_names_{symbol}.h"),
        _ => mmap_assets_core::header::header_file_name(symbol),
    }
}

fn write_manifest(path: &Path, doc: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(doc)?;
    write_atomic(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    info!(?path, "manifest written");
    Ok(())
}

fn progress_bar(len: u64, verb: &str, enabled: bool) -> anyhow::Result<Option<ProgressBar>> {
    if !enabled {
        return Ok(None);
    }
    let b = ProgressBar::new(len);
    b.set_style(ProgressStyle::with_template(&format!(
        "{{spinner:.green}} {verb} {{pos}}/{{len}} [{{elapsed_precise}}] {{wide_msg}}"
    ))?);
    Ok(Some(b))
}

fn gather_paths(
    path: &Path,
    include: &[String],
    exclude: &[String],
    recursive: bool,
    accept: fn(&Path) -> bool,
) -> anyhow::Result<Vec<PathBuf>> {
    // Build glob matchers
    let mut inc_set = None;
    if !include.is_empty() {
        let mut b = GlobSetBuilder::new();
        for pat in include {
            b.add(Glob::new(pat)?);
        }
        inc_set = Some(b.build()?);
    }
    let mut exc_set = None;
    if !exclude.is_empty() {
        let mut b = GlobSetBuilder::new();
        for pat in exclude {
            b.add(Glob::new(pat)?);
        }
        exc_set = Some(b.build()?);
    }
    let mut list: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        if !should_skip(path, inc_set.as_ref(), exc_set.as_ref()) && accept(path) {
            list.push(path.to_path_buf());
        }
    } else {
        let walker = WalkDir::new(path).max_depth(if recursive { usize::MAX } else { 1 });
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && !should_skip(p, inc_set.as_ref(), exc_set.as_ref()) && accept(p) {
                list.push(p.to_path_buf());
            }
        }
    }
    list.sort();
    Ok(list)
}

fn should_skip(
    p: &Path,
    include: Option<&globset::GlobSet>,
    exclude: Option<&globset::GlobSet>,
) -> bool {
    let s = p.to_string_lossy().replace('\\', "/");
    if let Some(ex) = exclude {
        if ex.is_match(&s) {
            return true;
        }
    }
    if let Some(inc) = include {
        if !inc.is_match(&s) {
            return true;
        }
    }
    false
}

fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase()),
        Some(ext) if matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "bmp" | "gif" | "qoi")
    )
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}
