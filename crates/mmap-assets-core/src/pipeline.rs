use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, instrument, warn};

use crate::bundle::{Bundle, BundleBuilder};
use crate::config::PipelineConfig;
use crate::error::{AssetError, Result};
use crate::header::{emit_reference_header, header_file_name};
use crate::output::write_atomic;
use crate::splitter::{StripEncoder, split_file};

/// Output of a full asset build.
#[derive(Debug)]
pub struct PipelineReport {
    /// Files the bundle was built from, in staging order.
    pub staged: Vec<PathBuf>,
    pub bundle: Bundle,
    pub blob_path: PathBuf,
    pub blob_size: u64,
    pub header_path: PathBuf,
}

/// Kibibytes needed to hold `bytes`, rounded up.
pub fn recommended_kib(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}

/// Fails with `PartitionTooSmall` when `actual` bytes exceed `budget`.
pub fn check_partition(actual: u64, budget: u64) -> Result<()> {
    if actual > budget {
        return Err(AssetError::PartitionTooSmall {
            actual,
            budget,
            recommended_kib: recommended_kib(actual),
        });
    }
    Ok(())
}

#[instrument(skip_all, fields(assets = %cfg.assets_path.display()))]
/// Copies supported files from `assets_path` into a freshly emptied staging
/// directory, converting images to strip containers as the config asks.
///
/// `on_file` is called before each source file is handled (progress reporting).
/// On error the staging directory is removed again.
pub fn stage_assets(
    cfg: &PipelineConfig,
    encoder: &dyn StripEncoder,
    mut on_file: impl FnMut(&Path),
) -> Result<Vec<PathBuf>> {
    let strip_height = cfg.strip_height()?;
    let staging = cfg.staging_dir();
    guard_staging_dir(&cfg.assets_path, &staging)?;

    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| AssetError::io(&staging, e))?;
    }
    fs::create_dir_all(&staging).map_err(|e| AssetError::io(&staging, e))?;

    let result = stage_into(cfg, &staging, strip_height, encoder, &mut on_file);

    if result.is_err() {
        let _ = fs::remove_dir_all(&staging);
    }
    result
}

#[instrument(skip_all)]
/// Stages the assets, writes the merged blob and the reference header, then checks
/// the blob against the partition budget.
///
/// Notes:
/// - Hard errors abort before the blob is written.
/// - `PartitionTooSmall` is returned after both artifacts are on disk.
pub fn run_pipeline(
    cfg: &PipelineConfig,
    encoder: &dyn StripEncoder,
    on_file: impl FnMut(&Path),
) -> Result<PipelineReport> {
    cfg.validate()?;
    let staged = stage_assets(cfg, encoder, on_file)?;

    let bundle = BundleBuilder::new(cfg.name_length).build_from_paths(&staged)?;
    let blob_size = bundle.write_to(&cfg.image_file)?;

    let symbol = cfg.bundle_symbol();
    let header_path = cfg.header_dir.join(header_file_name(&symbol));
    let header = emit_reference_header(&bundle, &symbol, cfg.header_include.as_deref());
    write_atomic(&header_path, header.as_bytes())?;
    info!(
        blob = %cfg.image_file.display(),
        header = %header_path.display(),
        files = bundle.file_count(),
        "all files merged"
    );

    if let Some(budget) = cfg.partition_size {
        if let Err(e) = check_partition(blob_size, budget) {
            error!(
                given_kib = recommended_kib(budget),
                recommended_kib = recommended_kib(blob_size),
                "assets partition size is smaller than recommended"
            );
            return Err(e);
        }
    }

    Ok(PipelineReport {
        staged,
        bundle,
        blob_path: cfg.image_file.clone(),
        blob_size,
        header_path,
    })
}

fn stage_into(
    cfg: &PipelineConfig,
    staging: &Path,
    strip_height: Option<u16>,
    encoder: &dyn StripEncoder,
    on_file: &mut impl FnMut(&Path),
) -> Result<Vec<PathBuf>> {
    info!(
        support_spng = cfg.support_spng,
        support_sjpg = cfg.support_sjpg,
        support_qoi = cfg.support_qoi,
        support_sqoi = cfg.support_sqoi,
        split_height = ?strip_height,
        "staging assets"
    );
    let mut sources = list_files(&cfg.assets_path)?;
    sources.sort();
    let mut staged: Vec<PathBuf> = Vec::with_capacity(sources.len());
    for src in sources {
        on_file(&src);
        if !cfg.is_supported(&src) {
            info!(file = %src.display(), formats = ?cfg.support_format, "no match found, skipping");
            continue;
        }
        let dest = match cfg.conversion_for(&src) {
            Some(encoding) => split_file(&src, staging, strip_height, encoding, encoder)?,
            None => {
                let Some(name) = src.file_name() else { continue };
                let dest = staging.join(name);
                fs::copy(&src, &dest).map_err(|e| AssetError::io(&src, e))?;
                dest
            }
        };
        if staged.contains(&dest) {
            warn!(file = %dest.display(), src = %src.display(), "staged name reused, later source wins");
            continue;
        }
        info!(src = %src.display(), dest = %dest.display(), "staged");
        staged.push(dest);
    }
    Ok(staged)
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| AssetError::io(dir, e))? {
        let entry = entry.map_err(|e| AssetError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            out.push(path);
        }
    }
    Ok(out)
}

/// The staging directory is wiped on every run, so it must never contain the sources.
fn guard_staging_dir(assets: &Path, staging: &Path) -> Result<()> {
    let assets_abs = assets.canonicalize().map_err(|e| AssetError::io(assets, e))?;
    let staging_abs = staging
        .canonicalize()
        .unwrap_or_else(|_| staging.to_path_buf());
    if assets_abs.starts_with(&staging_abs) || assets.starts_with(staging) {
        return Err(AssetError::Config(format!(
            "staging dir {} would contain the assets dir {}",
            staging.display(),
            assets.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_equal_to_size_passes() {
        assert!(check_partition(8192, 8192).is_ok());
        assert_eq!(recommended_kib(1), 1);
        assert_eq!(recommended_kib(1024), 1);
        assert_eq!(recommended_kib(1025), 2);
    }
}
