use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use serde::Serialize;
use tracing::warn;

use crate::bundle::Bundle;

/// File name of the reference header for `symbol`.
pub fn header_file_name(symbol: &str) -> String {
    format!("mmap_generate_{symbol}.h")
}

/// Upper-cased C identifier fragment: every character outside `[A-Za-z0-9]` becomes `_`.
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// One enumerator of the reference header.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceItem {
    pub ident: String,
    pub index: usize,
    pub name: String,
}

/// Everything a reference header is rendered from. Also the context handed to
/// user templates.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceContext {
    /// Upper-cased prefix, e.g. `MMAP_DRIVE_A`.
    pub prefix: String,
    pub symbol: String,
    pub files: u32,
    pub checksum: String,
    pub include: Option<String>,
    pub items: Vec<ReferenceItem>,
}

/// Builds the header context. Enumerators that would repeat after sanitizing
/// (`icon-a.png` and `icon_a.png`) get the entry index appended, and a warning is logged.
pub fn reference_context(bundle: &Bundle, symbol: &str, include: Option<&str>) -> ReferenceContext {
    let prefix = format!("MMAP_{}", sanitize_identifier(symbol));
    let base: Vec<String> = bundle
        .entries()
        .iter()
        .map(|e| format!("{prefix}_{}", sanitize_identifier(&e.name)))
        .collect();
    let mut taken: HashSet<String> = base.iter().cloned().collect();
    let mut first_owner: HashMap<&str, &str> = HashMap::new();

    let mut items = Vec::with_capacity(base.len());
    for (index, (e, ident)) in bundle.entries().iter().zip(&base).enumerate() {
        let ident = match first_owner.get(ident.as_str()) {
            None => {
                first_owner.insert(ident, &e.name);
                ident.clone()
            }
            Some(first) => {
                let mut unique = format!("{ident}_{index}");
                while taken.contains(&unique) {
                    unique.push_str(&format!("_{index}"));
                }
                warn!(
                    first = %first,
                    second = %e.name,
                    ident = %unique,
                    "enumerator name collision, index appended"
                );
                taken.insert(unique.clone());
                unique
            }
        };
        items.push(ReferenceItem {
            ident,
            index,
            name: e.name.clone(),
        });
    }
    ReferenceContext {
        prefix,
        symbol: symbol.to_string(),
        files: bundle.file_count(),
        checksum: format!("0x{:04X}", bundle.checksum()),
        include: include.map(str::to_string),
        items,
    }
}

/// C header with the file count, checksum and a name -> index enumeration.
/// Enumerator values are the entry positions in the bundle, so the header must be
/// regenerated together with the blob.
pub fn emit_reference_header(bundle: &Bundle, symbol: &str, include: Option<&str>) -> String {
    render_c_header(&reference_context(bundle, symbol, include))
}

pub fn render_c_header(ctx: &ReferenceContext) -> String {
    let mut s = String::new();
    s.push_str("/**\n * @file\n * @brief This file was generated by mmap-assets, don't modify it\n */\n\n");
    s.push_str("#pragma once\n\n");
    if let Some(inc) = &ctx.include {
        let _ = writeln!(s, "#include \"{inc}\"\n");
    }
    let _ = writeln!(s, "#define {}_FILES           {}", ctx.prefix, ctx.files);
    let _ = writeln!(s, "#define {}_CHECKSUM        {}\n", ctx.prefix, ctx.checksum);
    let _ = writeln!(s, "enum {}_LISTS {{", ctx.prefix);
    for item in &ctx.items {
        let _ = writeln!(
            s,
            "    {} = {},        /*!< {} */",
            item.ident, item.index, item.name
        );
    }
    s.push_str("};\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_dots_and_dashes() {
        assert_eq!(sanitize_identifier("frame-01.sqoi"), "FRAME_01_SQOI");
        assert_eq!(header_file_name("Drive_A"), "mmap_generate_Drive_A.h");
    }
}
