use serde_json::{Value, json};

use crate::bundle::Bundle;

/// JSON description of a bundle for tooling: header fields, one record per entry
/// (in index order) and any build warnings.
/// Shape: `{ files, checksum, combinedLength, maxNameLength, entries: [{ index, name, offset, size, width, height }], warnings }`.
pub fn to_json_manifest(bundle: &Bundle) -> Value {
    let entries: Vec<Value> = bundle
        .entries()
        .iter()
        .enumerate()
        .map(|(index, e)| {
            json!({
                "index": index,
                "name": e.name,
                "offset": e.offset,
                "size": e.size,
                "width": e.width,
                "height": e.height,
            })
        })
        .collect();
    json!({
        "files": bundle.file_count(),
        "checksum": format!("0x{:04X}", bundle.checksum()),
        "combinedLength": bundle.combined_len(),
        "maxNameLength": bundle.max_name_len(),
        "entries": entries,
        "warnings": bundle.warnings(),
    })
}
