//! File key and node ID validation.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{FigmaError, FigmaResult};

static FILE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("valid file key pattern"));

static NODE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^I?\d+[:|-]\d+(?:;\d+[:|-]\d+)*$").expect("valid node id pattern")
});

/// Validate a Figma file key (alphanumeric only).
pub fn validate_file_key(file_key: &str) -> FigmaResult<&str> {
    if FILE_KEY.is_match(file_key) {
        Ok(file_key)
    } else {
        Err(FigmaError::InvalidFileKey(format!(
            "{file_key:?} must be alphanumeric"
        )))
    }
}

/// Validate a node ID and convert URL-style separators (`1-2`) to API form (`1:2`).
///
/// Instance IDs such as `I5666:180910;1:10515` are accepted.
pub fn normalize_node_id(node_id: &str) -> FigmaResult<String> {
    if !NODE_ID.is_match(node_id) {
        return Err(FigmaError::InvalidNodeId(format!(
            "{node_id:?} must look like '1234:5678' or 'I5666:180910;1:10515'"
        )));
    }
    Ok(node_id.replace('-', ":"))
}

/// Resolve `relative` under `base`, rejecting absolute paths and parent traversal.
pub fn safe_local_path(base: &Path, relative: &str) -> FigmaResult<PathBuf> {
    let rel = Path::new(relative);
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(FigmaError::InvalidPath(format!(
                    "{relative:?} must be a relative path inside {}",
                    base.display()
                )))
            }
        }
    }
    Ok(base.join(rel))
}
