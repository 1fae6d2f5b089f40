//! On-disk cache locations for downloaded datasets and pretrained weights.

use std::path::{Path, PathBuf};

/// Root of the toxgraph cache: `<user cache dir>/toxgraph`, or `.cache/toxgraph`
/// when the platform has no cache directory.
pub fn cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("toxgraph")
}

/// Resolve a cache subdirectory, honouring an explicit override.
///
/// An override is used as-is, so callers that point two collaborators at the
/// same directory get a shared cache.
pub fn cache_subdir(override_dir: Option<&Path>, name: &str) -> PathBuf {
    match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => cache_root().join(name),
    }
}
