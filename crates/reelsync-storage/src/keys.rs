//! Shared key and sidecar path derivation for uploaders.
//!
//! Key format: `<group>_<title>.<ext>` becomes `<group>/<title>.<ext>`.

use std::path::{Path, PathBuf};

use reelsync_core::constants::PROGRESS_SUFFIX;
use reelsync_core::{parse_file_name, NameError};

/// Derive the hierarchical remote key for a watched file name.
pub fn remote_key(file_name: &str) -> Result<String, NameError> {
    let parsed = parse_file_name(file_name)?;
    Ok(format!("{}/{}", parsed.group, parsed.title_with_extension()))
}

/// Sidecar path for `source_name`, placed next to `local_path`.
pub fn progress_path(local_path: &Path, source_name: &str) -> PathBuf {
    let file = format!("{}{}", source_name, PROGRESS_SUFFIX);
    match local_path.parent() {
        Some(parent) => parent.join(file),
        None => PathBuf::from(file),
    }
}

/// Reject keys that could escape a base directory or an object prefix.
///
/// Only whole segments count: `so close...mp4` is a fine file name.
pub(crate) fn check_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
