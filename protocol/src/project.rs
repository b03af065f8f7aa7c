use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Derive the stable project ID for a project root:
/// `"proj-" ++ first-8-hex(SHA-256(canonical absolute path))`.
///
/// The CLI, the bridge, and the editor plugin must all reproduce this
/// byte-for-byte, so canonicalization is pinned here: symlink-resolved
/// where the path exists, case-preserving on POSIX, lower-cased on Windows.
pub fn compute_project_id(path: &Path) -> String {
    let canonical = canonical_project_path(path);
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in &digest[..4] {
        hex.push_str(&format!("{:02x}", byte));
    }
    format!("proj-{}", hex)
}

/// Absolute, symlink-resolved form of the project path used for hashing.
pub fn canonical_project_path(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| absolutize(path));
    let text = absolute.to_string_lossy().into_owned();
    if cfg!(windows) {
        text.to_lowercase()
    } else {
        text
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}
