//! Model file integrity checks

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Compute SHA256 hash of a file, hex encoded
pub fn compute_sha256(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    Ok(hex::encode(hasher.finalize()))
}

/// Fail unless the file hashes to `expected` (case-insensitive hex)
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = compute_sha256(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        bail!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected.trim(),
            actual
        );
    }

    log::info!("Checksum verified: {}", path.display());
    Ok(())
}
