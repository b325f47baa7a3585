use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Writes `<digest>  <file name>` in `sha256sum` format.
pub fn write_sidecar(archive: &Path, sidecar: &Path) -> Result<String> {
    let digest = sha256_file(archive)?;
    let file_name = archive
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    fs::write(sidecar, format!("{digest}  {file_name}\n"))
        .with_context(|| format!("failed to write checksum {}", sidecar.display()))?;
    Ok(digest)
}

pub fn verify_sidecar(archive: &Path, sidecar: &Path) -> Result<()> {
    let recorded = fs::read_to_string(sidecar)
        .with_context(|| format!("failed to read checksum {}", sidecar.display()))?;
    let Some(expected) = recorded.split_whitespace().next() else {
        anyhow::bail!("checksum file is empty: {}", sidecar.display());
    };
    let actual = sha256_file(archive)?;
    if !actual.eq_ignore_ascii_case(expected) {
        anyhow::bail!(
            "checksum mismatch for {}: expected {expected}, got {actual}",
            archive.display()
        );
    }
    Ok(())
}
