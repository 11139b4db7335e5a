/*!
Snapshot metadata sidecar: schema, derivation and JSON persistence.

Every archive `<base>.zip` is paired with a sidecar `<base>.json` carrying the
record below. The sidecar is immutable once written; restore reads it to
recover the original table prefix and target URL without re-parsing the dump.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{paths, Result, VaultError};

/// Metadata recorded alongside each snapshot archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnapshotMetadata {
    /// Site display name at backup time
    pub site_name: String,

    /// Site base URL at backup time
    pub site_url: String,

    /// Base URL the snapshot is intended to go live under
    pub target_live_url: String,

    /// Operator identity that triggered the backup
    pub operator: String,

    /// UTC creation timestamp
    pub created_utc: DateTime<Utc>,

    /// Platform version of the source installation
    pub platform_version: String,

    /// Version of this engine that wrote the snapshot
    pub engine_version: String,

    /// Database table-name prefix of the source installation
    pub db_prefix: String,

    /// File name of the paired archive
    pub archive_file: String,

    /// Size of the SQL dump included in the archive, in bytes
    pub db_dump_size_bytes: u64,

    /// SHA-256 of the finished archive; absent in sidecars written by
    /// older builds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_sha256: Option<String>,
}

impl SnapshotMetadata {
    /// Compute the hex SHA-256 of a file, streaming through a bounded buffer.
    pub fn hash_file(path: &Path) -> Result<String> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Sidecar path paired with an archive path: same base name, `.json`
    /// extension.
    pub fn sidecar_path_for(archive_path: &Path) -> PathBuf {
        archive_path.with_extension("json")
    }

    /// Write the record to a sidecar file, creating parent directories.
    pub fn write_sidecar(&self, sidecar_path: &Path) -> Result<()> {
        if let Some(parent) = sidecar_path.parent() {
            paths::ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(sidecar_path, json)?;
        Ok(())
    }

    /// Read a sidecar record.
    pub fn read_sidecar(sidecar_path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(sidecar_path).map_err(|e| {
            VaultError::validation(format!(
                "cannot read metadata sidecar {}: {e}",
                sidecar_path.display()
            ))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Read the sidecar paired with the given archive, if present.
    pub fn read_for_archive(archive_path: &Path) -> Option<Self> {
        let sidecar = Self::sidecar_path_for(archive_path);
        if sidecar.is_file() {
            Self::read_sidecar(&sidecar).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> SnapshotMetadata {
        SnapshotMetadata {
            site_name: "Example Site".into(),
            site_url: "https://staging.example.test".into(),
            target_live_url: "https://example.test".into(),
            operator: "admin".into(),
            created_utc: Utc::now(),
            platform_version: "6.5".into(),
            engine_version: env!("CARGO_PKG_VERSION").into(),
            db_prefix: "wp_".into(),
            archive_file: "example-site-20260823-120000.zip".into(),
            db_dump_size_bytes: 1234,
            archive_sha256: None,
        }
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snap.json");
        let meta = sample();
        meta.write_sidecar(&path).unwrap();
        let loaded = SnapshotMetadata::read_sidecar(&path).unwrap();
        assert_eq!(loaded, meta);
    }

    #[test]
    fn test_sidecar_path_for_archive() {
        let p = SnapshotMetadata::sidecar_path_for(Path::new("/store/site-20260823-120000.zip"));
        assert_eq!(p, PathBuf::from("/store/site-20260823-120000.json"));
    }

    #[test]
    fn test_read_for_archive_missing_pair() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("orphan.zip");
        fs::write(&archive, b"zip").unwrap();
        assert!(SnapshotMetadata::read_for_archive(&archive).is_none());
    }

    #[test]
    fn test_tolerates_sidecar_without_checksum() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old.json");
        let mut value = serde_json::to_value(sample()).unwrap();
        value.as_object_mut().unwrap().remove("archive_sha256");
        fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
        let loaded = SnapshotMetadata::read_sidecar(&path).unwrap();
        assert_eq!(loaded.archive_sha256, None);
    }

    #[test]
    fn test_hash_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        fs::write(&path, b"test data").unwrap();
        assert_eq!(
            SnapshotMetadata::hash_file(&path).unwrap(),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }
}
