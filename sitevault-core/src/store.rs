/*!
The archive store: the directory holding snapshot pairs, the operation log,
persisted pre-import site URLs and access-denial markers.

Listing tolerates files appearing mid-write: a zip or sidecar whose pair is
missing is reported as an orphan, never as an error.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::{paths, Result};

/// Operation log file name inside the store.
pub const LOG_FILE: &str = "sitevault.log";

/// Reserved file persisting the pre-import site URLs; excluded from orphan
/// detection.
pub const SITE_URLS_FILE: &str = ".sitevault-siteurls.json";

/// Empty placeholder preventing directory listings on naive servers.
const PLACEHOLDER_FILE: &str = "index.html";

/// Deny-all rule file for Apache-family servers fronting the store.
const DENY_FILE: &str = ".htaccess";

const DENY_RULES: &str = "# sitevault backups protection\n\
Options -Indexes\n\
<IfModule mod_authz_core.c>\n\
\tRequire all denied\n\
</IfModule>\n\
<IfModule !mod_authz_core.c>\n\
\tDeny from all\n\
</IfModule>\n";

/// One valid snapshot: a `.zip`/`.json` pair sharing a base name.
#[derive(Debug, Clone)]
pub struct SnapshotPair {
    pub base: String,
    pub archive_path: PathBuf,
    pub sidecar_path: PathBuf,
    /// Sidecar modification time, the retention sort key
    pub modified: SystemTime,
}

/// Site URLs captured just before a database import overwrites them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSiteUrls {
    pub siteurl: String,
    pub home: String,
    pub saved_at: DateTime<Utc>,
}

/// Handle on the archive store directory.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    dir: PathBuf,
}

impl ArchiveStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: paths::normalize(dir),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ensure the store directory exists and carries its access-denial
    /// markers. Existing marker files are left untouched.
    pub fn ensure_protected(&self) -> Result<()> {
        paths::ensure_dir(&self.dir)?;
        let placeholder = self.dir.join(PLACEHOLDER_FILE);
        if !placeholder.exists() {
            fs::write(&placeholder, b"")?;
        }
        let deny = self.dir.join(DENY_FILE);
        if !deny.exists() {
            fs::write(&deny, DENY_RULES)?;
        }
        Ok(())
    }

    /// Append a UTC-timestamped line to the store's log file. Best-effort:
    /// logging never fails an operation.
    pub fn log(&self, message: &str) {
        info!(store = %self.dir.display(), "{message}");
        if paths::ensure_dir(&self.dir).is_err() {
            return;
        }
        let line = format!("[{}] {message}\n", Utc::now().to_rfc3339());
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(LOG_FILE))
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = appended {
            warn!(error = %e, "store log write failed");
        }
    }

    /// List valid snapshot pairs, newest sidecar first.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotPair>> {
        let mut pairs = Vec::new();
        for sidecar in self.sidecar_files()? {
            let base = match sidecar.file_stem().map(|s| s.to_string_lossy().into_owned()) {
                Some(base) => base,
                None => continue,
            };
            let archive = sidecar.with_extension("zip");
            if !archive.is_file() {
                continue;
            }
            let modified = fs::metadata(&sidecar)?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            pairs.push(SnapshotPair {
                base,
                archive_path: archive,
                sidecar_path: sidecar,
                modified,
            });
        }
        pairs.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(pairs)
    }

    /// Report files missing their pair: archives without a sidecar and
    /// sidecars without an archive. Reserved store files never count.
    pub fn orphans(&self) -> Result<Vec<PathBuf>> {
        let mut orphans = Vec::new();
        if !self.dir.is_dir() {
            return Ok(orphans);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || self.is_reserved(&path) {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some("zip") if !path.with_extension("json").is_file() => orphans.push(path),
                Some("json") if !path.with_extension("zip").is_file() => orphans.push(path),
                _ => {}
            }
        }
        orphans.sort();
        Ok(orphans)
    }

    /// Prune snapshots beyond the `keep` newest, deleting each excess
    /// sidecar together with its paired archive. Returns pruned base names.
    pub fn enforce_retention(&self, keep: usize) -> Result<Vec<String>> {
        let mut pruned = Vec::new();
        for pair in self.list_snapshots()?.into_iter().skip(keep) {
            if let Err(e) = fs::remove_file(&pair.sidecar_path) {
                warn!(path = %pair.sidecar_path.display(), error = %e, "retention delete failed");
                continue;
            }
            if let Err(e) = fs::remove_file(&pair.archive_path) {
                warn!(path = %pair.archive_path.display(), error = %e, "retention delete failed");
            }
            pruned.push(pair.base);
        }
        if !pruned.is_empty() {
            self.log(&format!("retention pruned snapshots: {}", pruned.join(", ")));
        }
        Ok(pruned)
    }

    /// Persist the current site URLs for forensic recovery before a database
    /// import overwrites the rows that hold them.
    pub fn persist_site_urls(&self, siteurl: &str, home: &str) -> Result<()> {
        paths::ensure_dir(&self.dir)?;
        let record = SavedSiteUrls {
            siteurl: siteurl.trim_end_matches('/').to_string(),
            home: home.trim_end_matches('/').to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(self.dir.join(SITE_URLS_FILE), json)?;
        Ok(())
    }

    /// Read back the persisted pre-import URLs, if any.
    pub fn read_site_urls(&self) -> Option<SavedSiteUrls> {
        let raw = fs::read_to_string(self.dir.join(SITE_URLS_FILE)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn is_reserved(&self, path: &Path) -> bool {
        matches!(
            path.file_name().and_then(|n| n.to_str()),
            Some(LOG_FILE) | Some(SITE_URLS_FILE) | Some(PLACEHOLDER_FILE) | Some(DENY_FILE)
        )
    }

    fn sidecar_files(&self) -> Result<Vec<PathBuf>> {
        let mut sidecars = Vec::new();
        if !self.dir.is_dir() {
            return Ok(sidecars);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file()
                && !self.is_reserved(&path)
                && path.extension().and_then(|e| e.to_str()) == Some("json")
            {
                sidecars.push(path);
            }
        }
        Ok(sidecars)
    }
}
