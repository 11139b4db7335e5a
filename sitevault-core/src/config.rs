/*!
Process-wide configuration: operator settings, database credentials and the
site context handed to the orchestrators.

The engine never owns ambient global state; every operation receives an
explicit [`SiteContext`] plus a [`SettingsStore`] and threads updates through
return values.
*/

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{paths, Result, VaultError};

/// Directory name used for the archive store when the operator has not
/// configured one, created under the site content directory.
pub const DEFAULT_STORE_DIRNAME: &str = "sitevault-backups";

/// Operator-facing settings persisted outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the staging site (search side of URL rewriting)
    pub staging_url: String,
    /// Canonical base URL of the live site (replace side of URL rewriting)
    pub live_url: String,
    /// Archive store directory; empty means the default under the content dir
    pub backup_dir: String,
    /// Number of snapshots to keep; 0 disables retention enforcement
    pub retention: u32,
    /// Whether a safety backup is taken before every restore
    pub pre_restore_backup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            staging_url: String::new(),
            live_url: String::new(),
            backup_dir: String::new(),
            retention: 10,
            pre_restore_backup: true,
        }
    }
}

impl Settings {
    /// Resolve the archive store directory, falling back to the default
    /// location under the given content directory.
    pub fn backup_dir_or_default(&self, content_dir: &Path) -> PathBuf {
        if self.backup_dir.is_empty() {
            content_dir.join(DEFAULT_STORE_DIRNAME)
        } else {
            paths::normalize(&self.backup_dir)
        }
    }
}

/// Persistent settings storage owned by the external surface.
///
/// The core reads settings once per operation and writes them back exactly
/// once: after a database import may have replaced the stored archive-store
/// path (restore step 13).
pub trait SettingsStore {
    /// Load the current settings; missing storage yields defaults.
    fn load(&self) -> Settings;

    /// Persist updated settings.
    fn save(&mut self, settings: &Settings) -> Result<()>;
}

/// Settings store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SettingsStore for JsonFileSettings {
    fn load(&self) -> Settings {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save(&mut self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            paths::ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory settings store for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    settings: Settings,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> Settings {
        self.settings.clone()
    }

    fn save(&mut self, settings: &Settings) -> Result<()> {
        self.settings = settings.clone();
        Ok(())
    }
}

/// Connection parameters for the site database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub socket: Option<String>,
    pub user: String,
    pub password: String,
    /// Database (schema) name
    pub name: String,
    /// Table-name prefix of the live installation
    pub prefix: String,
}

impl DbCredentials {
    /// Split a combined `host:port` or `host:/path/to/socket` host string,
    /// the form platform config files commonly use.
    pub fn split_host(host: &str) -> (String, Option<u16>, Option<String>) {
        match host.split_once(':') {
            Some((h, rest)) if rest.starts_with('/') => {
                (h.to_string(), None, Some(rest.to_string()))
            }
            Some((h, rest)) => (h.to_string(), rest.parse().ok(), None),
            None => (host.to_string(), None, None),
        }
    }
}

/// Which external-tool tiers an operation may attempt.
///
/// All tiers are enabled in production; tests disable subprocess tiers so the
/// fallback paths run deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Platform CLI control channel (export/import/search-replace)
    pub site_cli: bool,
    /// `mysqldump` / `mysql` client binaries
    pub db_cli: bool,
    /// System `zip` binary for archive creation
    pub system_zip: bool,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            site_cli: true,
            db_cli: true,
            system_zip: true,
        }
    }
}

impl ToolPolicy {
    /// Disable every subprocess tier; only in-process fallbacks run.
    pub fn in_process_only() -> Self {
        Self {
            site_cli: false,
            db_cli: false,
            system_zip: false,
        }
    }
}

/// Everything the orchestrators need to know about the live installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteContext {
    /// Installation root (the directory holding the platform config file)
    pub root: PathBuf,
    /// Content directory captured by backups
    pub content_dir: PathBuf,
    /// This engine's own install directory inside the extensions subtree;
    /// never deleted or overwritten during restore
    pub engine_dir: PathBuf,
    /// Platform configuration file holding credentials and the table prefix
    pub config_file: PathBuf,
    /// Human-readable site name
    pub site_name: String,
    /// Current site base URL
    pub site_url: String,
    /// Current home/front-page base URL
    pub home_url: String,
    /// Operator identity recorded in snapshot metadata
    pub operator: String,
    /// Platform version recorded in snapshot metadata
    pub platform_version: String,
    pub db: DbCredentials,
    #[serde(default)]
    pub tools: ToolPolicy,
}

impl SiteContext {
    /// The fixed top-level name content files carry inside an archive: the
    /// content directory's own basename.
    pub fn content_root_name(&self) -> String {
        self.content_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wp-content".to_string())
    }

    /// The subtree holding installed extensions, special-cased when the
    /// content tree is cleared during restore.
    pub fn extensions_dir(&self) -> Option<PathBuf> {
        self.engine_dir.parent().map(paths::normalize)
    }

    /// Validate that the context describes a usable installation.
    pub fn validate(&self) -> Result<()> {
        if self.site_url.is_empty() && self.home_url.is_empty() {
            return Err(VaultError::validation("site_url and home_url are both empty"));
        }
        if self.db.prefix.is_empty() {
            return Err(VaultError::validation("database table prefix cannot be empty"));
        }
        if self.content_dir.as_os_str().is_empty() {
            return Err(VaultError::validation("content_dir cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_defaults() {
        let s = Settings::default();
        assert_eq!(s.retention, 10);
        assert!(s.pre_restore_backup);
    }

    #[test]
    fn test_backup_dir_fallback() {
        let s = Settings::default();
        let dir = s.backup_dir_or_default(Path::new("/site/wp-content"));
        assert_eq!(dir, PathBuf::from("/site/wp-content/sitevault-backups"));

        let s = Settings {
            backup_dir: "/mnt/backups/".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            s.backup_dir_or_default(Path::new("/site/wp-content")),
            PathBuf::from("/mnt/backups")
        );
    }

    #[test]
    fn test_json_file_settings_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        let mut store = JsonFileSettings::new(&path);

        // Missing file yields defaults
        assert_eq!(store.load(), Settings::default());

        let settings = Settings {
            staging_url: "https://staging.example.test".into(),
            live_url: "https://example.test".into(),
            retention: 3,
            ..Settings::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn test_split_host() {
        assert_eq!(
            DbCredentials::split_host("db.example.test"),
            ("db.example.test".to_string(), None, None)
        );
        assert_eq!(
            DbCredentials::split_host("127.0.0.1:3307"),
            ("127.0.0.1".to_string(), Some(3307), None)
        );
        assert_eq!(
            DbCredentials::split_host("localhost:/run/mysqld/mysqld.sock"),
            (
                "localhost".to_string(),
                None,
                Some("/run/mysqld/mysqld.sock".to_string())
            )
        );
    }
}
