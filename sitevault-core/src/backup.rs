/*!
Backup orchestration: export, optional URL rewrite, archive, sidecar,
retention.

The orchestrator is the only component that sees the whole pipeline. Every
step failure is reported with the step name; nothing is retried.
*/

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::archive::{ArchiveService, SQL_DUMP_NAME};
use crate::config::{Settings, SiteContext};
use crate::db::DatabaseClient;
use crate::export::DatabaseExportEngine;
use crate::metadata::SnapshotMetadata;
use crate::replace::SearchReplaceEngine;
use crate::sanitize::sanitize;
use crate::store::ArchiveStore;
use crate::{fsops, paths, Result, VaultError};

/// Per-invocation backup options; unset fields fall back to settings, then
/// to the site context.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Override for the staging URL (search side of URL rewriting)
    pub staging_url: Option<String>,
    /// Override for the live URL (replace side of URL rewriting)
    pub live_url: Option<String>,
    /// Override for the archive store directory
    pub backup_dir: Option<PathBuf>,
    /// Rewrite staging URLs to live URLs inside the dump
    pub replace_urls: bool,
}

/// Outcome of a completed backup.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub archive_path: PathBuf,
    pub metadata: SnapshotMetadata,
}

/// Drives one snapshot from live state to a stored pair.
pub struct BackupOrchestrator<'a, D: DatabaseClient> {
    ctx: &'a SiteContext,
    db: &'a mut D,
    settings: Settings,
}

impl<'a, D: DatabaseClient> BackupOrchestrator<'a, D> {
    pub fn new(ctx: &'a SiteContext, db: &'a mut D, settings: Settings) -> Self {
        Self { ctx, db, settings }
    }

    /// Create one snapshot pair in the archive store.
    pub fn create_backup(&mut self, opts: &BackupOptions) -> Result<BackupReport> {
        self.ctx.validate()?;

        let staging_url = opts
            .staging_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| {
                if self.settings.staging_url.is_empty() {
                    self.ctx.site_url.clone()
                } else {
                    self.settings.staging_url.clone()
                }
            });
        let live_url = opts
            .live_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.settings.live_url.clone());

        let store_dir = opts
            .backup_dir
            .clone()
            .unwrap_or_else(|| self.settings.backup_dir_or_default(&self.ctx.content_dir));
        let store = ArchiveStore::new(&store_dir);
        store
            .ensure_protected()
            .map_err(|e| VaultError::step("store", e.to_string()))?;

        let base = snapshot_base_name(&self.ctx.site_name, &live_url, &staging_url);
        store.log(&format!("backup started: {base}"));

        let scratch = store.dir().join(format!(".tmp-{base}"));
        let result = self.run_pipeline(opts, &store, &scratch, &base, &staging_url, &live_url);
        fsops::remove_tree(&scratch);

        match &result {
            Ok(report) => store.log(&format!(
                "backup finished: {}",
                report.archive_path.display()
            )),
            Err(e) => store.log(&format!("backup failed: {e}")),
        }
        result
    }

    fn run_pipeline(
        &mut self,
        opts: &BackupOptions,
        store: &ArchiveStore,
        scratch: &Path,
        base: &str,
        staging_url: &str,
        live_url: &str,
    ) -> Result<BackupReport> {
        paths::ensure_dir(scratch)?;

        let mut dump = DatabaseExportEngine::new(self.ctx, self.db)
            .export_to_sql(&scratch.join(SQL_DUMP_NAME))
            .map_err(|e| VaultError::step("export", e.to_string()))?;

        // Best-effort: a failed rewrite never blocks the backup.
        if opts.replace_urls && !live_url.is_empty() && staging_url != live_url {
            match SearchReplaceEngine::new(self.ctx).replace_in_dump(&dump, staging_url, live_url) {
                Ok(rewritten) => dump = rewritten,
                Err(e) => warn!(error = %e, "URL rewrite skipped, archiving unreplaced dump"),
            }
        }

        let archive_path = store.dir().join(format!("{base}.zip"));
        let archiver = ArchiveService::new(self.ctx.content_root_name())
            .with_credentials_file(credentials_file_name(self.ctx))
            .with_system_zip(self.ctx.tools.system_zip);
        archiver
            .create(
                &archive_path,
                &self.ctx.content_dir,
                &dump,
                &[store.dir().to_path_buf()],
            )
            .map_err(|e| VaultError::step("archive", e.to_string()))?;

        let metadata = self
            .build_metadata(&archive_path, &dump, staging_url, live_url)
            .map_err(|e| VaultError::step("metadata", e.to_string()))?;
        metadata
            .write_sidecar(&SnapshotMetadata::sidecar_path_for(&archive_path))
            .map_err(|e| VaultError::step("metadata", e.to_string()))?;

        if self.settings.retention > 0 {
            store
                .enforce_retention(self.settings.retention as usize)
                .map_err(|e| VaultError::step("retention", e.to_string()))?;
        }

        info!(archive = %archive_path.display(), "snapshot created");
        Ok(BackupReport {
            archive_path,
            metadata,
        })
    }

    fn build_metadata(
        &self,
        archive_path: &Path,
        dump: &Path,
        staging_url: &str,
        live_url: &str,
    ) -> Result<SnapshotMetadata> {
        Ok(SnapshotMetadata {
            site_name: self.ctx.site_name.clone(),
            site_url: staging_url.to_string(),
            target_live_url: live_url.to_string(),
            operator: self.ctx.operator.clone(),
            created_utc: Utc::now(),
            platform_version: self.ctx.platform_version.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            db_prefix: self.ctx.db.prefix.clone(),
            archive_file: archive_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            db_dump_size_bytes: fs::metadata(dump)?.len(),
            archive_sha256: Some(SnapshotMetadata::hash_file(archive_path)?),
        })
    }
}

/// Base name of a new snapshot: sanitized site name, falling back to the
/// live (then staging) URL stripped of its scheme, plus a UTC timestamp.
fn snapshot_base_name(site_name: &str, live_url: &str, staging_url: &str) -> String {
    let mut base = sanitize(site_name);
    if base.is_empty() {
        base = sanitize(strip_scheme(live_url));
    }
    if base.is_empty() {
        base = sanitize(strip_scheme(staging_url));
    }
    if base.is_empty() {
        base = "site".to_string();
    }
    format!("{base}-{}", Utc::now().format("%Y%m%d-%H%M%S"))
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

fn credentials_file_name(ctx: &SiteContext) -> String {
    ctx.config_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wp-config.php".to_string())
}
