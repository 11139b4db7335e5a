/*!
Restore orchestration: the linear state machine that takes a snapshot pair
back onto a live installation.

This is the highest-risk path in the engine. Once the database import starts
the live state is gone; the safety backup taken up front is the only
recovery point, which is why its failure is always terminal.
*/

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::archive::{ArchiveService, SQL_DUMP_NAME};
use crate::backup::{BackupOptions, BackupOrchestrator};
use crate::config::{SettingsStore, SiteContext};
use crate::db::{quote_identifier, quote_literal, DatabaseClient};
use crate::fsops::{self, WalkFilter};
use crate::import::{DatabaseImportEngine, ImportOutcome, ImportReport, ImportTier, MysqlCliImport};
use crate::sitecli::SiteCli;
use crate::store::ArchiveStore;
use crate::{Result, VaultError};

/// Prefix of the scratch directory a restore extracts into.
const SCRATCH_PREFIX: &str = "sitevault-restore-";

/// Suffix appended to the configuration file backup taken before the
/// table-prefix assignment is rewritten.
const CONFIG_BACKUP_SUFFIX: &str = ".sitevault.bak";

/// Depth bound for locating the content subtree inside an extracted archive.
const CONTENT_SEARCH_DEPTH: usize = 3;

/// Table-name suffixes used to recognize the table prefix in a dump.
const PREFIX_MARKER_TABLES: [&str; 3] = ["options", "users", "posts"];

/// Per-invocation restore options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Force the restored database's canonical URLs to the current live URL
    pub force_current_url: bool,
}

/// Outcome of a completed restore.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// Archive path of the safety backup, when one was taken
    pub safety_backup: Option<PathBuf>,
    /// Whether a content tree was found in the archive and restored
    pub content_restored: bool,
    /// Table prefix of the live installation before the restore
    pub old_prefix: String,
    /// Table prefix in effect after the restore
    pub new_prefix: String,
    pub import: ImportReport,
    /// Stale old-prefix tables dropped after the prefix change
    pub dropped_tables: Vec<String>,
}

/// Drives one snapshot pair back onto the live installation.
pub struct RestoreOrchestrator<'a, D: DatabaseClient, S: SettingsStore> {
    ctx: SiteContext,
    db: &'a mut D,
    settings_store: &'a mut S,
}

impl<'a, D: DatabaseClient, S: SettingsStore> RestoreOrchestrator<'a, D, S> {
    pub fn new(ctx: &SiteContext, db: &'a mut D, settings_store: &'a mut S) -> Self {
        Self {
            ctx: ctx.clone(),
            db,
            settings_store,
        }
    }

    /// Restore the snapshot at `archive_path`.
    pub fn restore_from_backup(
        &mut self,
        archive_path: &Path,
        opts: RestoreOptions,
    ) -> Result<RestoreReport> {
        self.ctx.validate()?;
        if !archive_path.is_file() {
            return Err(VaultError::step(
                "validate",
                format!("archive not found: {}", archive_path.display()),
            ));
        }

        // The settings store is about to be overwritten by the import; hold
        // on to the archive-store path so it can be put back afterwards.
        let settings = self.settings_store.load();
        let preserved_backup_dir = settings.backup_dir.clone();
        let store = ArchiveStore::new(settings.backup_dir_or_default(&self.ctx.content_dir));
        store.log(&format!("restore started: {}", archive_path.display()));

        let safety_backup = if settings.pre_restore_backup {
            let report = BackupOrchestrator::new(&self.ctx, self.db, settings.clone())
                .create_backup(&BackupOptions::default())
                .map_err(|e| {
                    store.log(&format!("restore aborted, safety backup failed: {e}"));
                    VaultError::step("safety-backup", e.to_string())
                })?;
            Some(report.archive_path)
        } else {
            None
        };

        store
            .persist_site_urls(&self.ctx.site_url, &self.ctx.home_url)
            .map_err(|e| VaultError::step("persist-urls", e.to_string()))?;

        let scratch = self
            .ctx
            .content_dir
            .join(format!("{SCRATCH_PREFIX}{}", Utc::now().format("%Y%m%d-%H%M%S")));
        let result = self.run_pipeline(archive_path, opts, &store, &scratch, safety_backup);
        fsops::remove_tree(&scratch);

        match &result {
            Ok(report) => store.log(&format!(
                "restore finished: prefix {} -> {}",
                report.old_prefix, report.new_prefix
            )),
            Err(e) => store.log(&format!("restore failed: {e}")),
        }

        // The import replaced the settings store wholesale; put the
        // preserved store path back and re-assert the store's protection
        // markers.
        if result.is_ok() {
            let mut fresh = self.settings_store.load();
            fresh.backup_dir = preserved_backup_dir;
            self.settings_store.save(&fresh)?;
            store.ensure_protected()?;
        }
        result
    }

    fn run_pipeline(
        &mut self,
        archive_path: &Path,
        opts: RestoreOptions,
        store: &ArchiveStore,
        scratch: &Path,
        safety_backup: Option<PathBuf>,
    ) -> Result<RestoreReport> {
        let archiver = ArchiveService::new(self.ctx.content_root_name())
            .with_credentials_file(credentials_file_name(&self.ctx));
        archiver
            .extract(archive_path, scratch)
            .map_err(|e| VaultError::step("extract", e.to_string()))?;
        if !scratch.is_dir() {
            return Err(VaultError::step("extract", "scratch directory missing"));
        }

        let content_restored = self.replace_content_tree(store, scratch)?;
        if !content_restored {
            store.log("archive carries no content tree, database-only restore");
        }

        let dump = locate_sql_dump(scratch).ok_or_else(|| {
            VaultError::step("locate-dump", "no SQL dump found in extracted archive")
        })?;

        let old_prefix = self.ctx.db.prefix.clone();
        let new_prefix = self.target_prefix(archive_path, &dump, &old_prefix)?;

        let import = self.import_with_retry(&dump)?;
        if let Some(note) = import.partial_note() {
            store.log(&note);
        }

        let mut dropped_tables = Vec::new();
        if new_prefix != old_prefix {
            rewrite_config_prefix(&self.ctx.config_file, &new_prefix)
                .map_err(|e| VaultError::step("config", e.to_string()))?;
            self.ctx.db.prefix = new_prefix.clone();
            dropped_tables = self.drop_stale_tables(&old_prefix, &new_prefix);
            if !dropped_tables.is_empty() {
                store.log(&format!(
                    "dropped stale tables: {}",
                    dropped_tables.join(", ")
                ));
            }
        }

        if opts.force_current_url {
            self.canonicalize_urls(archive_path, &new_prefix)?;
        }

        self.flush_routing_cache();

        Ok(RestoreReport {
            safety_backup,
            content_restored,
            old_prefix,
            new_prefix,
            import,
            dropped_tables,
        })
    }

    /// Returns false when the archive has no content subtree.
    fn replace_content_tree(&self, store: &ArchiveStore, scratch: &Path) -> Result<bool> {
        let root_name = self.ctx.content_root_name();
        let source = {
            let fixed = scratch.join(&root_name);
            if fixed.is_dir() {
                Some(fixed)
            } else {
                fsops::find_dir_named(scratch, &root_name, CONTENT_SEARCH_DEPTH)
            }
        };
        let Some(source) = source else {
            return Ok(false);
        };

        // Clear the live content tree, keeping the archive store, the
        // running engine, the scratch dir and the extensions subtree (which
        // is pruned entry-by-entry so the engine survives).
        let mut clear_filter = WalkFilter::new()
            .with_prefix(store.dir())
            .with_prefix(&self.ctx.engine_dir)
            .with_prefix(scratch);
        if let Some(extensions) = self.ctx.extensions_dir() {
            clear_filter = clear_filter.with_prefix(&extensions);
            if extensions.is_dir() {
                fsops::clear_children(
                    &extensions,
                    &WalkFilter::new().with_prefix(&self.ctx.engine_dir),
                )?;
            }
        }
        fsops::clear_children(&self.ctx.content_dir, &clear_filter)?;

        // Never let an archived copy of the engine overwrite the running one.
        let mut copy_filter = WalkFilter::new();
        if let Ok(engine_rel) = self.ctx.engine_dir.strip_prefix(&self.ctx.content_dir) {
            copy_filter = copy_filter.with_prefix(source.join(engine_rel));
        }
        fsops::copy_tree(&source, &self.ctx.content_dir, &copy_filter)?;
        info!(source = %source.display(), "content tree replaced");
        Ok(true)
    }

    /// Sidecar prefix first, dump scan as fallback.
    fn target_prefix(
        &self,
        archive_path: &Path,
        dump: &Path,
        old_prefix: &str,
    ) -> Result<String> {
        if let Some(meta) = crate::metadata::SnapshotMetadata::read_for_archive(archive_path) {
            if !meta.db_prefix.is_empty() && meta.db_prefix != old_prefix {
                return Ok(meta.db_prefix);
            }
        }
        let contents = fs::read_to_string(dump)?;
        Ok(detect_prefix_in_dump(&contents).unwrap_or_else(|| old_prefix.to_string()))
    }

    /// Import the dump, allowing a single mysql-client retry.
    fn import_with_retry(&mut self, dump: &Path) -> Result<ImportReport> {
        let first = DatabaseImportEngine::new(&self.ctx, self.db).import_from_sql(dump);
        match first {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(error = %e, "import failed, retrying via mysql client");
                let mut retry = MysqlCliImport::new(self.ctx.db.clone(), self.ctx.tools.db_cli);
                match retry.attempt(dump) {
                    ImportOutcome::Success(report) => Ok(report),
                    _ => Err(VaultError::step("import", e.to_string())),
                }
            }
        }
    }

    /// Drop every table under the old prefix, keeping any that also
    /// carries the new prefix.
    fn drop_stale_tables(&mut self, old_prefix: &str, new_prefix: &str) -> Vec<String> {
        let pattern = like_escape(old_prefix);
        let listed = self
            .db
            .query(&format!("SHOW TABLES LIKE '{pattern}%'"))
            .map(|out| out.first_column())
            .unwrap_or_default();
        let stale: Vec<String> = listed
            .into_iter()
            .filter(|t| t.starts_with(old_prefix) && !t.starts_with(new_prefix))
            .collect();
        if stale.is_empty() {
            return stale;
        }

        if let Err(e) = self.db.execute("SET FOREIGN_KEY_CHECKS=0") {
            warn!(error = %e, "could not disable foreign key checks");
        }
        let mut dropped = Vec::new();
        for table in stale {
            let statement = format!("DROP TABLE IF EXISTS {}", quote_identifier(&table));
            match self.db.execute(&statement) {
                Ok(()) => dropped.push(table),
                Err(e) => warn!(table = %table, error = %e, "stale table drop failed"),
            }
        }
        if let Err(e) = self.db.execute("SET FOREIGN_KEY_CHECKS=1") {
            warn!(error = %e, "could not restore foreign key checks");
        }
        dropped
    }

    /// Pin the two canonical URL rows to the current live URL, then
    /// best-effort serializer-aware rewrite across the restored tables.
    fn canonicalize_urls(&mut self, archive_path: &Path, prefix: &str) -> Result<()> {
        let current = if self.ctx.site_url.is_empty() {
            self.ctx.home_url.clone()
        } else {
            self.ctx.site_url.clone()
        };
        let table = quote_identifier(&format!("{prefix}options"));
        self.db.execute(&format!(
            "UPDATE {table} SET option_value = {} WHERE option_name IN ('siteurl', 'home')",
            quote_literal(Some(&current))
        ))?;

        let restored_url = crate::metadata::SnapshotMetadata::read_for_archive(archive_path)
            .map(|m| m.site_url)
            .unwrap_or_default();
        if !restored_url.is_empty() && restored_url != current {
            if let Some(cli) = SiteCli::locate(&self.ctx) {
                let _ = cli.run(
                    &self.ctx.root,
                    [
                        "search-replace",
                        restored_url.as_str(),
                        current.as_str(),
                        "--all-tables-with-prefix",
                        "--skip-columns=guid",
                    ],
                );
            }
        }
        Ok(())
    }

    /// A no-op when the platform CLI is unavailable.
    fn flush_routing_cache(&self) {
        if let Some(cli) = SiteCli::locate(&self.ctx) {
            let _ = cli.run(&self.ctx.root, ["rewrite", "flush"]);
        }
    }
}

/// Fixed dump name at the scratch root, else the first `.sql` file.
fn locate_sql_dump(scratch: &Path) -> Option<PathBuf> {
    let fixed = scratch.join(SQL_DUMP_NAME);
    if fixed.is_file() {
        Some(fixed)
    } else {
        fsops::find_file_with_extension(scratch, "sql")
    }
}

/// Scan `CREATE TABLE` statements for a marker-table suffix and return the
/// prefix preceding it.
fn detect_prefix_in_dump(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with("CREATE TABLE") {
            continue;
        }
        let Some(name) = backticked_name(trimmed) else {
            continue;
        };
        for marker in PREFIX_MARKER_TABLES {
            if let Some(prefix) = name.strip_suffix(marker) {
                if !prefix.is_empty() {
                    return Some(prefix.to_string());
                }
            }
        }
    }
    None
}

fn backticked_name(line: &str) -> Option<String> {
    let start = line.find('`')? + 1;
    let end = start + line[start..].find('`')?;
    Some(line[start..end].to_string())
}

fn like_escape(prefix: &str) -> String {
    prefix
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('_', "\\_")
        .replace('%', "\\%")
}

fn credentials_file_name(ctx: &SiteContext) -> String {
    ctx.config_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wp-config.php".to_string())
}

/// Rewrite the table-prefix assignment in the platform config file,
/// backing the original up first. Falls back to inserting before the
/// bootstrap include, then to appending.
fn rewrite_config_prefix(config_file: &Path, new_prefix: &str) -> Result<()> {
    let original = fs::read_to_string(config_file)?;
    let backup = backup_path_for(config_file);
    fs::write(&backup, &original)?;

    let assignment = format!("$table_prefix = '{new_prefix}';");
    let mut lines: Vec<String> = original.lines().map(|l| l.to_string()).collect();

    if let Some(idx) = lines
        .iter()
        .position(|l| l.trim_start().starts_with("$table_prefix") && l.contains('='))
    {
        lines[idx] = assignment;
    } else if let Some(idx) = lines.iter().position(|l| l.contains("wp-settings.php")) {
        lines.insert(idx, assignment);
    } else {
        lines.push(assignment);
    }

    fs::write(config_file, lines.join("\n") + "\n")?;
    Ok(())
}

fn backup_path_for(config_file: &Path) -> PathBuf {
    let mut name = config_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(CONFIG_BACKUP_SUFFIX);
    config_file.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbCredentials, MemorySettings, Settings, ToolPolicy};
    use crate::db::MemoryDatabase;
    use crate::metadata::SnapshotMetadata;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn live_site(tmp: &TempDir) -> SiteContext {
        let root = tmp.path().join("site");
        let content = root.join("wp-content");
        write(&content.join("uploads/live.txt"), "live");
        write(&content.join("plugins/sitevault/engine.txt"), "engine");
        write(&content.join("plugins/other-plugin/main.txt"), "other");
        write(
            &root.join("wp-config.php"),
            "<?php\n$table_prefix = 'wp_';\nrequire_once ABSPATH . 'wp-settings.php';\n",
        );
        SiteContext {
            engine_dir: content.join("plugins/sitevault"),
            config_file: root.join("wp-config.php"),
            content_dir: content,
            root,
            site_name: "Live Site".into(),
            site_url: "https://live.test".into(),
            home_url: "https://live.test".into(),
            operator: "admin".into(),
            platform_version: "6.5".into(),
            db: DbCredentials {
                host: "localhost".into(),
                port: None,
                socket: None,
                user: "u".into(),
                password: "p".into(),
                name: "db".into(),
                prefix: "wp_".into(),
            },
            tools: ToolPolicy::in_process_only(),
        }
    }

    fn live_db() -> MemoryDatabase {
        MemoryDatabase::new()
            .with_table(
                "wp_options",
                &["option_name", "option_value"],
                vec![vec![Some("siteurl".into()), Some("https://live.test".into())]],
            )
            .with_table("wp_posts", &["id"], vec![vec![Some("1".into())]])
    }

    /// Build a snapshot pair the way a backup on another site would have:
    /// content under `wp-content/`, a dump creating `wp_old_`-prefixed
    /// tables, and a sidecar recording that prefix.
    fn snapshot(tmp: &TempDir, with_sidecar: bool, with_content: bool) -> PathBuf {
        let staging = tmp.path().join("staging-content/wp-content");
        if with_content {
            write(&staging.join("uploads/restored.txt"), "restored");
            write(&staging.join("plugins/sitevault/engine.txt"), "stale engine");
        } else {
            fs::create_dir_all(&staging).unwrap();
        }
        let dump = tmp.path().join("dump.sql");
        fs::write(
            &dump,
            "CREATE TABLE `wp_old_options` (`option_name` text, `option_value` text);\n\
             INSERT INTO `wp_old_options` (`option_name`, `option_value`) VALUES ('siteurl', 'https://staging.test');\n\
             CREATE TABLE `wp_old_posts` (`id` text);\n",
        )
        .unwrap();

        let archive = tmp.path().join("snapshot.zip");
        ArchiveService::new("wp-content")
            .with_system_zip(false)
            .create(&archive, &staging, &dump, &[])
            .unwrap();
        if with_sidecar {
            let meta = SnapshotMetadata {
                site_name: "Staging".into(),
                site_url: "https://staging.test".into(),
                target_live_url: "https://live.test".into(),
                operator: "admin".into(),
                created_utc: Utc::now(),
                platform_version: "6.5".into(),
                engine_version: env!("CARGO_PKG_VERSION").into(),
                db_prefix: "wp_old_".into(),
                archive_file: "snapshot.zip".into(),
                db_dump_size_bytes: fs::metadata(&dump).unwrap().len(),
                archive_sha256: None,
            };
            meta.write_sidecar(&SnapshotMetadata::sidecar_path_for(&archive))
                .unwrap();
        }
        archive
    }

    #[test]
    fn test_restore_changes_prefix_and_drops_stale_tables() {
        let tmp = TempDir::new().unwrap();
        let ctx = live_site(&tmp);
        let archive = snapshot(&tmp, true, true);
        let mut db = live_db();
        let mut settings = MemorySettings::new(Settings::default());

        let report = RestoreOrchestrator::new(&ctx, &mut db, &mut settings)
            .restore_from_backup(&archive, RestoreOptions::default())
            .unwrap();

        assert_eq!(report.old_prefix, "wp_");
        assert_eq!(report.new_prefix, "wp_old_");
        assert!(report.content_restored);
        assert!(report.safety_backup.is_some());

        // Imported tables present, stale live tables gone
        assert!(db.tables.contains_key("wp_old_options"));
        assert!(db.tables.contains_key("wp_old_posts"));
        assert!(!db.tables.contains_key("wp_options"));
        assert!(!db.tables.contains_key("wp_posts"));
        assert_eq!(report.dropped_tables, vec!["wp_options", "wp_posts"]);

        // Config rewritten, original backed up
        let config = fs::read_to_string(&ctx.config_file).unwrap();
        assert!(config.contains("$table_prefix = 'wp_old_';"));
        let backup = fs::read_to_string(backup_path_for(&ctx.config_file)).unwrap();
        assert!(backup.contains("$table_prefix = 'wp_';"));
    }

    #[test]
    fn test_restore_replaces_content_but_preserves_engine_and_store() {
        let tmp = TempDir::new().unwrap();
        let ctx = live_site(&tmp);
        let archive = snapshot(&tmp, true, true);
        let mut db = live_db();
        let mut settings = MemorySettings::new(Settings::default());

        RestoreOrchestrator::new(&ctx, &mut db, &mut settings)
            .restore_from_backup(&archive, RestoreOptions::default())
            .unwrap();

        // Restored file present, pre-restore live file gone
        assert_eq!(
            fs::read_to_string(ctx.content_dir.join("uploads/restored.txt")).unwrap(),
            "restored"
        );
        assert!(!ctx.content_dir.join("uploads/live.txt").exists());

        // The running engine survived; its archived copy did not win
        assert_eq!(
            fs::read_to_string(ctx.engine_dir.join("engine.txt")).unwrap(),
            "engine"
        );
        // Other plugins were cleared by the extensions special case
        assert!(!ctx.content_dir.join("plugins/other-plugin").exists());

        // Archive store (holding the safety backup) survived the clear
        let store_dir = ctx.content_dir.join("sitevault-backups");
        assert!(store_dir.is_dir());
        assert!(ArchiveStore::new(&store_dir).list_snapshots().unwrap().len() >= 1);

        // Scratch removed
        assert!(!fs::read_dir(&ctx.content_dir).unwrap().any(|e| {
            e.unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with(SCRATCH_PREFIX)
        }));
    }

    #[test]
    fn test_prefix_detected_from_dump_without_sidecar() {
        let tmp = TempDir::new().unwrap();
        let ctx = live_site(&tmp);
        let archive = snapshot(&tmp, false, true);
        let mut db = live_db();
        let mut settings = MemorySettings::new(Settings::default());

        let report = RestoreOrchestrator::new(&ctx, &mut db, &mut settings)
            .restore_from_backup(&archive, RestoreOptions::default())
            .unwrap();
        assert_eq!(report.new_prefix, "wp_old_");
    }

    #[test]
    fn test_database_only_restore() {
        let tmp = TempDir::new().unwrap();
        let ctx = live_site(&tmp);
        let archive = snapshot(&tmp, true, false);
        let mut db = live_db();
        let mut settings = MemorySettings::new(Settings::default());

        let report = RestoreOrchestrator::new(&ctx, &mut db, &mut settings)
            .restore_from_backup(&archive, RestoreOptions::default())
            .unwrap();

        assert!(!report.content_restored);
        // Live content untouched
        assert!(ctx.content_dir.join("uploads/live.txt").exists());
        assert!(db.tables.contains_key("wp_old_options"));
    }

    #[test]
    fn test_force_current_url_updates_option_rows() {
        let tmp = TempDir::new().unwrap();
        let ctx = live_site(&tmp);
        let archive = snapshot(&tmp, true, true);
        let mut db = live_db();
        let mut settings = MemorySettings::new(Settings::default());

        RestoreOrchestrator::new(&ctx, &mut db, &mut settings)
            .restore_from_backup(&archive, RestoreOptions { force_current_url: true })
            .unwrap();

        assert!(db.executed.iter().any(|s| {
            s.contains("UPDATE `wp_old_options`")
                && s.contains("'https://live.test'")
                && s.contains("option_name IN ('siteurl', 'home')")
        }));
    }

    #[test]
    fn test_missing_archive_is_terminal_before_side_effects() {
        let tmp = TempDir::new().unwrap();
        let ctx = live_site(&tmp);
        let mut db = live_db();
        let mut settings = MemorySettings::new(Settings::default());

        let err = RestoreOrchestrator::new(&ctx, &mut db, &mut settings)
            .restore_from_backup(&tmp.path().join("absent.zip"), RestoreOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("validate"));
        assert!(ctx.content_dir.join("uploads/live.txt").exists());
        assert!(db.tables.contains_key("wp_options"));
    }

    #[test]
    fn test_preserved_backup_dir_written_back_to_settings() {
        let tmp = TempDir::new().unwrap();
        let ctx = live_site(&tmp);
        let archive = snapshot(&tmp, true, true);
        let mut db = live_db();
        let custom_store = tmp.path().join("custom-store");
        let mut settings = MemorySettings::new(Settings {
            backup_dir: custom_store.to_string_lossy().into_owned(),
            ..Settings::default()
        });

        RestoreOrchestrator::new(&ctx, &mut db, &mut settings)
            .restore_from_backup(&archive, RestoreOptions::default())
            .unwrap();

        assert_eq!(
            settings.load().backup_dir,
            custom_store.to_string_lossy().as_ref()
        );
        assert!(custom_store.join("index.html").exists());
        assert!(custom_store.join(".htaccess").exists());
    }

    #[test]
    fn test_detect_prefix_in_dump() {
        let dump = "-- header\nCREATE TABLE `shop_old_users` (`id` int);\n";
        assert_eq!(detect_prefix_in_dump(dump).unwrap(), "shop_old_");
        assert!(detect_prefix_in_dump("CREATE TABLE `unrelated` (`id` int);").is_none());
        assert!(detect_prefix_in_dump("INSERT INTO `wp_options` VALUES (1);").is_none());
    }

    #[test]
    fn test_rewrite_config_prefix_insert_and_append() {
        let tmp = TempDir::new().unwrap();

        // No assignment: inserted before the bootstrap include
        let config = tmp.path().join("wp-config.php");
        fs::write(&config, "<?php\nrequire_once ABSPATH . 'wp-settings.php';\n").unwrap();
        rewrite_config_prefix(&config, "new_").unwrap();
        let rewritten = fs::read_to_string(&config).unwrap();
        let lines: Vec<&str> = rewritten.lines().collect();
        assert_eq!(lines[1], "$table_prefix = 'new_';");
        assert!(lines[2].contains("wp-settings.php"));

        // Neither assignment nor include: appended
        let bare = tmp.path().join("bare-config.php");
        fs::write(&bare, "<?php\n").unwrap();
        rewrite_config_prefix(&bare, "new_").unwrap();
        assert!(fs::read_to_string(&bare)
            .unwrap()
            .ends_with("$table_prefix = 'new_';\n"));
    }
}
