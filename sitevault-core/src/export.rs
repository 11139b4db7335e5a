/*!
Tiered database export.

Three strategies are attempted in order — platform CLI, `mysqldump`, direct
client-library dump — and the first one that leaves a non-empty file at the
destination wins. A tier that is unavailable on this host is a normal branch,
not an error.
*/

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::config::{DbCredentials, SiteContext};
use crate::db::{quote_identifier, quote_literal, DatabaseClient};
use crate::shell::{self, ToolError};
use crate::sitecli::SiteCli;
use crate::{paths, Result, VaultError};

/// Rows per generated `INSERT` statement in the client-library tier.
const INSERT_PAGE_SIZE: usize = 1000;

/// Outcome of one export strategy.
pub enum TierOutcome {
    Success,
    Unavailable,
    Failed(String),
}

/// One export strategy in the fallback chain.
pub trait ExportTier {
    fn name(&self) -> &'static str;
    fn attempt(&mut self, dest: &Path) -> TierOutcome;
}

/// Tiered SQL export engine.
pub struct DatabaseExportEngine<'a> {
    tiers: Vec<Box<dyn ExportTier + 'a>>,
}

impl<'a> DatabaseExportEngine<'a> {
    /// Build the full production chain for a site.
    pub fn new<D: DatabaseClient>(ctx: &'a SiteContext, db: &'a mut D) -> Self {
        Self {
            tiers: vec![
                Box::new(SiteCliExport { ctx }),
                Box::new(MysqldumpExport {
                    creds: ctx.db.clone(),
                    allowed: ctx.tools.db_cli,
                }),
                Box::new(ClientExport { db }),
            ],
        }
    }

    /// Build an engine from an explicit tier list.
    pub fn with_tiers(tiers: Vec<Box<dyn ExportTier + 'a>>) -> Self {
        Self { tiers }
    }

    /// Export the database to `dest`. Success requires the destination file
    /// to exist and be non-empty; a tier failing that check falls through.
    pub fn export_to_sql(&mut self, dest: &Path) -> Result<PathBuf> {
        if let Some(parent) = dest.parent() {
            paths::ensure_dir(parent)?;
        }
        for tier in &mut self.tiers {
            match tier.attempt(dest) {
                TierOutcome::Success if file_nonempty(dest) => {
                    info!(tier = tier.name(), dest = %dest.display(), "database exported");
                    return Ok(dest.to_path_buf());
                }
                TierOutcome::Success => {
                    warn!(tier = tier.name(), "tier reported success but produced no dump");
                }
                TierOutcome::Unavailable => {
                    debug!(tier = tier.name(), "tier unavailable");
                }
                TierOutcome::Failed(reason) => {
                    warn!(tier = tier.name(), reason, "export tier failed");
                }
            }
        }
        Err(VaultError::export(format!(
            "all export tiers failed for {}",
            dest.display()
        )))
    }
}

fn file_nonempty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Tier 1: platform CLI `db export`.
struct SiteCliExport<'a> {
    ctx: &'a SiteContext,
}

impl ExportTier for SiteCliExport<'_> {
    fn name(&self) -> &'static str {
        "site-cli"
    }

    fn attempt(&mut self, dest: &Path) -> TierOutcome {
        let Some(cli) = SiteCli::locate(self.ctx) else {
            return TierOutcome::Unavailable;
        };
        let dest_arg = dest.to_string_lossy();
        match cli.run(&self.ctx.root, ["db", "export", dest_arg.as_ref()]) {
            Ok(_) => TierOutcome::Success,
            Err(ToolError::Unavailable) => TierOutcome::Unavailable,
            Err(ToolError::Failed(e)) => TierOutcome::Failed(e),
        }
    }
}

/// Tier 2: `mysqldump` with credentials from configuration.
struct MysqldumpExport {
    creds: DbCredentials,
    allowed: bool,
}

impl ExportTier for MysqldumpExport {
    fn name(&self) -> &'static str {
        "mysqldump"
    }

    fn attempt(&mut self, dest: &Path) -> TierOutcome {
        if !self.allowed {
            return TierOutcome::Unavailable;
        }
        let Some(bin) = shell::find_tool("mysqldump") else {
            return TierOutcome::Unavailable;
        };
        let out = match File::create(dest) {
            Ok(f) => f,
            Err(e) => return TierOutcome::Failed(format!("cannot create {}: {e}", dest.display())),
        };

        let mut command = Command::new(bin);
        command
            .arg("--default-character-set=utf8mb4")
            .arg("--single-transaction")
            .arg("--quick")
            .arg("--skip-lock-tables");
        push_connection_args(&mut command, &self.creds);
        command.arg(&self.creds.name);
        command.stdout(out);

        match shell::run_tool(&mut command) {
            Ok(_) => TierOutcome::Success,
            Err(ToolError::Unavailable) => TierOutcome::Unavailable,
            Err(ToolError::Failed(e)) => TierOutcome::Failed(e),
        }
    }
}

/// Shared connection arguments for the `mysqldump`/`mysql` binaries.
pub(crate) fn push_connection_args(command: &mut Command, creds: &DbCredentials) {
    if !creds.host.is_empty() {
        command.arg(format!("--host={}", creds.host));
    }
    if let Some(port) = creds.port {
        command.arg(format!("--port={port}"));
    }
    if let Some(socket) = &creds.socket {
        command.arg(format!("--socket={socket}"));
    }
    if !creds.user.is_empty() {
        command.arg(format!("--user={}", creds.user));
    }
    if !creds.password.is_empty() {
        command.arg(format!("--password={}", creds.password));
    }
}

/// Tier 3: manual dump through the client library.
struct ClientExport<'a, D: DatabaseClient> {
    db: &'a mut D,
}

impl<D: DatabaseClient> ExportTier for ClientExport<'_, D> {
    fn name(&self) -> &'static str {
        "client-library"
    }

    fn attempt(&mut self, dest: &Path) -> TierOutcome {
        match dump_with_client(self.db, dest) {
            Ok(()) => TierOutcome::Success,
            Err(e) => TierOutcome::Failed(e.to_string()),
        }
    }
}

/// Emit `DROP TABLE` + `CREATE TABLE` + paginated `INSERT` statements for
/// every table, in the layout a human would expect from a dump tool.
fn dump_with_client<D: DatabaseClient>(db: &mut D, dest: &Path) -> Result<()> {
    let tables = db.query("SHOW TABLES")?.first_column();
    let mut out = BufWriter::new(File::create(dest)?);

    for table in tables {
        let quoted = quote_identifier(&table);
        writeln!(out, "--\n-- Table structure for table {quoted}\n--\n")?;

        let ddl = db.query(&format!("SHOW CREATE TABLE {quoted}"))?;
        if let Some(create) = ddl.rows.first().and_then(|r| r.get(1)).and_then(|v| v.clone()) {
            writeln!(out, "DROP TABLE IF EXISTS {quoted};")?;
            writeln!(out, "{create};\n")?;
        }

        writeln!(out, "--\n-- Dumping data for table {quoted}\n--\n")?;
        let mut offset = 0usize;
        loop {
            let page = db.query(&format!(
                "SELECT * FROM {quoted} LIMIT {INSERT_PAGE_SIZE} OFFSET {offset}"
            ))?;
            if page.rows.is_empty() {
                break;
            }
            let columns = page
                .columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            let values = page
                .rows
                .iter()
                .map(|row| {
                    let cells = row
                        .iter()
                        .map(|v| quote_literal(v.as_deref()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({cells})")
                })
                .collect::<Vec<_>>()
                .join(",\n");
            writeln!(out, "INSERT INTO {quoted} ({columns}) VALUES\n{values};")?;
            offset += INSERT_PAGE_SIZE;
        }
        writeln!(out, "\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDatabase;
    use tempfile::TempDir;

    fn client_only_engine(db: &mut MemoryDatabase) -> DatabaseExportEngine<'_> {
        DatabaseExportEngine::with_tiers(vec![Box::new(ClientExport { db })])
    }

    #[test]
    fn test_client_dump_layout() {
        let mut db = MemoryDatabase::new().with_table(
            "wp_options",
            &["option_id", "option_name", "option_value"],
            vec![
                vec![Some("1".into()), Some("siteurl".into()), Some("https://a.test".into())],
                vec![Some("2".into()), Some("nullable".into()), None],
            ],
        );
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("dump.sql");

        let path = client_only_engine(&mut db).export_to_sql(&dest).unwrap();
        let dump = fs::read_to_string(path).unwrap();

        assert!(dump.contains("DROP TABLE IF EXISTS `wp_options`;"));
        assert!(dump.contains("CREATE TABLE `wp_options`"));
        assert!(dump.contains("INSERT INTO `wp_options` (`option_id`, `option_name`, `option_value`) VALUES"));
        assert!(dump.contains("('1', 'siteurl', 'https://a.test')"));
        assert!(dump.contains("NULL"));
    }

    #[test]
    fn test_values_are_escaped() {
        let mut db = MemoryDatabase::new().with_table(
            "t",
            &["v"],
            vec![vec![Some("it's a \\ test".into())]],
        );
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("dump.sql");
        client_only_engine(&mut db).export_to_sql(&dest).unwrap();
        let dump = fs::read_to_string(&dest).unwrap();
        assert!(dump.contains(r"('it\'s a \\ test')"));
    }

    #[test]
    fn test_all_tiers_failing_is_an_error() {
        struct NeverTier;
        impl ExportTier for NeverTier {
            fn name(&self) -> &'static str {
                "never"
            }
            fn attempt(&mut self, _dest: &Path) -> TierOutcome {
                TierOutcome::Unavailable
            }
        }
        let tmp = TempDir::new().unwrap();
        let mut engine = DatabaseExportEngine::with_tiers(vec![Box::new(NeverTier)]);
        assert!(engine.export_to_sql(&tmp.path().join("dump.sql")).is_err());
    }

    #[test]
    fn test_empty_dump_does_not_count_as_success() {
        // A database with no tables produces an empty file, which must fall
        // through rather than be reported as a successful export.
        let mut db = MemoryDatabase::new();
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("dump.sql");
        assert!(client_only_engine(&mut db).export_to_sql(&dest).is_err());
    }
}
