/*!
# Sitevault Core Engine

Site snapshot and restore engine core library.

This crate captures a full site instance — the content directory tree plus
the relational database — into a portable snapshot pair (a `.zip` archive
and a `.json` metadata sidecar) and reconstitutes such a snapshot onto a
target installation, reconciling the database table-name prefix and the
canonical base URL along the way.

- Tiered fallback chains for database export, import and URL rewriting:
  platform CLI, external client binaries, in-process client library
- Path-traversal-safe streaming archive extraction
- Destructive content replacement that preserves the archive store and the
  running engine's own install
- Snapshot retention and orphan detection over the archive store

## Usage

```rust,no_run
use sitevault_core::{
    BackupOptions, BackupOrchestrator, MysqlClient, JsonFileSettings,
    SettingsStore, SiteContext,
};

# fn run(ctx: SiteContext) -> sitevault_core::Result<()> {
let settings = JsonFileSettings::new("/etc/sitevault/settings.json");
let mut db = MysqlClient::connect(&ctx.db)?;

let report = BackupOrchestrator::new(&ctx, &mut db, settings.load())
    .create_backup(&BackupOptions::default())?;
println!("snapshot written to {}", report.archive_path.display());
# Ok(())
# }
```
*/

pub mod archive;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fsops;
pub mod import;
pub mod metadata;
pub mod paths;
pub mod replace;
pub mod restore;
pub mod sanitize;
pub mod shell;
pub mod sitecli;
pub mod store;

pub use archive::{ArchiveService, SQL_DUMP_NAME};
pub use backup::{BackupOptions, BackupOrchestrator, BackupReport};
pub use config::{
    DbCredentials, JsonFileSettings, MemorySettings, Settings, SettingsStore, SiteContext,
    ToolPolicy,
};
pub use db::{DatabaseClient, MemoryDatabase, MysqlClient, QueryOutput};
pub use error::{Result, VaultError};
pub use export::DatabaseExportEngine;
pub use import::{DatabaseImportEngine, ImportReport, StatementSplitter};
pub use metadata::SnapshotMetadata;
pub use replace::SearchReplaceEngine;
pub use restore::{RestoreOptions, RestoreOrchestrator, RestoreReport};
pub use sanitize::sanitize;
pub use store::{ArchiveStore, SavedSiteUrls, SnapshotPair};
