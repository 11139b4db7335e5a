/*!
Archive creation and safe streaming extraction.

Creation prefers the system `zip` binary for throughput on large content
trees and falls back to an in-process writer; both produce the same logical
contents. Extraction whitelists entry names and never writes outside the
destination directory.
*/

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::fsops::WalkFilter;
use crate::shell::{self, ToolError};
use crate::{paths, Result, VaultError};

/// Name of the SQL dump stored at the archive root.
pub const SQL_DUMP_NAME: &str = "database.sql";

/// Buffer size for all streaming copies.
const COPY_BUF_BYTES: usize = 8192;

/// Creates and extracts snapshot archives.
#[derive(Debug, Clone)]
pub struct ArchiveService {
    /// Fixed top-level directory name content files carry inside an archive
    content_root_name: String,
    /// Credentials config file name excluded from every archive
    credentials_file_name: String,
    /// Whether the system `zip` binary may be attempted
    system_zip_allowed: bool,
}

impl ArchiveService {
    pub fn new<S: Into<String>>(content_root_name: S) -> Self {
        Self {
            content_root_name: content_root_name.into(),
            credentials_file_name: "wp-config.php".to_string(),
            system_zip_allowed: true,
        }
    }

    /// Override the credentials config file name to exclude.
    pub fn with_credentials_file<S: Into<String>>(mut self, name: S) -> Self {
        self.credentials_file_name = name.into();
        self
    }

    /// Allow or forbid the system `zip` tier.
    pub fn with_system_zip(mut self, allowed: bool) -> Self {
        self.system_zip_allowed = allowed;
        self
    }

    /// Create an archive of `content_dir` plus the SQL dump at the root.
    ///
    /// Descendants whose normalized path starts with an entry of
    /// `exclude_dirs` are skipped, as is the credentials config file. Every
    /// stored path is rewritten so the content directory's absolute prefix
    /// becomes the fixed content-root name.
    pub fn create(
        &self,
        zip_path: &Path,
        content_dir: &Path,
        sql_dump: &Path,
        exclude_dirs: &[PathBuf],
    ) -> Result<()> {
        let content_dir = paths::normalize(content_dir);
        if let Some(parent) = zip_path.parent() {
            paths::ensure_dir(parent)?;
        }

        if self.system_zip_allowed
            && self.try_system_zip(zip_path, &content_dir, sql_dump, exclude_dirs)
        {
            return Ok(());
        }

        self.create_in_process(zip_path, &content_dir, sql_dump, exclude_dirs)?;
        self.check_nonempty(zip_path)
    }

    /// Extract an archive into `dest`.
    ///
    /// Entries with a parent-directory segment or an absolute name are
    /// silently skipped, as are entries outside the whitelist (`database.sql`
    /// or the content-root subtree). A failed entry stream aborts extraction;
    /// partial output is the caller's to clean up.
    pub fn extract(&self, zip_path: &Path, dest: &Path) -> Result<()> {
        let file = File::open(zip_path)
            .map_err(|e| VaultError::archive(format!("cannot open {}: {e}", zip_path.display())))?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| VaultError::archive(format!("cannot read {}: {e}", zip_path.display())))?;
        paths::ensure_dir(dest)?;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| VaultError::archive(format!("entry {index}: {e}")))?;
            let name = entry.name().replace('\\', "/");
            if !self.entry_allowed(&name) {
                debug!(entry = %name, "skipping archive entry");
                continue;
            }

            let target = dest.join(&name);
            if name.ends_with('/') {
                paths::ensure_dir(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                paths::ensure_dir(parent)?;
            }
            let mut out = File::create(&target)
                .map_err(|e| VaultError::archive(format!("cannot create {}: {e}", target.display())))?;
            let mut buf = [0u8; COPY_BUF_BYTES];
            loop {
                let n = entry
                    .read(&mut buf)
                    .map_err(|e| VaultError::archive(format!("entry {name}: read failed: {e}")))?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])?;
            }
        }
        Ok(())
    }

    /// Whether an entry name passes traversal checks and the whitelist.
    fn entry_allowed(&self, name: &str) -> bool {
        if name.is_empty() || name.starts_with('/') {
            return false;
        }
        let segments: Vec<&str> = name.trim_end_matches('/').split('/').collect();
        if segments.iter().any(|s| *s == "..") {
            return false;
        }
        segments.last() == Some(&SQL_DUMP_NAME)
            || segments.contains(&self.content_root_name.as_str())
    }

    fn create_in_process(
        &self,
        zip_path: &Path,
        content_dir: &Path,
        sql_dump: &Path,
        exclude_dirs: &[PathBuf],
    ) -> Result<()> {
        let mut filter = WalkFilter::new().with_name(self.credentials_file_name.clone());
        for dir in exclude_dirs {
            filter = filter.with_prefix(dir);
        }

        let file = File::create(zip_path)?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default();

        for entry in WalkDir::new(content_dir)
            .into_iter()
            .filter_entry(|e| !filter_excludes(&filter, e.path()))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || filter.excludes(entry.path()) {
                continue;
            }
            let relative = match entry.path().strip_prefix(content_dir) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let stored = format!(
                "{}/{}",
                self.content_root_name,
                relative.to_string_lossy().replace('\\', "/")
            );
            writer
                .start_file(stored.as_str(), options)
                .map_err(|e| VaultError::archive(format!("cannot add {stored}: {e}")))?;
            stream_into(&mut writer, entry.path())?;
        }

        writer
            .start_file(SQL_DUMP_NAME, options)
            .map_err(|e| VaultError::archive(format!("cannot add {SQL_DUMP_NAME}: {e}")))?;
        stream_into(&mut writer, sql_dump)?;

        writer
            .finish()
            .map_err(|e| VaultError::archive(format!("cannot finish archive: {e}")))?;
        Ok(())
    }

    /// Shell out to the system `zip` binary and append the SQL dump with the
    /// in-process writer afterwards. Returns false to fall through.
    fn try_system_zip(
        &self,
        zip_path: &Path,
        content_dir: &Path,
        sql_dump: &Path,
        exclude_dirs: &[PathBuf],
    ) -> bool {
        let Some(zip_bin) = shell::find_tool("zip") else {
            return false;
        };
        let Some(site_root) = content_dir.parent() else {
            return false;
        };

        let mut command = Command::new(zip_bin);
        command.current_dir(site_root);
        command.arg("-rq").arg(zip_path).arg(&self.content_root_name);
        for dir in exclude_dirs {
            let dir = paths::normalize(dir);
            if let Ok(rel) = dir.strip_prefix(content_dir) {
                command.arg("-x").arg(format!(
                    "{}/{}/*",
                    self.content_root_name,
                    rel.to_string_lossy().replace('\\', "/")
                ));
            }
        }
        command
            .arg("-x")
            .arg(format!("{}/{}", self.content_root_name, self.credentials_file_name));

        match shell::run_tool(&mut command) {
            Ok(_) => {}
            Err(ToolError::Unavailable) => return false,
            Err(ToolError::Failed(e)) => {
                warn!(error = %e, "system zip failed, falling back to in-process writer");
                return false;
            }
        }

        if self.append_sql_dump(zip_path, sql_dump).is_err() {
            warn!("could not append SQL dump to system-created archive");
            return false;
        }
        let ok = self.check_nonempty(zip_path).is_ok();
        if ok {
            info!(zip = %zip_path.display(), "archive created via system zip");
        }
        ok
    }

    fn append_sql_dump(&self, zip_path: &Path, sql_dump: &Path) -> Result<()> {
        let file = OpenOptions::new().read(true).write(true).open(zip_path)?;
        let mut writer = ZipWriter::new_append(file)
            .map_err(|e| VaultError::archive(format!("cannot append to archive: {e}")))?;
        writer
            .start_file(SQL_DUMP_NAME, FileOptions::default())
            .map_err(|e| VaultError::archive(format!("cannot add {SQL_DUMP_NAME}: {e}")))?;
        stream_into(&mut writer, sql_dump)?;
        writer
            .finish()
            .map_err(|e| VaultError::archive(format!("cannot finish archive: {e}")))?;
        Ok(())
    }

    fn check_nonempty(&self, zip_path: &Path) -> Result<()> {
        match fs::metadata(zip_path) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(VaultError::archive(format!(
                "archive {} is missing or empty",
                zip_path.display()
            ))),
        }
    }
}

/// Directory-level pruning for the walk; file-level exclusion is re-checked
/// per entry because `filter_entry` only sees directories it descends into.
fn filter_excludes(filter: &WalkFilter, path: &Path) -> bool {
    filter.excludes(path)
}

fn stream_into<W: Write>(writer: &mut W, source: &Path) -> Result<()> {
    let mut input = File::open(source)?;
    let mut buf = [0u8; COPY_BUF_BYTES];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
    }
    Ok(())
}
