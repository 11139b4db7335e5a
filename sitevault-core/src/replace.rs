/*!
URL search/replace over a SQL dump.

Two strategies: the platform CLI's serializer-aware `search-replace` (it
understands length-prefixed serialized payloads), falling back to a streamed
literal substitution. Both leave the input untouched and write a sibling
file. The whole operation is best-effort by contract; the restore sequence
canonicalizes the two top-level URL options regardless of what happens here.
*/

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::SiteContext;
use crate::sitecli::SiteCli;
use crate::Result;

/// Rewrites URL occurrences in an exported dump.
pub struct SearchReplaceEngine<'a> {
    ctx: &'a SiteContext,
}

impl<'a> SearchReplaceEngine<'a> {
    pub fn new(ctx: &'a SiteContext) -> Self {
        Self { ctx }
    }

    /// Replace `search` with `replace` across the dump at `sql_path` and
    /// return the path of the rewritten dump. A blank or identity search is
    /// a no-op returning the input path.
    pub fn replace_in_dump(&self, sql_path: &Path, search: &str, replace: &str) -> Result<PathBuf> {
        if search.is_empty() || search == replace {
            debug!("nothing to replace");
            return Ok(sql_path.to_path_buf());
        }
        let dest = replaced_path(sql_path);

        if let Some(outcome) = self.try_site_cli(&dest, search, replace) {
            return Ok(outcome);
        }
        self.replace_streaming(sql_path, &dest, search, replace)?;
        info!(dest = %dest.display(), "dump rewritten in-process");
        Ok(dest)
    }

    /// The CLI rewrites live tables and exports the result; only a
    /// non-empty export file counts, since some builds exit zero while
    /// writing nothing.
    fn try_site_cli(&self, dest: &Path, search: &str, replace: &str) -> Option<PathBuf> {
        let cli = SiteCli::locate(self.ctx)?;
        let export_arg = format!("--export={}", dest.display());
        let result = cli.run(
            &self.ctx.root,
            [
                "search-replace",
                search,
                replace,
                "--all-tables-with-prefix",
                export_arg.as_str(),
                "--skip-columns=guid",
            ],
        );
        match result {
            Ok(_) if file_nonempty(dest) => {
                info!(dest = %dest.display(), "dump rewritten via site CLI");
                Some(dest.to_path_buf())
            }
            Ok(_) => {
                warn!("site CLI search-replace produced no export");
                None
            }
            Err(e) => {
                debug!(error = %e, "site CLI search-replace unusable");
                None
            }
        }
    }

    fn replace_streaming(
        &self,
        sql_path: &Path,
        dest: &Path,
        search: &str,
        replace: &str,
    ) -> Result<()> {
        let reader = BufReader::new(File::open(sql_path)?);
        let mut writer = BufWriter::new(File::create(dest)?);
        for line in reader.lines() {
            let line = line?;
            writer.write_all(line.replace(search, replace).as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn replaced_path(sql_path: &Path) -> PathBuf {
    let mut name = sql_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".replaced.sql");
    sql_path.with_file_name(name)
}

fn file_nonempty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
