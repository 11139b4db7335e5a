/*!
Platform CLI control channel.

The platform ships a management CLI (`wp`) that can export/import the
database and perform serializer-aware search/replace. It is reachable either
as a system binary or as a bundled executable archive run through a
discovered interpreter. Absence of every channel is a normal outcome; callers
fall through to their next tier.
*/

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::config::SiteContext;
use crate::shell::{self, ToolResult};

/// System binary name of the platform CLI.
const SITE_CLI_BINARY: &str = "wp";

/// Interpreter able to run the bundled CLI archive.
const INTERPRETER_BINARY: &str = "php";

/// Bundled CLI archive location relative to the engine's install dir.
const BUNDLED_CLI_RELATIVE: &str = "bin/wp-cli.phar";

/// A located way of invoking the platform CLI.
#[derive(Debug, Clone)]
pub enum SiteCli {
    /// `wp` found on the search path
    System(PathBuf),
    /// Bundled archive run through an interpreter
    Bundled {
        interpreter: PathBuf,
        archive: PathBuf,
    },
}

impl SiteCli {
    /// Locate an invocable CLI channel for this installation, preferring the
    /// system binary over the bundled archive. Returns `None` when the
    /// context's tool policy forbids the channel or nothing is discoverable.
    pub fn locate(ctx: &SiteContext) -> Option<Self> {
        if !ctx.tools.site_cli {
            return None;
        }
        if let Some(bin) = shell::find_tool(SITE_CLI_BINARY) {
            debug!(bin = %bin.display(), "site CLI found on path");
            return Some(Self::System(bin));
        }
        let archive = ctx.engine_dir.join(BUNDLED_CLI_RELATIVE);
        if archive.is_file() {
            if let Some(interpreter) = shell::find_tool(INTERPRETER_BINARY) {
                debug!(archive = %archive.display(), "using bundled site CLI");
                return Some(Self::Bundled { interpreter, archive });
            }
        }
        None
    }

    /// Run a CLI subcommand against the installation rooted at `root`.
    pub fn run<I, S>(&self, root: &Path, args: I) -> ToolResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = match self {
            Self::System(bin) => Command::new(bin),
            Self::Bundled { interpreter, archive } => {
                let mut c = Command::new(interpreter);
                c.arg(archive);
                c
            }
        };
        command.args(args);
        command.arg(format!("--path={}", root.display()));
        command.arg("--allow-root");
        shell::run_tool(&mut command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbCredentials, ToolPolicy};

    fn ctx(tools: ToolPolicy) -> SiteContext {
        SiteContext {
            root: "/site".into(),
            content_dir: "/site/wp-content".into(),
            engine_dir: "/site/wp-content/plugins/sitevault".into(),
            config_file: "/site/wp-config.php".into(),
            site_name: "Site".into(),
            site_url: "https://a.test".into(),
            home_url: "https://a.test".into(),
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
            tools,
        }
    }

    #[test]
    fn test_locate_respects_policy() {
        assert!(SiteCli::locate(&ctx(ToolPolicy::in_process_only())).is_none());
    }
}
