//! The engine's out-of-band recovery and repair utility.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{info, instrument};

use crate::error::{DbResult, Error};

/// Recovery capabilities used by [`crate::session::Session::open`] once a
/// plain attach/open has failed. Both operations mutate files on disk.
pub trait RepairTool {
    /// Replays the transaction logs with the given prefix, found in `log_dir`,
    /// into the databases they belong to.
    fn recover(&self, log_prefix: &str, log_dir: &Path) -> DbResult<()>;

    /// Repairs page-level corruption of the database file. Uncommitted data
    /// may be discarded.
    fn repair(&self, path: &Path) -> DbResult<()>;
}

/// Runs the `esentutl` command-line utility.
#[derive(Debug, Clone)]
pub struct Esentutl {
    program: PathBuf,
}

impl Esentutl {
    /// Uses the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Esentutl {
            program: program.into(),
        }
    }

    #[instrument(level = "debug", skip(self, configure))]
    fn run(&self, mode: &str, configure: impl FnOnce(&mut Command)) -> DbResult<()> {
        let mut command = Command::new(&self.program);
        configure(&mut command);
        info!(?command, "running {mode}");

        let status = command.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::RepairTool {
                tool: self.program.display().to_string(),
                status: status.to_string(),
            })
        }
    }
}

impl Default for Esentutl {
    fn default() -> Self {
        Esentutl::new("esentutl")
    }
}

impl RepairTool for Esentutl {
    fn recover(&self, log_prefix: &str, log_dir: &Path) -> DbResult<()> {
        self.run("log recovery", |command| {
            // `/i` ignores mismatched or missing attached databases.
            command
                .current_dir(log_dir)
                .args(["/r", log_prefix, "/i"]);
        })
    }

    fn repair(&self, path: &Path) -> DbResult<()> {
        self.run("repair", |command| {
            // `/o` suppresses the logo banner.
            command.arg("/p").arg(path).arg("/o");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_io_error() {
        let tool = Esentutl::new("esentutl-that-does-not-exist");
        assert!(matches!(
            tool.repair(Path::new("db.edb")),
            Err(Error::Io(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_checked() {
        assert!(Esentutl::new("true").recover("edb", Path::new(".")).is_ok());
        assert!(matches!(
            Esentutl::new("false").repair(Path::new("db.edb")),
            Err(Error::RepairTool { .. })
        ));
    }
}
