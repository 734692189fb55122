//! Stopping the processes that keep a database file locked.

use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::DbResult;

/// Process management capability.
pub trait ProcessControl {
    /// Stops every running process with the given image name. Returns whether
    /// any process was stopped; a name with no running process is not an
    /// error.
    fn stop(&self, name: &str) -> DbResult<bool>;
}

/// Stops every named process, best-effort: failures are logged and the
/// remaining names are still processed.
pub fn stop_all(control: &dyn ProcessControl, names: &[String]) {
    for name in names {
        match control.stop(name) {
            Ok(true) => info!(%name, "stopped process"),
            Ok(false) => debug!(%name, "process not running"),
            Err(error) => warn!(%name, %error, "could not stop process"),
        }
    }
}

/// Uses the operating system's process tools (`taskkill` on Windows, `pkill`
/// elsewhere).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl ProcessControl for SystemProcesses {
    fn stop(&self, name: &str) -> DbResult<bool> {
        let status = kill_command(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        // Both tools exit with a non-zero status when nothing matched.
        Ok(status.success())
    }
}

#[cfg(windows)]
fn kill_command(name: &str) -> Command {
    let mut command = Command::new("taskkill");
    command.args(["/F", "/IM", name]);
    command
}

#[cfg(not(windows))]
fn kill_command(name: &str) -> Command {
    let mut command = Command::new("pkill");
    command.args(["-x", name]);
    command
}
