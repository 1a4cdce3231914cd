use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{Result, RioError};
use crate::events::{publish, PROCESS_TERMINATED};
use crate::platform::{ProcessStatus, Signal};

use super::ProcessManager;

fn validate_pid(pid: u32) -> Result<()> {
    if pid == 0 || libc::pid_t::try_from(pid).is_err() {
        return Err(RioError::Validation(format!("invalid PID: {}", pid)));
    }
    Ok(())
}

impl ProcessManager {
    /// Terminate a tracked process: SIGTERM, grace period, then SIGKILL.
    pub async fn kill(&self, pid: u32) -> Result<()> {
        validate_pid(pid)?;
        if !self.table.contains(pid) {
            return Err(RioError::ProcessNotFound(pid));
        }

        match self.signals.status(pid)? {
            ProcessStatus::Running => {}
            ProcessStatus::NotFound => {
                self.untrack(pid, None);
                return Err(RioError::ProcessNotFound(pid));
            }
            ProcessStatus::NoPermission => return Err(RioError::PermissionDenied(pid)),
        }

        if let Err(e) = self.signals.signal(pid, Signal::Term) {
            warn!(pid, error = %e, "SIGTERM failed");
        }
        tokio::time::sleep(self.config.kill_grace).await;

        let mut signal = "SIGTERM";
        match self.signals.status(pid) {
            Ok(status) if status.is_alive() => {
                signal = "SIGKILL";
                if let Err(e) = self.signals.signal(pid, Signal::Kill) {
                    warn!(pid, error = %e, "SIGKILL failed");
                }
            }
            Ok(_) => {}
            Err(e) => debug!(pid, error = %e, "post-TERM liveness check failed, assuming exited"),
        }

        self.untrack(pid, Some(signal));
        Ok(())
    }

    /// Remove the record and its monitor; report only if the monitor did not already.
    fn untrack(&self, pid: u32, signal: Option<&str>) {
        self.monitors.cancel(pid);
        if self.table.remove(pid).is_some() {
            info!(pid, ?signal, "rio process terminated");
            publish(
                &*self.bus,
                PROCESS_TERMINATED,
                json!({ "pid": pid, "signal": signal }),
            );
        }
    }

    /// Bring a tracked process's window to the front.
    pub async fn attach(&self, pid: u32) -> Result<()> {
        validate_pid(pid)?;
        if !self.table.contains(pid) {
            return Err(RioError::ProcessNotFound(pid));
        }
        self.focus
            .focus(pid)
            .await
            .map_err(|source| RioError::AttachFailure { pid, source })
    }
}
