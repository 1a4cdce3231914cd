use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

/// Brings the window owned by a process to the front.
#[async_trait]
pub trait WindowFocus: Send + Sync {
    async fn focus(&self, pid: u32) -> io::Result<()>;
}

/// Uses System Events on macOS and `xdotool` elsewhere.
#[derive(Debug, Default)]
pub struct OsWindowFocus;

impl OsWindowFocus {
    fn command(pid: u32) -> Command {
        if cfg!(target_os = "macos") {
            let script = format!(
                "tell application \"System Events\" to set frontmost of \
                 (first process whose unix id is {}) to true",
                pid
            );
            let mut cmd = Command::new("osascript");
            cmd.args(["-e", &script]);
            cmd
        } else {
            let mut cmd = Command::new("xdotool");
            cmd.args(["search", "--pid", &pid.to_string(), "windowactivate"]);
            cmd
        }
    }
}

#[async_trait]
impl WindowFocus for OsWindowFocus {
    async fn focus(&self, pid: u32) -> io::Result<()> {
        let output = Self::command(pid)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::other(format!(
                "focus command failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
