use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;

/// Items currently selected in the file manager.
#[async_trait]
pub trait SelectionSource: Send + Sync {
    async fn selected_items(&self) -> anyhow::Result<Vec<PathBuf>>;
}

/// Platforms without a queryable file manager.
pub struct NoSelection;

#[async_trait]
impl SelectionSource for NoSelection {
    async fn selected_items(&self) -> anyhow::Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Finder selection via AppleScript.
pub struct FinderSelection;

const FINDER_SCRIPT: &str = r#"tell application "Finder"
    set out to ""
    repeat with i in (get selection as alias list)
        set out to out & POSIX path of i & linefeed
    end repeat
    return out
end tell"#;

#[async_trait]
impl SelectionSource for FinderSelection {
    async fn selected_items(&self) -> anyhow::Result<Vec<PathBuf>> {
        let output = Command::new("osascript")
            .args(["-e", FINDER_SCRIPT])
            .output()
            .await
            .context("Failed to query Finder selection")?;

        if !output.status.success() {
            anyhow::bail!(
                "Finder selection query failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

/// Selection source for the current platform.
pub fn platform_selection() -> Arc<dyn SelectionSource> {
    if cfg!(target_os = "macos") {
        Arc::new(FinderSelection)
    } else {
        Arc::new(NoSelection)
    }
}
