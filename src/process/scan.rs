use std::io;
use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{publish, PROCESS_TERMINATED};

use super::table::{ProcessRecord, ReconcileDiff};
use super::ProcessManager;

/// One row of the OS process list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsProcess {
    pub pid: u32,
    pub command: String,
}

/// Source of the live OS process list.
#[async_trait]
pub trait ProcessLister: Send + Sync {
    async fn list(&self) -> io::Result<Vec<OsProcess>>;
}

/// Lists processes with `ps`.
pub struct PsLister;

#[async_trait]
impl ProcessLister for PsLister {
    async fn list(&self) -> io::Result<Vec<OsProcess>> {
        let output = Command::new("ps")
            .args(["-axo", "pid=,args="])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::other(format!("ps failed: {}", stderr.trim())));
        }

        Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

// Format: <pid> <command line>
static RE_PS_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(.+?)\s*$").unwrap());

pub(crate) fn parse_ps_output(stdout: &str) -> Vec<OsProcess> {
    stdout
        .lines()
        .filter_map(|line| {
            let caps = RE_PS_LINE.captures(line)?;
            Some(OsProcess {
                pid: caps[1].parse().ok()?,
                command: caps[2].to_string(),
            })
        })
        .collect()
}

/// Whether a command line runs the terminal binary.
pub(crate) fn matches_binary(command: &str, binary: &Path) -> bool {
    let Some(argv0) = command.split_whitespace().next() else {
        return false;
    };
    if Path::new(argv0) == binary {
        return true;
    }
    match (Path::new(argv0).file_name(), binary.file_name()) {
        (Some(name), Some(expected)) => name == expected,
        _ => false,
    }
}

impl ProcessManager {
    /// Reconcile the table with the OS process list.
    ///
    /// New terminal processes are added with default metadata and a polling
    /// monitor; tracked processes missing from the list are dropped once a null
    /// signal confirms they are gone.
    pub async fn scan(&self) -> Result<ReconcileDiff> {
        let processes = self.lister.list().await?;
        let own_pid = std::process::id();
        let live: Vec<u32> = processes
            .iter()
            .filter(|p| p.pid != own_pid && matches_binary(&p.command, &self.config.terminal_binary))
            .map(|p| p.pid)
            .collect();

        let home = self.config.home_dir.clone();
        let signals = self.signals.clone();
        let diff = self.table.reconcile(
            &live,
            |pid| matches!(signals.status(pid), Ok(status) if status.is_alive()),
            |pid| ProcessRecord::new(pid, "Rio", home.clone()),
        );

        for &pid in &diff.removed {
            self.monitors.cancel(pid);
            publish(&*self.bus, PROCESS_TERMINATED, json!({ "pid": pid }));
        }
        let ctx = self.monitor_context();
        for &pid in &diff.added {
            ctx.watch_polled(pid);
        }

        debug!(added = ?diff.added, removed = ?diff.removed, "process scan");
        Ok(diff)
    }

    /// Rescan, then return every tracked process. A failed scan falls back to
    /// the current table.
    pub async fn list(&self) -> Vec<ProcessRecord> {
        if let Err(e) = self.scan().await {
            warn!(error = %e, "process scan failed");
        }
        self.table.snapshot()
    }
}
