use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, RioError};
use crate::events::{publish, PROCESS_LAUNCHED};
use crate::profiles::Profile;

use super::table::ProcessRecord;
use super::ProcessManager;

/// Requested window placement; flags are only passed for values present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowBounds {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchOptions {
    pub working_directory: Option<PathBuf>,
    pub profile_id: Option<String>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub bounds: WindowBounds,
}

/// Fully resolved arguments, environment and directory for one spawn.
#[derive(Debug, Clone)]
pub(crate) struct LaunchPlan {
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: PathBuf,
    pub title: String,
    pub profile_id: Option<String>,
}

impl LaunchPlan {
    pub fn build<I>(
        config: &Config,
        options: &LaunchOptions,
        profile: Option<&Profile>,
        selection: &[PathBuf],
        base_env: I,
    ) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let cwd = resolve_working_directory(
            options.working_directory.as_deref(),
            selection,
            &config.home_dir,
        );

        // Lowest to highest priority: process env, overrides, profile, PATH prefix
        let mut env: HashMap<String, String> = base_env.into_iter().collect();
        env.extend(options.env.clone());
        if let Some(profile_env) = profile.and_then(|p| p.environment.as_ref()) {
            env.extend(profile_env.clone());
        }
        let path = match env.get("PATH") {
            Some(existing) if !existing.is_empty() => {
                format!("{}:{}", config.toolchain_bin.display(), existing)
            }
            _ => config.toolchain_bin.display().to_string(),
        };
        env.insert("PATH".to_string(), path);

        let mut args = Vec::new();
        if !cwd.as_os_str().is_empty() {
            args.push("--working-dir".to_string());
            args.push(cwd.display().to_string());
        }

        let bounds = &options.bounds;
        if let Some(x) = bounds.x {
            args.extend(["--window-x".to_string(), x.to_string()]);
        }
        if let Some(y) = bounds.y {
            args.extend(["--window-y".to_string(), y.to_string()]);
        }
        if let Some(width) = bounds.width {
            args.extend(["--window-width".to_string(), width.to_string()]);
        }
        if let Some(height) = bounds.height {
            args.extend(["--window-height".to_string(), height.to_string()]);
        }

        // `--command` consumes every remaining argument, so it goes last
        let command = options
            .command
            .clone()
            .map(|c| (c, options.args.clone()))
            .or_else(|| {
                profile.and_then(|p| {
                    p.shell_command
                        .clone()
                        .map(|c| (c, p.shell_args.clone().unwrap_or_default()))
                })
            });
        if let Some((command, command_args)) = command {
            args.push("--command".to_string());
            args.push(command);
            args.extend(command_args);
        }

        let title = match profile {
            Some(p) => format!("Rio ({})", p.name),
            None => "Rio".to_string(),
        };

        Self {
            args,
            env,
            cwd,
            title,
            profile_id: profile.map(|p| p.id.clone()),
        }
    }
}

/// Explicit option, then the file-manager selection, then home.
fn resolve_working_directory(explicit: Option<&Path>, selection: &[PathBuf], home: &Path) -> PathBuf {
    if let Some(dir) = explicit.filter(|d| !d.as_os_str().is_empty()) {
        return dir.to_path_buf();
    }
    if let Some(item) = selection.first() {
        if item.is_dir() {
            return item.clone();
        }
        if let Some(parent) = item.parent().filter(|p| !p.as_os_str().is_empty()) {
            return parent.to_path_buf();
        }
    }
    home.to_path_buf()
}

impl ProcessManager {
    /// Spawn a detached terminal and start tracking it.
    pub async fn launch(&self, options: LaunchOptions) -> Result<ProcessRecord> {
        let binary = &self.config.terminal_binary;
        if !tokio::fs::try_exists(binary).await.unwrap_or(false) {
            return Err(RioError::BinaryNotFound(binary.clone()));
        }

        let profile = match options.profile_id.as_deref() {
            Some(id) => {
                let profile = self.profiles.get_profile(id);
                if profile.is_none() {
                    warn!(profile = id, "unknown profile, launching without it");
                }
                profile
            }
            None => None,
        };

        let selection = if options.working_directory.is_none() {
            self.selection.selected_items().await.unwrap_or_else(|e| {
                debug!(error = %e, "no file-manager selection");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let plan = LaunchPlan::build(
            &self.config,
            &options,
            profile.as_ref(),
            &selection,
            std::env::vars(),
        );

        let mut cmd = Command::new(binary);
        cmd.args(&plan.args)
            .env_clear()
            .envs(&plan.env)
            .current_dir(&plan.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        // Own process group: the terminal outlives us and ignores our signals
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| RioError::SpawnFailure {
            binary: binary.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| RioError::SpawnFailure {
            binary: binary.clone(),
            source: io::Error::other("spawned process reported no PID"),
        })?;

        let record = ProcessRecord::new(pid, plan.title, plan.cwd).with_profile(plan.profile_id);
        self.table.insert(record.clone());
        self.monitor_context().watch_child(pid, child);

        info!(pid, cwd = %record.working_directory.display(), "launched rio");
        publish(
            &*self.bus,
            PROCESS_LAUNCHED,
            json!({
                "pid": record.pid,
                "windowId": record.window_id,
                "title": record.title,
                "workingDirectory": record.working_directory,
            }),
        );
        Ok(record)
    }
}
