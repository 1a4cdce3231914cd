use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, RioError};
use crate::events::{
    publish, EventBus, RECORDING_EXPORTED, RECORDING_FAILED, RECORDING_STARTED, RECORDING_STOPPED,
};
use crate::platform::{KillSignaller, Signal, Signaller};
use crate::session::SessionRecord;

use super::{
    owner_file, recording_file_name, remove_recording, ExportFormat, RecordingCatalog,
    RecordingHandle, StopOutcome,
};

#[derive(Debug, Clone)]
enum RecorderExit {
    Exited(Option<i32>),
    Error(String),
}

impl RecorderExit {
    fn success(&self) -> bool {
        matches!(self, RecorderExit::Exited(Some(0)))
    }

    fn describe(&self) -> String {
        match self {
            RecorderExit::Exited(Some(code)) => format!("recorder exited with status {}", code),
            RecorderExit::Exited(None) => "recorder was killed by a signal".to_string(),
            RecorderExit::Error(e) => format!("waiting on recorder failed: {}", e),
        }
    }
}

struct ActiveRecording {
    handle: RecordingHandle,
    exited: watch::Receiver<Option<RecorderExit>>,
}

type ActiveMap = Arc<Mutex<HashMap<String, ActiveRecording>>>;

fn lock(active: &ActiveMap) -> MutexGuard<'_, HashMap<String, ActiveRecording>> {
    active.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs at most one recorder subprocess per session.
pub struct RecordingController {
    config: Arc<Config>,
    catalog: RecordingCatalog,
    signals: Arc<dyn Signaller>,
    bus: Arc<dyn EventBus>,
    active: ActiveMap,
}

impl RecordingController {
    pub fn new(config: Arc<Config>, bus: Arc<dyn EventBus>) -> Self {
        let catalog = RecordingCatalog::new(&config.recordings_dir, &config.recording_extension);
        Self {
            config,
            catalog,
            signals: Arc::new(KillSignaller),
            bus,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn catalog(&self) -> &RecordingCatalog {
        &self.catalog
    }

    pub fn is_recording(&self, session_id: &str) -> bool {
        lock(&self.active).contains_key(session_id)
    }

    /// Snapshot of the active recording for a session.
    pub fn handle(&self, session_id: &str) -> Option<RecordingHandle> {
        lock(&self.active).get(session_id).map(|a| a.handle.clone())
    }

    fn recorder_command(&self, session: &SessionRecord, file_path: &Path) -> Command {
        let mut cmd = Command::new(&self.config.recorder_binary);
        cmd.args(["rec", "--quiet"]);
        if let Some(shell) = session.profile.as_ref().and_then(|p| p.shell_command.as_ref()) {
            let mut line = vec![shell.clone()];
            if let Some(args) = session.profile.as_ref().and_then(|p| p.shell_args.as_ref()) {
                line.extend(args.iter().cloned());
            }
            cmd.args(["--command", &line.join(" ")]);
        }
        cmd.arg(file_path)
            .env("TERM", &self.config.recorder_term)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        cmd
    }

    /// Start recording a session.
    pub async fn start(&self, session: &SessionRecord) -> Result<RecordingHandle> {
        if self.is_recording(&session.id) {
            return Err(RioError::AlreadyRecording(session.id.clone()));
        }
        tokio::fs::create_dir_all(&self.config.recordings_dir).await?;

        let start_time = Utc::now();
        let file_path = self.config.recordings_dir.join(recording_file_name(
            &session.name,
            start_time,
            &self.config.recording_extension,
        ));
        tokio::fs::write(owner_file(&file_path), &session.id).await?;

        let handle = match self.spawn_recorder(session, file_path.clone(), start_time) {
            Ok(handle) => handle,
            Err(e) => {
                // A concurrent start in the same millisecond owns this path
                if self.handle(&session.id).map(|h| h.file_path) != Some(file_path.clone()) {
                    remove_recording(&file_path).await;
                }
                return Err(e);
            }
        };
        info!(session = %session.id, pid = handle.pid, path = %handle.file_path.display(), "recording started");
        publish(
            &*self.bus,
            RECORDING_STARTED,
            json!({ "sessionId": handle.session_id, "filePath": handle.file_path, "pid": handle.pid }),
        );
        Ok(handle)
    }

    /// Check, spawn and register under one lock acquisition.
    fn spawn_recorder(
        &self,
        session: &SessionRecord,
        file_path: PathBuf,
        start_time: DateTime<Utc>,
    ) -> Result<RecordingHandle> {
        let mut active = lock(&self.active);
        if active.contains_key(&session.id) {
            return Err(RioError::AlreadyRecording(session.id.clone()));
        }

        let mut child = self
            .recorder_command(session, &file_path)
            .spawn()
            .map_err(RioError::RecorderSpawnFailure)?;
        let pid = child.id().ok_or_else(|| {
            RioError::RecorderSpawnFailure(std::io::Error::other("recorder reported no PID"))
        })?;

        let handle = RecordingHandle {
            session_id: session.id.clone(),
            file_path: file_path.clone(),
            pid,
            start_time,
        };
        let (exit_tx, exit_rx) = watch::channel(None);

        let watcher_map = self.active.clone();
        let bus = self.bus.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => RecorderExit::Exited(status.code()),
                Err(e) => RecorderExit::Error(e.to_string()),
            };
            let _ = exit_tx.send(Some(exit.clone()));

            // A stop() in progress has already taken the handle
            let unsolicited = {
                let mut map = lock(&watcher_map);
                let ours = matches!(map.get(&session_id), Some(a) if a.handle.pid == pid);
                if ours {
                    map.remove(&session_id);
                }
                ours
            };
            if !unsolicited {
                return;
            }

            if exit.success() {
                info!(session = %session_id, "recorder exited");
                publish(
                    &*bus,
                    RECORDING_STOPPED,
                    json!({ "sessionId": session_id, "filePath": file_path }),
                );
                return;
            }

            let reason = exit.describe();
            warn!(session = %session_id, %reason, "recorder failed, discarding partial file");
            remove_recording(&file_path).await;
            publish(
                &*bus,
                RECORDING_FAILED,
                json!({ "sessionId": session_id, "reason": reason }),
            );
        });

        active.insert(
            session.id.clone(),
            ActiveRecording {
                handle: handle.clone(),
                exited: exit_rx,
            },
        );
        Ok(handle)
    }

    /// Stop a recording: SIGTERM, wait for exit, SIGKILL on timeout.
    pub async fn stop(&self, session_id: &str) -> Result<StopOutcome> {
        let ActiveRecording { handle, mut exited } = lock(&self.active)
            .remove(session_id)
            .ok_or_else(|| RioError::NotRecording(session_id.to_string()))?;

        if let Err(e) = self.signals.signal(handle.pid, Signal::Term) {
            debug!(pid = handle.pid, error = %e, "SIGTERM to recorder failed");
        }

        let stop_timeout = self.config.recording_stop_timeout;
        if timeout(stop_timeout, exited.wait_for(Option::is_some)).await.is_err() {
            warn!(pid = handle.pid, "recorder ignored SIGTERM, killing");
            if let Err(e) = self.signals.signal(handle.pid, Signal::Kill) {
                debug!(pid = handle.pid, error = %e, "SIGKILL to recorder failed");
            }
            let _ = timeout(stop_timeout, exited.wait_for(Option::is_some)).await;
        }

        let path = handle.file_path;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!(session = session_id, path = %path.display(), "recording saved");
            publish(
                &*self.bus,
                RECORDING_STOPPED,
                json!({ "sessionId": session_id, "filePath": path }),
            );
            Ok(StopOutcome::Saved(path))
        } else {
            warn!(session = session_id, path = %path.display(), "recording file missing after stop");
            publish(
                &*self.bus,
                RECORDING_FAILED,
                json!({ "sessionId": session_id, "reason": "recording file missing" }),
            );
            Ok(StopOutcome::Missing(path))
        }
    }

    /// Play the newest recording of a session in the caller's terminal.
    pub async fn play(&self, session: &SessionRecord) -> Result<()> {
        let entry = self
            .catalog
            .latest_for(session)
            .await?
            .ok_or_else(|| RioError::RecordingNotFound(session.id.clone()))?;

        let status = Command::new(&self.config.recorder_binary)
            .arg("play")
            .arg(&entry.path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        if !status.success() {
            return Err(RioError::PlaybackFailed(status.to_string()));
        }
        Ok(())
    }

    /// Convert the newest recording of a session; returns the written file.
    pub async fn export(&self, session: &SessionRecord, format: ExportFormat) -> Result<PathBuf> {
        let entry = self
            .catalog
            .latest_for(session)
            .await?
            .ok_or_else(|| RioError::RecordingNotFound(session.id.clone()))?;
        let source = entry.path;
        let destination = source.with_extension(format.extension());

        let mut cmd = match format {
            ExportFormat::Gif => {
                let mut cmd = Command::new(&self.config.gif_converter);
                cmd.arg(&source).arg(&destination);
                cmd
            }
            ExportFormat::Svg => {
                let mut cmd = Command::new(&self.config.svg_converter);
                cmd.arg("--in").arg(&source).arg("--out").arg(&destination);
                cmd
            }
            ExportFormat::Txt => {
                let mut cmd = Command::new(&self.config.recorder_binary);
                cmd.arg("cat").arg(&source);
                cmd
            }
        };

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RioError::ExportFailed(format!("{} converter: {}", format, e)))?;
        if !output.status.success() {
            return Err(RioError::ExportFailed(format!(
                "{} converter exited with {}: {}",
                format,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if format == ExportFormat::Txt {
            tokio::fs::write(&destination, &output.stdout).await?;
        }

        info!(session = %session.id, %format, path = %destination.display(), "recording exported");
        publish(
            &*self.bus,
            RECORDING_EXPORTED,
            json!({ "sessionId": session.id, "format": format.extension(), "filePath": destination }),
        );
        Ok(destination)
    }
}
