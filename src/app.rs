use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::actions::{Action, HELP};
use crate::config::Config;
use crate::error::RioError;
use crate::events::EventBus;
use crate::process::{LaunchOptions, ProcessManager, ProcessRecord};
use crate::profiles::ProfileProvider;
use crate::recording::{
    ExportFormat, RecordingController, RecordingEntry, RecordingHandle, StopOutcome,
};
use crate::session::{AttachOutcome, SessionPatch, SessionProfile, SessionRecord, SessionStore};
use crate::storage::KeyValueStore;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Main application state
pub struct App {
    config: Arc<Config>,
    processes: Arc<ProcessManager>,
    sessions: SessionStore,
    recordings: Arc<RecordingController>,
}

impl App {
    pub fn new(
        config: Arc<Config>,
        processes: Arc<ProcessManager>,
        sessions: SessionStore,
        recordings: Arc<RecordingController>,
    ) -> Self {
        Self {
            config,
            processes,
            sessions,
            recordings,
        }
    }

    /// Wire the real OS collaborators around the given stores.
    pub async fn build(
        config: Arc<Config>,
        bus: Arc<dyn EventBus>,
        kv: Arc<dyn KeyValueStore>,
        profiles: Arc<dyn ProfileProvider>,
    ) -> crate::error::Result<Self> {
        let processes =
            Arc::new(ProcessManager::new(config.clone(), bus.clone()).with_profiles(profiles));
        let recordings = Arc::new(RecordingController::new(config.clone(), bus.clone()));
        let sessions = SessionStore::load(kv, bus, processes.clone(), recordings.clone()).await?;
        Ok(Self::new(config, processes, sessions, recordings))
    }

    /// Sync the process table with the OS, then drop stale session handles.
    pub async fn startup(&self) -> crate::error::Result<()> {
        match self.processes.scan().await {
            Ok(diff) => info!(
                adopted = diff.added.len(),
                tracked = self.processes.tracked().len(),
                "process table synced"
            ),
            Err(e) => warn!(error = %e, "initial process scan failed"),
        }
        self.sessions.reconcile().await?;
        Ok(())
    }

    async fn rescan(&self) {
        match self.processes.scan().await {
            Ok(diff) if !diff.is_empty() => {
                debug!(added = ?diff.added, removed = ?diff.removed, "rescan changed table")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "process scan failed"),
        }
        if let Err(e) = self.sessions.reconcile().await {
            warn!(error = %e, "session reconcile failed");
        }
    }

    /// Cancel monitors. Running processes are left alone.
    pub fn shutdown(&self) {
        self.processes.shutdown();
    }

    pub async fn launch_rio(&self, options: LaunchOptions) -> crate::error::Result<ProcessRecord> {
        self.processes.launch(options).await
    }

    pub async fn get_rio_processes(&self) -> Vec<ProcessRecord> {
        self.processes.list().await
    }

    pub async fn kill_process(&self, pid: u32) -> crate::error::Result<()> {
        self.processes.kill(pid).await
    }

    pub async fn attach_to_process(&self, pid: u32) -> crate::error::Result<()> {
        self.processes.attach(pid).await
    }

    /// Create a session, copying the named profile when one is given.
    pub async fn create_session(
        &self,
        name: &str,
        profile_id: Option<&str>,
    ) -> crate::error::Result<SessionRecord> {
        let profile = match profile_id {
            Some(id) => {
                let profile = self
                    .processes
                    .profiles()
                    .get_profile(id)
                    .ok_or_else(|| RioError::Validation(format!("unknown profile '{}'", id)))?;
                Some(SessionProfile::from(&profile))
            }
            None => None,
        };

        let session = self.sessions.create(name, profile).await?;
        if self.config.auto_record {
            if let Err(e) = self.recordings.start(&session).await {
                warn!(session = %session.id, error = %e, "auto-record failed to start");
            }
        }
        Ok(session)
    }

    pub fn get_sessions(&self) -> Vec<SessionRecord> {
        self.sessions.list()
    }

    pub fn get_session(&self, id: &str) -> crate::error::Result<SessionRecord> {
        self.sessions.get(id)
    }

    pub async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> crate::error::Result<SessionRecord> {
        self.sessions.update(id, patch).await
    }

    pub async fn delete_session(&self, id: &str) -> crate::error::Result<()> {
        self.sessions.delete(id).await
    }

    pub async fn restore_session(&self, id: &str) -> crate::error::Result<ProcessRecord> {
        self.sessions.restore(id).await
    }

    pub async fn attach_session(&self, id: &str) -> crate::error::Result<AttachOutcome> {
        self.sessions.attach(id).await
    }

    pub async fn save_session_state(&self, id: &str) -> crate::error::Result<SessionRecord> {
        self.sessions.save_state(id).await
    }

    pub async fn record_session(&self, id: &str) -> crate::error::Result<RecordingHandle> {
        let session = self.sessions.get(id)?;
        self.recordings.start(&session).await
    }

    pub async fn stop_recording(&self, id: &str) -> crate::error::Result<StopOutcome> {
        self.recordings.stop(id).await
    }

    pub fn get_session_recording(&self, id: &str) -> Option<RecordingHandle> {
        self.recordings.handle(id)
    }

    pub async fn play_recording(&self, id: &str) -> crate::error::Result<()> {
        let session = self.sessions.get(id)?;
        self.recordings.play(&session).await
    }

    pub async fn export_recording(&self, id: &str, format: &str) -> crate::error::Result<PathBuf> {
        let format: ExportFormat = format.parse()?;
        let session = self.sessions.get(id)?;
        self.recordings.export(&session, format).await
    }

    pub async fn list_recordings(&self) -> crate::error::Result<Vec<RecordingEntry>> {
        self.recordings.catalog().list(&self.sessions.list()).await
    }

    /// Handle an action. Returns true when the app should quit.
    pub async fn handle_action(&self, action: Action) -> Result<bool> {
        match action {
            Action::Quit => return Ok(true),
            Action::Error(msg) => eprintln!("error: {}", msg),
            Action::Event(topic, payload) => println!("» {} {}", topic, payload),
            Action::Rescan => self.rescan().await,
            action => match self.run(action).await {
                Ok(output) if output.is_empty() => {}
                Ok(output) => println!("{}", output),
                Err(e) => eprintln!("error: {:#}", e),
            },
        }
        Ok(false)
    }

    /// Execute a command and render its result.
    async fn run(&self, action: Action) -> Result<String> {
        let output = match action {
            Action::Launch(options) => {
                let record = self.launch_rio(options).await?;
                format!("launched {} (pid {}, {})", record.title, record.pid, record.window_id)
            }
            Action::ListProcesses => {
                let processes = self.get_rio_processes().await;
                if processes.is_empty() {
                    "no Rio processes".to_string()
                } else {
                    processes.iter().map(describe_process).collect::<Vec<_>>().join("\n")
                }
            }
            Action::Kill(pid) => {
                self.kill_process(pid).await?;
                format!("terminated {}", pid)
            }
            Action::Attach(pid) => {
                self.attach_to_process(pid).await?;
                format!("focused {}", pid)
            }
            Action::CreateSession { name, profile } => {
                let session = self.create_session(&name, profile.as_deref()).await?;
                format!("created session {} ({})", session.id, session.name)
            }
            Action::ListSessions => {
                let sessions = self.get_sessions();
                if sessions.is_empty() {
                    "no sessions".to_string()
                } else {
                    sessions.iter().map(describe_session).collect::<Vec<_>>().join("\n")
                }
            }
            Action::ShowSession(id) => serde_json::to_string_pretty(&self.get_session(&id)?)?,
            Action::RenameSession { id, name } => {
                let patch = SessionPatch {
                    name: Some(name),
                    ..SessionPatch::default()
                };
                let session = self.update_session(&id, patch).await?;
                format!("renamed {} to {}", session.id, session.name)
            }
            Action::DeleteSession(id) => {
                self.delete_session(&id).await?;
                format!("deleted {}", id)
            }
            Action::RestoreSession(id) => {
                let record = self.restore_session(&id).await?;
                format!("restored {} (pid {})", id, record.pid)
            }
            Action::AttachSession(id) => match self.attach_session(&id).await? {
                AttachOutcome::Focused(record) => format!("focused pid {}", record.pid),
                AttachOutcome::Restored(record) => format!("restored (pid {})", record.pid),
            },
            Action::SaveSession(id) => {
                let session = self.save_session_state(&id).await?;
                format!("saved {} window(s) to {}", session.window_ids.len(), session.name)
            }
            Action::Record(id) => {
                let handle = self.record_session(&id).await?;
                format!("recording to {}", handle.file_path.display())
            }
            Action::StopRecording(id) => match self.stop_recording(&id).await? {
                StopOutcome::Saved(path) => format!("saved {}", path.display()),
                StopOutcome::Missing(path) => {
                    format!("recorder exited without writing {}", path.display())
                }
            },
            Action::RecordingStatus(id) => match self.get_session_recording(&id) {
                Some(handle) => format!(
                    "recording since {} (pid {}) to {}",
                    handle.start_time.format(TIME_FORMAT),
                    handle.pid,
                    handle.file_path.display()
                ),
                None => "not recording".to_string(),
            },
            Action::Play(id) => {
                self.play_recording(&id).await?;
                String::new()
            }
            Action::Export { id, format } => {
                let path = self.export_recording(&id, &format).await?;
                format!("exported {}", path.display())
            }
            Action::ListRecordings => {
                let entries = self.list_recordings().await?;
                if entries.is_empty() {
                    "no recordings".to_string()
                } else {
                    entries.iter().map(describe_recording).collect::<Vec<_>>().join("\n")
                }
            }
            Action::Help => HELP.to_string(),
            Action::Rescan | Action::Event(..) | Action::Error(_) | Action::Quit => String::new(),
        };
        Ok(output)
    }
}

fn describe_process(record: &ProcessRecord) -> String {
    format!(
        "{:>7}  {:<12} {:<20} {}",
        record.pid,
        record.window_id,
        record.title,
        record.working_directory.display()
    )
}

fn describe_session(session: &SessionRecord) -> String {
    format!(
        "{}  {:<20} {} window(s)  last used {}",
        session.id,
        session.name,
        session.window_ids.len(),
        session.last_accessed_at.format(TIME_FORMAT)
    )
}

fn describe_recording(entry: &RecordingEntry) -> String {
    format!(
        "{}  {:<20} {:>9} B  {}",
        entry.created_at.format(TIME_FORMAT),
        entry.session_name,
        entry.size_bytes,
        entry.path.display()
    )
}
