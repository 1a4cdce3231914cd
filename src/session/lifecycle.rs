use std::collections::HashSet;

use serde_json::json;
use tracing::{info, warn};

use crate::error::{Result, RioError};
use crate::events::{publish, SESSION_DELETED, SESSION_RESTORED};
use crate::process::{LaunchOptions, ProcessRecord};
use crate::recording::{remove_recording, StopOutcome};

use super::store::SessionStore;
use super::SessionRecord;

/// How `attach_session` reached a window.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachOutcome {
    /// An existing window was brought to front
    Focused(ProcessRecord),
    /// No live window; a new one was launched
    Restored(ProcessRecord),
}

fn restore_hint(err: &RioError) -> &'static str {
    match err {
        RioError::BinaryNotFound(_) => "install Rio with `cargo install rioterm`",
        RioError::SpawnFailure { .. } => {
            "check that the session's working directory exists and its shell is installed"
        }
        _ => "try launching Rio directly to see the underlying error",
    }
}

impl SessionStore {
    /// Delete a session, its active recording and its recording files.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let session = self.get(id)?;

        if self.recordings.is_recording(id) {
            match self.recordings.stop(id).await {
                Ok(StopOutcome::Saved(path)) | Ok(StopOutcome::Missing(path)) => {
                    remove_recording(&path).await;
                }
                Err(e) => warn!(session = id, error = %e, "failed to stop recording"),
            }
        }
        match self.recordings.catalog().for_session(&session).await {
            Ok(entries) => {
                for entry in entries {
                    remove_recording(&entry.path).await;
                }
            }
            Err(e) => warn!(session = id, error = %e, "failed to list session recordings"),
        }

        let id_owned = id.to_string();
        self.mutate(move |sessions| {
            sessions
                .remove(&id_owned)
                .map(|_| ())
                .ok_or(RioError::SessionNotFound(id_owned))
        })
        .await?;

        info!(id, name = %session.name, "session deleted");
        publish(
            &*self.bus,
            SESSION_DELETED,
            json!({ "id": id, "name": session.name }),
        );
        Ok(())
    }

    /// Launch a new window from the session's profile.
    pub async fn restore(&self, id: &str) -> Result<ProcessRecord> {
        let session = self.get(id)?;
        let options = session
            .profile
            .as_ref()
            .map(|p| p.launch_options())
            .unwrap_or_else(LaunchOptions::default);

        let record = match self.processes.launch(options).await {
            Ok(record) => record,
            Err(e) => {
                // The attempt still counts as an access
                if let Err(touch_err) = self.touch(id).await {
                    warn!(session = id, error = %touch_err, "failed to record access");
                }
                return Err(RioError::RestoreFailure {
                    session: session.name,
                    hint: restore_hint(&e).to_string(),
                    source: Box::new(e),
                });
            }
        };

        let id_owned = id.to_string();
        let window_id = record.window_id.clone();
        self.mutate(move |sessions| {
            let session = sessions
                .get_mut(&id_owned)
                .ok_or_else(|| RioError::SessionNotFound(id_owned.clone()))?;
            if !session.window_ids.contains(&window_id) {
                session.window_ids.push(window_id);
            }
            session.touch();
            Ok(())
        })
        .await?;

        info!(id, pid = record.pid, "session restored");
        publish(
            &*self.bus,
            SESSION_RESTORED,
            json!({ "id": id, "pid": record.pid, "windowId": record.window_id }),
        );
        Ok(record)
    }

    /// Focus the session's first live window, or restore it when none is live.
    pub async fn attach(&self, id: &str) -> Result<AttachOutcome> {
        let session = self.touch(id).await?;

        let live = session
            .window_ids
            .iter()
            .find_map(|window_id| self.processes.find_by_window(window_id));
        match live {
            Some(record) => {
                self.processes.attach(record.pid).await?;
                Ok(AttachOutcome::Focused(record))
            }
            None => self.restore(id).await.map(AttachOutcome::Restored),
        }
    }

    /// Replace a session's window handles with the live process table and persist.
    pub async fn save_state(&self, id: &str) -> Result<SessionRecord> {
        let window_ids: Vec<String> = self
            .processes
            .tracked()
            .into_iter()
            .map(|r| r.window_id)
            .collect();

        let id_owned = id.to_string();
        self.mutate(move |sessions| {
            let session = sessions
                .get_mut(&id_owned)
                .ok_or_else(|| RioError::SessionNotFound(id_owned.clone()))?;
            session.window_ids = window_ids;
            session.touch();
            Ok(session.clone())
        })
        .await
    }

    /// Drop window handles with no live process. Sessions are never deleted.
    /// Returns how many sessions changed.
    pub async fn reconcile(&self) -> Result<usize> {
        let live: HashSet<String> = self.processes.live_window_ids();
        let changed = self
            .mutate(move |sessions| {
                let mut changed = 0;
                for session in sessions.values_mut() {
                    let before = session.window_ids.len();
                    session.window_ids.retain(|w| live.contains(w));
                    if session.window_ids.len() != before {
                        changed += 1;
                    }
                }
                Ok(changed)
            })
            .await?;

        if changed > 0 {
            info!(changed, "cleared stale window handles");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{PROCESS_TERMINATED, RECORDING_STOPPED};
    use crate::process::testing::write_script;
    use crate::recording::{owner_file, RecordingController};
    use crate::session::store::testing::Fixture;
    use crate::session::{SessionPatch, SessionProfile};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reconcile_clears_orphans_but_keeps_sessions() {
        let fx = Fixture::new();
        let store = fx.store().await;
        let session = store.create("dev", None).await.unwrap();
        store
            .update(
                &session.id,
                SessionPatch {
                    window_ids: Some(vec!["rio-999999".into()]),
                    ..SessionPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.reconcile().await.unwrap(), 1);

        let after = store.get(&session.id).unwrap();
        assert!(after.window_ids.is_empty());
        assert_eq!(store.list().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let fx = Fixture::new();
        let store = fx.store().await;
        assert!(matches!(
            store.delete("missing").await,
            Err(RioError::SessionNotFound(_))
        ));
    }

    async fn recording_store(fx: &Fixture) -> (SessionStore, Arc<RecordingController>) {
        let recorder = write_script(
            fx.home.path(),
            "recorder",
            "for last; do :; done\necho data > \"$last\"\ntrap 'exit 0' TERM\nwhile :; do sleep 0.05; done",
        );
        let mut config = (*fx.config).clone();
        config.recorder_binary = recorder.display().to_string();
        let recordings = Arc::new(RecordingController::new(Arc::new(config), fx.bus.clone()));
        let store = SessionStore::load(
            fx.kv.clone(),
            fx.bus.clone(),
            fx.processes.clone(),
            recordings.clone(),
        )
        .await
        .unwrap();
        (store, recordings)
    }

    #[tokio::test]
    async fn test_delete_stops_recording_and_removes_file() {
        let fx = Fixture::new();
        let (store, recordings) = recording_store(&fx).await;

        let session = store.create("dev", None).await.unwrap();
        let handle = recordings.start(&session).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        store.delete(&session.id).await.unwrap();

        assert!(!recordings.is_recording(&session.id));
        assert_eq!(fx.bus.count(RECORDING_STOPPED), 1);
        assert!(!handle.file_path.exists());
        assert!(!owner_file(&handle.file_path).exists());
        assert!(store.list().is_empty());
        assert_eq!(fx.bus.count(SESSION_DELETED), 1);
    }

    #[tokio::test]
    async fn test_delete_spares_recordings_of_same_named_session() {
        let fx = Fixture::new();
        let (store, recordings) = recording_store(&fx).await;

        let doomed = store.create("dev", None).await.unwrap();
        let survivor = store.create("dev", None).await.unwrap();
        let handle = recordings.start(&survivor).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        recordings.stop(&survivor.id).await.unwrap();

        store.delete(&doomed.id).await.unwrap();

        assert!(handle.file_path.exists());
        let latest = recordings.catalog().latest_for(&survivor).await.unwrap();
        assert_eq!(latest.map(|e| e.path), Some(handle.file_path));
    }

    #[tokio::test]
    async fn test_restore_failure_is_wrapped_with_hint() {
        let fx = Fixture::new();
        let store = fx.store().await;
        let session = store.create("dev", None).await.unwrap();

        let err = store.restore(&session.id).await.unwrap_err();
        match err {
            RioError::RestoreFailure { hint, source, .. } => {
                assert!(hint.contains("cargo install"));
                assert!(matches!(*source, RioError::BinaryNotFound(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_attach_restores_then_focuses() {
        let fx = Fixture::new();
        write_script(fx.home.path(), "rio", "exec sleep 30");
        let store = fx.store().await;
        let workdir = fx.home.path().join("project");
        std::fs::create_dir_all(&workdir).unwrap();
        let profile = SessionProfile {
            id: "work".into(),
            working_directory: Some(workdir.clone()),
            ..SessionProfile::default()
        };
        let session = store.create("dev", Some(profile)).await.unwrap();

        let restored = match store.attach(&session.id).await.unwrap() {
            AttachOutcome::Restored(record) => record,
            other => panic!("expected restore, got {other:?}"),
        };
        assert_eq!(restored.working_directory, workdir);
        assert_eq!(
            store.get(&session.id).unwrap().window_ids,
            vec![restored.window_id.clone()]
        );
        assert_eq!(fx.bus.count(SESSION_RESTORED), 1);

        let focused = store.attach(&session.id).await.unwrap();
        assert_eq!(focused, AttachOutcome::Focused(restored.clone()));
        assert_eq!(fx.focus.focused(), vec![restored.pid]);

        fx.processes.kill(restored.pid).await.unwrap();
        assert_eq!(fx.bus.count(PROCESS_TERMINATED), 1);
    }

    #[tokio::test]
    async fn test_save_state_snapshots_live_windows() {
        let fx = Fixture::new();
        write_script(fx.home.path(), "rio", "exec sleep 30");
        let store = fx.store().await;
        let session = store.create("dev", None).await.unwrap();

        let record = fx.processes.launch(LaunchOptions::default()).await.unwrap();
        let saved = store.save_state(&session.id).await.unwrap();
        assert_eq!(saved.window_ids, vec![record.window_id.clone()]);
        assert_eq!(fx.store().await.get(&session.id).unwrap().window_ids, saved.window_ids);

        fx.processes.kill(record.pid).await.unwrap();
        store.reconcile().await.unwrap();
        assert!(store.get(&session.id).unwrap().window_ids.is_empty());
    }
}
