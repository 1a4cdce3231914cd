use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tracing::{debug, info};

use crate::error::{Result, RioError};
use crate::events::{publish, EventBus, SESSION_CREATED, SESSION_UPDATED};
use crate::process::ProcessManager;
use crate::recording::RecordingController;
use crate::storage::KeyValueStore;

use super::{SessionPatch, SessionProfile, SessionRecord};

/// Storage key holding the JSON array of sessions.
pub const SESSIONS_KEY: &str = "rio-sessions";

type SessionMap = HashMap<String, SessionRecord>;

/// In-memory sessions, written through to the key-value store.
///
/// Mutations go through [`SessionStore::mutate`]: the map is updated in one
/// lock acquisition, then persisted; a failed write rolls the map back.
pub struct SessionStore {
    sessions: Mutex<SessionMap>,
    // Orders persists so an older snapshot never overwrites a newer one
    write_lock: tokio::sync::Mutex<()>,
    kv: Arc<dyn KeyValueStore>,
    pub(super) bus: Arc<dyn EventBus>,
    pub(super) processes: Arc<ProcessManager>,
    pub(super) recordings: Arc<RecordingController>,
}

impl SessionStore {
    /// Load persisted sessions.
    pub async fn load(
        kv: Arc<dyn KeyValueStore>,
        bus: Arc<dyn EventBus>,
        processes: Arc<ProcessManager>,
        recordings: Arc<RecordingController>,
    ) -> Result<Self> {
        let sessions: Vec<SessionRecord> = match kv.get_item(SESSIONS_KEY).await? {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            _ => Vec::new(),
        };
        debug!(count = sessions.len(), "loaded sessions");

        Ok(Self {
            sessions: Mutex::new(sessions.into_iter().map(|s| (s.id.clone(), s)).collect()),
            write_lock: tokio::sync::Mutex::new(()),
            kv,
            bus,
            processes,
            recordings,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn serialize(sessions: &SessionMap) -> Result<String> {
        let mut records: Vec<&SessionRecord> = sessions.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(serde_json::to_string(&records)?)
    }

    /// Apply `f` to the map and persist the result.
    pub(super) async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SessionMap) -> Result<T>,
    {
        let _write = self.write_lock.lock().await;

        let (value, before, payload) = {
            let mut sessions = self.lock();
            let before = sessions.clone();
            let value = match f(&mut sessions) {
                Ok(value) => value,
                Err(e) => {
                    *sessions = before;
                    return Err(e);
                }
            };
            let payload = match Self::serialize(&sessions) {
                Ok(payload) => payload,
                Err(e) => {
                    *sessions = before;
                    return Err(e);
                }
            };
            (value, before, payload)
        };

        if let Err(e) = self.kv.set_item(SESSIONS_KEY, payload).await {
            *self.lock() = before;
            return Err(e.into());
        }
        Ok(value)
    }

    pub async fn create(
        &self,
        name: &str,
        profile: Option<SessionProfile>,
    ) -> Result<SessionRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RioError::Validation("session name must not be empty".into()));
        }

        let session = SessionRecord::new(name, profile);
        let stored = session.clone();
        self.mutate(move |sessions| {
            sessions.insert(stored.id.clone(), stored);
            Ok(())
        })
        .await?;

        info!(id = %session.id, name = %session.name, "session created");
        publish(
            &*self.bus,
            SESSION_CREATED,
            json!({ "id": session.id, "name": session.name }),
        );
        Ok(session)
    }

    /// All sessions, most recently accessed first.
    pub fn list(&self) -> Vec<SessionRecord> {
        let mut sessions: Vec<_> = self.lock().values().cloned().collect();
        sessions.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        sessions
    }

    pub fn get(&self, id: &str) -> Result<SessionRecord> {
        if id.trim().is_empty() {
            return Err(RioError::Validation("session id must not be empty".into()));
        }
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RioError::SessionNotFound(id.to_string()))
    }

    /// Merge `patch` into a session; always refreshes `last_accessed_at`.
    pub async fn update(&self, id: &str, patch: SessionPatch) -> Result<SessionRecord> {
        if let Some(name) = patch.name.as_deref() {
            if name.trim().is_empty() {
                return Err(RioError::Validation("session name must not be empty".into()));
            }
        }

        let id_owned = id.to_string();
        let updated = self
            .mutate(move |sessions| {
                let session = sessions
                    .get_mut(&id_owned)
                    .ok_or_else(|| RioError::SessionNotFound(id_owned.clone()))?;
                if let Some(name) = patch.name {
                    session.name = name.trim().to_string();
                }
                if let Some(window_ids) = patch.window_ids {
                    session.window_ids = window_ids;
                }
                if let Some(profile) = patch.profile {
                    session.profile = profile;
                }
                session.touch();
                Ok(session.clone())
            })
            .await?;

        publish(
            &*self.bus,
            SESSION_UPDATED,
            json!({ "id": updated.id, "name": updated.name }),
        );
        Ok(updated)
    }

    /// Refresh `last_accessed_at` and persist.
    pub(super) async fn touch(&self, id: &str) -> Result<SessionRecord> {
        let id_owned = id.to_string();
        self.mutate(move |sessions| {
            let session = sessions
                .get_mut(&id_owned)
                .ok_or_else(|| RioError::SessionNotFound(id_owned.clone()))?;
            session.touch();
            Ok(session.clone())
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::Config;
    use crate::events::mock::CollectingBus;
    use crate::platform::focus_mock::MockFocus;
    use crate::process::testing::{test_config, StaticLister};
    use crate::storage::memory::MemoryStore;

    pub struct Fixture {
        pub home: tempfile::TempDir,
        pub config: Arc<Config>,
        pub kv: Arc<MemoryStore>,
        pub bus: Arc<CollectingBus>,
        pub focus: Arc<MockFocus>,
        pub processes: Arc<ProcessManager>,
        pub recordings: Arc<RecordingController>,
    }

    impl Fixture {
        pub fn new() -> Self {
            let home = tempfile::tempdir().unwrap();
            let config = Arc::new(test_config(home.path()));
            let bus = Arc::new(CollectingBus::default());
            let focus = Arc::new(MockFocus::default());
            let processes = Arc::new(
                ProcessManager::new(config.clone(), bus.clone())
                    .with_focus(focus.clone())
                    .with_lister(Arc::new(StaticLister::default())),
            );
            let recordings = Arc::new(RecordingController::new(config.clone(), bus.clone()));
            Self {
                home,
                config,
                kv: Arc::new(MemoryStore::default()),
                bus,
                focus,
                processes,
                recordings,
            }
        }

        pub async fn store(&self) -> SessionStore {
            SessionStore::load(
                self.kv.clone(),
                self.bus.clone(),
                self.processes.clone(),
                self.recordings.clone(),
            )
            .await
            .unwrap()
        }
    }
}
