use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A terminal process known to the launcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub pid: u32,
    /// Stable handle (`rio-<pid>`) used by sessions
    pub window_id: String,
    pub title: String,
    pub working_directory: PathBuf,
    pub start_time: DateTime<Utc>,
    /// Always true while tracked
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
}

impl ProcessRecord {
    pub fn new(pid: u32, title: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            window_id: Self::window_id_for(pid),
            title: title.into(),
            working_directory: working_directory.into(),
            start_time: Utc::now(),
            is_active: true,
            profile_id: None,
        }
    }

    pub fn with_profile(mut self, profile_id: Option<String>) -> Self {
        self.profile_id = profile_id;
        self
    }

    pub fn window_id_for(pid: u32) -> String {
        format!("rio-{}", pid)
    }
}

/// Outcome of diffing the table against the OS process list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDiff {
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
}

impl ReconcileDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// PID-keyed arena of tracked processes.
///
/// Every mutation completes under a single lock acquisition and the lock is
/// never held across an await point. Removing an absent key is a no-op.
#[derive(Clone, Default)]
pub struct ProcessTable {
    records: Arc<Mutex<HashMap<u32, ProcessRecord>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, ProcessRecord>> {
        // A panic mid-update cannot leave a half-written record behind
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, record: ProcessRecord) {
        self.lock().insert(record.pid, record);
    }

    pub fn remove(&self, pid: u32) -> Option<ProcessRecord> {
        self.lock().remove(&pid)
    }

    #[cfg(test)]
    pub fn get(&self, pid: u32) -> Option<ProcessRecord> {
        self.lock().get(&pid).cloned()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains_key(&pid)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Records ordered by PID.
    pub fn snapshot(&self) -> Vec<ProcessRecord> {
        let mut records: Vec<_> = self.lock().values().cloned().collect();
        records.sort_by_key(|r| r.pid);
        records
    }

    pub fn window_ids(&self) -> HashSet<String> {
        self.lock().values().map(|r| r.window_id.clone()).collect()
    }

    pub fn find_by_window(&self, window_id: &str) -> Option<ProcessRecord> {
        self.lock()
            .values()
            .find(|r| r.window_id == window_id)
            .cloned()
    }

    /// Add live PIDs that are not tracked yet and drop tracked PIDs that are
    /// neither in `live` nor confirmed alive by `still_alive`.
    pub fn reconcile<A, M>(&self, live: &[u32], still_alive: A, make: M) -> ReconcileDiff
    where
        A: Fn(u32) -> bool,
        M: Fn(u32) -> ProcessRecord,
    {
        let live: HashSet<u32> = live.iter().copied().collect();
        let mut records = self.lock();
        let mut diff = ReconcileDiff::default();

        let vanished: Vec<u32> = records
            .keys()
            .filter(|pid| !live.contains(pid))
            .copied()
            .collect();
        for pid in vanished {
            if !still_alive(pid) {
                records.remove(&pid);
                diff.removed.push(pid);
            }
        }

        for pid in live {
            if !records.contains_key(&pid) {
                records.insert(pid, make(pid));
                diff.added.push(pid);
            }
        }

        diff.added.sort_unstable();
        diff.removed.sort_unstable();
        diff
    }
}
