//! Terminal process tracking: launch, monitor, terminate and reconcile.

mod launcher;
mod monitor;
mod scan;
mod table;
mod terminator;

pub use launcher::{LaunchOptions, WindowBounds};
pub use scan::{ProcessLister, PsLister};
pub use table::ProcessRecord;

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::events::EventBus;
use crate::platform::{
    platform_selection, KillSignaller, OsWindowFocus, SelectionSource, Signaller, WindowFocus,
};
use crate::profiles::{JsonProfileProvider, ProfileProvider};

use monitor::{MonitorContext, MonitorSet};
use table::ProcessTable;

/// Owns the process table and every operation that mutates it.
pub struct ProcessManager {
    config: Arc<Config>,
    table: ProcessTable,
    monitors: MonitorSet,
    bus: Arc<dyn EventBus>,
    signals: Arc<dyn Signaller>,
    focus: Arc<dyn WindowFocus>,
    lister: Arc<dyn ProcessLister>,
    selection: Arc<dyn SelectionSource>,
    profiles: Arc<dyn ProfileProvider>,
}

impl ProcessManager {
    /// Manager wired to the real OS primitives and no profiles.
    pub fn new(config: Arc<Config>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            config,
            table: ProcessTable::new(),
            monitors: MonitorSet::default(),
            bus,
            signals: Arc::new(KillSignaller),
            focus: Arc::new(OsWindowFocus),
            lister: Arc::new(PsLister),
            selection: platform_selection(),
            profiles: Arc::new(JsonProfileProvider::default()),
        }
    }

    #[cfg(test)]
    pub fn with_signaller(mut self, signals: Arc<dyn Signaller>) -> Self {
        self.signals = signals;
        self
    }

    #[cfg(test)]
    pub fn with_focus(mut self, focus: Arc<dyn WindowFocus>) -> Self {
        self.focus = focus;
        self
    }

    #[cfg(test)]
    pub fn with_lister(mut self, lister: Arc<dyn ProcessLister>) -> Self {
        self.lister = lister;
        self
    }

    #[cfg(test)]
    pub fn with_selection(mut self, selection: Arc<dyn SelectionSource>) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileProvider>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileProvider> {
        &self.profiles
    }

    /// Snapshot read of the table without rescanning.
    pub fn tracked(&self) -> Vec<ProcessRecord> {
        self.table.snapshot()
    }

    #[cfg(test)]
    pub fn is_tracked(&self, pid: u32) -> bool {
        self.table.contains(pid)
    }

    pub fn live_window_ids(&self) -> HashSet<String> {
        self.table.window_ids()
    }

    pub fn find_by_window(&self, window_id: &str) -> Option<ProcessRecord> {
        self.table.find_by_window(window_id)
    }

    /// Stop every monitor; tracked processes keep running.
    pub fn shutdown(&self) {
        self.monitors.cancel_all();
    }

    fn monitor_context(&self) -> MonitorContext {
        MonitorContext {
            table: self.table.clone(),
            monitors: self.monitors.clone(),
            bus: self.bus.clone(),
            signals: self.signals.clone(),
            interval: self.config.monitor_interval,
        }
    }
}
