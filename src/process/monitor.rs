//! Per-process liveness monitors.
//!
//! Children spawned by the launcher are watched through their own exit
//! notification. Processes discovered by a scan are not our children, so they
//! are polled with a zero signal instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::json;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use crate::events::{publish, EventBus, PROCESS_TERMINATED};
use crate::platform::Signaller;

use super::table::ProcessTable;

#[derive(Default)]
struct MonitorInner {
    next_id: u64,
    tasks: HashMap<u32, (u64, JoinHandle<()>)>,
}

/// Running monitor tasks keyed by PID.
#[derive(Clone, Default)]
pub(crate) struct MonitorSet {
    inner: Arc<Mutex<MonitorInner>>,
}

impl MonitorSet {
    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn a monitor under the lock so it cannot finish before it is registered.
    fn register<F>(&self, pid: u32, spawn: F)
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let handle = spawn(id);
        if let Some((_, previous)) = inner.tasks.insert(pid, (id, handle)) {
            previous.abort();
        }
    }

    /// Drop the entry for a monitor that finished on its own.
    fn forget(&self, pid: u32, id: u64) {
        let mut inner = self.lock();
        if matches!(inner.tasks.get(&pid), Some((current, _)) if *current == id) {
            inner.tasks.remove(&pid);
        }
    }

    pub fn cancel(&self, pid: u32) {
        if let Some((_, handle)) = self.lock().tasks.remove(&pid) {
            handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        for (_, (_, handle)) in self.lock().tasks.drain() {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub fn is_watching(&self, pid: u32) -> bool {
        self.lock().tasks.contains_key(&pid)
    }
}

/// What a monitor task needs to report an exit.
#[derive(Clone)]
pub(crate) struct MonitorContext {
    pub table: ProcessTable,
    pub monitors: MonitorSet,
    pub bus: Arc<dyn EventBus>,
    pub signals: Arc<dyn Signaller>,
    pub interval: Duration,
}

impl MonitorContext {
    fn on_exit(&self, pid: u32, id: u64, exit_code: Option<i32>) {
        self.monitors.forget(pid, id);
        if self.table.remove(pid).is_some() {
            info!(pid, ?exit_code, "rio process exited");
            publish(
                &*self.bus,
                PROCESS_TERMINATED,
                json!({ "pid": pid, "exitCode": exit_code }),
            );
        }
    }

    /// Watch a spawned child until it exits.
    pub fn watch_child(&self, pid: u32, mut child: Child) {
        let ctx = self.clone();
        self.monitors.register(pid, move |id| {
            tokio::spawn(async move {
                let exit_code = match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        debug!(pid, error = %e, "wait on child failed");
                        None
                    }
                };
                ctx.on_exit(pid, id, exit_code);
            })
        });
    }

    /// Poll a process we did not spawn.
    pub fn watch_polled(&self, pid: u32) {
        let ctx = self.clone();
        self.monitors.register(pid, move |id| {
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + ctx.interval, ctx.interval);
                loop {
                    ticker.tick().await;
                    match ctx.signals.status(pid) {
                        Ok(status) if status.is_alive() => {}
                        Ok(_) => break,
                        Err(e) => {
                            debug!(pid, error = %e, "liveness check failed");
                            break;
                        }
                    }
                }
                ctx.on_exit(pid, id, None);
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::mock::CollectingBus;
    use crate::platform::signals_mock::ScriptedSignaller;
    use crate::platform::ProcessStatus;
    use crate::process::table::ProcessRecord;

    fn context(
        bus: Arc<CollectingBus>,
        signals: Arc<ScriptedSignaller>,
    ) -> MonitorContext {
        MonitorContext {
            table: ProcessTable::new(),
            monitors: MonitorSet::default(),
            bus,
            signals,
            interval: Duration::from_millis(20),
        }
    }

    async fn wait_until_untracked(table: &ProcessTable, pid: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while table.contains(pid) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("monitor did not remove the record");
    }

    #[tokio::test]
    async fn test_polled_monitor_detects_exit() {
        let bus = Arc::new(CollectingBus::default());
        let signals = Arc::new(ScriptedSignaller::new().with_process(500, ProcessStatus::Running));
        let ctx = context(bus.clone(), signals.clone());
        ctx.table.insert(ProcessRecord::new(500, "Rio", "/"));
        ctx.watch_polled(500);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(ctx.table.contains(500));

        signals.set_status(500, ProcessStatus::NotFound);
        wait_until_untracked(&ctx.table, 500).await;

        assert_eq!(bus.count(PROCESS_TERMINATED), 1);
        assert_eq!(bus.find(PROCESS_TERMINATED).unwrap()["pid"], 500);
        assert!(!ctx.monitors.is_watching(500));
    }

    #[tokio::test]
    async fn test_no_permission_counts_as_alive() {
        let bus = Arc::new(CollectingBus::default());
        let signals =
            Arc::new(ScriptedSignaller::new().with_process(501, ProcessStatus::NoPermission));
        let ctx = context(bus.clone(), signals);
        ctx.table.insert(ProcessRecord::new(501, "Rio", "/"));
        ctx.watch_polled(501);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ctx.table.contains(501));
        assert_eq!(bus.count(PROCESS_TERMINATED), 0);
        ctx.monitors.cancel_all();
    }

    #[tokio::test]
    async fn test_child_monitor_reports_exit_code() {
        let bus = Arc::new(CollectingBus::default());
        let ctx = context(bus.clone(), Arc::new(ScriptedSignaller::new()));

        let child = tokio::process::Command::new("sh")
            .args(["-c", "exit 3"])
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        ctx.table.insert(ProcessRecord::new(pid, "Rio", "/"));
        ctx.watch_child(pid, child);

        wait_until_untracked(&ctx.table, pid).await;
        assert_eq!(bus.find(PROCESS_TERMINATED).unwrap()["exitCode"], 3);
    }

    #[tokio::test]
    async fn test_cancelled_monitor_reports_nothing() {
        let bus = Arc::new(CollectingBus::default());
        let signals = Arc::new(ScriptedSignaller::new().with_process(502, ProcessStatus::Running));
        let ctx = context(bus.clone(), signals.clone());
        ctx.table.insert(ProcessRecord::new(502, "Rio", "/"));
        ctx.watch_polled(502);
        ctx.monitors.cancel(502);

        signals.set_status(502, ProcessStatus::NotFound);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(ctx.table.contains(502));
        assert_eq!(bus.count(PROCESS_TERMINATED), 0);
    }
}
