//! Periodic background persistence of workflow state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::state::WorkflowState;
use crate::storage::PersistenceAdapter;

/// Background task snapshotting shared state into the persistence adapter.
///
/// A tick only writes when the state changed since the last successful
/// save. [`AutoSaveScheduler::request_save`] forces a write on the next
/// loop turn. Dropping the scheduler aborts the task; use
/// [`AutoSaveScheduler::shutdown`] to let an in-flight write finish.
#[derive(Debug)]
pub struct AutoSaveScheduler {
    trigger: Arc<Notify>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl AutoSaveScheduler {
    /// Spawn the timer on the current tokio runtime.
    pub fn start(
        state: Arc<Mutex<WorkflowState>>,
        adapter: PersistenceAdapter,
        interval: Duration,
    ) -> Self {
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle =
            tokio::spawn(run(state, adapter, interval, Arc::clone(&trigger), shutdown_rx));

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Auto-save started");
        Self { trigger, shutdown: Some(shutdown_tx), handle: Some(handle) }
    }

    /// Ask for a save without waiting for the next tick.
    pub fn request_save(&self) {
        self.trigger.notify_one();
    }

    /// Stop the timer, waiting for any in-flight write.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Auto-save task ended abnormally");
            }
        }
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run(
    state: Arc<Mutex<WorkflowState>>,
    adapter: PersistenceAdapter,
    interval: Duration,
    trigger: Arc<Notify>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    let mut last_written: Option<WorkflowState> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
            () = trigger.notified() => {}
        }

        let snapshot = state.lock().clone();
        let comparable = WorkflowState { last_saved: None, ..snapshot.clone() };
        if last_written.as_ref() == Some(&comparable) {
            continue;
        }

        if let Some(stamp) = adapter.save(&snapshot).await {
            state.lock().last_saved = Some(stamp);
            last_written = Some(comparable);
        }
    }

    tracing::debug!("Auto-save stopped");
}
