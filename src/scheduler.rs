//! Background tick scheduler.
//!
//! Runs [`ReminderEngine::run_tick`] on a fixed interval until stopped. The
//! first tick fires immediately; ticks that fall behind are skipped rather
//! than bunched. The shutdown signal is handed to each tick so a stop request
//! also abandons the tick in progress between rules.

use crate::core::orchestrator::ReminderEngine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

/// Handle controlling the background reminder task.
pub struct ReminderScheduler {
    shutdown_tx: watch::Sender<bool>,
    task_handle: Option<JoinHandle<()>>,
}

impl ReminderScheduler {
    /// Spawns the tick loop on the current runtime.
    pub fn spawn(engine: Arc<ReminderEngine>, every: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task_handle = tokio::spawn(run_tick_loop(engine, every, shutdown_rx));

        Self {
            shutdown_tx,
            task_handle: Some(task_handle),
        }
    }

    /// Signals shutdown and waits for the loop to finish.
    pub async fn stop(&mut self) {
        // The loop may already have exited.
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Reminder scheduler task panicked");
            }
        }
        info!("Reminder scheduler stopped");
    }

    /// Whether the loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

async fn run_tick_loop(
    engine: Arc<ReminderEngine>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut timer = interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = every.as_secs(), "Starting reminder scheduler");

    loop {
        tokio::select! {
            _ = timer.tick() => {
                engine.run_tick(Utc::now(), &shutdown_rx).await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Reminder scheduler received shutdown signal");
                    break;
                }
            }
        }
    }
}
