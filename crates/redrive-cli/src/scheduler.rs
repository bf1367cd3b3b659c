use std::sync::Arc;
use std::time::Duration;

use redrive_core::DlqEngine;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// External scheduler for the engine.
/// - 一定間隔で `redrive_ready` と `sweep_expired` を呼ぶだけ（エンジン自身はループを持たない）
/// - `shutdown_tx` を drop するか `request_shutdown()` でループが止まる
pub struct RedriveScheduler {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RedriveScheduler {
    pub fn spawn(engine: Arc<DlqEngine>, interval: Duration, batch_size: usize) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            scheduler_loop(engine, interval, batch_size, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    /// Stop after the current tick. An in-flight processor call is not cancelled.
    pub fn request_shutdown(&self) {
        // receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }
}

async fn scheduler_loop(
    engine: Arc<DlqEngine>,
    interval: Duration,
    batch_size: usize,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_ms = interval.as_millis() as u64, batch_size, "redrive scheduler started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped: nobody can stop us later, so stop now
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match engine.redrive_ready(batch_size).await {
            Ok(report) if !report.results.is_empty() => {
                debug!(processed = report.processed, failed = report.failed, "tick redrive");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "redrive pass failed"),
        }

        if let Err(e) = engine.sweep_expired().await {
            warn!(error = %e, "expiration sweep failed");
        }
    }

    info!("redrive scheduler stopped");
}
