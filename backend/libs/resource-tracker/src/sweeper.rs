//! Background aged cleanup of leaked resources

use crate::cleanup::CleanupCoordinator;
use crate::config::TrackerConfig;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Periodically reaps leaked records; stops when dropped
///
/// Must be created inside a tokio runtime.
pub struct StaleSweeper {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl StaleSweeper {
    pub fn spawn(coordinator: CleanupCoordinator, interval: Duration, max_age: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let handle = tokio::spawn(async move {
            sweep_loop(coordinator, interval, max_age, shutdown_rx).await;
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    pub fn from_config(coordinator: CleanupCoordinator, config: &TrackerConfig) -> Self {
        Self::spawn(coordinator, config.sweep_interval, config.leak_max_age)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for StaleSweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        self.handle.abort();
    }
}

async fn sweep_loop(
    coordinator: CleanupCoordinator,
    interval: Duration,
    max_age: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!(component = %coordinator.component(), "stale resource sweeper shutting down");
                break;
            }
            _ = sleep(interval) => {
                let reaped = coordinator.reap_aged(max_age);
                debug!(
                    component = %coordinator.component(),
                    reaped = reaped.len(),
                    remaining = coordinator.registry().len(),
                    "sweep finished"
                );
            }
        }
    }
}
