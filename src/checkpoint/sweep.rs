//! Background staleness sweep for abandoned waiting checkpoints

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::checkpoint::CheckpointProtocol;
use crate::error::WaypointError;

/// Resolves waiting checkpoints older than `stale_after` as stale
pub struct StaleSweeper {
    checkpoints: CheckpointProtocol,
    stale_after: Duration,
    interval: Duration,
}

impl StaleSweeper {
    pub fn new(checkpoints: CheckpointProtocol, stale_after: Duration) -> Self {
        Self {
            checkpoints,
            stale_after,
            interval: Duration::from_secs(30),
        }
    }

    /// Create with custom sweep interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass over the store. Returns how many records were cleared.
    pub async fn sweep_once(&self) -> Result<usize, WaypointError> {
        let age = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - age;
        let stale = self
            .checkpoints
            .gateway()
            .waiting_created_before(cutoff)
            .await?;

        let mut cleared = 0;
        for event in stale {
            let status = self.checkpoints.clear_stale_record(&event).await?;
            if !status.is_missing() {
                cleared += 1;
            }
        }
        if cleared > 0 {
            info!(cleared, "stale checkpoints cleared");
        }
        Ok(cleared)
    }

    /// Run the sweep loop until cancelled
    #[instrument(skip_all)]
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "checkpoint sweep started, stale after {:?}, interval {:?}",
            self.stale_after, self.interval
        );
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(n) => debug!(cleared = n, "sweep pass complete"),
                        Err(e) => warn!("checkpoint sweep failed: {}", e),
                    }
                }
                () = cancel.cancelled() => {
                    info!("checkpoint sweep shutting down");
                    break;
                }
            }
        }
    }
}
