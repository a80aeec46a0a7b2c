//! Periodic background expiration of ACTIVE codes past their expiry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::error::OtpServiceError;

/// How long `stop` waits for an in-flight run before aborting it.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Something the sweeper can run on each tick.
pub trait ExpirySweep: Send + Sync {
    /// Returns how many codes were expired.
    fn sweep(&self) -> impl Future<Output = Result<u64, OtpServiceError>> + Send;
}

pub struct ExpirationSweeper<T> {
    target: Arc<T>,
    interval: Duration,
}

impl<T> ExpirationSweeper<T>
where
    T: ExpirySweep + 'static,
{
    pub fn new(target: Arc<T>, interval: Duration) -> Self {
        Self { target, interval }
    }

    /// Spawn the schedule. The first run starts immediately; ticks missed
    /// while a run is slow are skipped rather than bunched up.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let Self { target, interval } = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Dropping the set aborts a run that is still going when this task is aborted.
            let mut runs = JoinSet::new();

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }

                let target = Arc::clone(&target);
                runs.spawn(async move { target.sweep().await });
                match runs.join_next().await {
                    Some(Ok(Ok(count))) => tracing::debug!(count, "expiration sweep finished"),
                    Some(Ok(Err(e))) => tracing::error!(error = %e, "expiration sweep failed"),
                    Some(Err(e)) if e.is_panic() => tracing::error!("expiration sweep panicked"),
                    Some(Err(e)) => tracing::warn!(error = %e, "expiration sweep cancelled"),
                    None => {}
                }
            }
        });

        tracing::info!(interval_secs = interval.as_secs(), "expiration sweeper started");
        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owner of a running sweeper. Dropping it without `stop` also ends the
/// schedule after the current run.
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        self.stop_within(STOP_GRACE).await;
    }

    /// Signal the loop to end and wait up to `grace` before aborting it.
    pub async fn stop_within(self, grace: Duration) {
        let Self { shutdown, mut task } = self;
        let _ = shutdown.send(());

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => tracing::info!("expiration sweeper stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "expiration sweeper ended abnormally"),
            Err(_) => {
                tracing::warn!("expiration sweeper did not stop in time, aborting");
                task.abort();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
