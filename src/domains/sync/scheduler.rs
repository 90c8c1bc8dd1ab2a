use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domains::sync::client::SessionProvider;
use crate::domains::sync::service::SyncService;

/// Timing knobs for the background sync loops.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Interval between data (upload) passes.
    pub data_interval: Duration,
    /// Interval between serial-pool refreshes.
    pub pool_interval: Duration,
    /// Delay after login or reconnect before the first pass.
    pub settle_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_interval: Duration::from_secs(180),
            pool_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Drives periodic sync passes while the app is running.
///
/// Each pass kind carries its own overlap guard: a tick that arrives
/// while the previous pass of that kind is still running is dropped,
/// never queued. Pass errors are logged and swallowed so one bad pass
/// cannot kill the loop.
pub struct SyncScheduler {
    service: Arc<SyncService>,
    session: Arc<dyn SessionProvider>,
    config: SchedulerConfig,
    data_running: AtomicBool,
    pool_running: AtomicBool,
    shutdown: CancellationToken,
}

impl SyncScheduler {
    pub fn new(
        service: Arc<SyncService>,
        session: Arc<dyn SessionProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            service,
            session,
            config,
            data_running: AtomicBool::new(false),
            pool_running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the interval loops and the connectivity watcher.
    ///
    /// `connectivity` carries the current online state; a false-to-true
    /// transition triggers an immediate pass after the settle delay.
    pub fn start(self: &Arc<Self>, mut connectivity: watch::Receiver<bool>) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(scheduler.config.settle_delay).await;
            let mut interval = tokio::time::interval(scheduler.config.data_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        scheduler.run_data_pass().await;
                    }
                }
            }
        });

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(scheduler.config.settle_delay).await;
            let mut interval = tokio::time::interval(scheduler.config.pool_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        scheduler.run_pool_pass().await;
                    }
                }
            }
        });

        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut was_online = *connectivity.borrow();
            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *connectivity.borrow();
                        if online && !was_online {
                            log::info!("Connectivity regained, scheduling sync pass");
                            tokio::time::sleep(scheduler.config.settle_delay).await;
                            scheduler.run_data_pass().await;
                            scheduler.run_pool_pass().await;
                        }
                        was_online = online;
                    }
                }
            }
        });
    }

    /// Stop all loops. Passes already in flight finish on their own.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// One upload pass; returns false if skipped (gated or overlapping).
    pub async fn run_data_pass(&self) -> bool {
        if !self.session.sync_allowed() {
            return false;
        }
        if self
            .data_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Data pass skipped: previous pass still running");
            return false;
        }

        if let Err(e) = self.service.push_pending().await {
            log::warn!("Data pass failed: {}", e);
        }
        self.data_running.store(false, Ordering::SeqCst);
        true
    }

    /// One serial-pool refresh; returns false if skipped.
    pub async fn run_pool_pass(&self) -> bool {
        if !self.session.sync_allowed() {
            return false;
        }
        if self
            .pool_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Pool pass skipped: previous pass still running");
            return false;
        }

        if let Err(e) = self.service.sync_serial_pool(false).await {
            log::warn!("Pool pass failed: {}", e);
        }
        self.pool_running.store(false, Ordering::SeqCst);
        true
    }
}
