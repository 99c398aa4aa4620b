use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::household::Household;

/// Something that can re-pull its state from the store
#[async_trait]
pub trait Refresher: Send + Sync + 'static {
    async fn refresh(&self) -> Result<()>;
}

#[async_trait]
impl Refresher for Household {
    async fn refresh(&self) -> Result<()> {
        Household::refresh(self).await
    }
}

/// Re-runs a full refresh on a fixed period and whenever the host reports
/// it became visible again
#[derive(Debug, Clone)]
pub struct PollingScheduler {
    period: Duration,
}

impl PollingScheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Start refreshing in the background. Refreshing stops when the
    /// returned handle is stopped or dropped.
    pub fn start<R: Refresher>(&self, target: Arc<R>) -> SchedulerHandle {
        let visible = Arc::new(Notify::new());
        let wake = visible.clone();
        let period = self.period;

        let task = tokio::spawn(async move {
            debug!("Refresh loop started, every {:?}", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes at once; the caller has just loaded.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Periodic refresh");
                    }
                    _ = wake.notified() => {
                        debug!("Visibility refresh");
                        ticker.reset();
                    }
                }
                if let Err(e) = target.refresh().await {
                    warn!("Background refresh failed: {}", e);
                }
            }
        });

        SchedulerHandle {
            visible,
            task: Some(task),
        }
    }
}

/// Controls a running [`PollingScheduler`] loop
#[derive(Debug)]
pub struct SchedulerHandle {
    visible: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// The host became visible again: refresh now
    pub fn notify_visible(&self) {
        self.visible.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Refresh loop stopped");
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
