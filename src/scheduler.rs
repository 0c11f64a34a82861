//! Background jobs: error rate monitoring, telemetry eviction and periodic
//! reports.
//!
//! Each job runs on its own tokio task and ticks at the interval configured
//! in [`SchedulerConfig`](crate::config::SchedulerConfig). The first tick
//! happens one interval after start. All jobs stop on
//! [`SchedulerHandle::shutdown`].

use crate::engine::ResilienceEngine;

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Broadcasts a stop signal to every background job.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Creates a new coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribes to the stop signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Sends the stop signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Returns the number of jobs still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts the background jobs of an engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Spawns the rate monitor, eviction and report jobs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(engine: Arc<ResilienceEngine>) -> SchedulerHandle {
        let shutdown = Shutdown::new();
        let intervals = engine.config().scheduler.clone();

        tracing::info!(
            rate_monitor_interval_ms = intervals.rate_monitor_interval.as_millis() as u64,
            eviction_interval_ms = intervals.eviction_interval.as_millis() as u64,
            report_interval_ms = intervals.report_interval.as_millis() as u64,
            "Background jobs starting"
        );

        let monitor = {
            let engine = Arc::clone(&engine);
            spawn_job(
                "rate_monitor",
                intervals.rate_monitor_interval,
                shutdown.subscribe(),
                move || {
                    engine.run_rate_monitor();
                    async {}
                },
            )
        };

        let eviction = {
            let engine = Arc::clone(&engine);
            spawn_job(
                "eviction",
                intervals.eviction_interval,
                shutdown.subscribe(),
                move || {
                    engine.evict_expired();
                    async {}
                },
            )
        };

        let reports = spawn_job(
            "report",
            intervals.report_interval,
            shutdown.subscribe(),
            move || {
                let engine = Arc::clone(&engine);
                async move {
                    if let Err(e) = engine.publish_periodic_report().await {
                        tracing::error!(error = %e, "Periodic report failed");
                    }
                }
            },
        );

        SchedulerHandle {
            shutdown,
            tasks: vec![monitor, eviction, reports],
        }
    }
}

fn spawn_job<F, Fut>(
    job: &'static str,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!(job, "Background job received shutdown signal");
                    break;
                }
            }
        }
    })
}

/// Handle to running background jobs.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Returns the number of jobs still running.
    pub fn running(&self) -> usize {
        self.shutdown.receiver_count()
    }

    /// Stops every job and waits for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Background job panicked");
            }
        }
        tracing::info!("Background jobs stopped");
    }
}
