// Swap scheduler - drives the orchestrator on a fixed interval
//
// - One tick at a time; a slow tick delays the next one instead of stacking
// - Shutdown is checked between ticks and, inside a tick, between swaps
// - Fatal errors end the loop and are returned to the caller

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::AppResult;
use crate::settlement::orchestrator::Orchestrator;

/// Swap schedule configuration
#[derive(Debug, Clone)]
pub struct SwapScheduleConfig {
    pub poll_interval: Duration,
}

impl Default for SwapScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

pub struct SwapScheduler {
    config: SwapScheduleConfig,
    orchestrator: Orchestrator,
    shutdown: watch::Receiver<bool>,
}

impl SwapScheduler {
    pub fn new(config: SwapScheduleConfig, orchestrator: Orchestrator, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            config,
            orchestrator,
            shutdown,
        }
    }

    /// Start the scheduler (runs in background)
    pub fn start(self) -> JoinHandle<AppResult<()>> {
        tokio::spawn(self.run())
    }

    /// Tick until shutdown is requested or a fatal error occurs
    pub async fn run(mut self) -> AppResult<()> {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "⏰ Swap scheduler running every {}s",
            self.config.poll_interval.as_secs_f32()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        // shutdown sender dropped
                        break;
                    }
                }
            }

            if *self.shutdown.borrow() {
                break;
            }

            debug!("🔄 Starting swap tick");
            match self.orchestrator.tick().await {
                Ok(report) => {
                    if report.settled + report.failed + report.pending > 0 {
                        info!(
                            "✓ Tick completed: {} settled, {} failed, {} pending, {} discarded",
                            report.settled, report.failed, report.pending, report.discarded
                        );
                    }
                    if report.poll_failures > 0 {
                        warn!("⚠️  {} chains could not be polled this tick", report.poll_failures);
                    }
                    if report.interrupted {
                        debug!("Tick interrupted by shutdown");
                    }
                }
                Err(e) => {
                    error!("❌ Swap tick aborted: {}", e);
                    return Err(e);
                }
            }
        }

        info!("🛑 Swap scheduler stopped");
        Ok(())
    }
}
