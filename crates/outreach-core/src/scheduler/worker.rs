//! Background worker that runs queue passes on a fixed interval

use std::sync::Arc;

use outreach_common::config::SchedulerConfig;
use outreach_common::Error;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::processor::QueueProcessor;

/// Periodic queue pass driver
pub struct SchedulerWorker {
    processor: Arc<QueueProcessor>,
    /// Interval between passes (seconds)
    poll_interval_secs: u64,
}

impl SchedulerWorker {
    pub fn new(processor: Arc<QueueProcessor>) -> Self {
        Self {
            processor,
            poll_interval_secs: 300,
        }
    }

    pub fn from_config(processor: Arc<QueueProcessor>, config: &SchedulerConfig) -> Self {
        Self::new(processor).with_poll_interval(config.poll_interval_secs)
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs.max(1);
        self
    }

    /// Run the worker until the task is dropped
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.poll_interval_secs));
        // A pass can outlast the interval because of send pacing
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Campaign scheduler started (interval: {}s)",
            self.poll_interval_secs
        );

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// Run a single pass, logging the outcome
    pub async fn run_once(&self) {
        match self.processor.process_queue().await {
            Ok(result) if result.success => {
                if result.processed > 0 || result.errors > 0 {
                    info!(
                        processed = result.processed,
                        errors = result.errors,
                        "{}",
                        result.message
                    );
                } else {
                    debug!("{}", result.message);
                }
            }
            Ok(result) => warn!("Queue pass did not run: {}", result.message),
            Err(Error::Conflict(msg)) => debug!("Skipping tick: {}", msg),
            Err(e) => error!("Error processing campaign queue: {}", e),
        }
    }
}
