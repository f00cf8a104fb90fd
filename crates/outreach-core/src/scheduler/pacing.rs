//! Inter-send pacing
//!
//! Sends within one campaign batch are separated by a random delay drawn
//! uniformly from a configured range. The delay itself goes through [`Pacer`]
//! so tests can observe it without waiting.

use async_trait::async_trait;
use outreach_common::config::SchedulerConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

/// Uniform random delay between `min` and `max`, inclusive
pub struct DelayPolicy {
    min: Duration,
    max: Duration,
    rng: Mutex<StdRng>,
}

impl DelayPolicy {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    pub fn with_rng(min: Duration, max: Duration, rng: StdRng) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.min_delay_secs),
            Duration::from_secs(config.max_delay_secs),
        )
    }

    pub fn range(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    /// Draw the next delay
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }

        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        let millis = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(min..=max),
            Err(poisoned) => poisoned.into_inner().gen_range(min..=max),
        };
        Duration::from_millis(millis)
    }
}

/// Waits between sends
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Returns immediately and remembers every requested delay
#[derive(Debug, Default)]
pub struct InstantPacer {
    delays: Mutex<Vec<Duration>>,
}

impl InstantPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Pacer for InstantPacer {
    async fn pause(&self, delay: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
    }
}
