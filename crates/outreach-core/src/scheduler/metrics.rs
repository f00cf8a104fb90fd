//! Prometheus metrics for the scheduler

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Scheduler counters and gauges, registered on their own registry
pub struct SchedulerMetrics {
    registry: Registry,
    pub emails: IntCounterVec,
    pub passes: IntCounterVec,
    pub pass_duration: Histogram,
    pub active_campaigns: IntGauge,
    pub claims_released: IntCounter,
}

impl SchedulerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("outreach".to_string()), None)?;

        let emails = IntCounterVec::new(
            Opts::new("emails_total", "Campaign emails by outcome"),
            &["outcome"],
        )?;
        let passes = IntCounterVec::new(
            Opts::new("queue_passes_total", "Queue passes by result"),
            &["result"],
        )?;
        let pass_duration = Histogram::with_opts(
            HistogramOpts::new("queue_pass_duration_seconds", "Wall time of one queue pass")
                .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        )?;
        let active_campaigns =
            IntGauge::new("active_campaigns", "Active campaigns seen by the last pass")?;
        let claims_released = IntCounter::new(
            "stale_claims_released_total",
            "Recipient claims returned to pending after timing out",
        )?;

        registry.register(Box::new(emails.clone()))?;
        registry.register(Box::new(passes.clone()))?;
        registry.register(Box::new(pass_duration.clone()))?;
        registry.register(Box::new(active_campaigns.clone()))?;
        registry.register(Box::new(claims_released.clone()))?;

        Ok(Self {
            registry,
            emails,
            passes,
            pass_duration,
            active_campaigns,
            claims_released,
        })
    }

    pub fn record_sent(&self) {
        self.emails.with_label_values(&["sent"]).inc();
    }

    pub fn record_failed(&self) {
        self.emails.with_label_values(&["failed"]).inc();
    }

    pub fn record_skipped(&self) {
        self.emails.with_label_values(&["skipped"]).inc();
    }

    pub fn record_pass(&self, result: &str) {
        self.passes.with_label_values(&[result]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = SchedulerMetrics::new().unwrap();
        metrics.record_sent();
        metrics.record_sent();
        metrics.record_failed();
        metrics.record_pass("ok");

        let text = metrics.render().unwrap();
        assert!(text.contains("outreach_emails_total{outcome=\"sent\"} 2"));
        assert!(text.contains("outreach_emails_total{outcome=\"failed\"} 1"));
        assert!(text.contains("outreach_queue_passes_total{result=\"ok\"} 1"));
    }
}
