//! Campaign send scheduler
//!
//! One queue pass walks every active campaign in turn. For each campaign it
//! checks the sending window and the daily cap, claims a small batch of pending
//! recipients, personalizes and sends each one with a randomized pause between
//! sends, then recomputes the campaign's counters and completes it once nothing
//! is left to send.

pub mod daily_cap;
pub mod dispatch;
pub mod lifecycle;
pub mod metrics;
pub mod pacing;
pub mod personalize;
pub mod processor;
pub mod window;
pub mod worker;

pub use dispatch::{DispatchFailure, DispatchOutcome};
pub use lifecycle::{CampaignActivity, CampaignDetail, CampaignError, CampaignManager};
pub use metrics::SchedulerMetrics;
pub use pacing::{DelayPolicy, InstantPacer, Pacer, TokioPacer};
pub use personalize::Personalizer;
pub use processor::QueueProcessor;
pub use window::is_within_window;
pub use worker::SchedulerWorker;

use outreach_common::types::CampaignId;
use serde::{Deserialize, Serialize};

/// Message when no sender could be built from configuration
pub const PROVIDER_NOT_CONFIGURED: &str = "Email provider not configured";

/// Message when a pass is requested while another is still running
pub const PASS_ALREADY_RUNNING: &str = "A queue pass is already running";

/// Per-campaign result of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignPassResult {
    pub id: CampaignId,
    pub name: String,
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one queue pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueResult {
    pub success: bool,
    pub processed: u32,
    pub errors: u32,
    pub campaigns: Vec<CampaignPassResult>,
    pub message: String,
}

impl QueueResult {
    fn empty(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            processed: 0,
            errors: 0,
            campaigns: Vec::new(),
            message: message.into(),
        }
    }

    pub fn unconfigured() -> Self {
        Self::empty(false, PROVIDER_NOT_CONFIGURED)
    }

    pub fn no_active_campaigns() -> Self {
        Self::empty(true, "No active campaigns")
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::empty(false, message)
    }

    pub(crate) fn summarize(&mut self) {
        self.message = format!(
            "Processed {} emails with {} errors",
            self.processed, self.errors
        );
    }
}

/// Snapshot of queue backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub active_campaigns: i64,
    pub pending_emails: i64,
    pub sent_today: i64,
}

#[cfg(test)]
pub(crate) mod testing;
