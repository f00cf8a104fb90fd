//! Outreach Core - campaign send scheduler and email providers
//!
//! This crate holds the queue pass that sends campaign emails in paced batches,
//! the campaign lifecycle operations, and the outbound email providers.

pub mod clock;
pub mod mailer;
pub mod scheduler;

pub use clock::{Clock, FixedClock, SystemClock};
pub use mailer::{build_sender, EmailSender, OutgoingEmail, SendOutcome};
pub use scheduler::{
    CampaignError, CampaignManager, QueueProcessor, QueueResult, QueueStatus, SchedulerMetrics,
    SchedulerWorker,
};
