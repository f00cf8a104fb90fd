//! Campaign recipient repository
//!
//! Recipient rows move `pending -> sending -> sent | failed | skipped`. The
//! `sending` state is a claim held by one scheduler pass: a row is claimed and
//! returned in the same statement, so two overlapping passes can never select
//! the same row. Terminal states never move back to pending.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::{CampaignId, RecipientId};
use outreach_common::{Error, Result};
use tracing::debug;

use crate::db::DatabasePool;
use crate::models::{CampaignRecipient, ClaimedRecipient, RecipientStatus, RecipientStatusCounts};

/// Recipient repository trait
#[async_trait]
pub trait RecipientRepository: Send + Sync {
    /// Claim up to `limit` pending recipients of a campaign, moving them to `sending`
    async fn claim_pending(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedRecipient>>;

    /// Returns false if the row was not in `sending`
    async fn mark_sent(&self, id: RecipientId, sent_at: DateTime<Utc>) -> Result<bool>;
    async fn mark_failed(&self, id: RecipientId, error: &str) -> Result<bool>;
    async fn mark_skipped(&self, id: RecipientId, reason: &str) -> Result<bool>;

    /// Return claims taken before `claimed_before` to pending
    async fn release_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<u64>;

    /// Return specific claimed rows to pending; rows no longer in `sending` are left alone
    async fn release_claims(&self, ids: &[RecipientId]) -> Result<u64>;

    async fn count_sent_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64>;
    async fn status_counts(&self, campaign_id: CampaignId) -> Result<RecipientStatusCounts>;

    /// Pending recipients across all campaigns
    async fn count_pending(&self) -> Result<i64>;

    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignRecipient>>;
}

/// Database recipient repository
pub struct DbRecipientRepository {
    pool: DatabasePool,
}

impl DbRecipientRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn finish(
        &self,
        id: RecipientId,
        status: RecipientStatus,
        sent_at: Option<DateTime<Utc>>,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients
            SET status = $2, sent_at = $3, error_message = $4, claimed_at = NULL
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(sent_at)
        .bind(error_message)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RecipientRepository for DbRecipientRepository {
    async fn claim_pending(
        &self,
        campaign_id: CampaignId,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedRecipient>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let claimed = sqlx::query_as::<_, ClaimedRecipient>(
            r#"
            WITH candidates AS (
                SELECT id FROM campaign_recipients
                WHERE campaign_id = $1 AND status = 'pending'
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            ),
            claimed AS (
                UPDATE campaign_recipients cr
                SET status = 'sending', claimed_at = $3
                FROM candidates
                WHERE cr.id = candidates.id
                RETURNING cr.id, cr.client_id
            )
            SELECT claimed.id AS recipient_id, c.*
            FROM claimed
            JOIN clients c ON c.id = claimed.client_id
            ORDER BY claimed.id
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        debug!(campaign_id = %campaign_id, count = claimed.len(), "Claimed recipients");
        Ok(claimed)
    }

    async fn mark_sent(&self, id: RecipientId, sent_at: DateTime<Utc>) -> Result<bool> {
        self.finish(id, RecipientStatus::Sent, Some(sent_at), None).await
    }

    async fn mark_failed(&self, id: RecipientId, error: &str) -> Result<bool> {
        self.finish(id, RecipientStatus::Failed, None, Some(error)).await
    }

    async fn mark_skipped(&self, id: RecipientId, reason: &str) -> Result<bool> {
        self.finish(id, RecipientStatus::Skipped, None, Some(reason)).await
    }

    async fn release_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients
            SET status = 'pending', claimed_at = NULL
            WHERE status = 'sending' AND claimed_at < $1
            "#,
        )
        .bind(claimed_before)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn release_claims(&self, ids: &[RecipientId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients
            SET status = 'pending', claimed_at = NULL
            WHERE id = ANY($1) AND status = 'sending'
            "#,
        )
        .bind(ids)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count_sent_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM campaign_recipients
            WHERE campaign_id = $1 AND status = 'sent' AND sent_at >= $2
            "#,
        )
        .bind(campaign_id)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn status_counts(&self, campaign_id: CampaignId) -> Result<RecipientStatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM campaign_recipients
            WHERE campaign_id = $1
            GROUP BY status
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let mut counts = RecipientStatusCounts::default();
        for (status, count) in rows {
            let status: RecipientStatus = status.parse().map_err(Error::Internal)?;
            counts.add(status, count);
        }
        Ok(counts)
    }

    async fn count_pending(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM campaign_recipients WHERE status = 'pending'",
        )
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignRecipient>> {
        sqlx::query_as::<_, CampaignRecipient>(
            "SELECT * FROM campaign_recipients WHERE campaign_id = $1 ORDER BY id",
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
