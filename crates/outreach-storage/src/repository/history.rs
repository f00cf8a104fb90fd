//! Email history repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::CampaignId;
use outreach_common::{Error, Result};
use uuid::Uuid;

use crate::db::DatabasePool;
use crate::models::{EmailHistoryRecord, NewEmailHistory};

/// Email history repository trait
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, input: NewEmailHistory) -> Result<EmailHistoryRecord>;

    /// Most recent records first
    async fn recent_for_campaign(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<EmailHistoryRecord>>;

    /// Records sent at or after `since`, across all campaigns
    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64>;
}

/// Database email history repository
pub struct DbHistoryRepository {
    pool: DatabasePool,
}

impl DbHistoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for DbHistoryRepository {
    async fn append(&self, input: NewEmailHistory) -> Result<EmailHistoryRecord> {
        sqlx::query_as::<_, EmailHistoryRecord>(
            r#"
            INSERT INTO email_history (
                id, client_id, campaign_id, template_id, subject, content_preview,
                provider_message_id, status, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'sent', $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.client_id)
        .bind(input.campaign_id)
        .bind(input.template_id)
        .bind(&input.subject)
        .bind(&input.content_preview)
        .bind(&input.provider_message_id)
        .bind(input.sent_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn recent_for_campaign(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<EmailHistoryRecord>> {
        sqlx::query_as::<_, EmailHistoryRecord>(
            r#"
            SELECT * FROM email_history
            WHERE campaign_id = $1
            ORDER BY sent_at DESC
            LIMIT $2
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM email_history WHERE sent_at >= $1")
            .bind(since)
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
