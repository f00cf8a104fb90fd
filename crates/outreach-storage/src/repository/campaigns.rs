//! Campaign repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::{CampaignId, ClientId};
use outreach_common::{Error, Result};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::db::DatabasePool;
use crate::models::{
    Campaign, CampaignStatus, CreateCampaign, DEFAULT_DAILY_LIMIT, DEFAULT_SEND_END_HOUR,
    DEFAULT_SEND_START_HOUR,
};
use crate::repository::map_write_error;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Create a draft campaign together with its pending recipient rows
    async fn create(&self, input: CreateCampaign) -> Result<Campaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;
    async fn count_by_status(&self, status: CampaignStatus) -> Result<i64>;

    /// Move a campaign to `to` if it is currently in one of `from`.
    ///
    /// Sets `started_at` on the first move to active and `completed_at` on a move
    /// to stopped or completed. Returns `None` when the campaign does not exist or
    /// was not in an allowed state.
    async fn transition(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Campaign>>;

    async fn update_sent_count(&self, id: CampaignId, sent_count: i64) -> Result<()>;

    /// Delete all recipient rows and insert a fresh pending set
    async fn replace_recipients(&self, id: CampaignId, client_ids: &[ClientId]) -> Result<Campaign>;

    async fn delete(&self, id: CampaignId) -> Result<bool>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn insert_recipients(
        tx: &mut Transaction<'_, Postgres>,
        campaign_id: CampaignId,
        client_ids: &[ClientId],
    ) -> Result<i32> {
        if client_ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = client_ids.iter().map(|_| Uuid::now_v7()).collect();

        let inserted = sqlx::query(
            r#"
            INSERT INTO campaign_recipients (id, campaign_id, client_id, status)
            SELECT t.id, $1, t.client_id, 'pending'
            FROM UNNEST($2::uuid[], $3::uuid[]) AS t(id, client_id)
            ON CONFLICT (campaign_id, client_id) DO NOTHING
            "#,
        )
        .bind(campaign_id)
        .bind(&ids)
        .bind(client_ids)
        .execute(&mut **tx)
        .await
        .map_err(map_write_error)?;

        Ok(inserted.rows_affected() as i32)
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, name, template_id, status, daily_limit, send_start_hour, send_end_hour,
                total_recipients, sent_count, created_at
            )
            VALUES ($1, $2, $3, 'draft', $4, $5, $6, 0, 0, $7)
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.template_id)
        .bind(input.daily_limit.unwrap_or(DEFAULT_DAILY_LIMIT))
        .bind(input.send_start_hour.unwrap_or(DEFAULT_SEND_START_HOUR))
        .bind(input.send_end_hour.unwrap_or(DEFAULT_SEND_END_HOUR))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let total = Self::insert_recipients(&mut tx, id, &input.client_ids).await?;

        let campaign = sqlx::query_as::<_, Campaign>(
            "UPDATE campaigns SET total_recipients = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(total)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_by_status(&self, status: CampaignStatus) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM campaigns WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn transition(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $2,
                started_at = CASE WHEN $2 = 'active' THEN COALESCE(started_at, $4) ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('stopped', 'completed') THEN $4 ELSE completed_at END
            WHERE id = $1 AND status = ANY($3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(&from)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_sent_count(&self, id: CampaignId, sent_count: i64) -> Result<()> {
        sqlx::query("UPDATE campaigns SET sent_count = $2 WHERE id = $1")
            .bind(id)
            .bind(sent_count as i32)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn replace_recipients(&self, id: CampaignId, client_ids: &[ClientId]) -> Result<Campaign> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query("DELETE FROM campaign_recipients WHERE campaign_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let total = Self::insert_recipients(&mut tx, id, client_ids).await?;

        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET total_recipients = $2, sent_count = 0
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(total)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::NotFound(format!("Campaign {}", id)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(campaign)
    }

    async fn delete(&self, id: CampaignId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
