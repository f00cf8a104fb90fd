//! Email template repository

use async_trait::async_trait;
use outreach_common::types::TemplateId;
use outreach_common::{Error, Result};
use uuid::Uuid;

use crate::db::DatabasePool;
use crate::models::{CreateEmailTemplate, EmailTemplate};

/// Email template repository trait
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn create(&self, input: CreateEmailTemplate) -> Result<EmailTemplate>;
    async fn get(&self, id: TemplateId) -> Result<Option<EmailTemplate>>;
    async fn delete(&self, id: TemplateId) -> Result<bool>;
}

/// Database email template repository
pub struct DbTemplateRepository {
    pool: DatabasePool,
}

impl DbTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for DbTemplateRepository {
    async fn create(&self, input: CreateEmailTemplate) -> Result<EmailTemplate> {
        let id = Uuid::now_v7();
        let now = chrono::Utc::now();

        sqlx::query_as::<_, EmailTemplate>(
            r#"
            INSERT INTO email_templates (
                id, name, subject, html_content, plain_content, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, true, $6, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.html_content)
        .bind(&input.plain_content)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: TemplateId) -> Result<Option<EmailTemplate>> {
        sqlx::query_as::<_, EmailTemplate>("SELECT * FROM email_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn delete(&self, id: TemplateId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM email_templates WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
