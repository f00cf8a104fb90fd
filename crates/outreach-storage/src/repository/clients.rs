//! Client repository

use async_trait::async_trait;
use outreach_common::types::ClientId;
use outreach_common::{Error, Result};
use uuid::Uuid;

use crate::db::DatabasePool;
use crate::models::{Client, CreateClient};

/// Client repository trait
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, input: CreateClient) -> Result<Client>;
    async fn get(&self, id: ClientId) -> Result<Option<Client>>;
}

/// Database client repository
pub struct DbClientRepository {
    pool: DatabasePool,
}

impl DbClientRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for DbClientRepository {
    async fn create(&self, input: CreateClient) -> Result<Client> {
        let id = Uuid::now_v7();
        let now = chrono::Utc::now();

        sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (
                id, company_name, category, city, address, email, website, phone_primary,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9, $9)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.company_name)
        .bind(&input.category)
        .bind(&input.city)
        .bind(&input.address)
        .bind(&input.email)
        .bind(&input.website)
        .bind(&input.phone_primary)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: ClientId) -> Result<Option<Client>> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
