//! Repository layer for data access

pub mod campaigns;
pub mod clients;
pub mod history;
pub mod recipients;
pub mod templates;

use std::sync::Arc;

use outreach_common::{Error, Result};

use crate::db::DatabasePool;
use crate::memory::MemoryStore;

// Re-export concrete repository implementations
pub use campaigns::DbCampaignRepository;
pub use clients::DbClientRepository;
pub use history::DbHistoryRepository;
pub use recipients::DbRecipientRepository;
pub use templates::DbTemplateRepository;

// Re-export repository traits
pub use campaigns::CampaignRepository;
pub use clients::ClientRepository;
pub use history::HistoryRepository;
pub use recipients::RecipientRepository;
pub use templates::TemplateRepository;

/// The full set of repositories the scheduler and API work against
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub recipients: Arc<dyn RecipientRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub history: Arc<dyn HistoryRepository>,
    database: Option<DatabasePool>,
}

impl Repositories {
    /// PostgreSQL-backed repositories
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            recipients: Arc::new(DbRecipientRepository::new(pool.clone())),
            clients: Arc::new(DbClientRepository::new(pool.clone())),
            templates: Arc::new(DbTemplateRepository::new(pool.clone())),
            history: Arc::new(DbHistoryRepository::new(pool.clone())),
            database: Some(pool),
        }
    }

    /// Repositories sharing one in-memory store
    pub fn in_memory(store: MemoryStore) -> Self {
        Self {
            campaigns: Arc::new(store.clone()),
            recipients: Arc::new(store.clone()),
            clients: Arc::new(store.clone()),
            templates: Arc::new(store.clone()),
            history: Arc::new(store),
            database: None,
        }
    }

    /// Check the backing store is reachable
    pub async fn health_check(&self) -> Result<()> {
        match &self.database {
            Some(db) => db.health_check().await,
            None => Ok(()),
        }
    }
}

/// Map a sqlx error, surfacing references to missing rows as validation failures
pub(crate) fn map_write_error(e: sqlx::Error) -> Error {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_foreign_key_violation() {
            return Error::Validation(format!("Unknown reference: {}", db_err.message()));
        }
    }
    Error::Database(e.to_string())
}
