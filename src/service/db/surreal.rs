//! SurrealDB implementation for bot data storage.
//!
//! The same embedded database handle also backs the knowledge base vector index.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use surrealdb::{
    Surreal,
    engine::local::{Db, Mem, SurrealKv},
};
use tracing::{info, instrument};

use crate::base::types::{Res, Void};

use super::{DbClient, GenericDbClient, UserPreference};

const NAMESPACE: &str = "oncall";
const DATABASE: &str = "bot";
/// Table holding per-user model preferences; shares the database with the vector index.
pub const PREFERENCE_TABLE: &str = "user_preference";

// Connections.

/// Open (or create) the on-disk database at `path`.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn open_surreal_kv(path: &Path) -> Res<Surreal<Db>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Surreal::new::<SurrealKv>(path.to_string_lossy().as_ref()).await?;
    db.use_ns(NAMESPACE).use_db(DATABASE).await?;

    info!("Database opened successfully.");

    Ok(db)
}

/// Open a throwaway in-memory database.
pub async fn open_surreal_memory() -> Res<Surreal<Db>> {
    let db = Surreal::new::<Mem>(()).await?;
    db.use_ns(NAMESPACE).use_db(DATABASE).await?;

    Ok(db)
}

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Create a database client over an already-opened handle.
    pub fn surreal(db: Surreal<Db>) -> Self {
        Self::new(Arc::new(SurrealDbClient { db }))
    }

    /// Create a database client over a fresh in-memory database.
    pub async fn surreal_memory() -> Res<Self> {
        Ok(Self::surreal(open_surreal_memory().await?))
    }
}

// Specific implementations.

/// SurrealDB database client implementation.
pub struct SurrealDbClient {
    db: Surreal<Db>,
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(name = "SurrealDbClient::get_user_preference", skip(self))]
    async fn get_user_preference(&self, user_id: &str) -> Res<Option<UserPreference>> {
        let preference: Option<UserPreference> = self.db.select((PREFERENCE_TABLE, user_id)).await?;

        Ok(preference)
    }

    #[instrument(name = "SurrealDbClient::set_user_preference", skip(self))]
    async fn set_user_preference(&self, user_id: &str, preference: &UserPreference) -> Void {
        let _: Option<UserPreference> = self.db.upsert((PREFERENCE_TABLE, user_id)).content(preference.clone()).await?;

        info!("Stored preference `{}/{}` for user `{user_id}`.", preference.provider, preference.model);

        Ok(())
    }
}

// Tests.
