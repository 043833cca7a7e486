//! Persistence of per-user settings.

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::base::types::{Res, Void};

pub mod surreal;

// Types.

/// The completion provider and model a user has selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub provider: String,
    pub model: String,
}

// Traits.

/// Generic database client trait that clients must implement.
///
/// Implementing this trait allows different database backends to be used with the bot.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Gets the stored preference for a user, if one was ever saved.
    async fn get_user_preference(&self, user_id: &str) -> Res<Option<UserPreference>>;

    /// Stores (or replaces) the preference for a user.
    async fn set_user_preference(&self, user_id: &str, preference: &UserPreference) -> Void;
}

// Structs.

/// Database client for the bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}
