//! Customer profile lookup and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CustomerId, UserId};

use crate::error::DependencyError;

/// Resolves an authenticated user to their customer profile.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn customer_profile(&self, user_id: UserId)
    -> Result<Option<CustomerId>, DependencyError>;
}

#[derive(Debug, Default)]
struct InMemoryProfileState {
    customers: HashMap<UserId, CustomerId>,
    unavailable: bool,
}

/// In-memory profile directory for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileDirectory {
    state: Arc<RwLock<InMemoryProfileState>>,
}

impl InMemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a customer profile for `user_id`, returning the existing one if present.
    pub fn register(&self, user_id: UserId) -> CustomerId {
        *self
            .state
            .write()
            .unwrap()
            .customers
            .entry(user_id)
            .or_default()
    }

    /// Links `user_id` to a known customer profile.
    pub fn insert(&self, user_id: UserId, customer_id: CustomerId) {
        self.state
            .write()
            .unwrap()
            .customers
            .insert(user_id, customer_id);
    }

    /// Makes every lookup fail as if the directory were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryProfileDirectory {
    async fn customer_profile(
        &self,
        user_id: UserId,
    ) -> Result<Option<CustomerId>, DependencyError> {
        let state = self.state.read().unwrap();
        if state.unavailable {
            return Err(DependencyError::new("profile directory", "not reachable"));
        }
        Ok(state.customers.get(&user_id).copied())
    }
}
