use crate::domain::{ObservationRouter, RouterStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thingshare_domain::DomainResult;
use tokio::sync::RwLock;

/// In-memory implementation of RouterStore using HashMap
pub struct InMemoryRouterStore {
    routers: Arc<RwLock<HashMap<String, ObservationRouter>>>,
}

impl InMemoryRouterStore {
    pub fn new() -> Self {
        Self {
            routers: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryRouterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouterStore for InMemoryRouterStore {
    async fn upsert(&self, agreement_id: String, router: ObservationRouter) -> DomainResult<()> {
        let mut routers = self.routers.write().await;
        routers.insert(agreement_id, router);
        Ok(())
    }

    async fn remove(&self, agreement_id: &str) -> DomainResult<Option<ObservationRouter>> {
        let mut routers = self.routers.write().await;
        Ok(routers.remove(agreement_id))
    }

    async fn list_agreement_ids(&self) -> DomainResult<Vec<String>> {
        let routers = self.routers.read().await;
        Ok(routers.keys().cloned().collect())
    }

    async fn exists(&self, agreement_id: &str) -> DomainResult<bool> {
        let routers = self.routers.read().await;
        Ok(routers.contains_key(agreement_id))
    }

    async fn count(&self) -> DomainResult<usize> {
        let routers = self.routers.read().await;
        Ok(routers.len())
    }
}
