use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thingshare_domain::{DomainError, DomainResult, OrganizationDirectory};
use tokio::sync::RwLock;

/// In-memory implementation of OrganizationDirectory using HashMap.
///
/// Maps an organization reference to the entity files registered for it; the
/// real organization domain lives outside this system.
pub struct InMemoryOrganizationDirectory {
    files: Arc<RwLock<HashMap<String, Vec<PathBuf>>>>,
}

impl InMemoryOrganizationDirectory {
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, organization: impl Into<String>, files: Vec<PathBuf>) {
        let mut map = self.files.write().await;
        map.insert(organization.into(), files);
    }
}

impl Default for InMemoryOrganizationDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrganizationDirectory for InMemoryOrganizationDirectory {
    async fn data_load_files(&self, organization: &str) -> DomainResult<Vec<PathBuf>> {
        let map = self.files.read().await;
        map.get(organization)
            .cloned()
            .ok_or_else(|| DomainError::OrganizationNotFound(organization.to_string()))
    }
}
