use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thingshare_domain::{
    BatchRepository, BatchState, CreateBatchInput, DomainResult, PageOptions, ProvisioningBatch,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory implementation of BatchRepository using HashMap.
///
/// Batches are kept after reaching a terminal state as an audit record;
/// removal is an explicit caller decision.
pub struct InMemoryBatchRepository {
    batches: Arc<RwLock<HashMap<String, ProvisioningBatch>>>,
}

impl InMemoryBatchRepository {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryBatchRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchRepository {
    async fn create_batch(&self, input: CreateBatchInput) -> DomainResult<ProvisioningBatch> {
        let batch = ProvisioningBatch {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            target_url: input.target_url,
            source_files: input.source_files,
            state: BatchState::InProgress,
            created: 0,
            existing: 0,
            failed: 0,
            retries_remaining: input.retries,
            requests: input.requests,
            created_at: Some(Utc::now()),
            updated_at: None,
        };

        let mut batches = self.batches.write().await;
        batches.insert(batch.id.clone(), batch.clone());
        Ok(batch)
    }

    async fn get_batch(&self, batch_id: &str) -> DomainResult<Option<ProvisioningBatch>> {
        let batches = self.batches.read().await;
        Ok(batches.get(batch_id).cloned())
    }

    async fn update_batch(&self, batch: ProvisioningBatch) -> DomainResult<()> {
        let mut batches = self.batches.write().await;
        batches.insert(batch.id.clone(), batch);
        Ok(())
    }

    async fn delete_batch(&self, batch_id: &str) -> DomainResult<()> {
        let mut batches = self.batches.write().await;
        batches.remove(batch_id);
        Ok(())
    }

    async fn list_batches(&self, options: PageOptions) -> DomainResult<Vec<ProvisioningBatch>> {
        let batches = self.batches.read().await;
        let mut all: Vec<ProvisioningBatch> = batches.values().cloned().collect();
        all.sort_by_key(|b| b.created_at);
        Ok(all
            .into_iter()
            .skip(options.offset)
            .take(options.limit)
            .collect())
    }
}
