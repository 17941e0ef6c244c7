use crate::domain::ObservationRouter;
use async_trait::async_trait;
use thingshare_domain::DomainResult;

/// Trait for storing the running observation router per agreement.
#[async_trait]
pub trait RouterStore: Send + Sync {
    /// Insert or replace the router for an agreement.
    async fn upsert(&self, agreement_id: String, router: ObservationRouter) -> DomainResult<()>;

    /// Remove and return the router for an agreement.
    async fn remove(&self, agreement_id: &str) -> DomainResult<Option<ObservationRouter>>;

    /// List all agreement IDs with a running router.
    async fn list_agreement_ids(&self) -> DomainResult<Vec<String>>;

    /// Check whether an agreement has a running router.
    async fn exists(&self, agreement_id: &str) -> DomainResult<bool>;

    /// Count running routers.
    async fn count(&self) -> DomainResult<usize>;
}
