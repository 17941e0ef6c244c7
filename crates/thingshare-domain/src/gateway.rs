use crate::error::DomainResult;
use crate::options::PageOptions;
use crate::resource::ResourceType;
use async_trait::async_trait;
use std::sync::Arc;

/// HTTP surface of a remote SensorThings endpoint.
///
/// Implementations live in the infrastructure layer (thingshare-sensorthings).
/// All operations are idempotent reads except `create`, which is an additive
/// write the remote tolerates concurrently.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SensorThingsGateway: Send + Sync {
    /// Fetch a raw document; an empty path fetches the service root.
    async fn get(&self, path: &str) -> DomainResult<serde_json::Value>;

    /// List one page of a collection, sorted by the remote's default order.
    async fn list(
        &self,
        resource: ResourceType,
        options: PageOptions,
    ) -> DomainResult<Vec<serde_json::Value>>;

    /// Scan a collection page by page for an exact `name` match.
    ///
    /// Returns `Ok(None)` on a clean miss (a page shorter than requested
    /// without a match); errors only on transport failure.
    async fn search(
        &self,
        name: &str,
        resource: ResourceType,
    ) -> DomainResult<Option<serde_json::Value>>;

    /// Create an entity, returning the remote's representation of it.
    async fn create(
        &self,
        resource: ResourceType,
        payload: serde_json::Value,
    ) -> DomainResult<serde_json::Value>;
}

/// Hands out one shared gateway per endpoint URL.
///
/// An explicit registry rather than ambient global state; callers hold the
/// returned `Arc` for as long as they need the endpoint.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GatewayRegistry: Send + Sync {
    async fn gateway(&self, url: &str) -> DomainResult<Arc<dyn SensorThingsGateway>>;
}
