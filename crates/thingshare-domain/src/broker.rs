use crate::error::DomainResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Identifies one subscription on one broker connection, for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked for every message delivered on a subscribed topic.
///
/// Handlers must never panic and never block the delivery loop on unrelated
/// work; per-message failures are theirs to log and drop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, topic: &str, payload: &[u8]);
}

/// One persistent connection to a message broker.
///
/// Subscriptions survive reconnects: the connection replays every active
/// topic subscription after re-establishing the session.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> DomainResult<SubscriptionId>;

    async fn unsubscribe(&self, id: SubscriptionId) -> DomainResult<()>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> DomainResult<()>;

    fn is_connected(&self) -> bool;
}

/// Hands out one shared connection per broker URL.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BrokerRegistry: Send + Sync {
    async fn connection(&self, url: &str) -> DomainResult<Arc<dyn BrokerConnection>>;
}
