use async_trait::async_trait;
use std::sync::Arc;
use thingshare_domain::{BrokerRegistry, DomainResult, ObservationForwarder};
use tracing::debug;

/// Forwards observations to an agreement's consumers by republishing to
/// `dsa/{agreement_id}` on the consumer-side broker.
pub struct MqttObservationForwarder {
    registry: Arc<dyn BrokerRegistry>,
    consumer_broker_url: String,
}

impl MqttObservationForwarder {
    pub fn new(registry: Arc<dyn BrokerRegistry>, consumer_broker_url: impl Into<String>) -> Self {
        Self {
            registry,
            consumer_broker_url: consumer_broker_url.into(),
        }
    }
}

#[async_trait]
impl ObservationForwarder for MqttObservationForwarder {
    async fn forward(&self, agreement_id: &str, payload: &[u8]) -> DomainResult<()> {
        let connection = self.registry.connection(&self.consumer_broker_url).await?;
        let topic = format!("dsa/{}", agreement_id);
        connection.publish(&topic, payload.to_vec()).await?;
        debug!(topic = %topic, "forwarded observation to consumers");
        Ok(())
    }
}
