use crate::mqtt::{datastream_from_topic, observation_topic};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thingshare_domain::{
    AgreementRepository, BrokerConnection, BrokerRegistry, DomainResult, MessageHandler,
    Observation, ObservationForwarder, SharingAgreement, SubscriptionId,
};
use tracing::{debug, info, instrument, warn};

/// Routes one agreement's observation telemetry: subscribes to every covered
/// datastream on the producer's broker, keeps per-datastream delivery metrics,
/// and forwards each message to the agreement's consumers.
pub struct ObservationRouter {
    agreement_id: String,
    connection: Arc<dyn BrokerConnection>,
    subscriptions: Vec<SubscriptionId>,
}

impl ObservationRouter {
    #[instrument(
        skip_all,
        fields(agreement_id = %agreement.id, producer = %agreement.producer_mqtt_url)
    )]
    pub async fn start(
        agreement: &SharingAgreement,
        registry: Arc<dyn BrokerRegistry>,
        repository: Arc<dyn AgreementRepository>,
        forwarder: Arc<dyn ObservationForwarder>,
    ) -> DomainResult<ObservationRouter> {
        let connection = registry.connection(&agreement.producer_mqtt_url).await?;

        let handler = Arc::new(ObservationMessageHandler {
            agreement_id: agreement.id.clone(),
            repository,
            forwarder,
        });

        let mut subscriptions = Vec::with_capacity(agreement.datastreams.len());
        for metric in &agreement.datastreams {
            let topic = observation_topic(&metric.name);
            let id = connection
                .subscribe(&topic, Arc::clone(&handler) as Arc<dyn MessageHandler>)
                .await?;
            subscriptions.push(id);
        }

        info!(
            datastream_count = subscriptions.len(),
            "started observation router"
        );
        Ok(ObservationRouter {
            agreement_id: agreement.id.clone(),
            connection,
            subscriptions,
        })
    }

    pub fn agreement_id(&self) -> &str {
        &self.agreement_id
    }

    /// Unsubscribe every datastream topic and release the connection.
    #[instrument(skip(self), fields(agreement_id = %self.agreement_id))]
    pub async fn stop(self) -> DomainResult<()> {
        for id in &self.subscriptions {
            self.connection.unsubscribe(*id).await?;
        }
        info!("stopped observation router");
        Ok(())
    }
}

/// Per-message work: derive the datastream, forward the raw payload, and
/// record delivery metrics. Every failure is logged and dropped; nothing may
/// propagate into the broker's delivery loop.
pub(crate) struct ObservationMessageHandler {
    pub(crate) agreement_id: String,
    pub(crate) repository: Arc<dyn AgreementRepository>,
    pub(crate) forwarder: Arc<dyn ObservationForwarder>,
}

#[async_trait]
impl MessageHandler for ObservationMessageHandler {
    async fn handle(&self, topic: &str, payload: &[u8]) {
        let Some(datastream) = datastream_from_topic(topic) else {
            warn!(
                agreement_id = %self.agreement_id,
                topic = %topic,
                "message on unexpected topic, dropping"
            );
            return;
        };

        let observation: Observation = match serde_json::from_slice(payload) {
            Ok(observation) => observation,
            Err(e) => {
                warn!(
                    agreement_id = %self.agreement_id,
                    datastream = %datastream,
                    error = %e,
                    "malformed observation, dropping"
                );
                return;
            }
        };

        // Best-effort delivery: forward even if metric bookkeeping fails.
        if let Err(e) = self.forwarder.forward(&self.agreement_id, payload).await {
            warn!(
                agreement_id = %self.agreement_id,
                error = %e,
                "failed to forward observation to consumers"
            );
        }

        match self
            .repository
            .record_observation(
                &self.agreement_id,
                datastream,
                observation.phenomenon_time,
                Utc::now(),
            )
            .await
        {
            Ok(metric) => {
                debug!(
                    agreement_id = %self.agreement_id,
                    datastream = %datastream,
                    observation_count = metric.observation_count,
                    "recorded observation"
                );
            }
            Err(e) => {
                warn!(
                    agreement_id = %self.agreement_id,
                    datastream = %datastream,
                    error = %e,
                    "failed to record observation metrics, dropping"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thingshare_domain::{
        AgreementState, CreateAgreementInput, DatastreamMetric, MockBrokerConnection,
        MockBrokerRegistry, MockObservationForwarder,
    };
    use thingshare_store::InMemoryAgreementRepository;

    fn agreement(datastreams: &[&str]) -> SharingAgreement {
        SharingAgreement {
            id: "agr-1".to_string(),
            name: "wx-share".to_string(),
            producer_mqtt_url: "mqtt://producer:1883".to_string(),
            consumers: vec!["acme".to_string()],
            datastreams: datastreams
                .iter()
                .map(|name| DatastreamMetric::new(*name))
                .collect(),
            state: AgreementState::Active,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    fn noop_forwarder() -> Arc<dyn ObservationForwarder> {
        let mut forwarder = MockObservationForwarder::new();
        forwarder.expect_forward().returning(|_, _| Ok(()));
        Arc::new(forwarder)
    }

    async fn seeded_repository() -> (Arc<InMemoryAgreementRepository>, String) {
        let repository = Arc::new(InMemoryAgreementRepository::new());
        let agreement = repository
            .create_agreement(CreateAgreementInput {
                name: "wx-share".to_string(),
                producer_mqtt_url: "mqtt://producer:1883".to_string(),
                consumers: vec!["acme".to_string()],
                datastream_names: vec!["DS-1".to_string()],
            })
            .await
            .unwrap();
        (repository, agreement.id)
    }

    #[tokio::test]
    async fn test_start_subscribes_every_datastream() {
        let mut connection = MockBrokerConnection::new();
        connection
            .expect_subscribe()
            .withf(|topic, _| topic == "DS-1/Observations")
            .times(1)
            .returning(|_, _| Ok(SubscriptionId(1)));
        connection
            .expect_subscribe()
            .withf(|topic, _| topic == "DS-2/Observations")
            .times(1)
            .returning(|_, _| Ok(SubscriptionId(2)));
        let connection: Arc<dyn BrokerConnection> = Arc::new(connection);

        let mut registry = MockBrokerRegistry::new();
        registry
            .expect_connection()
            .withf(|url| url == "mqtt://producer:1883")
            .times(1)
            .returning(move |_| Ok(Arc::clone(&connection)));

        let router = ObservationRouter::start(
            &agreement(&["DS-1", "DS-2"]),
            Arc::new(registry),
            Arc::new(InMemoryAgreementRepository::new()),
            noop_forwarder(),
        )
        .await
        .unwrap();
        assert_eq!(router.agreement_id(), "agr-1");
    }

    #[tokio::test]
    async fn test_stop_unsubscribes_every_topic() {
        let mut connection = MockBrokerConnection::new();
        connection
            .expect_subscribe()
            .returning(|_, _| Ok(SubscriptionId(7)));
        connection
            .expect_unsubscribe()
            .withf(|id| *id == SubscriptionId(7))
            .times(2)
            .returning(|_| Ok(()));
        let connection: Arc<dyn BrokerConnection> = Arc::new(connection);

        let mut registry = MockBrokerRegistry::new();
        registry
            .expect_connection()
            .returning(move |_| Ok(Arc::clone(&connection)));

        let router = ObservationRouter::start(
            &agreement(&["DS-1", "DS-2"]),
            Arc::new(registry),
            Arc::new(InMemoryAgreementRepository::new()),
            noop_forwarder(),
        )
        .await
        .unwrap();
        router.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_out_of_order_messages_keep_monotonic_watermark() {
        let (repository, agreement_id) = seeded_repository().await;
        let handler = ObservationMessageHandler {
            agreement_id: agreement_id.clone(),
            repository: Arc::clone(&repository) as Arc<dyn AgreementRepository>,
            forwarder: noop_forwarder(),
        };

        handler
            .handle(
                "DS-1/Observations",
                br#"{"phenomenonTime": "2024-05-01T10:00:00Z", "result": 1}"#,
            )
            .await;
        handler
            .handle(
                "DS-1/Observations",
                br#"{"phenomenonTime": "2024-05-01T09:00:00Z", "result": 2}"#,
            )
            .await;

        let agreement = repository
            .get_agreement(&agreement_id)
            .await
            .unwrap()
            .unwrap();
        let metric = &agreement.datastreams[0];
        assert_eq!(metric.observation_count, 2);
        assert_eq!(
            metric.last_phenomenon_time.unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped_without_forwarding() {
        let (repository, agreement_id) = seeded_repository().await;
        let mut forwarder = MockObservationForwarder::new();
        forwarder.expect_forward().times(0);

        let handler = ObservationMessageHandler {
            agreement_id: agreement_id.clone(),
            repository: Arc::clone(&repository) as Arc<dyn AgreementRepository>,
            forwarder: Arc::new(forwarder),
        };

        handler.handle("DS-1/Observations", b"not json").await;

        let agreement = repository
            .get_agreement(&agreement_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agreement.datastreams[0].observation_count, 0);
    }

    #[tokio::test]
    async fn test_unexpected_topic_is_dropped() {
        let (repository, agreement_id) = seeded_repository().await;
        let mut forwarder = MockObservationForwarder::new();
        forwarder.expect_forward().times(0);

        let handler = ObservationMessageHandler {
            agreement_id,
            repository: Arc::clone(&repository) as Arc<dyn AgreementRepository>,
            forwarder: Arc::new(forwarder),
        };

        handler.handle("DS-1/Things", b"{}").await;
    }

    #[tokio::test]
    async fn test_forwarding_survives_metric_failure() {
        let (repository, agreement_id) = seeded_repository().await;
        let mut forwarder = MockObservationForwarder::new();
        forwarder.expect_forward().times(1).returning(|_, _| Ok(()));

        let handler = ObservationMessageHandler {
            agreement_id,
            repository: Arc::clone(&repository) as Arc<dyn AgreementRepository>,
            forwarder: Arc::new(forwarder),
        };

        // DS-9 is not part of the agreement: metrics fail, delivery happens.
        handler.handle("DS-9/Observations", br#"{"result": 1}"#).await;
    }
}
