use crate::domain::{ObservationRouter, RouterStore};
use std::sync::Arc;
use thingshare_domain::{
    AgreementRepository, BrokerRegistry, DomainResult, ObservationForwarder, SharingAgreement,
};
use tracing::{debug, error, info, instrument, warn};

/// Creates and tears down observation routers as sharing agreements come and
/// go: startup discovery of already-active agreements, one router per newly
/// created agreement, teardown on deactivation and shutdown.
pub struct AgreementLifecycleService {
    agreement_repository: Arc<dyn AgreementRepository>,
    router_store: Arc<dyn RouterStore>,
    broker_registry: Arc<dyn BrokerRegistry>,
    forwarder: Arc<dyn ObservationForwarder>,
}

impl AgreementLifecycleService {
    pub fn new(
        agreement_repository: Arc<dyn AgreementRepository>,
        router_store: Arc<dyn RouterStore>,
        broker_registry: Arc<dyn BrokerRegistry>,
        forwarder: Arc<dyn ObservationForwarder>,
    ) -> Self {
        Self {
            agreement_repository,
            router_store,
            broker_registry,
            forwarder,
        }
    }

    /// Discover active agreements at startup and start a router for each.
    #[instrument(skip(self))]
    pub async fn launch_agreements(&self) -> DomainResult<()> {
        let agreements = self.agreement_repository.list_active_agreements().await?;
        debug!("found {} active agreements to route", agreements.len());

        for agreement in agreements {
            if let Err(e) = self.start_router(&agreement).await {
                error!(
                    "failed to start router for agreement {}: {}",
                    agreement.id, e
                );
                // Continue starting other routers even if one fails
            }
        }

        Ok(())
    }

    /// Handle agreement created event
    #[instrument(skip(self, agreement), fields(agreement_id = %agreement.id))]
    pub async fn handle_agreement_created(
        &self,
        agreement: &SharingAgreement,
    ) -> DomainResult<()> {
        debug!("handling agreement created");
        self.start_router(agreement).await
    }

    /// Deactivate an agreement and tear down its router.
    #[instrument(skip(self), fields(agreement_id = %agreement_id))]
    pub async fn handle_agreement_deactivated(&self, agreement_id: &str) -> DomainResult<()> {
        debug!("handling agreement deactivated");
        self.agreement_repository
            .deactivate_agreement(agreement_id)
            .await?;
        self.stop_router(agreement_id).await
    }

    /// Stop every running router.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> DomainResult<()> {
        let agreement_ids = self.router_store.list_agreement_ids().await?;
        info!("stopping {} observation routers", agreement_ids.len());

        for agreement_id in agreement_ids {
            if let Err(e) = self.stop_router(&agreement_id).await {
                error!("failed to stop router for agreement {}: {}", agreement_id, e);
                // Continue stopping other routers
            }
        }

        debug!("agreement lifecycle shutdown complete");
        Ok(())
    }

    async fn start_router(&self, agreement: &SharingAgreement) -> DomainResult<()> {
        if self.router_store.exists(&agreement.id).await? {
            warn!(
                "router already exists for agreement {}, skipping",
                agreement.id
            );
            return Ok(());
        }

        let router = ObservationRouter::start(
            agreement,
            Arc::clone(&self.broker_registry),
            Arc::clone(&self.agreement_repository),
            Arc::clone(&self.forwarder),
        )
        .await?;

        self.router_store
            .upsert(agreement.id.clone(), router)
            .await?;
        info!("started observation router for agreement {}", agreement.id);
        Ok(())
    }

    async fn stop_router(&self, agreement_id: &str) -> DomainResult<()> {
        match self.router_store.remove(agreement_id).await? {
            Some(router) => {
                router.stop().await?;
                Ok(())
            }
            None => {
                warn!("no router found for agreement {}", agreement_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InMemoryRouterStore;
    use thingshare_domain::{
        BrokerConnection, CreateAgreementInput, MockBrokerConnection, MockBrokerRegistry,
        MockObservationForwarder, SubscriptionId,
    };
    use thingshare_store::InMemoryAgreementRepository;

    fn permissive_registry() -> Arc<MockBrokerRegistry> {
        let mut registry = MockBrokerRegistry::new();
        registry.expect_connection().returning(|_| {
            let mut connection = MockBrokerConnection::new();
            connection
                .expect_subscribe()
                .returning(|_, _| Ok(SubscriptionId(1)));
            connection.expect_unsubscribe().returning(|_| Ok(()));
            Ok(Arc::new(connection) as Arc<dyn BrokerConnection>)
        });
        Arc::new(registry)
    }

    fn noop_forwarder() -> Arc<dyn ObservationForwarder> {
        let mut forwarder = MockObservationForwarder::new();
        forwarder.expect_forward().returning(|_, _| Ok(()));
        Arc::new(forwarder)
    }

    fn agreement_input(name: &str) -> CreateAgreementInput {
        CreateAgreementInput {
            name: name.to_string(),
            producer_mqtt_url: "mqtt://producer:1883".to_string(),
            consumers: vec!["acme".to_string()],
            datastream_names: vec!["DS-1".to_string()],
        }
    }

    async fn service_with(
        repository: Arc<InMemoryAgreementRepository>,
    ) -> (AgreementLifecycleService, Arc<InMemoryRouterStore>) {
        let store = Arc::new(InMemoryRouterStore::new());
        let service = AgreementLifecycleService::new(
            repository as Arc<dyn AgreementRepository>,
            Arc::clone(&store) as Arc<dyn RouterStore>,
            permissive_registry(),
            noop_forwarder(),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_launch_starts_router_per_active_agreement() {
        let repository = Arc::new(InMemoryAgreementRepository::new());
        repository
            .create_agreement(agreement_input("share-1"))
            .await
            .unwrap();
        repository
            .create_agreement(agreement_input("share-2"))
            .await
            .unwrap();

        let (service, store) = service_with(Arc::clone(&repository)).await;
        service.launch_agreements().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_inactive_agreements_are_not_routed() {
        let repository = Arc::new(InMemoryAgreementRepository::new());
        let agreement = repository
            .create_agreement(agreement_input("share-1"))
            .await
            .unwrap();
        repository.deactivate_agreement(&agreement.id).await.unwrap();

        let (service, store) = service_with(Arc::clone(&repository)).await;
        service.launch_agreements().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handle_created_starts_router_once() {
        let repository = Arc::new(InMemoryAgreementRepository::new());
        let agreement = repository
            .create_agreement(agreement_input("share-1"))
            .await
            .unwrap();

        let (service, store) = service_with(Arc::clone(&repository)).await;
        service.handle_agreement_created(&agreement).await.unwrap();
        assert!(store.exists(&agreement.id).await.unwrap());

        // A duplicate create event does not start a second router.
        service.handle_agreement_created(&agreement).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deactivation_tears_down_router() {
        let repository = Arc::new(InMemoryAgreementRepository::new());
        let agreement = repository
            .create_agreement(agreement_input("share-1"))
            .await
            .unwrap();

        let (service, store) = service_with(Arc::clone(&repository)).await;
        service.handle_agreement_created(&agreement).await.unwrap();

        service
            .handle_agreement_deactivated(&agreement.id)
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(repository
            .list_active_agreements()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_router() {
        let repository = Arc::new(InMemoryAgreementRepository::new());
        repository
            .create_agreement(agreement_input("share-1"))
            .await
            .unwrap();
        repository
            .create_agreement(agreement_input("share-2"))
            .await
            .unwrap();

        let (service, store) = service_with(Arc::clone(&repository)).await;
        service.launch_agreements().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        service.shutdown().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
