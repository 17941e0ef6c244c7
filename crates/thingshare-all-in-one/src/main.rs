mod config;
mod telemetry;

use config::ServiceConfig;
use provisioning_worker::provisioning_worker::{
    BatchSource, ProvisioningWorker, ProvisioningWorkerConfig, SubmitBatchInput,
};
use sharing_worker::domain::{AgreementLifecycleService, InMemoryRouterStore};
use sharing_worker::mqtt::MqttObservationForwarder;
use std::sync::Arc;
use std::time::Duration;
use telemetry::init_telemetry;
use thingshare_domain::{
    AgreementRepository, BatchRepository, BrokerRegistry, GatewayRegistry, ObservationForwarder,
    OrganizationDirectory,
};
use thingshare_runner::Runner;
use thingshare_sensorthings::{HttpGatewayRegistry, MqttBrokerRegistry};
use thingshare_store::{
    InMemoryAgreementRepository, InMemoryBatchRepository, InMemoryOrganizationDirectory,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&config.log_level) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!("Starting thingshare-all-in-one service");

    // Repositories
    let batch_repository: Arc<dyn BatchRepository> = Arc::new(InMemoryBatchRepository::new());
    let agreement_repository: Arc<dyn AgreementRepository> =
        Arc::new(InMemoryAgreementRepository::new());
    let organizations: Arc<dyn OrganizationDirectory> =
        Arc::new(InMemoryOrganizationDirectory::new());

    // Shared per-URL client registries
    let broker_shutdown_token = tokio_util::sync::CancellationToken::new();
    let gateway_registry: Arc<dyn GatewayRegistry> = Arc::new(HttpGatewayRegistry::new());
    let broker_registry: Arc<dyn BrokerRegistry> =
        Arc::new(MqttBrokerRegistry::new(broker_shutdown_token.clone()));

    let forwarder: Arc<dyn ObservationForwarder> = Arc::new(MqttObservationForwarder::new(
        Arc::clone(&broker_registry),
        config.consumer_mqtt_url.clone(),
    ));

    // Workers
    let worker_shutdown_token = tokio_util::sync::CancellationToken::new();
    let provisioning = Arc::new(ProvisioningWorker::new(
        Arc::clone(&batch_repository),
        Arc::clone(&gateway_registry),
        Arc::clone(&organizations),
        ProvisioningWorkerConfig {
            retry_delay: Duration::from_secs(config.batch_retry_delay_secs),
            batch_retries: config.batch_retries,
        },
        worker_shutdown_token.clone(),
    ));

    let sharing = Arc::new(AgreementLifecycleService::new(
        Arc::clone(&agreement_repository),
        Arc::new(InMemoryRouterStore::new()),
        Arc::clone(&broker_registry),
        forwarder,
    ));

    // Optional startup provisioning load
    let startup_files = config.load_file_list();
    if !startup_files.is_empty() && !config.load_target_url.is_empty() {
        match provisioning
            .submit_batch(SubmitBatchInput {
                name: config.load_name.clone(),
                target_url: config.load_target_url.clone(),
                source: BatchSource::Files(startup_files),
            })
            .await
        {
            Ok(batch) => info!(batch_id = %batch.id, "submitted startup provisioning batch"),
            Err(e) => error!(error = %e, "failed to submit startup provisioning batch"),
        }
    }

    let runner = Runner::new()
        .with_named_process("sharing_worker", {
            let sharing = Arc::clone(&sharing);
            move |ctx| async move {
                sharing.launch_agreements().await?;
                ctx.cancelled().await;
                sharing.shutdown().await?;
                Ok(())
            }
        })
        .with_named_process("provisioning_worker", {
            let provisioning = Arc::clone(&provisioning);
            move |ctx| async move {
                ctx.cancelled().await;
                provisioning.shutdown().await;
                Ok(())
            }
        })
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            worker_shutdown_token.cancel();
            broker_shutdown_token.cancel();
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    let exit = runner.run().await;
    std::process::exit(exit.code());
}
