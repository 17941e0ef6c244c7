use anyhow::anyhow;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thingshare_domain::{
    BrokerConnection, BrokerRegistry, DomainError, DomainResult, MessageHandler, SubscriptionId,
};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CHANNEL_CAPACITY: usize = 100;

struct Subscription {
    topic: String,
    handler: Arc<dyn MessageHandler>,
}

/// One persistent MQTT connection, shared by every subscriber pointed at the
/// same broker URL.
///
/// A spawned task drives the rumqttc event loop: incoming publishes are
/// dispatched to the handlers registered for that exact topic, and every
/// active topic subscription is replayed when the session is re-established
/// after a connection loss.
pub struct MqttConnection {
    url: String,
    client: AsyncClient,
    subscriptions: RwLock<HashMap<u64, Subscription>>,
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl MqttConnection {
    pub fn connect(url: &str, shutdown_token: CancellationToken) -> DomainResult<Arc<Self>> {
        let (host, port) = parse_broker_url(url)?;

        let client_id = format!("thingshare-{}", Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let connection = Arc::new(Self {
            url: url.to_string(),
            client,
            subscriptions: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(run_event_loop(
            Arc::clone(&connection),
            eventloop,
            shutdown_token,
        ));

        Ok(connection)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn dispatch(&self, topic: &str, payload: &[u8]) {
        let handlers: Vec<Arc<dyn MessageHandler>> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .values()
                .filter(|s| s.topic == topic)
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in handlers {
            handler.handle(topic, payload).await;
        }
    }

    async fn replay_subscriptions(&self) {
        let topics: Vec<String> = {
            let subscriptions = self.subscriptions.read().await;
            let mut topics: Vec<String> =
                subscriptions.values().map(|s| s.topic.clone()).collect();
            topics.sort();
            topics.dedup();
            topics
        };

        for topic in topics {
            if let Err(e) = self.client.subscribe(&topic, QoS::AtLeastOnce).await {
                warn!(url = %self.url, topic = %topic, error = %e, "failed to replay subscription");
            } else {
                debug!(url = %self.url, topic = %topic, "replayed subscription");
            }
        }
    }
}

#[async_trait]
impl BrokerConnection for MqttConnection {
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> DomainResult<SubscriptionId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut subscriptions = self.subscriptions.write().await;
            subscriptions.insert(
                id,
                Subscription {
                    topic: topic.to_string(),
                    handler,
                },
            );
        }

        // Duplicate SUBSCRIBE packets are harmless; the ConnAck replay covers
        // sessions that are currently down.
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| {
                DomainError::EndpointError(anyhow!("subscribe to '{}' failed: {}", topic, e))
            })?;

        debug!(url = %self.url, topic = %topic, "subscribed");
        Ok(SubscriptionId(id))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> DomainResult<()> {
        let removed_topic = {
            let mut subscriptions = self.subscriptions.write().await;
            match subscriptions.remove(&id.0) {
                Some(subscription) => {
                    let topic = subscription.topic;
                    let still_used = subscriptions.values().any(|s| s.topic == topic);
                    if still_used {
                        None
                    } else {
                        Some(topic)
                    }
                }
                None => return Ok(()),
            }
        };

        if let Some(topic) = removed_topic {
            self.client.unsubscribe(&topic).await.map_err(|e| {
                DomainError::EndpointError(anyhow!("unsubscribe from '{}' failed: {}", topic, e))
            })?;
            debug!(url = %self.url, topic = %topic, "unsubscribed");
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> DomainResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| {
                DomainError::EndpointError(anyhow!("publish to '{}' failed: {}", topic, e))
            })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn run_event_loop(
    connection: Arc<MqttConnection>,
    mut eventloop: EventLoop,
    shutdown_token: CancellationToken,
) {
    info!(url = %connection.url, "starting MQTT connection loop");

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                debug!(url = %connection.url, "MQTT connection loop cancelled");
                let _ = connection.client.disconnect().await;
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(url = %connection.url, "connected to MQTT broker");
                        connection.connected.store(true, Ordering::SeqCst);
                        connection.replay_subscriptions().await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        connection.dispatch(&publish.topic, &publish.payload).await;
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!(url = %connection.url, "broker requested disconnect");
                        connection.connected.store(false, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        connection.connected.store(false, Ordering::SeqCst);
                        warn!(url = %connection.url, error = %e, "MQTT connection error, retrying");
                        tokio::select! {
                            _ = shutdown_token.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    info!(url = %connection.url, "MQTT connection loop stopped");
}

/// Parse a broker URL in the form mqtt://host:port, tcp://host:port or
/// host:port; the port defaults to 1883.
fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let trimmed = url.trim_start_matches("mqtt://").trim_start_matches("tcp://");

    let parts: Vec<&str> = trimmed.split(':').collect();
    match parts.len() {
        1 if !parts[0].is_empty() => Ok((parts[0], 1883)),
        2 => {
            let port = parts[1].parse::<u16>().map_err(|_| {
                DomainError::InvalidBrokerUrl(format!("invalid port in '{}'", url))
            })?;
            Ok((parts[0], port))
        }
        _ => Err(DomainError::InvalidBrokerUrl(url.to_string())),
    }
}

/// Explicit per-URL connection registry: one underlying broker connection per
/// distinct URL, shared across every router pointed at the same producer.
pub struct MqttBrokerRegistry {
    connections: Mutex<HashMap<String, Arc<MqttConnection>>>,
    shutdown_token: CancellationToken,
}

impl MqttBrokerRegistry {
    pub fn new(shutdown_token: CancellationToken) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            shutdown_token,
        }
    }
}

#[async_trait]
impl BrokerRegistry for MqttBrokerRegistry {
    async fn connection(&self, url: &str) -> DomainResult<Arc<dyn BrokerConnection>> {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(url) {
            return Ok(Arc::clone(existing) as Arc<dyn BrokerConnection>);
        }

        let connection = MqttConnection::connect(url, self.shutdown_token.child_token())?;
        connections.insert(url.to_string(), Arc::clone(&connection));
        Ok(connection as Arc<dyn BrokerConnection>)
    }
}
