use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thingshare_domain::{
    DomainError, DomainResult, GatewayRegistry, PageOptions, ResourceType, SensorThingsGateway,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Page size for exact-name collection scans.
const SEARCH_PAGE_SIZE: usize = 20;

/// HTTP client for one SensorThings endpoint, rooted at `{url}/{version}`.
pub struct SensorThingsHttp {
    url: String,
    client: reqwest::Client,
}

impl SensorThingsHttp {
    pub fn new(url: &str) -> Self {
        Self::with_version(url, "v1.0")
    }

    pub fn with_version(url: &str, version: &str) -> Self {
        Self {
            url: format!("{}/{}", url.trim_end_matches('/'), version),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get_json(&self, url: &str) -> DomainResult<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DomainError::EndpointError(anyhow!("GET {} failed: {}", url, e)))?
            .error_for_status()
            .map_err(|e| DomainError::EndpointError(anyhow!("GET {} failed: {}", url, e)))?;

        response
            .json()
            .await
            .map_err(|e| DomainError::EndpointError(anyhow!("GET {}: invalid JSON: {}", url, e)))
    }
}

#[async_trait]
impl SensorThingsGateway for SensorThingsHttp {
    async fn get(&self, path: &str) -> DomainResult<serde_json::Value> {
        let url = if path.is_empty() {
            self.url.clone()
        } else {
            format!("{}/{}", self.url, path)
        };
        self.get_json(&url).await
    }

    async fn list(
        &self,
        resource: ResourceType,
        options: PageOptions,
    ) -> DomainResult<Vec<serde_json::Value>> {
        let url = format!(
            "{}/{}?$top={}&$skip={}",
            self.url,
            resource.collection(),
            options.limit,
            options.offset
        );
        debug!(url = %url, "listing SensorThings collection");

        let document = self.get_json(&url).await?;
        match document.get("value") {
            Some(serde_json::Value::Array(items)) => Ok(items.clone()),
            _ => Err(DomainError::EndpointError(anyhow!(
                "Unexpected SensorThings response shape from {}",
                url
            ))),
        }
    }

    async fn search(
        &self,
        name: &str,
        resource: ResourceType,
    ) -> DomainResult<Option<serde_json::Value>> {
        let mut offset = 0;

        loop {
            let items = self
                .list(resource, PageOptions::new(offset, SEARCH_PAGE_SIZE))
                .await?;

            for item in &items {
                if item.get("name").and_then(|v| v.as_str()) == Some(name) {
                    return Ok(Some(item.clone()));
                }
            }

            // A short page means the collection is exhausted.
            if items.len() < SEARCH_PAGE_SIZE {
                return Ok(None);
            }
            offset += SEARCH_PAGE_SIZE;
        }
    }

    async fn create(
        &self,
        resource: ResourceType,
        payload: serde_json::Value,
    ) -> DomainResult<serde_json::Value> {
        let url = format!("{}/{}", self.url, resource.collection());
        debug!(url = %url, "creating SensorThings entity");

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DomainError::EndpointError(anyhow!("POST {} failed: {}", url, e)))?
            .error_for_status()
            .map_err(|e| DomainError::EndpointError(anyhow!("POST {} failed: {}", url, e)))?;

        // Some SensorThings servers return the created entity, others only a
        // Location header with an empty body.
        let body = response
            .text()
            .await
            .map_err(|e| DomainError::EndpointError(anyhow!("POST {}: {}", url, e)))?;
        if body.trim().is_empty() {
            return Ok(payload);
        }
        serde_json::from_str(&body)
            .map_err(|e| DomainError::EndpointError(anyhow!("POST {}: invalid JSON: {}", url, e)))
    }
}

/// Explicit per-URL gateway registry; one shared client per endpoint.
pub struct HttpGatewayRegistry {
    gateways: Mutex<HashMap<String, Arc<SensorThingsHttp>>>,
}

impl HttpGatewayRegistry {
    pub fn new() -> Self {
        Self {
            gateways: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for HttpGatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayRegistry for HttpGatewayRegistry {
    async fn gateway(&self, url: &str) -> DomainResult<Arc<dyn SensorThingsGateway>> {
        let mut gateways = self.gateways.lock().await;
        let gateway = gateways
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(SensorThingsHttp::new(url)));
        Ok(Arc::clone(gateway) as Arc<dyn SensorThingsGateway>)
    }
}
