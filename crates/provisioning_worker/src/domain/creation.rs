use chrono::{DateTime, Utc};
use std::sync::Arc;
use thingshare_domain::{
    CreationOutcome, DomainResult, EntityCreationRequest, ResourceType, SensorThingsGateway,
};
use tracing::{debug, info, instrument, warn};

/// Idempotent, dependency-aware creation of one entity against a remote
/// SensorThings endpoint.
///
/// Each attempt is a ladder of early returns: TooEarly before the request's
/// scheduled instant, AlreadyExists on an exact-name match (skipped for
/// dynamic entities, which are recreated fresh each time), Deferred when a
/// referenced entity does not exist remotely yet, Created after the POST.
/// Reference resolution and dynamic substitution happen on a working copy;
/// the stored request payload is never mutated.
pub struct EntityCreator {
    gateway: Arc<dyn SensorThingsGateway>,
}

impl EntityCreator {
    pub fn new(gateway: Arc<dyn SensorThingsGateway>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self, request), fields(entity = %request))]
    pub async fn attempt(
        &self,
        request: &EntityCreationRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<CreationOutcome> {
        if request.not_before > now {
            return Ok(CreationOutcome::TooEarly);
        }

        if request.dynamic.is_none() {
            if let Some(name) = request.entity_name() {
                if self.gateway.search(name, request.resource).await?.is_some() {
                    debug!("entity already exists");
                    return Ok(CreationOutcome::AlreadyExists);
                }
            }
        }

        let mut payload = request.payload.clone();
        if !self.resolve_references(&mut payload).await? {
            warn!("creation deferred, dependency not yet available");
            return Ok(CreationOutcome::Deferred);
        }

        if let Some(dynamic) = &request.dynamic {
            if let Some(fields) = payload.as_object_mut() {
                for (field, directive) in dynamic {
                    fields.insert(field.clone(), directive.generate(now));
                }
            }
        }

        self.gateway.create(request.resource, payload).await?;
        info!("created entity");
        Ok(CreationOutcome::Created)
    }

    /// Replace reference fields (a string value under a resource-type key)
    /// with the referenced entity's full remote representation, so the
    /// creation payload carries the remote's assigned identifiers.
    ///
    /// Returns false without touching remote state when any reference cannot
    /// be resolved yet.
    async fn resolve_references(&self, payload: &mut serde_json::Value) -> DomainResult<bool> {
        let Some(fields) = payload.as_object_mut() else {
            return Ok(true);
        };

        let references: Vec<(String, String, ResourceType)> = fields
            .iter()
            .filter_map(|(key, value)| {
                let resource = ResourceType::parse(key)?;
                let name = value.as_str()?;
                Some((key.clone(), name.to_string(), resource))
            })
            .collect();

        for (key, name, resource) in references {
            match self.gateway.search(&name, resource).await? {
                Some(entity) => {
                    debug!(field = %key, referenced = %name, "resolved reference");
                    fields.insert(key, entity);
                }
                None => return Ok(false),
            }
        }

        Ok(true)
    }
}
