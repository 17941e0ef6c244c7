use crate::dynamic_value::DynamicValue;
use crate::resource::ResourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of one creation attempt for one entity.
///
/// `Pending` means no attempt has resolved the request yet this pass.
/// `Created` and `AlreadyExists` are terminal; `Deferred` and `TooEarly` are
/// recoverable and reset to `Pending` before the next reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreationOutcome {
    Pending,
    Created,
    AlreadyExists,
    Deferred,
    TooEarly,
}

impl CreationOutcome {
    /// True once the entity is known to exist remotely.
    pub fn is_resolved(&self) -> bool {
        matches!(self, CreationOutcome::Created | CreationOutcome::AlreadyExists)
    }
}

/// One desired entity to provision against a remote endpoint.
///
/// The payload is plain serializable data; string fields whose key names a
/// resource type are references to other entities by name and are resolved at
/// creation time. The stored payload itself is never mutated by an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCreationRequest {
    pub resource: ResourceType,
    pub payload: serde_json::Value,
    pub dynamic: Option<BTreeMap<String, DynamicValue>>,
    pub not_before: DateTime<Utc>,
    pub outcome: CreationOutcome,
}

impl EntityCreationRequest {
    pub fn new(
        resource: ResourceType,
        payload: serde_json::Value,
        dynamic: Option<BTreeMap<String, DynamicValue>>,
        not_before: DateTime<Utc>,
    ) -> Self {
        Self {
            resource,
            payload,
            dynamic,
            not_before,
            outcome: CreationOutcome::Pending,
        }
    }

    /// The entity's `name` payload field, when present.
    pub fn entity_name(&self) -> Option<&str> {
        self.payload.get("name").and_then(|v| v.as_str())
    }
}

impl std::fmt::Display for EntityCreationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({})",
            self.entity_name().unwrap_or("<anonymous>"),
            self.resource
        )
    }
}
