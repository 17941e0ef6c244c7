use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thingshare_domain::{
    DomainError, DomainResult, DynamicValue, EntityCreationRequest, ResourceType,
};
use tracing::{debug, info};

const REPEAT_DIRECTIVE: &str = "sensor-things-repeat";
const DYNAMIC_DIRECTIVE: &str = "sensor-things-dynamic";

#[derive(Debug, Deserialize)]
struct RepeatDirective {
    #[serde(default)]
    interval: i64,
    #[serde(default = "default_quantity")]
    quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl Default for RepeatDirective {
    fn default() -> Self {
        Self {
            interval: 0,
            quantity: 1,
        }
    }
}

/// Expands declarative entity documents into a flat, ordered queue of
/// creation requests.
///
/// Documents are mappings from resource-type keys to lists of entity field
/// maps. Unrecognized keys holding a nested mapping are recursed into so
/// entities may be grouped under arbitrary namespaces; an unrecognized key
/// holding a list is a hard error at the top level only.
pub struct EntityRequestExpander;

impl EntityRequestExpander {
    pub fn expand_files(
        paths: &[PathBuf],
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<EntityCreationRequest>> {
        let mut results = Vec::new();

        for path in paths {
            debug!(path = %path.display(), "reading entity declarations");
            let contents = std::fs::read_to_string(path).map_err(|e| {
                DomainError::InvalidDocument(format!("cannot read {}: {}", path.display(), e))
            })?;
            let document: YamlValue = serde_yaml::from_str(&contents).map_err(|e| {
                DomainError::InvalidDocument(format!("cannot parse {}: {}", path.display(), e))
            })?;
            results.extend(Self::expand_document(&document, now)?);
        }

        info!(
            entity_count = results.len(),
            file_count = paths.len(),
            "expanded entity declarations"
        );
        Ok(results)
    }

    pub fn expand_document(
        document: &YamlValue,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<EntityCreationRequest>> {
        Self::expand_element(document, now, 0)
    }

    fn expand_element(
        element: &YamlValue,
        now: DateTime<Utc>,
        depth: usize,
    ) -> DomainResult<Vec<EntityCreationRequest>> {
        let mut results = Vec::new();
        let Some(mapping) = element.as_mapping() else {
            return Ok(results);
        };

        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                return Err(DomainError::InvalidDocument(
                    "entity document keys must be strings".to_string(),
                ));
            };

            match ResourceType::parse(key) {
                Some(resource) => {
                    let entities = value.as_sequence().ok_or_else(|| {
                        DomainError::InvalidDocument(format!(
                            "'{}' must hold a list of entities",
                            key
                        ))
                    })?;
                    for entity in entities {
                        results.extend(Self::expand_entity(resource, entity, now)?);
                    }
                }
                None if value.is_mapping() => {
                    results.extend(Self::expand_element(value, now, depth + 1)?);
                }
                None if value.is_sequence() && depth == 0 => {
                    return Err(DomainError::InvalidDocument(format!(
                        "unrecognized resource type '{}'",
                        key
                    )));
                }
                None => {}
            }
        }

        Ok(results)
    }

    fn expand_entity(
        resource: ResourceType,
        entity: &YamlValue,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<EntityCreationRequest>> {
        if !entity.is_mapping() {
            return Err(DomainError::InvalidDocument(format!(
                "{} entries must be field maps",
                resource
            )));
        }

        let mut payload: serde_json::Value = serde_json::to_value(entity)
            .map_err(|e| DomainError::InvalidDocument(e.to_string()))?;
        let fields = payload
            .as_object_mut()
            .ok_or_else(|| DomainError::InvalidDocument(format!("{} entry is not a map", resource)))?;

        let repeat = match fields.remove(REPEAT_DIRECTIVE) {
            Some(value) => serde_json::from_value::<RepeatDirective>(value).map_err(|e| {
                DomainError::InvalidDocument(format!("invalid {}: {}", REPEAT_DIRECTIVE, e))
            })?,
            None => RepeatDirective::default(),
        };

        let dynamic = match fields.remove(DYNAMIC_DIRECTIVE) {
            Some(value) => Some(Self::parse_dynamic_spec(value)?),
            None => None,
        };

        let mut results = Vec::with_capacity(repeat.quantity as usize);
        for i in 1..=i64::from(repeat.quantity) {
            results.push(EntityCreationRequest::new(
                resource,
                payload.clone(),
                dynamic.clone(),
                now + Duration::seconds(repeat.interval * i),
            ));
        }
        Ok(results)
    }

    fn parse_dynamic_spec(
        value: serde_json::Value,
    ) -> DomainResult<BTreeMap<String, DynamicValue>> {
        let directives: BTreeMap<String, String> = serde_json::from_value(value).map_err(|e| {
            DomainError::InvalidDocument(format!("invalid {}: {}", DYNAMIC_DIRECTIVE, e))
        })?;

        directives
            .into_iter()
            .map(|(field, name)| {
                DynamicValue::from_directive(&name)
                    .map(|directive| (field, directive))
                    .ok_or(DomainError::UnknownDirective(name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thingshare_domain::CreationOutcome;

    fn expand(yaml: &str) -> DomainResult<Vec<EntityCreationRequest>> {
        let document: YamlValue = serde_yaml::from_str(yaml).unwrap();
        EntityRequestExpander::expand_document(&document, Utc::now())
    }

    #[test]
    fn test_expands_flat_document() {
        let requests = expand(
            r#"
            Sensors:
              - name: S1
              - name: S2
            Things:
              - name: T1
            "#,
        )
        .unwrap();

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].resource, ResourceType::Sensors);
        assert_eq!(requests[0].payload["name"], "S1");
        assert_eq!(requests[0].outcome, CreationOutcome::Pending);
        assert_eq!(requests[2].resource, ResourceType::Things);
    }

    #[test]
    fn test_recurses_into_namespaced_groups() {
        let requests = expand(
            r#"
            mesa-verde:
              weather-station:
                Sensors:
                  - name: S1
            "#,
        )
        .unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload["name"], "S1");
    }

    #[test]
    fn test_unrecognized_top_level_list_is_an_error() {
        let result = expand(
            r#"
            Gateways:
              - name: G1
            "#,
        );
        assert!(matches!(result, Err(DomainError::InvalidDocument(_))));
    }

    #[test]
    fn test_unrecognized_nested_list_is_ignored() {
        let requests = expand(
            r#"
            group:
              annotations:
                - ignored
              Sensors:
                - name: S1
            "#,
        )
        .unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_repeat_expansion_spacing() {
        let now = Utc::now();
        let document: YamlValue = serde_yaml::from_str(
            r#"
            Observations:
              - result: 0
                sensor-things-repeat:
                  interval: 5
                  quantity: 3
            "#,
        )
        .unwrap();

        let requests = EntityRequestExpander::expand_document(&document, now).unwrap();

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].not_before, now + Duration::seconds(5));
        assert_eq!(requests[1].not_before, now + Duration::seconds(10));
        assert_eq!(requests[2].not_before, now + Duration::seconds(15));
        // The directive is stripped from the stored payload
        assert!(requests[0].payload.get(REPEAT_DIRECTIVE).is_none());
    }

    #[test]
    fn test_dynamic_directive_is_parsed_eagerly() {
        let requests = expand(
            r#"
            Observations:
              - Datastream: DS-1
                sensor-things-dynamic:
                  phenomenonTime: CURRENT_TIME
                  result: RANDOM_BOOLEAN
            "#,
        )
        .unwrap();

        let dynamic = requests[0].dynamic.as_ref().unwrap();
        assert_eq!(dynamic["phenomenonTime"], DynamicValue::CurrentTime);
        assert_eq!(dynamic["result"], DynamicValue::RandomBoolean);
        assert!(requests[0].payload.get(DYNAMIC_DIRECTIVE).is_none());
    }

    #[test]
    fn test_unknown_directive_is_fatal() {
        let result = expand(
            r#"
            Observations:
              - sensor-things-dynamic:
                  result: RANDOM_NUMBER
            "#,
        );
        assert!(matches!(result, Err(DomainError::UnknownDirective(name)) if name == "RANDOM_NUMBER"));
    }

    #[test]
    fn test_singular_key_is_accepted() {
        let requests = expand(
            r#"
            ObservedProperty:
              - name: Temperature
            "#,
        )
        .unwrap();
        assert_eq!(requests[0].resource, ResourceType::ObservedProperties);
    }

    #[test]
    fn test_entity_must_be_a_map() {
        let result = expand(
            r#"
            Sensors:
              - just-a-string
            "#,
        );
        assert!(matches!(result, Err(DomainError::InvalidDocument(_))));
    }

    #[test]
    fn test_missing_file_is_invalid_document() {
        let result = EntityRequestExpander::expand_files(
            &[PathBuf::from("/nonexistent/entities.yml")],
            Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::InvalidDocument(_))));
    }
}
