use serde::{Deserialize, Serialize};

/// The fixed SensorThings resource vocabulary.
///
/// Variants are named after the plural collection form used in resource
/// paths and top-level entity documents. Reference fields inside another
/// entity's payload use the singular form (`Thing`, `ObservedProperty`, ...),
/// so both spellings resolve to the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Things,
    Sensors,
    Locations,
    ObservedProperties,
    Datastreams,
    FeaturesOfInterest,
    Observations,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::Things,
        ResourceType::Sensors,
        ResourceType::Locations,
        ResourceType::ObservedProperties,
        ResourceType::Datastreams,
        ResourceType::FeaturesOfInterest,
        ResourceType::Observations,
    ];

    /// Plural collection name, as used in resource paths and top-level keys.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceType::Things => "Things",
            ResourceType::Sensors => "Sensors",
            ResourceType::Locations => "Locations",
            ResourceType::ObservedProperties => "ObservedProperties",
            ResourceType::Datastreams => "Datastreams",
            ResourceType::FeaturesOfInterest => "FeaturesOfInterest",
            ResourceType::Observations => "Observations",
        }
    }

    /// Singular form, as used by reference fields inside entity payloads.
    pub fn singular(&self) -> &'static str {
        match self {
            ResourceType::Things => "Thing",
            ResourceType::Sensors => "Sensor",
            ResourceType::Locations => "Location",
            ResourceType::ObservedProperties => "ObservedProperty",
            ResourceType::Datastreams => "Datastream",
            ResourceType::FeaturesOfInterest => "FeatureOfInterest",
            ResourceType::Observations => "Observation",
        }
    }

    /// Match a plural collection name, case-sensitively.
    pub fn from_collection(value: &str) -> Option<ResourceType> {
        Self::ALL.into_iter().find(|r| r.collection() == value)
    }

    /// Match a singular reference-field name, case-sensitively.
    pub fn from_reference(value: &str) -> Option<ResourceType> {
        Self::ALL.into_iter().find(|r| r.singular() == value)
    }

    /// Match either spelling. Entity documents declare with the plural form
    /// while payload reference fields use the singular, and the distinction
    /// does not matter to callers that only need the resolved type.
    pub fn parse(value: &str) -> Option<ResourceType> {
        Self::from_collection(value).or_else(|| Self::from_reference(value))
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}
