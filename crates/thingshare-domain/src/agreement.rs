use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgreementState {
    Active,
    Inactive,
}

/// Per-datastream delivery bookkeeping, mutated once per received
/// observation through the agreement repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastreamMetric {
    pub name: String,
    pub observation_count: u64,
    pub last_phenomenon_time: Option<DateTime<Utc>>,
    pub last_delivery_time: Option<DateTime<Utc>>,
}

impl DatastreamMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observation_count: 0,
            last_phenomenon_time: None,
            last_delivery_time: None,
        }
    }

    /// Record one delivered observation. The phenomenon-time watermark only
    /// moves forward; out-of-order or duplicate messages never regress it.
    pub fn record(&mut self, phenomenon_time: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.observation_count += 1;
        self.last_delivery_time = Some(now);
        if let Some(incoming) = phenomenon_time {
            match self.last_phenomenon_time {
                Some(current) if incoming <= current => {}
                _ => self.last_phenomenon_time = Some(incoming),
            }
        }
    }
}

/// A record authorizing consumers to receive a producer's observations for a
/// named set of datastreams. Owned by the excluded organization domain; the
/// routing broker reads it and mutates only the embedded metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharingAgreement {
    pub id: String,
    pub name: String,
    pub producer_mqtt_url: String,
    pub consumers: Vec<String>,
    pub datastreams: Vec<DatastreamMetric>,
    pub state: AgreementState,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// External input for creating an agreement (no ID); metrics are seeded at
/// zero for every named datastream.
#[derive(Debug, Clone)]
pub struct CreateAgreementInput {
    pub name: String,
    pub producer_mqtt_url: String,
    pub consumers: Vec<String>,
    pub datastream_names: Vec<String>,
}

/// The slice of a SensorThings observation document the router reads.
/// Everything else in the message is forwarded opaquely.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Observation {
    #[serde(rename = "phenomenonTime", default)]
    pub phenomenon_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_increments_and_stamps_delivery() {
        let mut metric = DatastreamMetric::new("DS-1");
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        metric.record(None, now);
        assert_eq!(metric.observation_count, 1);
        assert_eq!(metric.last_delivery_time, Some(now));
        assert_eq!(metric.last_phenomenon_time, None);
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let mut metric = DatastreamMetric::new("DS-1");
        let now = Utc::now();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        metric.record(Some(t1), now);
        metric.record(Some(t2), now);

        assert_eq!(metric.last_phenomenon_time, Some(t1));
        assert_eq!(metric.observation_count, 2);
    }

    #[test]
    fn test_watermark_advances_on_newer_time() {
        let mut metric = DatastreamMetric::new("DS-1");
        let now = Utc::now();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();

        metric.record(Some(t1), now);
        metric.record(Some(t2), now);

        assert_eq!(metric.last_phenomenon_time, Some(t2));
    }

    #[test]
    fn test_observation_parses_phenomenon_time() {
        let observation: Observation = serde_json::from_str(
            r#"{"phenomenonTime": "2024-05-01T10:00:00Z", "result": 21.5}"#,
        )
        .unwrap();
        assert_eq!(
            observation.phenomenon_time,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(observation.result, Some(serde_json::json!(21.5)));
    }

    #[test]
    fn test_observation_tolerates_missing_fields() {
        let observation: Observation = serde_json::from_str(r#"{"result": 3}"#).unwrap();
        assert_eq!(observation.phenomenon_time, None);
    }
}
