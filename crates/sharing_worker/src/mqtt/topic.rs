/// Topic suffix under which a SensorThings broker publishes a datastream's
/// observations.
pub const OBSERVATIONS_SUFFIX: &str = "/Observations";

/// Observation topic for a datastream name.
pub fn observation_topic(datastream: &str) -> String {
    format!("{}{}", datastream, OBSERVATIONS_SUFFIX)
}

/// Derive the datastream name from an observation topic by stripping the
/// fixed suffix. Returns `None` for topics outside the observation namespace.
pub fn datastream_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_suffix(OBSERVATIONS_SUFFIX)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_topic_round_trip() {
        let topic = observation_topic("MCC-DataStream-001");
        assert_eq!(topic, "MCC-DataStream-001/Observations");
        assert_eq!(datastream_from_topic(&topic), Some("MCC-DataStream-001"));
    }

    #[test]
    fn test_topic_without_suffix_is_rejected() {
        assert_eq!(datastream_from_topic("MCC-DataStream-001"), None);
        assert_eq!(datastream_from_topic("DS-1/Things"), None);
    }

    #[test]
    fn test_bare_suffix_is_rejected() {
        assert_eq!(datastream_from_topic("/Observations"), None);
    }

    #[test]
    fn test_nested_topic_keeps_full_prefix() {
        assert_eq!(
            datastream_from_topic("site-4/DS-1/Observations"),
            Some("site-4/DS-1")
        );
    }
}
