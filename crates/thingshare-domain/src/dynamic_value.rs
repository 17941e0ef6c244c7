use chrono::{DateTime, SecondsFormat, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const CHOICES: [&str; 4] = ["low", "nominal", "high", "critical"];

const ADJECTIVES: [&str; 6] = ["quiet", "steady", "brisk", "faint", "sharp", "gentle"];
const NOUNS: [&str; 6] = ["breeze", "current", "signal", "pulse", "drift", "reading"];

/// Computed-value directives for entity payload fields.
///
/// The directive set is closed; documents name directives with the
/// SCREAMING_SNAKE wire form (`CURRENT_TIME`, ...) and unknown names are
/// rejected when the document is expanded, not at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DynamicValue {
    CurrentTime,
    RandomBoolean,
    RandomChoice,
    RandomPhrase,
}

impl DynamicValue {
    pub fn from_directive(name: &str) -> Option<DynamicValue> {
        match name {
            "CURRENT_TIME" => Some(DynamicValue::CurrentTime),
            "RANDOM_BOOLEAN" => Some(DynamicValue::RandomBoolean),
            "RANDOM_CHOICE" => Some(DynamicValue::RandomChoice),
            "RANDOM_PHRASE" => Some(DynamicValue::RandomPhrase),
            _ => None,
        }
    }

    /// Produce the field value at creation time. `now` is the creation
    /// instant, not the expansion instant.
    pub fn generate(&self, now: DateTime<Utc>) -> serde_json::Value {
        let mut rng = rand::thread_rng();
        match self {
            DynamicValue::CurrentTime => {
                serde_json::Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            DynamicValue::RandomBoolean => serde_json::Value::Bool(rng.gen_bool(0.5)),
            DynamicValue::RandomChoice => {
                let choice = CHOICES.choose(&mut rng).copied().unwrap_or(CHOICES[0]);
                serde_json::Value::String(choice.to_string())
            }
            DynamicValue::RandomPhrase => {
                let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or(ADJECTIVES[0]);
                let noun = NOUNS.choose(&mut rng).copied().unwrap_or(NOUNS[0]);
                serde_json::Value::String(format!("{} {}", adjective, noun))
            }
        }
    }
}
