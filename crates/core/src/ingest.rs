//! Conversion between the loosely-typed KPI mapping and [`KpiRecord`].
//!
//! Provider responses arrive as free text that should contain a JSON object,
//! possibly inside markdown fences or surrounded by prose. This module finds
//! that object, then maps each key onto the typed record. Values that do not
//! resolve to a number become placeholders, never errors.

use crate::error::{Error, Result};
use crate::record::{Channel, Figure, KpiRecord, Metric, MetricValue, OrganizedTactics, Tactics};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Placeholder tokens emitted by report templates and providers.
const PLACEHOLDER_TOKENS: &[&str] = &["[x,xxx]", "[xxx]", "$x.xx", "[xx]", "[xx.xx%]"];

/// Whether a raw string stands for "not observed".
///
/// This is the single place where placeholder strings are recognised; the
/// rest of the crate works with [`MetricValue::Placeholder`].
pub fn is_placeholder(text: &str) -> bool {
    let s = text.trim().to_lowercase();
    if s.is_empty() || matches!(s.as_str(), "nan" | "none" | "null") {
        return true;
    }
    PLACEHOLDER_TOKENS.contains(&s.as_str())
        || s.contains("[x")
        || s.contains("$x")
        || s.contains("xxx")
}

/// Read one metric value from JSON.
fn metric_from_json(metric: Metric, value: &Value) -> MetricValue {
    match value {
        Value::Number(n) => Figure::from_json_number(n.clone())
            .map(MetricValue::Number)
            .unwrap_or_else(|| MetricValue::placeholder_for(metric)),
        Value::String(s) => {
            if is_placeholder(s) {
                return MetricValue::Placeholder(s.clone());
            }
            match Figure::parse_text(s) {
                Some(f) => MetricValue::Number(f),
                None => {
                    log::debug!("Value {:?} is not numeric; keeping it as a placeholder", s);
                    MetricValue::Placeholder(s.clone())
                }
            }
        }
        Value::Array(items) => {
            let figures: Vec<Figure> = items
                .iter()
                .filter_map(|item| match metric_from_json(metric, item) {
                    MetricValue::Number(f) => Some(f),
                    MetricValue::NumberList(mut inner) if !inner.is_empty() => {
                        Some(inner.remove(0))
                    }
                    _ => None,
                })
                .collect();
            if figures.is_empty() {
                MetricValue::placeholder_for(metric)
            } else {
                MetricValue::NumberList(figures)
            }
        }
        Value::Null | Value::Bool(_) | Value::Object(_) => MetricValue::placeholder_for(metric),
    }
}

/// JSON form of a metric value.
pub fn metric_to_json(value: &MetricValue) -> Value {
    match value {
        MetricValue::Placeholder(s) => Value::String(s.clone()),
        MetricValue::Number(f) => f.to_json(),
        MetricValue::NumberList(list) => Value::Array(list.iter().map(Figure::to_json).collect()),
    }
}

fn bool_from_json(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

fn string_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tactics_from_json(value: &Value) -> Option<Tactics> {
    match value {
        Value::Array(items) => Some(Tactics::List(
            items.iter().filter_map(string_from_json).collect(),
        )),
        Value::Null => None,
        other => string_from_json(other).map(Tactics::Text),
    }
}

impl KpiRecord {
    /// Build a record from an untyped JSON object.
    pub fn from_json(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::InvalidRecord(format!("expected a JSON object, got {}", kind_of(value))))?;
        Ok(Self::from_map(map))
    }

    /// Build a record from a JSON map. Never fails; unknown keys go to `extra`.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut record = KpiRecord::new();

        for (key, value) in map {
            match key.as_str() {
                "store_name" => record.store_name = string_from_json(value),
                "date_range" => record.date_range = string_from_json(value),
                "has_bcdf" => record.has_bcdf = bool_from_json(value),
                "bcdf_tactics" => record.bcdf_tactics = tactics_from_json(value),
                "bcdf_tactics_organized" => {
                    match serde_json::from_value::<OrganizedTactics>(value.clone()) {
                        Ok(organized) => record.bcdf_tactics_organized = Some(organized),
                        Err(_) => {
                            record.extra.insert(key.clone(), value.clone());
                        }
                    }
                }
                _ => {
                    let routed = Channel::split_key(key)
                        .and_then(|(channel, suffix)| Some((channel, Metric::from_suffix(suffix)?)));
                    match routed {
                        Some((channel, metric)) => {
                            record.set(channel, metric, metric_from_json(metric, value));
                        }
                        None => {
                            record.extra.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }

        record
    }

    /// Flatten the record back into the untyped mapping.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();

        if let Some(store) = &self.store_name {
            map.insert("store_name".into(), Value::String(store.clone()));
        }
        if let Some(range) = &self.date_range {
            map.insert("date_range".into(), Value::String(range.clone()));
        }
        map.insert("has_bcdf".into(), Value::Bool(self.has_bcdf));

        for channel in Channel::ALL {
            for (metric, value) in self.group(channel).iter() {
                map.insert(channel.key(metric), metric_to_json(value));
            }
        }

        if let Some(tactics) = &self.bcdf_tactics {
            map.insert(
                "bcdf_tactics".into(),
                serde_json::to_value(tactics).unwrap_or(Value::Null),
            );
        }
        if let Some(organized) = &self.bcdf_tactics_organized {
            map.insert(
                "bcdf_tactics_organized".into(),
                serde_json::to_value(organized).unwrap_or(Value::Null),
            );
        }
        for (key, value) in &self.extra {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Value::Object(map)
    }

    /// Pretty-printed JSON export.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Serialize for KpiRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KpiRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        KpiRecord::from_json(&value).map_err(serde::de::Error::custom)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Find the first well-formed JSON object in arbitrary text.
///
/// Each `{` is tried as a start position in turn; the first one that parses
/// as a complete object wins. This handles code fences, leading prose, and
/// trailing commentary alike.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>> {
    for (start, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            return Ok(map);
        }
    }

    let preview: String = text.chars().take(200).collect();
    Err(Error::ExtractionError(format!(
        "no JSON object found in response: {:?}",
        preview
    )))
}

/// A record recovered from a provider response.
#[derive(Debug)]
pub struct IngestOutcome {
    /// The record; empty when nothing could be extracted.
    pub record: KpiRecord,
    /// Set when extraction failed and `record` is the empty fallback.
    pub failure: Option<Error>,
}

impl IngestOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Ingest a provider response, falling back to an empty record on failure.
pub fn ingest_response(text: &str) -> IngestOutcome {
    match extract_json_object(text) {
        Ok(map) => IngestOutcome {
            record: KpiRecord::from_map(&map),
            failure: None,
        },
        Err(e) => {
            log::warn!("{}", e);
            IngestOutcome {
                record: KpiRecord::new(),
                failure: Some(e),
            }
        }
    }
}
