//! Candidate field names per logical attribute, tried in priority order.
//!
//! Producers on the bus do not agree on naming, so every logical value is
//! looked up through an ordered alias list. New aliases go into these tables.

use crate::market::types::UNKNOWN_INSTRUMENT_ID;
use serde_json::{Map, Value};

pub const TOPIC_KEYS: &[&str] = &["topic", "type", "channel"];
pub const PAYLOAD_KEYS: &[&str] = &["data", "payload"];
pub const ENVELOPE_KEYS: &[&str] = &["topic", "type", "channel", "version", "v"];
pub const TIMESTAMP_KEYS: &[&str] = &["ts", "timestamp", "datetime"];

#[derive(Debug, Clone, Copy)]
pub struct TopicFields {
    pub identifier: &'static [&'static str],
    pub value: &'static [&'static str],
}

pub const PRICE_FIELDS: TopicFields = TopicFields {
    identifier: &["security_id", "securityId", "symbol", "ticker"],
    value: &["last", "mid", "price"],
};

pub const INAV_FIELDS: TopicFields = TopicFields {
    identifier: &[
        "etf_id",
        "etfId",
        "etf",
        "security_id",
        "securityId",
        "symbol",
        "ticker",
        "share_class_id",
        "shareClassId",
    ],
    value: &["inav", "value"],
};

pub const BAND_UPPER_KEYS: &[&str] = &["band_upper", "bandUpper", "band_high", "bandHigh"];
pub const BAND_LOWER_KEYS: &[&str] = &["band_lower", "bandLower", "band_low", "bandLow"];

/// First candidate key holding a non-null value.
pub fn first_present<'a>(
    fields: &'a Map<String, Value>,
    candidates: &[&str],
) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|key| fields.get(*key))
        .find(|value| !value.is_null())
}

/// Numbers pass through, numeric strings are parsed; anything non-finite is rejected.
pub fn finite_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

pub fn resolve_number(fields: &Map<String, Value>, candidates: &[&str]) -> Option<f64> {
    first_present(fields, candidates).and_then(finite_number)
}

pub fn resolve_identifier(fields: &Map<String, Value>, candidates: &[&str]) -> String {
    candidates
        .iter()
        .filter_map(|key| fields.get(*key))
        .find_map(|value| match value {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_INSTRUMENT_ID.to_string())
}
