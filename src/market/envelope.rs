use crate::market::fields::{
    first_present, ENVELOPE_KEYS, PAYLOAD_KEYS, TIMESTAMP_KEYS, TOPIC_KEYS,
};
use crate::market::types::FeedRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Splits one decoded document into records. A top-level array carries one
/// envelope per element; anything else is a single envelope.
pub fn normalize_document(document: Value, now_ms: i64) -> Vec<FeedRecord> {
    match document {
        Value::Array(items) => items
            .into_iter()
            .map(|item| normalize(item, now_ms))
            .collect(),
        other => vec![normalize(other, now_ms)],
    }
}

/// Standardises shape only. Never fails: a document that is not an object
/// yields an empty topic, empty fields and the current time.
pub fn normalize(document: Value, now_ms: i64) -> FeedRecord {
    let Value::Object(mut envelope) = document else {
        return FeedRecord {
            topic: String::new(),
            timestamp: now_ms,
            fields: Map::new(),
        };
    };

    let topic = TOPIC_KEYS
        .iter()
        .find_map(|key| envelope.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let payload_key = PAYLOAD_KEYS
        .iter()
        .copied()
        .find(|key| envelope.get(*key).is_some_and(|value| !value.is_null()));

    let fields = match payload_key {
        Some(key) => match envelope.remove(key) {
            Some(Value::Object(payload)) => payload,
            _ => Map::new(),
        },
        None => envelope
            .iter()
            .filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    };

    let timestamp = first_present(&fields, TIMESTAMP_KEYS)
        .or_else(|| first_present(&envelope, TIMESTAMP_KEYS))
        .map(|value| timestamp_ms(value, now_ms))
        .unwrap_or(now_ms);

    FeedRecord {
        topic,
        timestamp,
        fields,
    }
}

/// Numbers are epoch milliseconds, strings are calendar date-times; every
/// other shape, or an unparsable string, means "now".
pub fn timestamp_ms(value: &Value, now_ms: i64) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|ms| ms.is_finite() && ms.abs() < i64::MAX as f64)
                    .map(|ms| ms.round() as i64)
            })
            .unwrap_or(now_ms),
        Value::String(text) => parse_datetime_ms(text.trim()).unwrap_or(now_ms),
        _ => now_ms,
    }
}

fn parse_datetime_ms(text: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }

    // Zone-less date-times are taken as UTC.
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn normalizes_bus_envelope() {
        let record = normalize(
            json!({
                "id": "7d1c",
                "type": "prices.tick",
                "ts": 1_700_000_000_500_i64,
                "datetime": "2023-11-14T22:13:20.500+00:00",
                "v": 1,
                "payload": { "security_id": "SPY", "last": 450.5 }
            }),
            NOW,
        );

        assert_eq!(record.topic, "prices.tick");
        assert_eq!(record.timestamp, 1_700_000_000_500);
        assert_eq!(record.fields.get("security_id"), Some(&json!("SPY")));
        assert!(record.fields.get("id").is_none());
    }

    #[test]
    fn topic_resolution_prefers_topic_then_type_then_channel() {
        let record = normalize(json!({ "channel": "c", "type": "t", "topic": "x" }), NOW);
        assert_eq!(record.topic, "x");

        let record = normalize(json!({ "channel": "c", "type": "t" }), NOW);
        assert_eq!(record.topic, "t");

        let record = normalize(json!({ "channel": "fx.spot" }), NOW);
        assert_eq!(record.topic, "fx.spot");
    }

    #[test]
    fn data_field_wins_over_payload() {
        let record = normalize(
            json!({ "topic": "prices.tick", "data": { "last": 1.0 }, "payload": { "last": 2.0 } }),
            NOW,
        );
        assert_eq!(record.fields.get("last"), Some(&json!(1.0)));
    }

    #[test]
    fn flat_message_strips_envelope_keys() {
        let record = normalize(
            json!({ "topic": "inav.tick", "version": 2, "v": 1, "etf_id": "E1", "inav": 99.5 }),
            NOW,
        );

        assert_eq!(record.topic, "inav.tick");
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.fields.get("etf_id"), Some(&json!("E1")));
        assert!(record.fields.get("topic").is_none());
        assert!(record.fields.get("version").is_none());
    }

    #[test]
    fn payload_timestamp_wins_over_envelope_timestamp() {
        let record = normalize(
            json!({ "type": "fx.spot", "ts": 5, "payload": { "pair": "EURUSD", "ts": 9 } }),
            NOW,
        );
        assert_eq!(record.timestamp, 9);
    }

    #[test]
    fn parses_iso_timestamps() {
        let record = normalize(
            json!({ "type": "fx.spot", "payload": { "ts": "2023-11-14T22:13:20+00:00" } }),
            NOW,
        );
        assert_eq!(record.timestamp, 1_700_000_000_000);

        let naive = timestamp_ms(&json!("2023-11-14T22:13:20.250"), NOW);
        assert_eq!(naive, 1_700_000_000_250);
    }

    #[test]
    fn unusable_timestamps_fall_back_to_now() {
        assert_eq!(timestamp_ms(&json!("yesterday"), 42), 42);
        assert_eq!(timestamp_ms(&json!(true), 42), 42);
        assert_eq!(timestamp_ms(&json!({ "ms": 1 }), 42), 42);

        let record = normalize(json!({ "topic": "prices.tick", "data": { "last": 1 } }), NOW);
        assert_eq!(record.timestamp, NOW);
    }

    #[test]
    fn fractional_numeric_timestamps_are_rounded() {
        assert_eq!(timestamp_ms(&json!(1_700_000_000_000.6_f64), 0), 1_700_000_000_001);
    }

    #[test]
    fn malformed_shapes_degrade_to_defaults() {
        let record = normalize(json!("just a string"), NOW);
        assert_eq!(record.topic, "");
        assert_eq!(record.timestamp, NOW);
        assert!(record.fields.is_empty());

        let record = normalize(json!({ "topic": 17, "data": [1, 2, 3] }), NOW);
        assert_eq!(record.topic, "");
        assert!(record.fields.is_empty());
    }

    #[test]
    fn array_documents_yield_one_record_per_element() {
        let records = normalize_document(
            json!([
                { "topic": "prices.tick", "data": { "symbol": "A", "last": 1.0 } },
                { "topic": "inav.tick", "data": { "etf_id": "B", "inav": 2.0 } }
            ]),
            NOW,
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].topic, "prices.tick");
        assert_eq!(records[1].topic, "inav.tick");
    }
}
