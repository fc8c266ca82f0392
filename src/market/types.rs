use crate::error::FeedError;
use crate::market::gateway::resolve_endpoint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9080;
pub const DEFAULT_PATH: &str = "/stream";
pub const DEFAULT_SECURE: bool = false;
pub const DEFAULT_HISTORY_CAPACITY: usize = 7_200;
pub const DEFAULT_CHART_REFRESH_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 << 20;
pub const MIN_HISTORY_CAPACITY: usize = 60;
pub const MAX_HISTORY_CAPACITY: usize = 86_400;
pub const MIN_CHART_REFRESH_INTERVAL_MS: u64 = 100;
pub const MAX_CHART_REFRESH_INTERVAL_MS: u64 = 60_000;
pub const MIN_MAX_MESSAGE_BYTES: usize = 1 << 10;
pub const MAX_MAX_MESSAGE_BYTES: usize = 64 << 20;
pub const RECONNECT_BASE_DELAY_MS: u64 = 250;
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
pub const STALE_AFTER_MS: i64 = 5_000;
pub const UNKNOWN_INSTRUMENT_ID: &str = "unknown";

pub const PRICES_TOPIC_PREFIX: &str = "prices.";
pub const INAV_TOPIC_PREFIX: &str = "inav.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusSnapshot {
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
    pub endpoint: String,
    pub reason: Option<String>,
}

impl FeedStatusSnapshot {
    pub fn closed(endpoint: String, reason: Option<String>) -> Self {
        Self {
            state: ConnectionState::Closed,
            reconnect_attempt: 0,
            endpoint,
            reason,
        }
    }
}

/// Latest known state of one instrument. Fields only ever move from one
/// finite value to another; partial records never clear them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentSnapshot {
    pub last_price: Option<f64>,
    pub inav: Option<f64>,
    pub band_upper: Option<f64>,
    pub band_lower: Option<f64>,
    pub last_update_time: i64,
    pub price_update_time: Option<i64>,
    pub inav_update_time: Option<i64>,
}

impl InstrumentSnapshot {
    pub fn history_point(&self, t: i64) -> HistoryPoint {
        HistoryPoint {
            t,
            price: self.last_price,
            inav: self.inav,
            band_upper: self.band_upper,
            band_lower: self.band_lower,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub t: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inav: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_upper: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_lower: Option<f64>,
}

/// One logical event after envelope normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRecord {
    pub topic: String,
    pub timestamp: i64,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedStreamArgs {
    pub endpoint: Option<String>,
    pub secure: Option<bool>,
    pub host: Option<String>,
    pub history_capacity: Option<usize>,
    pub chart_refresh_interval_ms: Option<u64>,
    pub max_message_bytes: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FeedStreamConfig {
    pub endpoint: String,
    pub history_capacity: usize,
    pub chart_refresh_interval_ms: u64,
    pub max_message_bytes: usize,
}

impl FeedStreamArgs {
    pub fn normalize(self) -> Result<FeedStreamConfig, FeedError> {
        let host = self
            .host
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
            .trim()
            .to_string();
        if host.is_empty() {
            return Err(FeedError::InvalidArgument(
                "host must be non-empty".to_string(),
            ));
        }

        let secure = self.secure.unwrap_or(DEFAULT_SECURE);
        let endpoint = resolve_endpoint(self.endpoint.as_deref(), secure, &host)?;

        let history_capacity = self.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY);
        if !(MIN_HISTORY_CAPACITY..=MAX_HISTORY_CAPACITY).contains(&history_capacity) {
            return Err(FeedError::InvalidArgument(format!(
                "historyCapacity must be between {MIN_HISTORY_CAPACITY} and {MAX_HISTORY_CAPACITY}"
            )));
        }

        let chart_refresh_interval_ms = self
            .chart_refresh_interval_ms
            .unwrap_or(DEFAULT_CHART_REFRESH_INTERVAL_MS);
        if !(MIN_CHART_REFRESH_INTERVAL_MS..=MAX_CHART_REFRESH_INTERVAL_MS)
            .contains(&chart_refresh_interval_ms)
        {
            return Err(FeedError::InvalidArgument(format!(
                "chartRefreshIntervalMs must be between {MIN_CHART_REFRESH_INTERVAL_MS} and {MAX_CHART_REFRESH_INTERVAL_MS}"
            )));
        }

        let max_message_bytes = self.max_message_bytes.unwrap_or(DEFAULT_MAX_MESSAGE_BYTES);
        if !(MIN_MAX_MESSAGE_BYTES..=MAX_MAX_MESSAGE_BYTES).contains(&max_message_bytes) {
            return Err(FeedError::InvalidArgument(format!(
                "maxMessageBytes must be between {MIN_MAX_MESSAGE_BYTES} and {MAX_MAX_MESSAGE_BYTES}"
            )));
        }

        Ok(FeedStreamConfig {
            endpoint,
            history_capacity,
            chart_refresh_interval_ms,
            max_message_bytes,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStreamSession {
    pub running: bool,
    pub endpoint: String,
    pub history_capacity: usize,
    pub chart_refresh_interval_ms: u64,
    pub max_message_bytes: usize,
}

impl FeedStreamSession {
    pub fn from_config(config: &FeedStreamConfig) -> Self {
        Self {
            running: true,
            endpoint: config.endpoint.clone(),
            history_capacity: config.history_capacity,
            chart_refresh_interval_ms: config.chart_refresh_interval_ms,
            max_message_bytes: config.max_message_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStreamStopResult {
    pub stopped: bool,
}

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
