use crate::market::types::{ConnectionState, FeedStatusSnapshot, STALE_AFTER_MS};
use crate::state::FeedState;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedHealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub connection: ConnectionState,
    pub reconnect_attempt: u32,
    pub instruments: usize,
    pub history_capacity: usize,
    pub last_event_age_ms: Option<i64>,
    pub stale: bool,
}

/// `stale` is set when no event of any topic arrived within the staleness
/// window, or none arrived at all.
pub fn build_feed_health(
    started_at: Instant,
    feed_status: &FeedStatusSnapshot,
    last_any_event_time: Option<i64>,
    instruments: usize,
    history_capacity: usize,
    now_ms: i64,
) -> FeedHealthResponse {
    let last_event_age_ms = last_any_event_time.map(|seen| now_ms.saturating_sub(seen).max(0));
    let stale = last_event_age_ms.map_or(true, |age| age > STALE_AFTER_MS);
    let status = if feed_status.state == ConnectionState::Open && !stale {
        "ok"
    } else {
        "degraded"
    };

    FeedHealthResponse {
        status,
        uptime_ms: started_at.elapsed().as_millis(),
        connection: feed_status.state,
        reconnect_attempt: feed_status.reconnect_attempt,
        instruments,
        history_capacity,
        last_event_age_ms,
        stale,
    }
}

pub fn feed_health(state: &FeedState, now_ms: i64) -> FeedHealthResponse {
    let feed_status = state.feed_status.read().clone();
    let (last_any_event_time, instruments, history_capacity) = {
        let readable = state.store.read();
        (
            readable.last_any_event_time(),
            readable.instrument_count(),
            readable.history_store().capacity(),
        )
    };

    build_feed_health(
        state.started_at,
        &feed_status,
        last_any_event_time,
        instruments,
        history_capacity,
        now_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::DEFAULT_HISTORY_CAPACITY;

    fn status(state: ConnectionState) -> FeedStatusSnapshot {
        FeedStatusSnapshot {
            state,
            reconnect_attempt: 0,
            endpoint: "ws://localhost:9080/stream".to_string(),
            reason: None,
        }
    }

    #[test]
    fn fresh_events_on_open_stream_report_ok() {
        let response = build_feed_health(
            Instant::now(),
            &status(ConnectionState::Open),
            Some(9_000),
            3,
            7_200,
            10_000,
        );

        assert_eq!(response.status, "ok");
        assert!(!response.stale);
        assert_eq!(response.last_event_age_ms, Some(1_000));
        assert_eq!(response.instruments, 3);
        assert!(response.uptime_ms <= 1_000);
    }

    #[test]
    fn silence_beyond_window_is_stale() {
        let response = build_feed_health(
            Instant::now(),
            &status(ConnectionState::Open),
            Some(1_000),
            1,
            7_200,
            1_000 + STALE_AFTER_MS + 1,
        );

        assert!(response.stale);
        assert_eq!(response.status, "degraded");
    }

    #[test]
    fn no_events_yet_is_stale() {
        let response = build_feed_health(
            Instant::now(),
            &status(ConnectionState::Closed),
            None,
            0,
            7_200,
            5,
        );

        assert!(response.stale);
        assert_eq!(response.last_event_age_ms, None);
        assert_eq!(response.connection, ConnectionState::Closed);
    }

    #[test]
    fn reports_idle_state() {
        let state = FeedState::default();
        let response = feed_health(&state, 0);

        assert_eq!(response.status, "degraded");
        assert_eq!(response.instruments, 0);
        assert_eq!(response.history_capacity, DEFAULT_HISTORY_CAPACITY);
    }
}
