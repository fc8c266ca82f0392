pub mod commands;
pub mod error;
pub mod market;
pub mod state;

pub use commands::{
    feed_stream::{feed_stream_running, feed_stream_status, start_feed_stream, stop_feed_stream},
    health::{feed_health, FeedHealthResponse},
    market_data::{
        decimated_history, history_depth, instrument_chart, instrument_history,
        instrument_snapshot, instrument_symbols, last_any_event_time, latest_history_point,
    },
};
pub use error::FeedError;
pub use market::telemetry::{FeedObserver, FeedTelemetry, FeedTelemetrySnapshot, NoopObserver};
pub use market::types::{
    now_unix_ms, ConnectionState, FeedStatusSnapshot, FeedStreamArgs, FeedStreamSession,
    FeedStreamStopResult, HistoryPoint, InstrumentSnapshot,
};
pub use state::FeedState;
