use etf_feed_lib::{
    feed_health, feed_stream_status, history_depth, instrument_chart, instrument_snapshot,
    instrument_symbols, latest_history_point, start_feed_stream, stop_feed_stream, FeedError,
    FeedObserver, FeedState, FeedStreamArgs, FeedTelemetry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const REPORT_INTERVAL_MS: u64 = 5_000;

#[tokio::main]
async fn main() -> Result<(), FeedError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FEED_ENDPOINT").ok());

    let telemetry = Arc::new(FeedTelemetry::default());
    let observer: Arc<dyn FeedObserver> = telemetry.clone();
    let state = FeedState::new(observer);

    let session = start_feed_stream(
        &state,
        Some(FeedStreamArgs {
            endpoint,
            ..Default::default()
        }),
    )
    .await?;
    info!(
        endpoint = %session.endpoint,
        history_capacity = session.history_capacity,
        "feed probe started"
    );

    let mut report = tokio::time::interval(Duration::from_millis(REPORT_INTERVAL_MS));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(%error, "ctrl-c listener failed");
                }
                break;
            }
            _ = report.tick() => log_report(&state, &telemetry),
        }
    }

    let result = stop_feed_stream(&state).await;
    info!(stopped = result.stopped, "feed probe stopped");
    Ok(())
}

fn log_report(state: &FeedState, telemetry: &FeedTelemetry) {
    let status = feed_stream_status(state);
    let health = feed_health(state, etf_feed_lib::now_unix_ms());
    let counters = telemetry.snapshot();
    info!(
        state = ?status.state,
        attempt = status.reconnect_attempt,
        instruments = health.instruments,
        stale = health.stale,
        last_event_age_ms = ?health.last_event_age_ms,
        frames = counters.frames,
        decode_errors = counters.decode_errors,
        frame_p95_us = ?counters.frame_p95_us,
        "feed status"
    );

    for symbol in instrument_symbols(state) {
        let Some(snapshot) = instrument_snapshot(state, &symbol) else {
            continue;
        };
        info!(
            symbol = %symbol,
            price = ?snapshot.last_price,
            inav = ?snapshot.inav,
            band_upper = ?snapshot.band_upper,
            band_lower = ?snapshot.band_lower,
            last_point_t = ?latest_history_point(state, &symbol).map(|point| point.t),
            history_points = history_depth(state, &symbol),
            chart_points = instrument_chart(state, &symbol).len(),
            "instrument"
        );
    }
}
