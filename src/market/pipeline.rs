use crate::error::FeedError;
use crate::market::aggregator::{apply_record, ApplyOutcome, FeedStore};
use crate::market::decimate::decimate;
use crate::market::envelope::normalize_document;
use crate::market::gateway::connect_feed_stream;
use crate::market::telemetry::FeedObserver;
use crate::market::types::{
    now_unix_ms, ConnectionState, FeedStatusSnapshot, FeedStreamConfig, HistoryPoint,
    RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS,
};
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CLOSE_HANDSHAKE_TIMEOUT_MS: u64 = 1_000;
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Decimated series per instrument, rebuilt by the chart refresh timer.
#[derive(Debug, Default)]
pub struct ChartCache {
    series: HashMap<String, Vec<HistoryPoint>>,
    refreshed_at: Option<i64>,
}

impl ChartCache {
    pub fn series(&self, symbol: &str) -> Vec<HistoryPoint> {
        self.series.get(symbol).cloned().unwrap_or_default()
    }

    pub fn refreshed_at(&self) -> Option<i64> {
        self.refreshed_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub documents: usize,
    pub decode_errors: usize,
    pub applied: usize,
    pub discarded: usize,
    pub ignored: usize,
}

struct StreamRuntimeContext<'a> {
    config: &'a FeedStreamConfig,
    store: &'a Arc<RwLock<FeedStore>>,
    status_store: &'a Arc<RwLock<FeedStatusSnapshot>>,
    observer: &'a Arc<dyn FeedObserver>,
}

enum StreamDirective {
    Continue,
    Reconnect,
}

/// `min(30 s, 250 ms * 2^attempt)`.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
    let delay_ms = RECONNECT_BASE_DELAY_MS
        .saturating_mul(1_u64 << exponent)
        .min(RECONNECT_MAX_DELAY_MS);
    Duration::from_millis(delay_ms)
}

/// Feeds every newline-delimited document of one payload through the
/// normaliser and aggregator. Undecodable documents are dropped on their own.
pub fn ingest_payload(
    store: &mut FeedStore,
    payload: &str,
    now_ms: i64,
    observer: &dyn FeedObserver,
) -> FrameSummary {
    let mut summary = FrameSummary::default();

    for line in payload.split('\n') {
        let document_text = line.trim();
        if document_text.is_empty() {
            continue;
        }
        summary.documents += 1;

        let mut owned_document = document_text.as_bytes().to_vec();
        let document = match simd_json::serde::from_slice::<Value>(owned_document.as_mut_slice()) {
            Ok(document) => document,
            Err(error) => {
                let error = FeedError::from(error);
                debug!(%error, "dropping undecodable feed document");
                observer.on_decode_error(&error);
                summary.decode_errors += 1;
                continue;
            }
        };

        for record in normalize_document(document, now_ms) {
            let outcome = apply_record(store, &record);
            match &outcome {
                ApplyOutcome::Applied { .. } => summary.applied += 1,
                ApplyOutcome::Discarded { topic, .. } => {
                    debug!(topic = %topic, "discarding record without a usable value");
                    summary.discarded += 1;
                }
                ApplyOutcome::Ignored { .. } => summary.ignored += 1,
            }
            observer.on_record(&outcome);
        }
    }

    summary
}

pub fn refresh_charts(store: &RwLock<FeedStore>, charts: &RwLock<ChartCache>, now_ms: i64) -> usize {
    let histories: Vec<(String, Vec<HistoryPoint>)> = {
        let readable = store.read();
        let history = readable.history_store();
        history
            .symbols()
            .map(|symbol| (symbol.to_string(), history.read(symbol)))
            .collect()
    };

    let series: HashMap<String, Vec<HistoryPoint>> = histories
        .into_iter()
        .map(|(symbol, points)| {
            let decimated = decimate(&points, now_ms);
            (symbol, decimated)
        })
        .collect();
    let instruments = series.len();

    let mut writable = charts.write();
    writable.series = series;
    writable.refreshed_at = Some(now_ms);
    instruments
}

pub async fn run_feed_stream(
    config: FeedStreamConfig,
    store: Arc<RwLock<FeedStore>>,
    charts: Arc<RwLock<ChartCache>>,
    status_store: Arc<RwLock<FeedStatusSnapshot>>,
    observer: Arc<dyn FeedObserver>,
    cancel_token: CancellationToken,
) {
    let chart_cancel = cancel_token.clone();
    let chart_store = Arc::clone(&store);
    let chart_cache = Arc::clone(&charts);
    let chart_observer = Arc::clone(&observer);
    let chart_interval_ms = config.chart_refresh_interval_ms;
    let chart_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(chart_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = chart_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let instruments = refresh_charts(&chart_store, &chart_cache, now_unix_ms());
                    chart_observer.on_charts_refreshed(instruments);
                }
            }
        }
    });

    let context = StreamRuntimeContext {
        config: &config,
        store: &store,
        status_store: &status_store,
        observer: &observer,
    };

    let mut reconnect_attempt = 0_u32;
    while !cancel_token.is_cancelled() {
        let reason = if reconnect_attempt == 0 {
            "opening websocket stream".to_string()
        } else {
            format!("reconnect attempt {reconnect_attempt}")
        };
        publish_status(
            &context,
            ConnectionState::Connecting,
            reconnect_attempt,
            Some(reason),
        );

        let connect_result = tokio::select! {
            _ = cancel_token.cancelled() => break,
            result = connect_feed_stream(&config.endpoint, config.max_message_bytes) => result,
        };

        let close_reason = match connect_result {
            Ok(mut websocket_stream) => {
                reconnect_attempt = 0;
                info!(endpoint = %config.endpoint, "feed websocket connected");
                publish_status(
                    &context,
                    ConnectionState::Open,
                    reconnect_attempt,
                    Some("websocket connected".to_string()),
                );

                let mut close_reason = "websocket closed by peer".to_string();
                loop {
                    let frame = tokio::select! {
                        _ = cancel_token.cancelled() => {
                            publish_status(
                                &context,
                                ConnectionState::Closing,
                                reconnect_attempt,
                                Some("closing websocket stream".to_string()),
                            );
                            let _ = tokio::time::timeout(
                                Duration::from_millis(CLOSE_HANDSHAKE_TIMEOUT_MS),
                                websocket_stream.close(None),
                            )
                            .await;
                            break;
                        }
                        next_message = websocket_stream.next() => next_message,
                    };

                    let Some(frame_result) = frame else {
                        break;
                    };

                    match frame_result {
                        Ok(message) => match handle_message(message, &context) {
                            StreamDirective::Continue => {}
                            StreamDirective::Reconnect => break,
                        },
                        Err(error) => {
                            close_reason = format!("websocket frame error: {error}");
                            break;
                        }
                    }
                }

                if cancel_token.is_cancelled() {
                    break;
                }
                close_reason
            }
            Err(error) => {
                warn!(
                    endpoint = %config.endpoint,
                    attempt = reconnect_attempt,
                    %error,
                    "feed websocket connect failed"
                );
                format!("websocket connect error: {error}")
            }
        };

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        let delay = reconnect_delay(reconnect_attempt);
        info!(
            attempt = reconnect_attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %close_reason,
            "feed websocket closed, scheduling reconnect"
        );
        publish_status(
            &context,
            ConnectionState::Closed,
            reconnect_attempt,
            Some(close_reason),
        );

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    cancel_token.cancel();
    let _ = chart_handle.await;

    info!(endpoint = %config.endpoint, "feed stream stopped");
    publish_status(
        &context,
        ConnectionState::Closed,
        0,
        Some("stream stopped".to_string()),
    );
}

fn handle_message(message: Message, context: &StreamRuntimeContext<'_>) -> StreamDirective {
    let payload = match message {
        Message::Text(text_payload) => text_payload,
        Message::Binary(binary_payload) => String::from_utf8_lossy(&binary_payload).into_owned(),
        Message::Frame(frame) => String::from_utf8_lossy(&frame.into_data()).into_owned(),
        Message::Close(_) => return StreamDirective::Reconnect,
        Message::Ping(_) | Message::Pong(_) => return StreamDirective::Continue,
    };

    let started_at = Instant::now();
    let summary = {
        let mut writable = context.store.write();
        ingest_payload(
            &mut writable,
            &payload,
            now_unix_ms(),
            context.observer.as_ref(),
        )
    };
    let elapsed_us = started_at.elapsed().as_micros().min(u32::MAX as u128) as u32;
    context.observer.on_frame(summary.documents, elapsed_us);

    StreamDirective::Continue
}

fn publish_status(
    context: &StreamRuntimeContext<'_>,
    state: ConnectionState,
    reconnect_attempt: u32,
    reason: Option<String>,
) {
    let snapshot = FeedStatusSnapshot {
        state,
        reconnect_attempt,
        endpoint: context.config.endpoint.clone(),
        reason,
    };

    {
        let mut writable = context.status_store.write();
        *writable = snapshot.clone();
    }

    context.observer.on_status(&snapshot);
}
