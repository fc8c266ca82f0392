use crate::error::FeedError;
use crate::market::aggregator::FeedStore;
use crate::market::pipeline::{run_feed_stream, ChartCache};
use crate::market::types::{
    FeedStatusSnapshot, FeedStreamArgs, FeedStreamSession, FeedStreamStopResult,
};
use crate::state::{FeedState, FeedStreamHandle};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Starts a new ingestion session, replacing any running one. Each session
/// begins with an empty store sized to the configured history capacity.
pub async fn start_feed_stream(
    state: &FeedState,
    args: Option<FeedStreamArgs>,
) -> Result<FeedStreamSession, FeedError> {
    let config = args.unwrap_or_default().normalize()?;

    let mut stream_slot = state.feed_stream.lock().await;
    if let Some(handle) = stream_slot.take() {
        info!("replacing running feed stream");
        shutdown(handle).await;
    }

    *state.store.write() = FeedStore::new(config.history_capacity);
    *state.charts.write() = ChartCache::default();

    let cancellation_token = CancellationToken::new();
    let join_handle = tokio::spawn(run_feed_stream(
        config.clone(),
        Arc::clone(&state.store),
        Arc::clone(&state.charts),
        Arc::clone(&state.feed_status),
        Arc::clone(&state.observer),
        cancellation_token.clone(),
    ));

    *stream_slot = Some(FeedStreamHandle {
        cancellation_token,
        join_handle,
    });

    Ok(FeedStreamSession::from_config(&config))
}

/// Cancels the running session and waits for it to wind down. Calling it
/// with nothing running is a no-op reporting `stopped: false`.
pub async fn stop_feed_stream(state: &FeedState) -> FeedStreamStopResult {
    let existing_handle = {
        let mut stream_slot = state.feed_stream.lock().await;
        stream_slot.take()
    };

    let Some(handle) = existing_handle else {
        return FeedStreamStopResult { stopped: false };
    };
    shutdown(handle).await;

    {
        let mut writable = state.feed_status.write();
        let endpoint = writable.endpoint.clone();
        *writable =
            FeedStatusSnapshot::closed(endpoint, Some("stream stopped by command".to_string()));
    }

    FeedStreamStopResult { stopped: true }
}

pub fn feed_stream_status(state: &FeedState) -> FeedStatusSnapshot {
    state.feed_status.read().clone()
}

pub async fn feed_stream_running(state: &FeedState) -> bool {
    state
        .feed_stream
        .lock()
        .await
        .as_ref()
        .is_some_and(|handle| !handle.join_handle.is_finished())
}

async fn shutdown(handle: FeedStreamHandle) {
    handle.cancellation_token.cancel();
    if let Err(error) = handle.join_handle.await {
        warn!(%error, "feed stream task ended abnormally");
    }
}
