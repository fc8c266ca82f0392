use crate::market::aggregator::FeedStore;
use crate::market::gateway::resolve_endpoint;
use crate::market::pipeline::ChartCache;
use crate::market::telemetry::{FeedObserver, NoopObserver};
use crate::market::types::{
    FeedStatusSnapshot, DEFAULT_HISTORY_CAPACITY, DEFAULT_HOST, DEFAULT_SECURE,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct FeedStreamHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
}

/// Everything the query surface reads. The running stream task is the only
/// writer of `store`, `charts` and `feed_status`.
pub struct FeedState {
    pub started_at: Instant,
    pub store: Arc<RwLock<FeedStore>>,
    pub charts: Arc<RwLock<ChartCache>>,
    pub feed_status: Arc<RwLock<FeedStatusSnapshot>>,
    pub observer: Arc<dyn FeedObserver>,
    pub feed_stream: Mutex<Option<FeedStreamHandle>>,
}

impl FeedState {
    pub fn new(observer: Arc<dyn FeedObserver>) -> Self {
        let endpoint = resolve_endpoint(None, DEFAULT_SECURE, DEFAULT_HOST).unwrap_or_default();
        let feed_status = FeedStatusSnapshot::closed(endpoint, Some("stream idle".to_string()));

        Self {
            started_at: Instant::now(),
            store: Arc::new(RwLock::new(FeedStore::new(DEFAULT_HISTORY_CAPACITY))),
            charts: Arc::new(RwLock::new(ChartCache::default())),
            feed_status: Arc::new(RwLock::new(feed_status)),
            observer,
            feed_stream: Mutex::new(None),
        }
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(Arc::new(NoopObserver))
    }
}
