use crate::market::decimate::decimate;
use crate::market::types::{HistoryPoint, InstrumentSnapshot};
use crate::state::FeedState;

pub fn instrument_snapshot(state: &FeedState, symbol: &str) -> Option<InstrumentSnapshot> {
    state.store.read().snapshot(symbol)
}

pub fn instrument_history(state: &FeedState, symbol: &str) -> Vec<HistoryPoint> {
    state.store.read().history(symbol)
}

/// Head of the instrument's history, without copying the buffer.
pub fn latest_history_point(state: &FeedState, symbol: &str) -> Option<HistoryPoint> {
    state.store.read().history_store().latest(symbol)
}

pub fn history_depth(state: &FeedState, symbol: &str) -> usize {
    state.store.read().history_store().len(symbol)
}

/// Series last produced by the chart refresh timer.
pub fn instrument_chart(state: &FeedState, symbol: &str) -> Vec<HistoryPoint> {
    state.charts.read().series(symbol)
}

pub fn decimated_history(state: &FeedState, symbol: &str, now_ms: i64) -> Vec<HistoryPoint> {
    let history = instrument_history(state, symbol);
    decimate(&history, now_ms)
}

pub fn last_any_event_time(state: &FeedState) -> Option<i64> {
    state.store.read().last_any_event_time()
}

pub fn instrument_symbols(state: &FeedState) -> Vec<String> {
    state.store.read().symbols()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::pipeline::{ingest_payload, refresh_charts};
    use crate::market::telemetry::NoopObserver;

    fn seeded_state() -> FeedState {
        let state = FeedState::default();
        let payload = concat!(
            "{\"topic\":\"prices.tick\",\"ts\":1000,\"data\":{\"symbol\":\"QQQ\",\"last\":380.0}}\n",
            "{\"topic\":\"prices.tick\",\"ts\":1200,\"data\":{\"symbol\":\"IWM\",\"last\":190.0}}\n",
            "{\"topic\":\"inav.tick\",\"ts\":1500,\"data\":{\"etf_id\":\"QQQ\",\"inav\":379.8}}\n",
            "{\"topic\":\"fx.spot\",\"ts\":1700,\"data\":{\"pair\":\"EURUSD\",\"spot\":1.08}}"
        );
        {
            let mut writable = state.store.write();
            let _ = ingest_payload(&mut writable, payload, 0, &NoopObserver);
        }
        state
    }

    #[test]
    fn empty_state_answers_every_query() {
        let state = FeedState::default();

        assert!(instrument_snapshot(&state, "QQQ").is_none());
        assert!(instrument_history(&state, "QQQ").is_empty());
        assert!(latest_history_point(&state, "QQQ").is_none());
        assert_eq!(history_depth(&state, "QQQ"), 0);
        assert!(instrument_chart(&state, "QQQ").is_empty());
        assert!(decimated_history(&state, "QQQ", 1_000).is_empty());
        assert_eq!(last_any_event_time(&state), None);
        assert!(instrument_symbols(&state).is_empty());
    }

    #[test]
    fn queries_read_the_aggregated_store() {
        let state = seeded_state();

        let snapshot = instrument_snapshot(&state, "QQQ").expect("QQQ should be known");
        assert_eq!(snapshot.last_price, Some(380.0));
        assert_eq!(snapshot.inav, Some(379.8));
        assert_eq!(snapshot.last_update_time, 1_500);

        let history = instrument_history(&state, "QQQ");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].price, Some(380.0));
        assert_eq!(latest_history_point(&state, "QQQ"), history.last().copied());
        assert_eq!(history_depth(&state, "QQQ"), 2);
        assert_eq!(history_depth(&state, "IWM"), 1);

        assert_eq!(last_any_event_time(&state), Some(1_700));
        assert_eq!(
            instrument_symbols(&state),
            vec!["IWM".to_string(), "QQQ".to_string()]
        );
    }

    #[test]
    fn chart_reads_cached_series_until_refreshed() {
        let state = seeded_state();
        assert!(instrument_chart(&state, "QQQ").is_empty());

        let _ = refresh_charts(&state.store, &state.charts, 2_000);

        assert_eq!(
            instrument_chart(&state, "QQQ"),
            decimated_history(&state, "QQQ", 2_000)
        );
    }
}
