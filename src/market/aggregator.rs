use crate::market::fields::{
    resolve_identifier, resolve_number, BAND_LOWER_KEYS, BAND_UPPER_KEYS, INAV_FIELDS,
    PRICE_FIELDS,
};
use crate::market::history::HistoryStore;
use crate::market::types::{
    FeedRecord, HistoryPoint, InstrumentSnapshot, INAV_TOPIC_PREFIX, PRICES_TOPIC_PREFIX,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Price,
    Inav,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied { symbol: String, kind: RecordKind },
    Discarded { topic: String, kind: RecordKind },
    Ignored { topic: String },
}

/// Latest snapshot and bounded history per instrument. Only `apply_record`
/// mutates it.
#[derive(Debug)]
pub struct FeedStore {
    snapshots: HashMap<String, InstrumentSnapshot>,
    history: HistoryStore,
    last_any_event_time: Option<i64>,
}

impl FeedStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            snapshots: HashMap::new(),
            history: HistoryStore::new(history_capacity),
            last_any_event_time: None,
        }
    }

    pub fn snapshot(&self, symbol: &str) -> Option<InstrumentSnapshot> {
        self.snapshots.get(symbol).cloned()
    }

    pub fn history(&self, symbol: &str) -> Vec<HistoryPoint> {
        self.history.read(symbol)
    }

    pub fn history_store(&self) -> &HistoryStore {
        &self.history
    }

    pub fn last_any_event_time(&self) -> Option<i64> {
        self.last_any_event_time
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.snapshots.keys().cloned().collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn instrument_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Applies `mutate` to the instrument's snapshot, then appends a point
    /// carrying the full post-update field set. The point is stamped with
    /// `last_update_time`, so a late record from another topic never makes
    /// the buffer run backwards.
    fn update_instrument<F>(&mut self, symbol: &str, timestamp: i64, mutate: F)
    where
        F: FnOnce(&mut InstrumentSnapshot),
    {
        let snapshot = self
            .snapshots
            .entry(symbol.to_string())
            .or_insert_with(|| InstrumentSnapshot {
                last_update_time: timestamp,
                ..Default::default()
            });

        mutate(snapshot);
        snapshot.last_update_time = snapshot.last_update_time.max(timestamp);

        let point = snapshot.history_point(snapshot.last_update_time);
        self.history.append(symbol, point);
    }
}

pub fn apply_record(store: &mut FeedStore, record: &FeedRecord) -> ApplyOutcome {
    store.last_any_event_time = Some(
        store
            .last_any_event_time
            .map_or(record.timestamp, |seen| seen.max(record.timestamp)),
    );

    if record.topic.starts_with(PRICES_TOPIC_PREFIX) {
        apply_price(store, record.timestamp, &record.fields)
            .unwrap_or_else(|| discarded(record, RecordKind::Price))
    } else if record.topic.starts_with(INAV_TOPIC_PREFIX) {
        apply_inav(store, record.timestamp, &record.fields)
            .unwrap_or_else(|| discarded(record, RecordKind::Inav))
    } else {
        ApplyOutcome::Ignored {
            topic: record.topic.clone(),
        }
    }
}

fn discarded(record: &FeedRecord, kind: RecordKind) -> ApplyOutcome {
    ApplyOutcome::Discarded {
        topic: record.topic.clone(),
        kind,
    }
}

fn apply_price(
    store: &mut FeedStore,
    timestamp: i64,
    fields: &Map<String, Value>,
) -> Option<ApplyOutcome> {
    let price = resolve_number(fields, PRICE_FIELDS.value)?;
    let symbol = resolve_identifier(fields, PRICE_FIELDS.identifier);

    store.update_instrument(&symbol, timestamp, |snapshot| {
        snapshot.last_price = Some(price);
        snapshot.price_update_time = Some(timestamp);
    });

    Some(ApplyOutcome::Applied {
        symbol,
        kind: RecordKind::Price,
    })
}

fn apply_inav(
    store: &mut FeedStore,
    timestamp: i64,
    fields: &Map<String, Value>,
) -> Option<ApplyOutcome> {
    let inav = resolve_number(fields, INAV_FIELDS.value)?;
    let symbol = resolve_identifier(fields, INAV_FIELDS.identifier);
    let band_upper = resolve_number(fields, BAND_UPPER_KEYS);
    let band_lower = resolve_number(fields, BAND_LOWER_KEYS);

    store.update_instrument(&symbol, timestamp, |snapshot| {
        snapshot.inav = Some(inav);
        if band_upper.is_some() {
            snapshot.band_upper = band_upper;
        }
        if band_lower.is_some() {
            snapshot.band_lower = band_lower;
        }
        snapshot.inav_update_time = Some(timestamp);
    });

    Some(ApplyOutcome::Applied {
        symbol,
        kind: RecordKind::Inav,
    })
}
