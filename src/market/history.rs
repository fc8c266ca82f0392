use crate::market::types::HistoryPoint;
use std::collections::{HashMap, VecDeque};

/// Per-instrument append-only point buffers, bounded by count.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    buffers: HashMap<String, VecDeque<HistoryPoint>>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&mut self, symbol: &str, point: HistoryPoint) {
        let capacity = self.capacity;
        let buffer = self
            .buffers
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity.min(1_024)));

        buffer.push_back(point);
        if buffer.len() > capacity {
            let overflow = buffer.len() - capacity;
            buffer.drain(..overflow);
        }
    }

    /// Copy of the buffer at call time; empty for an unknown symbol.
    pub fn read(&self, symbol: &str) -> Vec<HistoryPoint> {
        self.buffers
            .get(symbol)
            .map(|buffer| buffer.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, symbol: &str) -> Option<HistoryPoint> {
        self.buffers.get(symbol).and_then(|buffer| buffer.back().copied())
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.buffers.get(symbol).map_or(0, VecDeque::len)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(t: i64, price: f64) -> HistoryPoint {
        HistoryPoint {
            t,
            price: Some(price),
            inav: None,
            band_upper: None,
            band_lower: None,
        }
    }

    #[test]
    fn unknown_symbol_reads_empty() {
        let store = HistoryStore::new(10);
        assert!(store.read("NOPE").is_empty());
        assert!(store.latest("NOPE").is_none());
        assert_eq!(store.len("NOPE"), 0);
    }

    #[test]
    fn evicts_oldest_points_beyond_capacity() {
        let capacity = 60;
        let mut store = HistoryStore::new(capacity);
        for step in 0..250 {
            store.append("SPY", point(step, step as f64));
        }

        let history = store.read("SPY");
        assert_eq!(history.len(), capacity);
        let expected: Vec<i64> = (190..250).collect();
        let retained: Vec<i64> = history.iter().map(|point| point.t).collect();
        assert_eq!(retained, expected);
    }

    #[test]
    fn read_returns_independent_copy() {
        let mut store = HistoryStore::new(10);
        store.append("SPY", point(1, 1.0));
        let before = store.read("SPY");

        store.append("SPY", point(2, 2.0));
        assert_eq!(before.len(), 1);
        assert_eq!(store.read("SPY").len(), 2);
    }

    #[test]
    fn buffers_are_per_symbol() {
        let mut store = HistoryStore::new(10);
        store.append("A", point(1, 1.0));
        store.append("B", point(1, 2.0));
        store.append("B", point(2, 3.0));

        assert_eq!(store.len("A"), 1);
        assert_eq!(store.len("B"), 2);
        assert_eq!(store.latest("B").map(|point| point.price), Some(Some(3.0)));

        let mut symbols: Vec<&str> = store.symbols().collect();
        symbols.sort_unstable();
        assert_eq!(symbols, vec!["A", "B"]);
    }
}
