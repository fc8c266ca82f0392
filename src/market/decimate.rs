use crate::market::types::HistoryPoint;

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeTier {
    /// Exclusive upper bound on `now - t`; `None` for the oldest tier.
    pub max_age_ms: Option<i64>,
    pub spacing_ms: i64,
}

pub const TIER_COUNT: usize = 4;

pub const AGE_TIERS: [AgeTier; TIER_COUNT] = [
    AgeTier {
        max_age_ms: Some(2 * MINUTE_MS),
        spacing_ms: SECOND_MS,
    },
    AgeTier {
        max_age_ms: Some(10 * MINUTE_MS),
        spacing_ms: 5 * SECOND_MS,
    },
    AgeTier {
        max_age_ms: Some(60 * MINUTE_MS),
        spacing_ms: 30 * SECOND_MS,
    },
    AgeTier {
        max_age_ms: None,
        spacing_ms: 5 * MINUTE_MS,
    },
];

pub fn tier_index(age_ms: i64) -> usize {
    AGE_TIERS
        .iter()
        .position(|tier| tier.max_age_ms.map_or(true, |max_age| age_ms < max_age))
        .unwrap_or(TIER_COUNT - 1)
}

/// Recency-weighted thinning of a chronological series: recent points stay
/// dense, older ones are spaced out. The last input point is always kept.
pub fn decimate(series: &[HistoryPoint], now_ms: i64) -> Vec<HistoryPoint> {
    let Some(last_index) = series.len().checked_sub(1) else {
        return Vec::new();
    };

    let mut last_kept: [Option<i64>; TIER_COUNT] = [None; TIER_COUNT];
    let mut kept = Vec::with_capacity(series.len().min(1_024));

    for (index, point) in series.iter().enumerate() {
        let tier = tier_index(now_ms.saturating_sub(point.t));
        let spacing_ok = last_kept[tier]
            .map(|previous| point.t.saturating_sub(previous) >= AGE_TIERS[tier].spacing_ms)
            .unwrap_or(true);

        if spacing_ok || index == last_index {
            last_kept[tier] = Some(point.t);
            kept.push(*point);
        }
    }

    kept
}
