use std::collections::VecDeque;

pub const LATENCY_WINDOW_LEN: usize = 20;

/// Rolling record of the most recent poll round trips.
///
/// Only used for diagnostics. Position compensation uses each sample's own
/// round trip, see [`compensate`].
#[derive(Debug, Clone, Default)]
pub struct LatencyWindow {
    round_trips_ms: VecDeque<u64>,
}

impl LatencyWindow {
    pub fn push(&mut self, round_trip_ms: u64) {
        if self.round_trips_ms.len() == LATENCY_WINDOW_LEN {
            self.round_trips_ms.pop_front();
        }
        self.round_trips_ms.push_back(round_trip_ms);
    }

    pub fn mean_ms(&self) -> Option<f64> {
        if self.round_trips_ms.is_empty() {
            return None;
        }
        let total: u64 = self.round_trips_ms.iter().sum();
        Some(total as f64 / self.round_trips_ms.len() as f64)
    }
}

/// Shifts a reported elapsed time forward by the round trip of the request that read it.
pub fn compensate(elapsed_ms: u64, round_trip_ms: u64) -> u64 {
    elapsed_ms.saturating_add(round_trip_ms)
}
