//! Maps an adjusted elapsed time onto a lyric line index.
//!
//! Timestamped sets use the exact per-line offsets. Plain sets fall back to a
//! piecewise curve that compresses the instrumental intro and outro, where a
//! straight `elapsed / duration` mapping runs ahead of the singer.

use crate::lyrics::LyricLine;

const INTRO_END: f64 = 0.12;
const OUTRO_START: f64 = 0.92;
const INTRO_SLOPE: f64 = 0.3;
const BODY_BASE: f64 = 0.3;
const BODY_SPAN: f64 = 0.55;
const OUTRO_BASE: f64 = 0.85;
const OUTRO_SLOPE: f64 = 1.5;

/// Picks the current line for the given set, clamped to `[0, len - 1]`.
pub fn estimate(lines: &[LyricLine], is_synchronized: bool, elapsed_ms: u64, duration_ms: u64) -> usize {
    if is_synchronized {
        timestamp_index(lines, elapsed_ms)
    } else {
        heuristic_index(elapsed_ms, duration_ms, lines.len())
    }
}

/// Last line whose offset is `<= elapsed_ms`, or 0 when none has started yet.
///
/// `lines` must be ordered by offset.
pub fn timestamp_index(lines: &[LyricLine], elapsed_ms: u64) -> usize {
    let started = lines.partition_point(|line| line.offset_ms.map_or(true, |offset| offset <= elapsed_ms));
    started.saturating_sub(1)
}

/// Song-structure curve applied to the playback fraction `p`, clamped to `[0, 1]`.
pub fn adjusted_progress(p: f64) -> f64 {
    let adjusted = if p < INTRO_END {
        p * INTRO_SLOPE
    } else if p <= OUTRO_START {
        BODY_BASE + ((p - INTRO_END) / (OUTRO_START - INTRO_END)) * BODY_SPAN
    } else {
        OUTRO_BASE + (p - OUTRO_START) * OUTRO_SLOPE
    };
    adjusted.clamp(0.0, 1.0)
}

pub fn heuristic_index(elapsed_ms: u64, duration_ms: u64, line_count: usize) -> usize {
    if line_count == 0 || duration_ms == 0 {
        return 0;
    }
    let p = elapsed_ms as f64 / duration_ms as f64;
    let index = (adjusted_progress(p) * line_count as f64).floor() as usize;
    index.min(line_count - 1)
}
