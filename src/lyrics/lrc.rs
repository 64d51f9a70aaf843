//! Line-timestamped lyric parsing.
//!
//! Each eligible line starts with a fixed-width `[m:ss.cc]` or `[mm:ss.cc]`
//! prefix. Anything else is silently skipped.

use lazy_static::lazy_static;
use regex::Regex;

use super::{is_section_marker, LyricLine};

lazy_static! {
    static ref TIMESTAMP_LINE: Regex =
        Regex::new(r"^\[([0-9]{1,2}):([0-9]{2})\.([0-9]{2})\](.*)$").unwrap();
}

fn parse_line(line: &str) -> Option<LyricLine> {
    let captures = TIMESTAMP_LINE.captures(line)?;
    let minutes: u64 = captures[1].parse().ok()?;
    let seconds: u64 = captures[2].parse().ok()?;
    let centis: u64 = captures[3].parse().ok()?;

    let text = captures[4].trim();
    if text.is_empty() || is_section_marker(text) {
        return None;
    }

    let offset_ms = (minutes * 60 + seconds) * 1000 + centis * 10;
    Some(LyricLine::timed(offset_ms, text))
}

/// Parses a timestamped blob into lines ordered by offset. Ties keep their source order.
pub fn parse(blob: &str) -> Vec<LyricLine> {
    let mut lines = blob.lines().filter_map(parse_line).collect::<Vec<_>>();
    // stable: equal offsets keep source order
    lines.sort_by_key(|line| line.offset_ms);
    lines
}

/// Whether at least one line of the blob parses as a timed lyric line.
pub fn is_timestamped(blob: &str) -> bool {
    blob.lines().any(|line| parse_line(line).is_some())
}
