pub mod lrc;
pub mod provider;

use provider::{LyricsBody, LyricsPayload};

/// A single displayable lyric line, optionally carrying the offset at which it becomes active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub text: String,
    pub offset_ms: Option<u64>,
}

impl LyricLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            offset_ms: None,
        }
    }

    pub fn timed(offset_ms: u64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            offset_ms: Some(offset_ms),
        }
    }
}

/// Lyrics for one track. Timestamped sets are ordered by offset, plain sets keep source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricSet {
    pub lines: Vec<LyricLine>,
    pub is_synchronized: bool,
    pub source: Option<String>,
}

impl LyricSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn synced(blob: &str, source: Option<String>) -> Self {
        Self {
            lines: lrc::parse(blob),
            is_synchronized: true,
            source,
        }
    }

    pub fn plain(blob: &str, max_lines: usize, source: Option<String>) -> Self {
        Self {
            lines: format_plain(blob, max_lines),
            is_synchronized: false,
            source,
        }
    }

    /// Builds a set from a provider payload. Plain text that turns out to
    /// carry timestamps is treated as synchronized.
    pub fn from_payload(payload: LyricsPayload, max_plain_lines: usize) -> Self {
        let source = Some(payload.source);
        match payload.body {
            LyricsBody::Synced(blob) => Self::synced(&blob, source),
            LyricsBody::Plain(blob) if lrc::is_timestamped(&blob) => Self::synced(&blob, source),
            LyricsBody::Plain(blob) => Self::plain(&blob, max_plain_lines, source),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines.iter().map(|it| it.text.clone()).collect()
    }
}

/// Whether a trimmed line is nothing but a bracketed section label such as `[Chorus]`.
pub fn is_section_marker(line: &str) -> bool {
    line.len() >= 2 && line.starts_with('[') && line.ends_with(']')
}

/// Splits plain lyrics into display lines, dropping blanks and section markers.
/// `max_lines == 0` keeps every line.
pub fn format_plain(blob: &str, max_lines: usize) -> Vec<LyricLine> {
    let limit = if max_lines == 0 { usize::MAX } else { max_lines };
    blob.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_section_marker(line))
        .take(limit)
        .map(LyricLine::plain)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_formatting_drops_blanks_and_markers() {
        let lines = format_plain("[Verse 1]\n  first line \n\n   \n[Chorus]\nsecond [loud] line\n", 0);
        assert_eq!(
            lines,
            vec![
                LyricLine::plain("first line"),
                LyricLine::plain("second [loud] line")
            ]
        );
    }

    #[test]
    fn plain_formatting_caps_line_count() {
        let blob = (0..80).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let lines = format_plain(&blob, 50);
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[49].text, "line 49");
    }

    #[test]
    fn timestamped_plain_payload_becomes_synchronized() {
        let payload = LyricsPayload {
            body: LyricsBody::Plain("[00:01.00]Hello\n[00:02.00]World".to_owned()),
            source: "test".to_owned(),
        };
        let set = LyricSet::from_payload(payload, 50);
        assert!(set.is_synchronized);
        assert_eq!(set.len(), 2);
        assert_eq!(set.source.as_deref(), Some("test"));
    }

    #[test]
    fn plain_payload_stays_unsynchronized() {
        let payload = LyricsPayload {
            body: LyricsBody::Plain("Hello\nWorld".to_owned()),
            source: "test".to_owned(),
        };
        let set = LyricSet::from_payload(payload, 50);
        assert!(!set.is_synchronized);
        assert_eq!(set.texts(), vec!["Hello".to_owned(), "World".to_owned()]);
    }

    #[test]
    fn blank_timestamp_keeps_plain_payload_lines() {
        let payload = LyricsPayload {
            body: LyricsBody::Plain("[00:00.00]\nHello\nWorld".to_owned()),
            source: "test".to_owned(),
        };
        let set = LyricSet::from_payload(payload, 50);
        assert!(!set.is_synchronized);
        assert_eq!(set.texts(), vec!["Hello".to_owned(), "World".to_owned()]);
    }
}
