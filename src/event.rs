use crate::engine::visibility::Visibility;

/// Render-facing updates emitted by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    NewTrack {
        metadata: TrackMetadata,
    },
    NewLyrics {
        song_label: String,
        lines: Vec<String>,
        is_synchronized: bool,
        source_label: Option<String>,
    },
    SwitchLyricLine {
        new_line: usize,
    },
    TrackProgress {
        new_progress_ms: u64,
        duration_ms: u64,
        /// Rolling mean of recent poll round trips.
        mean_latency_ms: Option<u64>,
    },
    OffsetChanged {
        offset_ms: i64,
        transient: bool,
    },
    OffsetFeedbackExpired,
    VisibilityChanged {
        visibility: Visibility,
    },
    SyncToggled {
        enabled: bool,
    },
}

/// User actions forwarded from the render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInput {
    LineUp,
    LineDown,
    OffsetIncrease,
    OffsetDecrease,
    ToggleSync,
    Show,
    Hide,
    ResetOverride,
    /// Drag, click or other activity with no effect of its own.
    Interaction,
    Quit,
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub track_id: String,
    pub track_name: String,
    pub track_artists: String,
    pub track_album: String,
    pub duration_ms: u64,
}
