use std::sync::{Arc, Mutex};

use crate::{
    config::LyricsyncConfig,
    engine::visibility::Visibility,
    event::{StatusEvent, TrackMetadata, UserInput},
};

pub type SyncDisplay = Arc<Mutex<DisplayState>>;

/// Everything the render target needs to draw one frame.
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub song_label: String,
    pub lines: Vec<String>,
    pub is_synchronized: bool,
    pub source_label: Option<String>,
    pub current_line: usize,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub mean_latency_ms: Option<u64>,
    pub track_data: TrackMetadata,
    pub offset_ms: i64,
    pub offset_banner: bool,
    pub visibility: Visibility,
    pub sync_enabled: bool,
    /// Set once the session stops sending updates.
    pub closed: bool,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            song_label: String::new(),
            lines: Vec::new(),
            is_synchronized: false,
            source_label: None,
            current_line: 0,
            progress_ms: 0,
            duration_ms: 0,
            mean_latency_ms: None,
            track_data: TrackMetadata::default(),
            offset_ms: 0,
            offset_banner: false,
            visibility: Visibility::Hidden,
            sync_enabled: true,
            closed: false,
        }
    }
}

impl DisplayState {
    pub fn apply(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::NewTrack { metadata } => {
                self.duration_ms = metadata.duration_ms;
                self.progress_ms = 0;
                self.track_data = metadata;
            }
            StatusEvent::NewLyrics {
                song_label,
                lines,
                is_synchronized,
                source_label,
            } => {
                self.song_label = song_label;
                self.lines = lines;
                self.is_synchronized = is_synchronized;
                self.source_label = source_label;
                self.current_line = 0;
            }
            StatusEvent::SwitchLyricLine { new_line } => self.current_line = new_line,
            StatusEvent::TrackProgress {
                new_progress_ms,
                duration_ms,
                mean_latency_ms,
            } => {
                self.progress_ms = new_progress_ms;
                self.duration_ms = duration_ms;
                self.mean_latency_ms = mean_latency_ms;
            }
            StatusEvent::OffsetChanged {
                offset_ms,
                transient,
            } => {
                self.offset_ms = offset_ms;
                self.offset_banner = transient;
            }
            StatusEvent::OffsetFeedbackExpired => self.offset_banner = false,
            StatusEvent::VisibilityChanged { visibility } => self.visibility = visibility,
            StatusEvent::SyncToggled { enabled } => self.sync_enabled = enabled,
        }
    }
}

#[async_trait::async_trait]
pub trait DisplayBackend {
    async fn run_backend(
        &mut self,
        display: SyncDisplay,
        config: Arc<LyricsyncConfig>,
        input_tx: flume::Sender<UserInput>,
    ) -> anyhow::Result<()>;
}

pub struct DisplayHandler<T: DisplayBackend> {
    display: SyncDisplay,
    backend: T,
}

impl<T: DisplayBackend + Send + Sync + 'static> DisplayHandler<T> {
    pub fn new(backend: T) -> Self {
        Self {
            display: Default::default(),
            backend,
        }
    }

    pub async fn run(
        mut self,
        event_rx: flume::Receiver<StatusEvent>,
        input_tx: flume::Sender<UserInput>,
        config: Arc<LyricsyncConfig>,
    ) -> anyhow::Result<()> {
        let display_w = self.display.clone();
        let display_r = self.display;
        let event_handler =
            tokio::task::spawn(async move { Self::run_event_handler(display_w, event_rx).await });
        let backend_handler = tokio::task::spawn(async move {
            self.backend.run_backend(display_r, config, input_tx).await
        });
        let (events, backend) = tokio::join!(event_handler, backend_handler);
        events??;
        backend??;
        Ok(())
    }

    async fn run_event_handler(
        display: SyncDisplay,
        event_rx: flume::Receiver<StatusEvent>,
    ) -> anyhow::Result<()> {
        while let Ok(event) = event_rx.recv_async().await {
            display.lock().unwrap().apply(event);
        }
        display.lock().unwrap().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lyrics_reset_the_highlighted_line() {
        let mut state = DisplayState::default();
        state.apply(StatusEvent::SwitchLyricLine { new_line: 7 });
        state.apply(StatusEvent::NewLyrics {
            song_label: "Song - Artist".to_owned(),
            lines: vec!["a".to_owned()],
            is_synchronized: true,
            source_label: Some("LRCLIB".to_owned()),
        });
        assert_eq!(state.current_line, 0);
        assert_eq!(state.song_label, "Song - Artist");
        assert!(state.is_synchronized);
    }

    #[test]
    fn offset_banner_follows_feedback() {
        let mut state = DisplayState::default();
        state.apply(StatusEvent::OffsetChanged {
            offset_ms: 500,
            transient: true,
        });
        assert!(state.offset_banner);
        assert_eq!(state.offset_ms, 500);
        state.apply(StatusEvent::OffsetFeedbackExpired);
        assert!(!state.offset_banner);
        assert_eq!(state.offset_ms, 500);
    }

    #[test]
    fn progress_carries_latency_estimate() {
        let mut state = DisplayState::default();
        state.apply(StatusEvent::TrackProgress {
            new_progress_ms: 61_000,
            duration_ms: 180_000,
            mean_latency_ms: Some(140),
        });
        assert_eq!(state.progress_ms, 61_000);
        assert_eq!(state.mean_latency_ms, Some(140));
    }

    #[tokio::test]
    async fn event_handler_marks_closed_when_session_ends() {
        let display: SyncDisplay = Default::default();
        let (tx, rx) = flume::unbounded();
        tx.send(StatusEvent::VisibilityChanged {
            visibility: Visibility::Visible,
        })
        .unwrap();
        drop(tx);

        struct NoBackend;
        #[async_trait::async_trait]
        impl DisplayBackend for NoBackend {
            async fn run_backend(
                &mut self,
                _display: SyncDisplay,
                _config: Arc<LyricsyncConfig>,
                _input_tx: flume::Sender<UserInput>,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        DisplayHandler::<NoBackend>::run_event_handler(display.clone(), rx)
            .await
            .unwrap();
        let state = display.lock().unwrap();
        assert_eq!(state.visibility, Visibility::Visible);
        assert!(state.closed);
    }
}
