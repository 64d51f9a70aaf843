//! Playback-synchronized lyric positioning.
//!
//! [`SyncEngine`] owns every piece of mutable timing state for one display
//! surface. It is driven by three kinds of events (playback samples, user
//! input and timer ticks) and answers each with the [`StatusEvent`]s the
//! render target should apply. Nothing in here blocks or fails: malformed
//! or stale input is absorbed locally.

use tracing::{debug, trace};

use crate::{
    event::{StatusEvent, UserInput},
    lyrics::LyricSet,
};

pub mod estimator;
pub mod latency;
pub mod offset;
pub mod timer;
pub mod visibility;

use latency::{compensate, LatencyWindow};
use offset::{OffsetController, DEFAULT_FEEDBACK_MS};
use visibility::{Visibility, VisibilityScheduler, DEFAULT_HIDE_DELAY_MS};

/// One reading of the remote player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSample {
    /// Monotonic per-poller counter, used to drop out-of-order deliveries.
    pub sequence: u64,
    pub elapsed_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    /// Round trip of the request that produced this sample.
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingState {
    pub offset_ms: i64,
    pub current_line_index: usize,
    pub is_synchronized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub initial_offset_ms: i64,
    pub hide_delay_ms: u64,
    pub feedback_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            initial_offset_ms: 0,
            hide_delay_ms: DEFAULT_HIDE_DELAY_MS,
            feedback_ms: DEFAULT_FEEDBACK_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncEngine {
    lyrics: LyricSet,
    timing: TimingState,
    auto_sync: bool,
    last_sequence: Option<u64>,
    /// Latency-compensated elapsed time of the last accepted sample, before the offset.
    compensated_ms: Option<u64>,
    duration_ms: u64,
    latency: LatencyWindow,
    offset: OffsetController,
    visibility: VisibilityScheduler,
}

impl SyncEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let offset = OffsetController::new(settings.initial_offset_ms, settings.feedback_ms);
        Self {
            lyrics: LyricSet::empty(),
            timing: TimingState {
                offset_ms: offset.offset_ms(),
                current_line_index: 0,
                is_synchronized: false,
            },
            auto_sync: true,
            last_sequence: None,
            compensated_ms: None,
            duration_ms: 0,
            latency: LatencyWindow::default(),
            offset,
            visibility: VisibilityScheduler::new(settings.hide_delay_ms),
        }
    }

    pub fn timing_state(&self) -> TimingState {
        self.timing
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility.state()
    }

    /// Events that bring a freshly attached render target up to the current state.
    pub fn snapshot_events(&self) -> Vec<StatusEvent> {
        vec![
            StatusEvent::OffsetChanged {
                offset_ms: self.timing.offset_ms,
                transient: self.offset.feedback_active(),
            },
            StatusEvent::VisibilityChanged {
                visibility: self.visibility(),
            },
            StatusEvent::SyncToggled {
                enabled: self.auto_sync,
            },
        ]
    }

    /// Replaces the lyric set for a new track. The offset is a user preference and survives.
    pub fn load_lyrics(&mut self, song_label: String, lyrics: LyricSet) -> StatusEvent {
        debug!(
            lines = lyrics.len(),
            synchronized = lyrics.is_synchronized,
            source = ?lyrics.source,
            "loading lyrics"
        );
        self.timing.is_synchronized = lyrics.is_synchronized;
        self.timing.current_line_index = 0;
        self.lyrics = lyrics;
        StatusEvent::NewLyrics {
            song_label,
            lines: self.lyrics.texts(),
            is_synchronized: self.timing.is_synchronized,
            source_label: self.lyrics.source.clone(),
        }
    }

    pub fn on_sample(&mut self, sample: PlaybackSample, now_ms: u64) -> Vec<StatusEvent> {
        if let Some(last) = self.last_sequence {
            if sample.sequence <= last {
                debug!(sequence = sample.sequence, last, "dropping out-of-order sample");
                return Vec::new();
            }
        }
        self.last_sequence = Some(sample.sequence);
        self.latency.push(sample.latency_ms);
        let mean_latency_ms = self.latency.mean_ms().map(|mean| mean.round() as u64);
        trace!(round_trip_ms = sample.latency_ms, ?mean_latency_ms, "playback sample");

        let compensated = compensate(sample.elapsed_ms, sample.latency_ms);
        self.compensated_ms = Some(compensated);
        self.duration_ms = sample.duration_ms;

        let mut events = vec![StatusEvent::TrackProgress {
            new_progress_ms: compensated,
            duration_ms: sample.duration_ms,
            mean_latency_ms,
        }];
        if let Some(visibility) = self.visibility.on_sample(sample.is_playing, now_ms) {
            events.push(StatusEvent::VisibilityChanged { visibility });
        }
        events.extend(self.resync());
        events
    }

    /// Expires due timers.
    pub fn tick(&mut self, now_ms: u64) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        if let Some(visibility) = self.visibility.tick(now_ms) {
            events.push(StatusEvent::VisibilityChanged { visibility });
        }
        if self.offset.expire_feedback(now_ms) {
            events.push(StatusEvent::OffsetFeedbackExpired);
        }
        events
    }

    pub fn handle_input(&mut self, input: UserInput, now_ms: u64) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        match input {
            UserInput::Show => {
                events.extend(self.visibility.manual_show().map(visibility_changed));
                return events;
            }
            UserInput::Hide => {
                events.extend(self.visibility.manual_hide().map(visibility_changed));
                return events;
            }
            _ => self.visibility.interaction(),
        }

        match input {
            UserInput::LineUp => {
                events.extend(self.move_to(self.timing.current_line_index.saturating_sub(1)));
            }
            UserInput::LineDown => {
                events.extend(self.move_to(self.timing.current_line_index + 1));
            }
            UserInput::OffsetIncrease | UserInput::OffsetDecrease => {
                let offset_ms = if input == UserInput::OffsetIncrease {
                    self.offset.increase(now_ms)
                } else {
                    self.offset.decrease(now_ms)
                };
                debug!(offset_ms, "offset adjusted");
                self.timing.offset_ms = offset_ms;
                events.push(StatusEvent::OffsetChanged {
                    offset_ms,
                    transient: self.offset.feedback_active(),
                });
                events.extend(self.resync());
            }
            UserInput::ToggleSync => {
                self.auto_sync = !self.auto_sync;
                debug!(enabled = self.auto_sync, "sync toggled");
                events.push(StatusEvent::SyncToggled {
                    enabled: self.auto_sync,
                });
                events.extend(self.resync());
            }
            UserInput::ResetOverride => self.visibility.reset_override(),
            UserInput::Interaction | UserInput::Quit | UserInput::Show | UserInput::Hide => {}
        }
        events
    }

    /// Re-estimates from the last accepted sample when sync is on.
    fn resync(&mut self) -> Option<StatusEvent> {
        if !self.auto_sync {
            return None;
        }
        let compensated = self.compensated_ms?;
        let adjusted = self.offset.apply(compensated);
        let target = estimator::estimate(
            &self.lyrics.lines,
            self.timing.is_synchronized,
            adjusted,
            self.duration_ms,
        );
        self.move_to(target)
    }

    /// Moves the current line, emitting only when the index actually changes.
    fn move_to(&mut self, index: usize) -> Option<StatusEvent> {
        let index = index.min(self.lyrics.len().saturating_sub(1));
        if index == self.timing.current_line_index {
            return None;
        }
        self.timing.current_line_index = index;
        Some(StatusEvent::SwitchLyricLine { new_line: index })
    }
}

fn visibility_changed(visibility: Visibility) -> StatusEvent {
    StatusEvent::VisibilityChanged { visibility }
}
