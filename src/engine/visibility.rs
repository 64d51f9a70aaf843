//! Show/hide scheduling for the display surface.
//!
//! Playback starting shows the surface right away. Playback stopping only
//! hides it after a grace period, and only on the playing -> paused edge, so a
//! long run of paused samples arms the timer once. A manual hide pins the
//! surface hidden until a manual show or an explicit reset.

use tracing::debug;

use super::timer::Timer;

pub const DEFAULT_HIDE_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Hidden,
    Visible,
}

#[derive(Debug, Clone)]
pub struct VisibilityScheduler {
    state: Visibility,
    manually_overridden: bool,
    was_playing: bool,
    hide_timer: Timer,
    hide_delay_ms: u64,
}

impl VisibilityScheduler {
    pub fn new(hide_delay_ms: u64) -> Self {
        Self {
            state: Visibility::Hidden,
            manually_overridden: false,
            was_playing: false,
            hide_timer: Timer::default(),
            hide_delay_ms,
        }
    }

    pub fn state(&self) -> Visibility {
        self.state
    }

    #[cfg(test)]
    pub fn is_manually_overridden(&self) -> bool {
        self.manually_overridden
    }

    #[cfg(test)]
    pub fn hide_pending(&self) -> bool {
        self.hide_timer.is_armed()
    }

    /// Feeds the playing flag of an accepted sample. Returns the new state if it changed.
    pub fn on_sample(&mut self, is_playing: bool, now_ms: u64) -> Option<Visibility> {
        let was_playing = std::mem::replace(&mut self.was_playing, is_playing);

        if is_playing {
            self.hide_timer.cancel();
            if self.state == Visibility::Hidden && !self.manually_overridden {
                return self.transition(Visibility::Visible);
            }
        } else if was_playing && self.state == Visibility::Visible {
            debug!(delay_ms = self.hide_delay_ms, "playback stopped, arming hide timer");
            self.hide_timer.arm(now_ms, self.hide_delay_ms);
        }
        None
    }

    /// Expires the hide timer. Returns the new state if it changed.
    pub fn tick(&mut self, now_ms: u64) -> Option<Visibility> {
        if self.hide_timer.fire(now_ms) && !self.was_playing && self.state == Visibility::Visible {
            return self.transition(Visibility::Hidden);
        }
        None
    }

    pub fn manual_show(&mut self) -> Option<Visibility> {
        self.manually_overridden = false;
        self.hide_timer.cancel();
        self.transition(Visibility::Visible)
    }

    pub fn manual_hide(&mut self) -> Option<Visibility> {
        self.manually_overridden = true;
        self.hide_timer.cancel();
        self.transition(Visibility::Hidden)
    }

    /// Clears a manual hide so the next playing sample can show the surface again.
    pub fn reset_override(&mut self) {
        self.manually_overridden = false;
    }

    /// Drag/click/keyboard activity: keeps the surface up without overriding it.
    pub fn interaction(&mut self) {
        if self.hide_timer.cancel() {
            debug!("interaction cancelled pending hide");
        }
    }

    fn transition(&mut self, next: Visibility) -> Option<Visibility> {
        if self.state == next {
            return None;
        }
        debug!(from = ?self.state, to = ?next, "visibility changed");
        self.state = next;
        Some(next)
    }
}

impl Default for VisibilityScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_HIDE_DELAY_MS)
    }
}
