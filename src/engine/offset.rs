use super::timer::Timer;

pub const OFFSET_STEP_MS: i64 = 250;
pub const MIN_OFFSET_MS: i64 = -5000;
pub const MAX_OFFSET_MS: i64 = 10_000;
pub const DEFAULT_FEEDBACK_MS: u64 = 2000;

/// User-tunable bias added to every elapsed time before line estimation.
#[derive(Debug, Clone)]
pub struct OffsetController {
    offset_ms: i64,
    feedback: Timer,
    feedback_ms: u64,
}

impl OffsetController {
    pub fn new(initial_offset_ms: i64, feedback_ms: u64) -> Self {
        Self {
            offset_ms: initial_offset_ms.clamp(MIN_OFFSET_MS, MAX_OFFSET_MS),
            feedback: Timer::default(),
            feedback_ms,
        }
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    pub fn increase(&mut self, now_ms: u64) -> i64 {
        self.step(OFFSET_STEP_MS, now_ms)
    }

    pub fn decrease(&mut self, now_ms: u64) -> i64 {
        self.step(-OFFSET_STEP_MS, now_ms)
    }

    fn step(&mut self, delta_ms: i64, now_ms: u64) -> i64 {
        self.offset_ms = (self.offset_ms + delta_ms).clamp(MIN_OFFSET_MS, MAX_OFFSET_MS);
        // supersedes any pending clear
        self.feedback.arm(now_ms, self.feedback_ms);
        self.offset_ms
    }

    /// `max(0, elapsed + offset)`
    pub fn apply(&self, elapsed_ms: u64) -> u64 {
        let elapsed = i64::try_from(elapsed_ms).unwrap_or(i64::MAX);
        elapsed.saturating_add(self.offset_ms).max(0) as u64
    }

    pub fn feedback_active(&self) -> bool {
        self.feedback.is_armed()
    }

    /// Returns `true` once when the on-screen feedback should be cleared.
    pub fn expire_feedback(&mut self, now_ms: u64) -> bool {
        self.feedback.fire(now_ms)
    }
}

impl Default for OffsetController {
    fn default() -> Self {
        Self::new(0, DEFAULT_FEEDBACK_MS)
    }
}
