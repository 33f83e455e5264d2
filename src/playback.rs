//! Playback clock for the clone field.
//!
//! Time either advances with the frame delta (`FreeRunning`) or is owned by an
//! external sequencer that scrubs it with explicit seeks
//! (`ExternallyControlled`). Seeking is only accepted in the latter state.

use std::fmt;

/// Who moves the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// `t` advances by the elapsed frame time on every tick.
    #[default]
    FreeRunning,
    /// `t` only changes through seeks.
    ExternallyControlled,
}

/// Errors from playback control calls.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// A seek arrived while the clock was free-running.
    NotExternallyControlled { requested: f64 },
    /// The requested time is NaN or infinite.
    InvalidTime(f64),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::NotExternallyControlled { requested } => write!(
                f,
                "Cannot seek to {}s: playback is free-running (call control_start first)",
                requested
            ),
            PlaybackError::InvalidTime(t) => write!(f, "Invalid playback time: {}", t),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Interface an external sequencer (timeline host) drives.
pub trait TimeControl {
    /// Take over the clock.
    fn control_start(&mut self);
    /// Hand the clock back to frame-driven advance.
    fn control_stop(&mut self);
    /// Set the clock directly. Only valid while controlled.
    fn set_time(&mut self, seconds: f64) -> Result<(), PlaybackError>;
}

/// Two-state playback clock.
#[derive(Debug, Clone, Default)]
pub struct PlaybackController {
    time: f64,
    state: PlaybackState,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current playback time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_externally_controlled(&self) -> bool {
        self.state == PlaybackState::ExternallyControlled
    }

    /// `FreeRunning -> ExternallyControlled`. No-op if already controlled.
    pub fn start(&mut self) {
        if self.state != PlaybackState::ExternallyControlled {
            log::debug!("Playback externally controlled at t={:.3}", self.time);
            self.state = PlaybackState::ExternallyControlled;
        }
    }

    /// `ExternallyControlled -> FreeRunning`. No-op if already free-running.
    pub fn stop(&mut self) {
        if self.state != PlaybackState::FreeRunning {
            log::debug!("Playback free-running from t={:.3}", self.time);
            self.state = PlaybackState::FreeRunning;
        }
    }

    /// Jump to `time`. Rejected unless externally controlled; a rejected seek
    /// leaves both the time and the state untouched.
    pub fn seek(&mut self, time: f64) -> Result<(), PlaybackError> {
        if !time.is_finite() {
            return Err(PlaybackError::InvalidTime(time));
        }
        if self.state != PlaybackState::ExternallyControlled {
            log::warn!("Ignoring seek to {:.3}s while free-running", time);
            return Err(PlaybackError::NotExternallyControlled { requested: time });
        }
        self.time = time;
        Ok(())
    }

    /// Advance one frame.
    pub fn tick(&mut self, elapsed: f32) {
        if self.state == PlaybackState::FreeRunning {
            self.time += elapsed as f64;
        }
    }
}

impl TimeControl for PlaybackController {
    fn control_start(&mut self) {
        self.start();
    }

    fn control_stop(&mut self) {
        self.stop();
    }

    fn set_time(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        self.seek(seconds)
    }
}
