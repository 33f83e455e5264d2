//! Opt-in timing of transform generation.
//!
//! When enabled, the frame driver wraps each generation pass in
//! [`FrameProfiler::timed`] and the profiler logs the running average every
//! `log_interval` frames. Disabled profilers cost one branch per frame.

use std::time::{Duration, Instant};

/// How often to log averages (every N frames).
const DEFAULT_LOG_INTERVAL: u64 = 300; // ~5 seconds at 60fps

#[derive(Debug, Clone)]
pub struct FrameProfiler {
    enabled: bool,
    log_interval: u64,
    frames: u64,
    window_total: Duration,
    window_frames: u64,
    last: Option<Duration>,
}

impl Default for FrameProfiler {
    fn default() -> Self {
        Self {
            enabled: false,
            log_interval: DEFAULT_LOG_INTERVAL,
            frames: 0,
            window_total: Duration::ZERO,
            window_frames: 0,
            last: None,
        }
    }
}

impl FrameProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            log::info!("Generation profiling ENABLED");
        } else {
            log::info!("Generation profiling DISABLED");
        }
    }

    pub fn set_log_interval(&mut self, frames: u64) {
        self.log_interval = frames.max(1);
    }

    /// Duration of the most recent timed pass.
    pub fn last(&self) -> Option<Duration> {
        self.last
    }

    /// Frames timed since creation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run `f`, recording its duration when enabled.
    pub fn timed<T, F: FnOnce() -> T>(&mut self, label: &str, f: F) -> T {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        self.record(label, start.elapsed());
        result
    }

    fn record(&mut self, label: &str, elapsed: Duration) {
        self.last = Some(elapsed);
        self.frames += 1;
        self.window_total += elapsed;
        self.window_frames += 1;

        if self.window_frames >= self.log_interval {
            let avg = self.window_total.as_secs_f64() * 1000.0 / self.window_frames as f64;
            log::info!(
                "[PERF] {}: {:.3}ms avg over {} frames",
                label,
                avg,
                self.window_frames
            );
            self.window_total = Duration::ZERO;
            self.window_frames = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_profiler_records_nothing() {
        let mut profiler = FrameProfiler::new();
        let value = profiler.timed("noop", || 7);
        assert_eq!(value, 7);
        assert_eq!(profiler.frames(), 0);
        assert!(profiler.last().is_none());
    }

    #[test]
    fn test_enabled_profiler_counts_frames() {
        let mut profiler = FrameProfiler::new();
        profiler.set_enabled(true);
        profiler.set_log_interval(2);

        for _ in 0..5 {
            profiler.timed("work", || std::hint::black_box(1 + 1));
        }
        assert_eq!(profiler.frames(), 5);
        assert!(profiler.last().is_some());
    }
}
