use std::time::{Duration, Instant};

/// Interval at which frame rates are logged.
pub const LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Counts captured and analyzed frames and periodically logs their rates.
pub struct FrameMeter {
    raw_frames: u64,
    detected_frames: u64,
    since: Instant,
    interval: Duration,
}

impl Default for FrameMeter {
    fn default() -> Self {
        Self::new(LOG_INTERVAL)
    }
}

impl FrameMeter {
    pub fn new(interval: Duration) -> FrameMeter {
        FrameMeter {
            raw_frames: 0,
            detected_frames: 0,
            since: Instant::now(),
            interval,
        }
    }

    pub fn tick_raw(&mut self) {
        self.raw_frames += 1;
    }

    pub fn tick_detected(&mut self) {
        self.detected_frames += 1;
    }

    /// Log and reset the counters once the interval has passed.
    ///
    /// Returns the raw and detected frames per second if they were logged.
    pub fn maybe_log(&mut self) -> Option<(f32, f32)> {
        let elapsed = self.since.elapsed();
        if elapsed < self.interval {
            return None;
        }

        let elapsed = elapsed.as_secs_f32().max(f32::EPSILON);
        let fps_raw = self.raw_frames as f32 / elapsed;
        let fps_detected = self.detected_frames as f32 / elapsed;

        if self.raw_frames > 0 {
            log::info!("Raw frames per second: {fps_raw:.2}");
        }
        if self.detected_frames > 0 {
            log::info!("Detected frames per second: {fps_detected:.2}");
        }

        self.raw_frames = 0;
        self.detected_frames = 0;
        self.since = Instant::now();

        Some((fps_raw, fps_detected))
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_rates_reset_after_logging() {
        let mut meter = FrameMeter::new(Duration::ZERO);
        for _ in 0..10 {
            meter.tick_raw();
        }
        meter.tick_detected();
        meter.tick_detected();

        let (fps_raw, fps_detected) = meter.maybe_log().expect("interval passed");
        assert!(fps_raw > fps_detected && fps_detected > 0.0);

        assert_eq!(meter.maybe_log(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_nothing_logged_before_interval() {
        let mut meter = FrameMeter::new(Duration::from_secs(3600));
        meter.tick_raw();
        assert_eq!(meter.maybe_log(), None);
    }
}
