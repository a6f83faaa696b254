use std::time::{Duration, Instant};

/// Trait for frame clocks driving a render loop
pub trait Timer {
    type Timestamp: Copy;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_stats(&self) -> FrameStats;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub frames: usize,
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl FrameStats {
    pub fn from_frame_times(frame_times: &[Duration]) -> Self {
        if frame_times.is_empty() {
            return Self::default();
        }
        let times: Vec<f64> = frame_times.iter().map(|d| d.as_nanos() as f64).collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        FrameStats {
            frames: times.len(),
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub frame_times: Vec<Duration>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.remove(0);
        }
        self.frame_times.push(d);
    }
    fn frame_stats(&self) -> FrameStats {
        FrameStats::from_frame_times(&self.frame_times)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame_times: Vec::with_capacity(1000),
            max_samples: 1000,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a render loop to a fixed frame rate.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    budget: Duration,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        let budget = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(1_000_000_000 / fps as u64)
        };
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left in the frame after `spent` of work.
    pub fn remaining(&self, spent: Duration) -> Duration {
        self.budget.saturating_sub(spent)
    }

    /// Sleeps out the rest of the frame started at `frame_start` and records
    /// the full frame time.
    pub fn finish_frame<T: Timer>(&self, timer: &mut T, frame_start: T::Timestamp) {
        timer.sleep(self.remaining(timer.elapsed(frame_start)));
        let total = timer.elapsed(frame_start);
        timer.record_frame(total);
    }
}
