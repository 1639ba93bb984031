use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic session clock
pub trait Timer: Clone + Send + Sync {
    /// Nanoseconds since the timer was created
    fn now(&self) -> u64;
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration);
}

/// Wall-clock timer with platform sleeps for short poll intervals
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(all(feature = "high_precision_timer", target_os = "linux"))]
        self.linux_sleep(duration);
        #[cfg(all(feature = "high_precision_timer", target_os = "macos"))]
        self.macos_sleep(duration);
        #[cfg(not(all(
            feature = "high_precision_timer",
            any(target_os = "linux", target_os = "macos")
        )))]
        std::thread::sleep(duration);
    }

    #[cfg(all(feature = "high_precision_timer", target_os = "linux"))]
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

    #[cfg(all(feature = "high_precision_timer", target_os = "macos"))]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

        if duration.as_nanos() < 100_000 {
            unsafe {
                let start = mach_absolute_time();
                let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
                mach_timebase_info(&mut timebase);

                let target_ticks =
                    duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;

                while mach_absolute_time() - start < target_ticks {
                    std::hint::spin_loop();
                }
            }
        } else {
            std::thread::sleep(duration);
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic clock that only moves when slept on or advanced.
///
/// Clones share the same clock, so a collector holding a clone observes the
/// controller's sleeps.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTimer {
    now_ns: Arc<AtomicU64>,
}

impl SimulatedTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Timer for SimulatedTimer {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
