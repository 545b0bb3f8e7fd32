use chrono::{Datelike, Duration, Local, NaiveDateTime};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Time source of the control loop.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds since startup.
    fn millis(&self) -> u64;
    /// Local wall-clock time, `None` until the system time is trustworthy.
    fn local_time(&self) -> Option<NaiveDateTime>;
}

/// Wall-clock readings before this year are treated as "never synchronized".
const MIN_VALID_YEAR: i32 = 2016;

#[derive(Debug)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        let now = Local::now();
        (now.year() >= MIN_VALID_YEAR).then(|| now.naive_local())
    }
}

/// Manually advanced clock for tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
    local: RwLock<Option<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(local: Option<NaiveDateTime>) -> Self {
        Self {
            millis: AtomicU64::new(0),
            local: RwLock::new(local),
        }
    }

    /// Advances both the monotonic and (if set) the wall clock.
    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
        let mut local = self.local.write();
        if let Some(t) = local.as_mut() {
            *t += Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX));
        }
    }

    pub fn set_local_time(&self, local: Option<NaiveDateTime>) {
        *self.local.write() = local;
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        *self.local.read()
    }
}
