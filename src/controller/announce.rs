use std::sync::Arc;
use tracing::info;

use super::status::Status;

/// Repeat interval for an unchanged status.
const REPEAT_INTERVAL_MS: u64 = 10_000;

/// Destination of status reports.
#[cfg_attr(test, mockall::automock)]
pub trait StatusSink: Send + Sync {
    fn report(&self, status: Status, uptime_ms: u64);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, status: Status, uptime_ms: u64) {
        let code: &'static str = status.into();
        info!(status = code, uptime_ms, "DPL: {}", status.text());
    }
}

/// Tracks the current status and rate-limits its reporting.
///
/// A changed status is reported right away, an unchanged one every ten
/// seconds. `DisabledByConfig` is reported once and then stays silent.
pub struct StatusAnnouncer {
    sink: Arc<dyn StatusSink>,
    current: Status,
    last_reported_at: Option<u64>,
}

impl StatusAnnouncer {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            sink,
            current: Status::Initializing,
            last_reported_at: None,
        }
    }

    pub fn current(&self) -> Status {
        self.current
    }

    pub fn should_report(&self, status: Status, now_ms: u64) -> bool {
        let Some(last) = self.last_reported_at else {
            return true;
        };
        if status != self.current {
            return true;
        }
        if status == Status::DisabledByConfig {
            return false;
        }
        now_ms >= last.saturating_add(REPEAT_INTERVAL_MS)
    }

    pub fn announce(&mut self, status: Status, now_ms: u64) {
        if !self.should_report(status, now_ms) {
            return;
        }
        self.sink.report(status, now_ms);
        self.current = status;
        self.last_reported_at = Some(now_ms);
    }
}
