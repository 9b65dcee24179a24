//! Long-running request workflows
//!
//! Each workflow owns at most one operation context. The engine feeds it
//! requests, timer ticks and collaborator events; it answers with
//! [`Reply`] values that the engine encodes and sends. Nothing here does
//! I/O on its own or reads the clock: `now` is always passed in.

mod activate;
mod provision;
mod scan;
mod storage;

pub use activate::Activate;
pub use provision::Provision;
pub use scan::Scan;
pub use storage::{StorageSwap, SwapPhase};

use std::time::Duration;

use provd_proto::{RequestHeader, Status};
use serde_json::Value;
use tokio::time::Instant;

/// A response a workflow wants sent
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub header: RequestHeader,
    pub status: Status,
    pub data: Option<Value>,
    /// Scan generation to continue once the peer confirmed this reply
    pub continue_scan: Option<u64>,
}

impl Reply {
    pub fn new(header: RequestHeader, status: Status) -> Self {
        Self {
            header,
            status,
            data: None,
            continue_scan: None,
        }
    }

    pub fn intermediate(header: RequestHeader) -> Self {
        Self::new(header, Status::Intermediate)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Poll and progress-report schedule shared by the polling workflows
#[derive(Debug, Clone)]
pub(crate) struct Pacer {
    started: Instant,
    last_report: Instant,
    next_poll: Instant,
    poll_interval: Duration,
    report_after: Duration,
    give_up_after: Duration,
}

impl Pacer {
    pub(crate) fn new(
        now: Instant,
        poll_interval: Duration,
        report_after: Duration,
        give_up_after: Duration,
    ) -> Self {
        Self {
            started: now,
            last_report: now,
            next_poll: now + poll_interval,
            poll_interval,
            report_after,
            give_up_after,
        }
    }

    pub(crate) fn next_poll(&self) -> Instant {
        self.next_poll
    }

    /// True once per poll interval
    pub(crate) fn tick(&mut self, now: Instant) -> bool {
        if now < self.next_poll {
            return false;
        }
        self.next_poll = now + self.poll_interval;
        true
    }

    /// Nothing was reported for the intermediate-report threshold
    pub(crate) fn report_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_report) >= self.report_after
    }

    pub(crate) fn reported(&mut self, now: Instant) {
        self.last_report = now;
    }

    pub(crate) fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.give_up_after
    }

    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }
}
