//! External storage swap
//!
//! Walks the card through eject, removal, insertion of a new card and
//! formatting if needed. Progress is driven by storage state-change events;
//! a report timer keeps the client informed and bounds the whole swap.
//!
//! ```text
//!   ready/full --stop--> Ejecting --stopped--> Stopped --not-present--> Inserting
//!   Inserting --unformatted/format--> Formatting --ready--> done
//!   Inserting --ready/full--> done
//! ```

use std::time::Duration;

use log::*;
use provd_proto::{RequestHeader, Status, StorageState};
use serde_json::json;
use tokio::time::Instant;

use super::Reply;
use crate::config::Timing;
use crate::{ServiceError, StorageService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPhase {
    /// Waiting for the storage daemon to stop using the card
    Ejecting,
    /// Safe to remove the card
    Stopped,
    /// Waiting for a card to be inserted
    Inserting,
    Formatting,
}

impl SwapPhase {
    pub fn name(self) -> &'static str {
        match self {
            SwapPhase::Ejecting => "ejecting",
            SwapPhase::Stopped => "stopped",
            SwapPhase::Inserting => "inserting",
            SwapPhase::Formatting => "formatting",
        }
    }
}

enum Transition {
    Stay,
    Enter(SwapPhase),
    Done,
    Abort(ServiceError),
}

#[derive(Debug)]
struct SwapOp {
    header: RequestHeader,
    phase: SwapPhase,
    started: Instant,
    next_report: Instant,
}

#[derive(Debug)]
pub struct StorageSwap {
    report_interval: Duration,
    timeout: Duration,
    op: Option<SwapOp>,
}

impl StorageSwap {
    pub fn new(timing: &Timing) -> Self {
        Self {
            report_interval: timing.storage_report,
            timeout: timing.storage_timeout,
            op: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.op.is_some()
    }

    pub fn phase(&self) -> Option<SwapPhase> {
        self.op.as_ref().map(|op| op.phase)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.op.as_ref().map(|op| op.next_report)
    }

    /// Begin a swap from whatever state the card is in now
    pub fn start(
        &mut self,
        header: RequestHeader,
        storage: &mut dyn StorageService,
        now: Instant,
    ) -> Result<Reply, ServiceError> {
        if let Some(op) = &self.op {
            return Err(ServiceError::invalid(format!(
                "storage swap already in progress ({})",
                op.phase.name()
            )));
        }

        let state = storage.state();
        let phase = match state {
            StorageState::Ready | StorageState::Full => {
                storage.stop()?;
                SwapPhase::Ejecting
            }
            StorageState::Stopping => SwapPhase::Ejecting,
            StorageState::Stopped => SwapPhase::Stopped,
            StorageState::NotPresent => SwapPhase::Inserting,
            StorageState::Unformatted => {
                storage.format()?;
                SwapPhase::Formatting
            }
            StorageState::Formatting => SwapPhase::Formatting,
            StorageState::Failed | StorageState::StopFailed => {
                return Err(ServiceError::Device(format!("storage is {}", state.name())));
            }
        };

        info!("Storage swap started in {} ({})", phase.name(), state.name());
        self.op = Some(SwapOp {
            header: header.clone(),
            phase,
            started: now,
            next_report: now + self.report_interval,
        });
        Ok(progress(header, phase))
    }

    /// The storage service reported a new state
    pub fn on_state_changed(
        &mut self,
        state: StorageState,
        storage: &mut dyn StorageService,
        now: Instant,
    ) -> Option<Reply> {
        let op = self.op.as_mut()?;
        debug!("Storage state {} during {}", state.name(), op.phase.name());

        let transition = match (op.phase, state) {
            (_, StorageState::Failed | StorageState::StopFailed) => {
                Transition::Abort(ServiceError::Device(format!("storage {}", state.name())))
            }
            (SwapPhase::Ejecting, StorageState::Stopping) => Transition::Stay,
            (SwapPhase::Ejecting | SwapPhase::Stopped, StorageState::Stopped) => {
                Transition::Enter(SwapPhase::Stopped)
            }
            (SwapPhase::Stopped | SwapPhase::Inserting, StorageState::NotPresent) => {
                Transition::Enter(SwapPhase::Inserting)
            }
            (SwapPhase::Inserting, StorageState::Unformatted) => match storage.format() {
                Ok(()) => Transition::Enter(SwapPhase::Formatting),
                Err(e) => Transition::Abort(e),
            },
            (SwapPhase::Inserting | SwapPhase::Formatting, StorageState::Formatting) => {
                Transition::Enter(SwapPhase::Formatting)
            }
            (SwapPhase::Inserting | SwapPhase::Formatting, StorageState::Ready | StorageState::Full) => {
                Transition::Done
            }
            (phase, state) => Transition::Abort(ServiceError::Device(format!(
                "unexpected storage state {} while {}",
                state.name(),
                phase.name()
            ))),
        };

        match transition {
            Transition::Stay => None,
            Transition::Enter(phase) if phase == op.phase => None,
            Transition::Enter(phase) => {
                info!("Storage swap: {} -> {}", op.phase.name(), phase.name());
                op.phase = phase;
                op.next_report = now + self.report_interval;
                Some(progress(op.header.clone(), phase))
            }
            Transition::Done => {
                let op = self.op.take()?;
                info!("Storage swap complete");
                Some(
                    Reply::new(op.header, Status::Success)
                        .with_data(serde_json::to_value(storage.info()).unwrap_or_default()),
                )
            }
            Transition::Abort(e) => {
                let op = self.op.take()?;
                warn!("Storage swap aborted: {e}");
                Some(Reply::new(op.header, e.status()))
            }
        }
    }

    /// Recurring report; gives up once the swap exceeds its timeout
    pub fn poll(&mut self, now: Instant) -> Option<Reply> {
        let op = self.op.as_mut()?;
        if now < op.next_report {
            return None;
        }
        if now.saturating_duration_since(op.started) >= self.timeout {
            let op = self.op.take()?;
            warn!("Storage swap timed out in {}", op.phase.name());
            return Some(Reply::new(op.header, Status::ErrTimeout));
        }
        op.next_report = now + self.report_interval;
        Some(progress(op.header.clone(), op.phase))
    }
}

fn progress(header: RequestHeader, phase: SwapPhase) -> Reply {
    Reply::intermediate(header).with_data(json!({ "state": phase.name() }))
}
