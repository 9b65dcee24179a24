//! One-time provisioning against a management endpoint

use std::time::Duration;

use log::*;
use provd_proto::{RequestHeader, Status};
use serde_json::json;
use tokio::time::Instant;

use super::{Pacer, Reply};
use crate::config::Timing;
use crate::{ProvisionState, ServiceError};

#[derive(Debug)]
struct ProvisionOp {
    header: RequestHeader,
    pacer: Pacer,
    last: ProvisionState,
}

#[derive(Debug)]
pub struct Provision {
    poll_interval: Duration,
    report_after: Duration,
    timeout: Duration,
    op: Option<ProvisionOp>,
}

impl Provision {
    pub fn new(timing: &Timing) -> Self {
        Self {
            poll_interval: timing.poll_interval,
            report_after: timing.intermediate_report,
            timeout: timing.provision_timeout,
            op: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.op.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.op.as_ref().map(|op| op.pacer.next_poll())
    }

    pub fn ensure_idle(&self) -> Result<(), ServiceError> {
        if self.is_active() {
            return Err(ServiceError::invalid("provisioning already in progress"));
        }
        Ok(())
    }

    /// Track an attempt the provisioning agent reported as `initial` on
    /// start; it may already be over
    pub fn start(&mut self, header: RequestHeader, initial: ProvisionState, now: Instant) -> Reply {
        info!("Provisioning started ({})", initial.name());
        self.op = Some(ProvisionOp {
            header: header.clone(),
            pacer: Pacer::new(now, self.poll_interval, self.report_after, self.timeout),
            last: ProvisionState::Unprovisioned,
        });
        self.observe(initial, now)
            .unwrap_or_else(|| Reply::intermediate(header))
    }

    /// A state reported by the provisioning agent, pushed or polled
    pub fn observe(&mut self, state: ProvisionState, now: Instant) -> Option<Reply> {
        let op = self.op.as_mut()?;

        if let Some(outcome) = state.outcome() {
            let op = self.op.take()?;
            return Some(match outcome {
                Ok(()) => {
                    info!("Provisioning succeeded");
                    Reply::new(op.header, Status::Success)
                }
                Err(e) => {
                    warn!("Provisioning failed: {e}");
                    Reply::new(op.header, e.status())
                }
            });
        }

        if state != op.last && state != ProvisionState::Unprovisioned {
            info!("Provisioning phase: {}", state.name());
            op.last = state;
            op.pacer.reported(now);
            return Some(
                Reply::intermediate(op.header.clone()).with_data(json!({ "state": state.name() })),
            );
        }
        None
    }

    /// Poll the agent's state once per poll interval
    pub fn poll(&mut self, state: impl FnOnce() -> ProvisionState, now: Instant) -> Option<Reply> {
        let op = self.op.as_mut()?;
        if !op.pacer.tick(now) {
            return None;
        }

        if let Some(reply) = self.observe(state(), now) {
            return Some(reply);
        }

        let op = self.op.as_mut()?;
        if op.pacer.expired(now) {
            let op = self.op.take()?;
            warn!("Provisioning timed out");
            return Some(Reply::new(op.header, Status::ErrTimeout));
        }
        if op.pacer.report_due(now) {
            op.pacer.reported(now);
            let mut reply = Reply::intermediate(op.header.clone());
            if op.last != ProvisionState::Unprovisioned {
                reply = reply.with_data(json!({ "state": op.last.name() }));
            }
            return Some(reply);
        }
        None
    }
}
