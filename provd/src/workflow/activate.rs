//! Bringing up a Wi-Fi or cellular profile
//!
//! The operation succeeds only when the link reports *our* profile as the
//! active one and the network stack reports full connectivity. A failure
//! reported by the link, or no resolution within the timeout, ends it with
//! the matching error and removes the trial profile.

use std::time::Duration;

use log::*;
use provd_proto::{Connectivity, RequestHeader, Status};
use serde_json::json;
use tokio::time::Instant;

use super::{Pacer, Reply};
use crate::config::Timing;
use crate::{ActivationLink, LinkState, ProfileId, ServiceError};

#[derive(Debug)]
struct ActivateOp {
    header: RequestHeader,
    profile: ProfileId,
    pacer: Pacer,
    last_state: Option<&'static str>,
}

#[derive(Debug)]
pub struct Activate {
    /// "Wi-Fi" or "LTE", for logs
    label: &'static str,
    poll_interval: Duration,
    report_after: Duration,
    timeout: Duration,
    op: Option<ActivateOp>,
}

impl Activate {
    pub fn wifi(timing: &Timing) -> Self {
        Self::new("Wi-Fi", timing, timing.activate_timeout)
    }

    pub fn cellular(timing: &Timing) -> Self {
        Self::new("LTE", timing, timing.lte_timeout)
    }

    fn new(label: &'static str, timing: &Timing, timeout: Duration) -> Self {
        Self {
            label,
            poll_interval: timing.poll_interval,
            report_after: timing.intermediate_report,
            timeout,
            op: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.op.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.op.as_ref().map(|op| op.pacer.next_poll())
    }

    /// Refuse a second activation while one is running
    pub fn ensure_idle(&self) -> Result<(), ServiceError> {
        match &self.op {
            Some(op) => Err(ServiceError::invalid(format!(
                "{} activation of {} already in progress",
                self.label, op.profile
            ))),
            None => Ok(()),
        }
    }

    /// Track the activation of `profile`, which the caller just asked the
    /// link to bring up
    pub fn start(&mut self, header: RequestHeader, profile: ProfileId, now: Instant) -> Reply {
        info!("{} activation of {profile} started", self.label);
        self.op = Some(ActivateOp {
            header: header.clone(),
            profile,
            pacer: Pacer::new(now, self.poll_interval, self.report_after, self.timeout),
            last_state: None,
        });
        Reply::intermediate(header)
    }

    /// Check the link once per poll interval
    pub fn poll<L: ActivationLink + ?Sized>(&mut self, link: &mut L, now: Instant) -> Option<Reply> {
        let op = self.op.as_mut()?;
        if !op.pacer.tick(now) {
            return None;
        }

        let status = link.activation_status();
        let ours = status.active_profile.as_ref() == Some(&op.profile);

        let outcome = match status.link {
            LinkState::Activated if ours && status.connectivity == Connectivity::Full => Some(Ok(())),
            LinkState::Failed(failure) => Some(Err(failure.error())),
            _ if op.pacer.expired(now) => {
                warn!(
                    "{} activation of {} timed out after {:?}",
                    self.label,
                    op.profile,
                    op.pacer.elapsed(now)
                );
                Some(Err(ServiceError::NoConnection))
            }
            _ => None,
        };

        if let Some(outcome) = outcome {
            let op = self.op.take()?;
            return Some(match outcome {
                Ok(()) => {
                    info!("{} connection {} activated", self.label, op.profile);
                    Reply::new(op.header, Status::Success)
                }
                Err(e) => {
                    warn!("{} activation of {} failed: {e}", self.label, op.profile);
                    link.cleanup(&op.profile);
                    Reply::new(op.header, e.status())
                }
            });
        }

        // Report state changes right away, otherwise keep the client alive
        let state = match status.link {
            LinkState::Activated if !ours => "waiting",
            LinkState::Activated => "connecting",
            other => other.name(),
        };
        let changed = op.last_state != Some(state);
        if changed {
            debug!("{} link state: {state}", self.label);
            op.last_state = Some(state);
        }
        if changed || op.pacer.report_due(now) {
            op.pacer.reported(now);
            return Some(Reply::intermediate(op.header.clone()).with_data(json!({ "state": state })));
        }
        None
    }
}
