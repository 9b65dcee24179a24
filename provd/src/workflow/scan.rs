//! Access point discovery in confirmed batches
//!
//! The first reply to `getAccessPoints` is a bare intermediate. Each
//! further batch is pulled only after the peer confirmed the previous
//! reply, so a slow link throttles the scan instead of piling up queued
//! responses. An exhausted enumeration ends with a data-less success.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::*;
use provd_proto::{AccessPoint, RequestHeader, Status};

use super::Reply;
use crate::{NetworkService, ServiceError};

#[derive(Debug)]
struct ScanOp {
    header: RequestHeader,
    generation: u64,
    cancelled: bool,
    exhausted: bool,
    /// SSIDs already reported in an earlier batch
    reported: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct Scan {
    op: Option<ScanOp>,
    generation: u64,
}

impl Scan {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scan is running and has not been cancelled
    pub fn is_active(&self) -> bool {
        self.op.as_ref().is_some_and(|op| !op.cancelled)
    }

    pub fn start(
        &mut self,
        header: RequestHeader,
        network: &mut dyn NetworkService,
    ) -> Result<Reply, ServiceError> {
        network.begin_scan()?;
        self.generation += 1;
        info!("Obtaining access point list (scan {})", self.generation);

        let mut reply = Reply::intermediate(header.clone());
        reply.continue_scan = Some(self.generation);
        self.op = Some(ScanOp {
            header,
            generation: self.generation,
            cancelled: false,
            exhausted: false,
            reported: HashSet::new(),
        });
        Ok(reply)
    }

    /// Stop scheduling batches; a batch already handed to the transport
    /// still drains, but nothing follows it
    pub fn cancel(&mut self) {
        if let Some(op) = self.op.as_mut()
            && !op.cancelled
        {
            info!("Access point scan cancelled");
            op.cancelled = true;
        }
    }

    /// The reply carrying scan `generation` was confirmed by the peer
    pub fn on_delivered(
        &mut self,
        generation: u64,
        network: &mut dyn NetworkService,
        budget: Duration,
    ) -> Option<Reply> {
        let op = self.op.as_mut()?;
        if op.generation != generation {
            debug!("Ignoring delivery for stale scan {generation}");
            return None;
        }
        if op.cancelled {
            self.op = None;
            return None;
        }
        if op.exhausted {
            let op = self.op.take()?;
            info!("Access point scan complete");
            return Some(Reply::new(op.header, Status::Success));
        }

        let batch = match network.list_access_points(budget) {
            Ok(batch) => batch,
            Err(e) => {
                let op = self.op.take()?;
                warn!("Access point scan failed: {e}");
                return Some(Reply::new(op.header, e.status()));
            }
        };

        op.exhausted = batch.exhausted;
        let fresh = dedup(batch.access_points, &mut op.reported);
        if fresh.is_empty() && op.exhausted {
            let op = self.op.take()?;
            info!("Access point scan complete");
            return Some(Reply::new(op.header, Status::Success));
        }

        debug!("Sending batch of {} access points", fresh.len());
        let mut reply = Reply::intermediate(op.header.clone())
            .with_data(serde_json::to_value(&fresh).unwrap_or_default());
        reply.continue_scan = Some(generation);
        Some(reply)
    }
}

/// Collapse duplicate SSIDs, keeping the strongest signal and the order of
/// first appearance; hidden networks and SSIDs reported earlier are dropped
fn dedup(access_points: Vec<AccessPoint>, reported: &mut HashSet<String>) -> Vec<AccessPoint> {
    let mut out: Vec<AccessPoint> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for ap in access_points {
        if ap.ssid.is_empty() || reported.contains(&ap.ssid) {
            continue;
        }
        match index.get(&ap.ssid) {
            Some(&i) => {
                if ap.strength > out[i].strength {
                    out[i] = ap;
                }
            }
            None => {
                index.insert(ap.ssid.clone(), out.len());
                out.push(ap);
            }
        }
    }

    reported.extend(out.iter().map(|ap| ap.ssid.clone()));
    out
}
