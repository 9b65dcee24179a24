//! The protocol engine
//!
//! One task owns all protocol state. GATT callbacks, collaborator
//! notifications and transport completions reach it as [`Event`]s over an
//! unbounded channel; timers are folded into the same loop as a single
//! sleep until the earliest deadline. Nothing inside the engine blocks.

use std::time::Duration;

use log::*;
use provd_proto::{encode, RequestHeader, Status, StorageState};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::{Capabilities, Config, Timing};
use crate::inactivity::{InactivityTimer, Watchdog};
use crate::reassembler::{Assembled, Reassembler};
use crate::transport::{ChunkTransport, Completion, Indicate};
use crate::workflow::{Activate, Provision, Reply, Scan, StorageSwap};
use crate::{ProvisionState, Services};

/// Everything that can wake the engine
#[derive(Debug)]
pub enum Event {
    /// The peer wrote a fragment to the request characteristic
    Write(Vec<u8>),
    /// The peer confirmed the last indication
    Confirm,
    /// The peer subscribed to the response characteristic
    Subscribed,
    /// The peer unsubscribed or disconnected
    Unsubscribed,
    ProvisionStateChanged(ProvisionState),
    StorageStateChanged(StorageState),
    /// A scan batch was delivered; pull the next one
    ScanBatchDelivered(u64),
    /// Replace the inactivity watchdog; `None` disables it
    SetWatchdog(Option<Watchdog>),
    /// Refresh the access point list ahead of a client connecting
    Prescan,
    Shutdown,
}

/// Cloneable sender side of the engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl EngineHandle {
    /// Returns false once the engine has stopped
    pub fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn write(&self, fragment: &[u8]) -> bool {
        self.send(Event::Write(fragment.to_vec()))
    }

    pub fn confirm(&self) -> bool {
        self.send(Event::Confirm)
    }

    pub fn subscribed(&self) -> bool {
        self.send(Event::Subscribed)
    }

    pub fn unsubscribed(&self) -> bool {
        self.send(Event::Unsubscribed)
    }

    pub fn provision_state_changed(&self, state: ProvisionState) -> bool {
        self.send(Event::ProvisionStateChanged(state))
    }

    pub fn storage_state_changed(&self, state: StorageState) -> bool {
        self.send(Event::StorageStateChanged(state))
    }

    pub fn set_inactivity_timeout(
        &self,
        delay: Duration,
        callback: impl FnMut() + Send + 'static,
    ) -> bool {
        self.send(Event::SetWatchdog(Some(Watchdog::new(delay, callback))))
    }

    pub fn clear_inactivity_timeout(&self) -> bool {
        self.send(Event::SetWatchdog(None))
    }

    pub fn prescan(&self) -> bool {
        self.send(Event::Prescan)
    }

    pub fn shutdown(&self) -> bool {
        self.send(Event::Shutdown)
    }
}

pub type ProvisionedHook = Box<dyn FnMut() + Send>;

pub struct Engine<I> {
    pub(crate) transport: ChunkTransport<I>,
    pub(crate) reassembler: Reassembler,
    pub(crate) inactivity: InactivityTimer,
    pub(crate) scan: Scan,
    pub(crate) wifi: Activate,
    pub(crate) lte: Activate,
    pub(crate) provision: Provision,
    pub(crate) storage: StorageSwap,
    pub(crate) services: Services,
    pub(crate) caps: Capabilities,
    pub(crate) timing: Timing,
    pub(crate) device_name: String,
    events: mpsc::UnboundedSender<Event>,
    on_provisioned: Option<ProvisionedHook>,
}

impl<I: Indicate> Engine<I> {
    /// Build an engine and the receiver to pass to [`Engine::run`]
    pub fn new(
        config: &Config,
        services: Services,
        indicator: I,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let timing = config.timing();
        let caps = config.capabilities.resolve(&services);
        info!("Capabilities: {caps:?}");

        let engine = Self {
            transport: ChunkTransport::new(indicator, config.chunk_size),
            reassembler: Reassembler::new(timing.rx_idle),
            inactivity: InactivityTimer::new(),
            scan: Scan::new(),
            wifi: Activate::wifi(&timing),
            lte: Activate::cellular(&timing),
            provision: Provision::new(&timing),
            storage: StorageSwap::new(&timing),
            services,
            caps,
            timing,
            device_name: config.device_name.clone(),
            events,
            on_provisioned: None,
        };
        (engine, rx)
    }

    /// Called once provisioning succeeds, after the final response is queued
    pub fn on_provisioned(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_provisioned = Some(Box::new(hook));
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.events.clone(),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn indicator(&self) -> &I {
        self.transport.indicator()
    }

    /// Apply one event; returns false on shutdown
    pub fn handle_event(&mut self, event: Event, now: Instant) -> bool {
        match event {
            Event::Write(fragment) => match self.reassembler.push(&fragment, now) {
                Assembled::Complete(request) => self.dispatch(request, now),
                Assembled::Pending => {}
                Assembled::Discarded(e) => warn!("Invalid request message, ignoring: {e}"),
                Assembled::Overflow(len) => warn!("Request exceeds {len} bytes, ignoring"),
            },
            Event::Confirm => self.transport.confirm(),
            Event::Subscribed => {
                info!("Client subscribed to responses");
                self.transport.flush();
            }
            Event::Unsubscribed => self.client_disconnected(),
            Event::ProvisionStateChanged(state) => {
                if let Some(reply) = self.provision.observe(state, now) {
                    self.finish_provision(reply, now);
                }
            }
            Event::StorageStateChanged(state) => {
                let reply = match self.services.storage.as_deref_mut() {
                    Some(storage) => self.storage.on_state_changed(state, storage, now),
                    None => None,
                };
                if let Some(reply) = reply {
                    self.emit(reply, now);
                }
            }
            Event::ScanBatchDelivered(generation) => {
                let budget = self.timing.scan_batch;
                if let Some(reply) =
                    self.scan.on_delivered(generation, self.services.network.as_mut(), budget)
                {
                    self.emit(reply, now);
                }
            }
            Event::SetWatchdog(watchdog) => self.inactivity.set(watchdog, now),
            Event::Prescan => {
                if self.caps.wifi && !self.scan.is_active() {
                    debug!("Starting access point pre-scan");
                    if let Err(e) = self.services.network.begin_scan() {
                        warn!("Access point pre-scan failed: {e}");
                    }
                }
            }
            Event::Shutdown => {
                info!("Engine shutting down");
                return false;
            }
        }
        true
    }

    /// Run every timer whose deadline has passed
    pub fn on_timer(&mut self, now: Instant) {
        self.reassembler.expire(now);
        self.inactivity.poll(now);

        if let Some(reply) = self.wifi.poll(self.services.network.as_mut(), now) {
            self.emit(reply, now);
        }

        let reply = match self.services.cellular.as_deref_mut() {
            Some(cellular) => self.lte.poll(cellular, now),
            None => None,
        };
        if let Some(reply) = reply {
            self.emit(reply, now);
        }

        let reply = match self.services.provisioning.as_deref() {
            Some(provisioning) => self.provision.poll(|| provisioning.state(), now),
            None => None,
        };
        if let Some(reply) = reply {
            self.finish_provision(reply, now);
        }

        if let Some(reply) = self.storage.poll(now) {
            self.emit(reply, now);
        }
    }

    /// Earliest instant at which [`Engine::on_timer`] has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.reassembler.deadline(),
            self.inactivity.deadline(),
            self.wifi.deadline(),
            self.lte.deadline(),
            self.provision.deadline(),
            self.storage.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Drive the engine until [`Event::Shutdown`]
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        info!("Engine running");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if !self.handle_event(event, Instant::now()) {
                        break;
                    }
                }
                _ = sleep_until(deadline) => self.on_timer(Instant::now()),
            }
        }
    }

    /// Peer went away: the session state goes, external work carries on
    ///
    /// Only the inactivity countdown is dropped. The watchdog stays set, so
    /// the next response sent (for instance from a workflow that outlives
    /// the session) arms it again.
    fn client_disconnected(&mut self) {
        info!("Client disconnected, resetting session state");
        self.scan.cancel();
        self.transport.flush();
        self.inactivity.cancel();
        self.reassembler.reset();
    }

    pub(crate) fn finish_provision(&mut self, reply: Reply, now: Instant) {
        let succeeded = reply.status == Status::Success;
        self.emit(reply, now);
        if succeeded {
            info!("Provisioning complete, disabling provisioning API");
            self.caps.provisioning = false;
            self.caps.edge = false;
            if let Some(hook) = self.on_provisioned.as_mut() {
                hook();
            }
        }
    }

    pub(crate) fn respond(
        &mut self,
        header: &RequestHeader,
        status: Status,
        data: Option<Value>,
        now: Instant,
    ) {
        let mut reply = Reply::new(header.clone(), status);
        reply.data = data;
        self.emit(reply, now);
    }

    /// Encode a reply and queue it on the transport
    pub(crate) fn emit(&mut self, reply: Reply, now: Instant) {
        let envelope = reply.header.response(reply.status, reply.data);
        info!("Sending {} response ({})", envelope.msg_type, envelope.status.code());

        let on_complete = reply.continue_scan.map(|generation| {
            let events = self.events.clone();
            Box::new(move || {
                let _ = events.send(Event::ScanBatchDelivered(generation));
            }) as Completion
        });
        self.transport.send(encode(&envelope), on_complete);
        self.inactivity.rearm(now);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
