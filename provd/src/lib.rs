//! provd - BLE provisioning agent for cellular/Wi-Fi gateways
//!
//! A mobile app talks to the gateway over a pair of GATT characteristics:
//! requests are written in fragments, responses come back as confirmed
//! indications. This crate is the protocol engine behind that link:
//!
//! - [`transport`]: chunking with one indication in flight
//! - [`reassembler`]: joins request fragments, drops stalled input
//! - [`Engine`]: request dispatch plus the long-running workflows
//!   (access point scan, Wi-Fi/LTE activation, provisioning, storage swap)
//! - [`inactivity`]: watchdog used to power the radio down when idle
//!
//! Network, modem, storage and provisioning subsystems sit behind the
//! traits in [`services`]; [`sim`] provides an in-memory implementation.

pub mod config;
mod dispatch;
mod engine;
mod error;
pub mod inactivity;
pub mod notify;
pub mod peripheral;
pub mod reassembler;
pub mod services;
pub mod sim;
pub mod transport;
pub mod workflow;

pub use config::{Capabilities, Config, Timing};
pub use engine::{Engine, EngineHandle, Event};
pub use error::{ConfigError, ServiceError};
pub use services::{
    ActivationLink, ActivationStatus, CellularService, LinkFailure, LinkState, NetworkService,
    ProfileId, ProvisionState, ProvisionTarget, ProvisioningService, ScanBatch, Services,
    StorageService, SystemService,
};
pub use transport::{ChunkTransport, Indicate};
