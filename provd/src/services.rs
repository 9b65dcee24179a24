//! Collaborator traits
//!
//! The engine never talks to the network manager, modem manager, storage
//! daemon or provisioning agent directly. Platform crates implement these
//! traits; [`crate::sim`] implements them in memory.
//!
//! Every call is non-blocking: long operations are started here and their
//! outcome is observed by polling or through state-change events fed to
//! [`crate::EngineHandle`].

use std::time::Duration;

use provd_proto::{
    AccessPoint, Connectivity, EdgeProvisionRequest, LteConfig, ProvisionRequest, StorageInfo,
    StorageState, WifiConfig,
};
use serde_json::Value;

use crate::ServiceError;

/// Stable identifier of a persisted network profile
pub type ProfileId = String;

/// Why a link failed to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    /// Wrong key or rejected credentials
    Auth,
    /// Cellular only
    NoSim,
    /// No route, no carrier, association failed
    Network,
}

impl LinkFailure {
    pub fn error(self) -> ServiceError {
        match self {
            LinkFailure::Auth => ServiceError::Auth,
            LinkFailure::NoSim => ServiceError::NoSim,
            LinkFailure::Network => ServiceError::NoConnection,
        }
    }
}

/// Link-layer state of a network device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Activating,
    Activated,
    Failed(LinkFailure),
}

impl LinkState {
    pub fn name(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Activating => "activating",
            LinkState::Activated => "activated",
            LinkState::Failed(_) => "failed",
        }
    }

    /// Numeric link status for `getLTEStatus`; a failed link reports the
    /// status code of its failure
    pub fn code(self) -> i32 {
        match self {
            LinkState::Disconnected => 0,
            LinkState::Activating => 1,
            LinkState::Activated => 2,
            LinkState::Failed(failure) => failure.error().status().code(),
        }
    }
}

/// Snapshot reported by a network or cellular service
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActivationStatus {
    pub link: LinkState,
    /// Profile backing the active connection, if any
    pub active_profile: Option<ProfileId>,
    pub connectivity: Connectivity,
}

/// Access points collected within one batch budget
#[derive(Debug, Clone, Default)]
pub struct ScanBatch {
    pub access_points: Vec<AccessPoint>,
    /// No more access points will follow
    pub exhausted: bool,
}

/// What an activation workflow needs from a link
pub trait ActivationLink {
    fn activation_status(&self) -> ActivationStatus;

    /// Remove a profile created by a failed activation
    fn cleanup(&mut self, profile: &ProfileId);
}

pub trait NetworkService: ActivationLink + Send {
    /// Start a fresh enumeration of visible access points
    fn begin_scan(&mut self) -> Result<(), ServiceError>;

    /// Pull access points from the enumeration for at most `budget`
    fn list_access_points(&mut self, budget: Duration) -> Result<ScanBatch, ServiceError>;

    /// Create or update the profile for `config` and bring it up
    ///
    /// Profiles are keyed by a stable identifier derived from the config,
    /// so repeated attempts replace rather than accumulate.
    ///
    /// On success the link must already have left any `Failed` state of an
    /// earlier attempt: a `Failed` status seen afterwards is taken as the
    /// failure of this one.
    fn activate(&mut self, config: &WifiConfig) -> Result<ProfileId, ServiceError>;

    /// Persist profiles without activating them
    fn save_profiles(&mut self, configs: &[WifiConfig]) -> Result<(), ServiceError>;

    /// SSIDs of persisted profiles
    fn saved_profiles(&self) -> Vec<String>;

    fn connectivity(&self) -> Connectivity;
}

pub trait CellularService: ActivationLink + Send {
    /// Create or update the cellular profile and bring it up
    ///
    /// Same contract as [`NetworkService::activate`]: a stale `Failed`
    /// status must be gone before this returns.
    fn connect(&mut self, config: &LteConfig) -> Result<ProfileId, ServiceError>;

    /// Modem properties (IMEI, operator, cell ids, APN, ...)
    fn info(&self) -> serde_json::Map<String, Value>;
}

/// Provisioning agent state, with its wire codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionState {
    Success,
    #[default]
    Unprovisioned,
    Downloading,
    Applying,
    FailedInvalid,
    FailedConnect,
    FailedAuth,
    FailedTimeout,
    FailedNotFound,
}

impl ProvisionState {
    pub const fn code(self) -> i32 {
        match self {
            ProvisionState::Success => 0,
            ProvisionState::Unprovisioned => 1,
            ProvisionState::Downloading => 2,
            ProvisionState::Applying => 3,
            ProvisionState::FailedInvalid => -1,
            ProvisionState::FailedConnect => -2,
            ProvisionState::FailedAuth => -3,
            ProvisionState::FailedTimeout => -4,
            ProvisionState::FailedNotFound => -5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ProvisionState::Success,
            1 => ProvisionState::Unprovisioned,
            2 => ProvisionState::Downloading,
            3 => ProvisionState::Applying,
            -1 => ProvisionState::FailedInvalid,
            -2 => ProvisionState::FailedConnect,
            -3 => ProvisionState::FailedAuth,
            -4 => ProvisionState::FailedTimeout,
            -5 => ProvisionState::FailedNotFound,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ProvisionState::Success => "success",
            ProvisionState::Unprovisioned => "unprovisioned",
            ProvisionState::Downloading => "downloading",
            ProvisionState::Applying => "applying",
            ProvisionState::FailedInvalid => "failed-invalid",
            ProvisionState::FailedConnect => "failed-connect",
            ProvisionState::FailedAuth => "failed-auth",
            ProvisionState::FailedTimeout => "failed-timeout",
            ProvisionState::FailedNotFound => "failed-not-found",
        }
    }

    /// Outcome of a finished attempt; `None` while still running or idle
    pub fn outcome(self) -> Option<Result<(), ServiceError>> {
        Some(match self {
            ProvisionState::Success => Ok(()),
            ProvisionState::FailedAuth => Err(ServiceError::Auth),
            ProvisionState::FailedTimeout => Err(ServiceError::Timeout),
            ProvisionState::FailedConnect => {
                Err(ServiceError::NotFound("provisioning endpoint unreachable".into()))
            }
            ProvisionState::FailedNotFound => {
                Err(ServiceError::NotFound("provisioning endpoint not found".into()))
            }
            ProvisionState::FailedInvalid => {
                Err(ServiceError::BadConfig("rejected provisioning credentials".into()))
            }
            ProvisionState::Unprovisioned
            | ProvisionState::Downloading
            | ProvisionState::Applying => return None,
        })
    }
}

/// Where to provision from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionTarget {
    Url(ProvisionRequest),
    Edge(EdgeProvisionRequest),
}

impl ProvisionTarget {
    pub fn url(&self) -> &str {
        match self {
            ProvisionTarget::Url(r) => &r.url,
            ProvisionTarget::Edge(r) => &r.url,
        }
    }
}

pub trait ProvisioningService: Send {
    /// Hand the target to the provisioning agent; returns its state right
    /// after accepting it
    fn start(&mut self, target: &ProvisionTarget) -> ProvisionState;

    fn state(&self) -> ProvisionState;

    fn is_provisioned(&self) -> bool;
}

pub trait StorageService: Send {
    fn state(&self) -> StorageState;

    fn info(&self) -> StorageInfo;

    /// Ask the storage daemon to stop using the card so it can be removed
    fn stop(&mut self) -> Result<(), ServiceError>;

    fn format(&mut self) -> Result<(), ServiceError>;
}

pub trait SystemService: Send {
    /// Usually the Wi-Fi MAC address
    fn device_id(&self) -> String;

    fn firmware_version(&self) -> String;

    fn update_config(&mut self, config: &Value) -> Result<(), ServiceError>;

    /// Report on available firmware updates
    fn check_update(&mut self) -> Result<Value, ServiceError>;
}

/// The collaborators one gateway model provides
pub struct Services {
    pub system: Box<dyn SystemService>,
    pub network: Box<dyn NetworkService>,
    pub cellular: Option<Box<dyn CellularService>>,
    pub provisioning: Option<Box<dyn ProvisioningService>>,
    pub storage: Option<Box<dyn StorageService>>,
}
