//! provd wire protocol - envelope, status codes and request vocabulary
//!
//! Everything that crosses the BLE link lives here so the device-side
//! engine (`provd`) and the central client (`provd-ble`) agree on it.

pub mod ble;
mod envelope;
mod types;

pub use envelope::{decode, encode, DecodeError, Envelope, RequestHeader};
pub use types::{
    AccessPoint, Connectivity, EdgeProvisionRequest, InvalidRequest, LteConfig,
    ProvisionRequest, StorageInfo, StorageState, WifiConfig, WifiSecurity,
};

/// Highest envelope version this engine understands
///
/// Requests carrying an older version are always served; newer ones are
/// refused with [`Status::ErrInvalid`] (except the version probe).
pub const PROTOCOL_VERSION: i64 = 1;

/// Response status taxonomy
///
/// The integer codes are a stable wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Status {
    #[default]
    Success,
    Intermediate,
    ErrInvalid,
    ErrTimeout,
    ErrAuth,
    ErrNotFound,
    ErrNoConn,
    ErrDevice,
    ErrApiDisabled,
    ErrNoSim,
    ErrBadConfig,
    ErrUnknown,
}

impl Status {
    pub const fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Intermediate => 1,
            Status::ErrInvalid => -1,
            Status::ErrTimeout => -2,
            Status::ErrAuth => -3,
            Status::ErrNotFound => -4,
            Status::ErrNoConn => -5,
            Status::ErrDevice => -6,
            Status::ErrApiDisabled => -7,
            Status::ErrNoSim => -8,
            Status::ErrBadConfig => -9,
            Status::ErrUnknown => -10,
        }
    }

    /// Terminal responses close a request; intermediate ones report progress
    pub fn is_terminal(self) -> bool {
        self != Status::Intermediate
    }

    pub fn is_error(self) -> bool {
        self.code() < 0
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> i32 {
        status.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown status code {0}")]
pub struct UnknownStatus(pub i32);

impl TryFrom<i32> for Status {
    type Error = UnknownStatus;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Status::Success,
            1 => Status::Intermediate,
            -1 => Status::ErrInvalid,
            -2 => Status::ErrTimeout,
            -3 => Status::ErrAuth,
            -4 => Status::ErrNotFound,
            -5 => Status::ErrNoConn,
            -6 => Status::ErrDevice,
            -7 => Status::ErrApiDisabled,
            -8 => Status::ErrNoSim,
            -9 => Status::ErrBadConfig,
            -10 => Status::ErrUnknown,
            other => return Err(UnknownStatus(other)),
        })
    }
}

/// Request types consumed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Version,
    GetDeviceId,
    GetDeviceCaps,
    GetAccessPoints,
    ConnectAp,
    UpdateAps,
    GetAps,
    ConnectLte,
    ProvisionUrl,
    ProvisionEdge,
    GetStorageInfo,
    ExtStorageSwap,
    GetLteInfo,
    GetLteStatus,
    ConnCheck,
    UpdateConfig,
    CheckUpdate,
}

impl RequestType {
    pub const ALL: [RequestType; 17] = [
        RequestType::Version,
        RequestType::GetDeviceId,
        RequestType::GetDeviceCaps,
        RequestType::GetAccessPoints,
        RequestType::ConnectAp,
        RequestType::UpdateAps,
        RequestType::GetAps,
        RequestType::ConnectLte,
        RequestType::ProvisionUrl,
        RequestType::ProvisionEdge,
        RequestType::GetStorageInfo,
        RequestType::ExtStorageSwap,
        RequestType::GetLteInfo,
        RequestType::GetLteStatus,
        RequestType::ConnCheck,
        RequestType::UpdateConfig,
        RequestType::CheckUpdate,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            RequestType::Version => "version",
            RequestType::GetDeviceId => "getDeviceId",
            RequestType::GetDeviceCaps => "getDeviceCaps",
            RequestType::GetAccessPoints => "getAccessPoints",
            RequestType::ConnectAp => "connectAP",
            RequestType::UpdateAps => "updateAPS",
            RequestType::GetAps => "getAPS",
            RequestType::ConnectLte => "connectLTE",
            RequestType::ProvisionUrl => "provisionURL",
            RequestType::ProvisionEdge => "provisionEdge",
            RequestType::GetStorageInfo => "getStorageInfo",
            RequestType::ExtStorageSwap => "extStorageSwap",
            RequestType::GetLteInfo => "getLTEInfo",
            RequestType::GetLteStatus => "getLTEStatus",
            RequestType::ConnCheck => "connCheck",
            RequestType::UpdateConfig => "updateConfig",
            RequestType::CheckUpdate => "checkUpdate",
        }
    }

    /// Look up a request type by its wire name (case sensitive)
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
