//! Payload records carried in the envelope `data` field

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid request: {0}")]
pub struct InvalidRequest(pub String);

impl InvalidRequest {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// One visible Wi-Fi network, as reported in a scan batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub ssid: String,
    /// Signal strength in percent
    pub strength: u8,
    pub wep: bool,
    pub psk: bool,
    pub eap: bool,
}

/// Wi-Fi profile body of `connectAP` / `updateAPS`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WifiConfig {
    pub ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wep_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wep_index: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase2_auth: Option<String>,
    #[serde(default)]
    pub disable_ipv6: bool,
}

/// Key management derived from a [`WifiConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiSecurity {
    Open,
    Psk(String),
    Wep {
        key: String,
        index: u8,
    },
    Eap {
        method: String,
        identity: String,
        password: String,
        phase2_auth: Option<String>,
    },
}

const MAX_SSID_LEN: usize = 32;

impl WifiConfig {
    pub fn open(ssid: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            ..Default::default()
        }
    }

    pub fn with_psk(ssid: &str, psk: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            psk: Some(psk.to_string()),
            ..Default::default()
        }
    }

    /// Validate the profile and resolve its security mode
    ///
    /// `psk` wins over `wep-key`, which wins over `eap`.
    pub fn security(&self) -> Result<WifiSecurity, InvalidRequest> {
        if self.ssid.is_empty() || self.ssid.len() > MAX_SSID_LEN {
            return Err(InvalidRequest::new("ssid must be 1-32 bytes"));
        }

        if let Some(psk) = &self.psk {
            let hex_key = psk.len() == 64 && psk.bytes().all(|b| b.is_ascii_hexdigit());
            if !(8..=63).contains(&psk.len()) && !hex_key {
                return Err(InvalidRequest::new("psk must be 8-63 characters or 64 hex digits"));
            }
            return Ok(WifiSecurity::Psk(psk.clone()));
        }

        if let Some(key) = &self.wep_key {
            let index = self.wep_index.unwrap_or(0);
            if index > 3 {
                return Err(InvalidRequest::new("wep-index must be 0-3"));
            }
            if key.is_empty() {
                return Err(InvalidRequest::new("empty wep-key"));
            }
            return Ok(WifiSecurity::Wep {
                key: key.clone(),
                index,
            });
        }

        if let Some(method) = &self.eap {
            let (Some(identity), Some(password)) = (&self.identity, &self.password) else {
                return Err(InvalidRequest::new("eap requires identity and password"));
            };
            return Ok(WifiSecurity::Eap {
                method: method.clone(),
                identity: identity.clone(),
                password: password.clone(),
                phase2_auth: self.phase2_auth.clone(),
            });
        }

        Ok(WifiSecurity::Open)
    }
}

/// Body of `connectLTE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LteConfig {
    pub apn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl LteConfig {
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.apn.trim().is_empty() {
            return Err(InvalidRequest::new("empty apn"));
        }
        Ok(())
    }
}

/// Body of `provisionURL`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Body of `provisionEdge`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeProvisionRequest {
    pub url: String,
    pub company: String,
}

/// External storage lifecycle as reported by the storage service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum StorageState {
    Full,
    Failed,
    StopFailed,
    Ready,
    NotPresent,
    Unformatted,
    Formatting,
    Stopping,
    Stopped,
}

impl StorageState {
    pub const fn code(self) -> i32 {
        match self {
            StorageState::Full => -1,
            StorageState::Failed => -2,
            StorageState::StopFailed => -3,
            StorageState::Ready => 0,
            StorageState::NotPresent => 1,
            StorageState::Unformatted => 2,
            StorageState::Formatting => 3,
            StorageState::Stopping => 4,
            StorageState::Stopped => 5,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            StorageState::Full => "full",
            StorageState::Failed => "failed",
            StorageState::StopFailed => "stop-failed",
            StorageState::Ready => "ready",
            StorageState::NotPresent => "not-present",
            StorageState::Unformatted => "unformatted",
            StorageState::Formatting => "formatting",
            StorageState::Stopping => "stopping",
            StorageState::Stopped => "stopped",
        }
    }

    /// The storage service gave up on the card
    pub fn is_failure(self) -> bool {
        matches!(self, StorageState::Failed | StorageState::StopFailed)
    }
}

impl From<StorageState> for i32 {
    fn from(state: StorageState) -> i32 {
        state.code()
    }
}

impl TryFrom<i32> for StorageState {
    type Error = InvalidRequest;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            -1 => StorageState::Full,
            -2 => StorageState::Failed,
            -3 => StorageState::StopFailed,
            0 => StorageState::Ready,
            1 => StorageState::NotPresent,
            2 => StorageState::Unformatted,
            3 => StorageState::Formatting,
            4 => StorageState::Stopping,
            5 => StorageState::Stopped,
            other => return Err(InvalidRequest(format!("unknown storage status {other}"))),
        })
    }
}

/// Reply body of `getStorageInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub status: StorageState,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_bytes: Option<u64>,
}

impl StorageInfo {
    pub fn new(status: StorageState) -> Self {
        Self {
            status,
            state: status.name().to_string(),
            total_bytes: None,
            free_bytes: None,
        }
    }
}

/// Overall network reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Unknown,
    None,
    Portal,
    Limited,
    Full,
}
