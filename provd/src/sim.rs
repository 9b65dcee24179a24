//! In-memory gateway backend
//!
//! Implements every collaborator trait over one shared [`SimState`]. Tests
//! set the state directly and feed the matching events to the engine; the
//! bench daemon uses [`Sim::demo`], where links and provisioning advance
//! by themselves as they are polled.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::*;
use provd_proto::{
    AccessPoint, Connectivity, LteConfig, StorageInfo, StorageState, WifiConfig,
};
use serde_json::{json, Value};

use crate::{
    ActivationLink, ActivationStatus, CellularService, LinkFailure, LinkState, NetworkService,
    ProfileId, ProvisionState, ProvisionTarget, ProvisioningService, ScanBatch, ServiceError,
    Services, StorageService, SystemService,
};

/// Polls an automatic activation or provisioning phase takes in demo mode
const DEMO_POLLS: u32 = 3;

#[derive(Debug)]
pub struct SimState {
    pub device_id: String,
    pub version: String,

    pub access_points: Vec<AccessPoint>,
    /// Access points returned per `list_access_points` call
    pub scan_batch_size: usize,
    pub scan_error: Option<ServiceError>,
    /// Number of `begin_scan` calls
    pub scans_started: u32,
    scan_pending: VecDeque<AccessPoint>,

    pub profiles: Vec<(ProfileId, WifiConfig)>,
    pub removed_profiles: Vec<ProfileId>,
    pub activate_error: Option<ServiceError>,
    pub wifi: ActivationStatus,
    /// Demo mode: the PSK that authenticates; others fail with `Auth`
    pub demo_psk: Option<String>,

    pub lte: ActivationStatus,
    pub lte_configs: Vec<LteConfig>,
    pub lte_info: serde_json::Map<String, Value>,

    pub provision_state: ProvisionState,
    pub provision_targets: Vec<ProvisionTarget>,
    pub provisioned: bool,

    pub storage_state: StorageState,
    pub storage_calls: Vec<&'static str>,
    pub storage_error: Option<ServiceError>,

    pub config_updates: Vec<Value>,

    /// Advance pending activations and provisioning on each poll
    pub auto: bool,
    polls: u32,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            device_id: "c0:ee:40:00:00:01".to_string(),
            version: "1.0.0".to_string(),
            access_points: Vec::new(),
            scan_batch_size: 8,
            scan_error: None,
            scans_started: 0,
            scan_pending: VecDeque::new(),
            profiles: Vec::new(),
            removed_profiles: Vec::new(),
            activate_error: None,
            wifi: ActivationStatus::default(),
            demo_psk: None,
            lte: ActivationStatus::default(),
            lte_configs: Vec::new(),
            lte_info: serde_json::Map::new(),
            provision_state: ProvisionState::Unprovisioned,
            provision_targets: Vec::new(),
            provisioned: false,
            storage_state: StorageState::Ready,
            storage_calls: Vec::new(),
            storage_error: None,
            config_updates: Vec::new(),
            auto: false,
            polls: 0,
        }
    }
}

/// Shared handle to the simulated gateway
#[derive(Debug, Clone, Default)]
pub struct Sim {
    state: Arc<Mutex<SimState>>,
}

impl Sim {
    pub fn new() -> Self {
        Self::default()
    }

    /// A self-driving gateway with a few networks in range
    pub fn demo() -> Self {
        let sim = Self::new();
        sim.with(|s| {
            s.auto = true;
            s.demo_psk = Some("password1".to_string());
            s.scan_batch_size = 3;
            s.access_points = [
                ("lab", 80, false, true, false),
                ("lab", 40, false, true, false),
                ("guest", 55, false, false, false),
                ("corp", 62, false, false, true),
                ("", 30, false, true, false),
                ("legacy", 20, true, false, false),
            ]
            .into_iter()
            .map(|(ssid, strength, wep, psk, eap)| AccessPoint {
                ssid: ssid.to_string(),
                strength,
                wep,
                psk,
                eap,
            })
            .collect();
            s.lte_info = json!({
                "imei": "356938035643809",
                "operator": "Sim Mobile",
                "apn": "",
            })
            .as_object()
            .cloned()
            .unwrap_or_default();
        });
        sim
    }

    /// Run `f` with the state locked
    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn services(&self) -> Services {
        Services {
            system: Box::new(SimSystem(self.clone())),
            network: Box::new(SimNetwork(self.clone())),
            cellular: Some(Box::new(SimCellular(self.clone()))),
            provisioning: Some(Box::new(SimProvisioning(self.clone()))),
            storage: Some(Box::new(SimStorage(self.clone()))),
        }
    }
}

fn profile_id(ssid: &str) -> ProfileId {
    format!("wifi-{ssid}")
}

/// One simulated poll of a pending activation in demo mode
fn advance(status: &mut ActivationStatus, polls: &mut u32, outcome: Result<ProfileId, LinkFailure>) {
    if status.link != LinkState::Activating {
        return;
    }
    *polls += 1;
    if *polls < DEMO_POLLS {
        return;
    }
    match outcome {
        Ok(profile) => {
            status.link = LinkState::Activated;
            status.active_profile = Some(profile);
            status.connectivity = Connectivity::Full;
        }
        Err(failure) => status.link = LinkState::Failed(failure),
    }
}

struct SimNetwork(Sim);

impl ActivationLink for SimNetwork {
    fn activation_status(&self) -> ActivationStatus {
        self.0.with(|s| {
            if s.auto {
                let outcome = match (s.profiles.last(), &s.demo_psk) {
                    (Some((id, cfg)), Some(psk)) if cfg.psk.as_deref() == Some(psk.as_str()) => {
                        Ok(id.clone())
                    }
                    (Some((id, cfg)), _) if cfg.psk.is_none() => Ok(id.clone()),
                    _ => Err(LinkFailure::Auth),
                };
                advance(&mut s.wifi, &mut s.polls, outcome);
            }
            s.wifi.clone()
        })
    }

    fn cleanup(&mut self, profile: &ProfileId) {
        self.0.with(|s| {
            info!("sim: removing profile {profile}");
            s.profiles.retain(|(id, _)| id != profile);
            s.removed_profiles.push(profile.clone());
            if s.wifi.active_profile.as_ref() == Some(profile) {
                s.wifi = ActivationStatus::default();
            }
        })
    }
}

impl NetworkService for SimNetwork {
    fn begin_scan(&mut self) -> Result<(), ServiceError> {
        self.0.with(|s| {
            s.scans_started += 1;
            s.scan_pending = s.access_points.iter().cloned().collect();
            Ok(())
        })
    }

    fn list_access_points(&mut self, _budget: Duration) -> Result<ScanBatch, ServiceError> {
        self.0.with(|s| {
            if let Some(e) = s.scan_error.clone() {
                return Err(e);
            }
            let n = s.scan_batch_size.max(1).min(s.scan_pending.len());
            let access_points = s.scan_pending.drain(..n).collect();
            Ok(ScanBatch {
                access_points,
                exhausted: s.scan_pending.is_empty(),
            })
        })
    }

    fn activate(&mut self, config: &WifiConfig) -> Result<ProfileId, ServiceError> {
        self.0.with(|s| {
            if let Some(e) = s.activate_error.clone() {
                return Err(e);
            }
            let id = profile_id(&config.ssid);
            s.profiles.retain(|(existing, _)| *existing != id);
            s.profiles.push((id.clone(), config.clone()));
            s.wifi.link = LinkState::Activating;
            s.polls = 0;
            info!("sim: activating {id}");
            Ok(id)
        })
    }

    fn save_profiles(&mut self, configs: &[WifiConfig]) -> Result<(), ServiceError> {
        self.0.with(|s| {
            for config in configs {
                let id = profile_id(&config.ssid);
                s.profiles.retain(|(existing, _)| *existing != id);
                s.profiles.push((id, config.clone()));
            }
            Ok(())
        })
    }

    fn saved_profiles(&self) -> Vec<String> {
        self.0.with(|s| s.profiles.iter().map(|(_, cfg)| cfg.ssid.clone()).collect())
    }

    fn connectivity(&self) -> Connectivity {
        self.0.with(|s| s.wifi.connectivity)
    }
}

struct SimCellular(Sim);

impl ActivationLink for SimCellular {
    fn activation_status(&self) -> ActivationStatus {
        self.0.with(|s| {
            if s.auto {
                advance(&mut s.lte, &mut s.polls, Ok("lte".to_string()));
            }
            s.lte.clone()
        })
    }

    fn cleanup(&mut self, profile: &ProfileId) {
        self.0.with(|s| {
            info!("sim: removing profile {profile}");
            s.removed_profiles.push(profile.clone());
            s.lte = ActivationStatus::default();
        })
    }
}

impl CellularService for SimCellular {
    fn connect(&mut self, config: &LteConfig) -> Result<ProfileId, ServiceError> {
        self.0.with(|s| {
            s.lte_configs.push(config.clone());
            s.lte_info.insert("apn".to_string(), json!(config.apn));
            s.lte.link = LinkState::Activating;
            s.polls = 0;
            Ok("lte".to_string())
        })
    }

    fn info(&self) -> serde_json::Map<String, Value> {
        self.0.with(|s| s.lte_info.clone())
    }
}

struct SimProvisioning(Sim);

impl ProvisioningService for SimProvisioning {
    fn start(&mut self, target: &ProvisionTarget) -> ProvisionState {
        self.0.with(|s| {
            info!("sim: provisioning from {}", target.url());
            s.provision_targets.push(target.clone());
            if s.auto {
                s.provision_state = ProvisionState::Downloading;
                s.polls = 0;
            }
            s.provision_state
        })
    }

    fn state(&self) -> ProvisionState {
        self.0.with(|s| {
            if s.auto {
                s.polls += 1;
                if s.polls >= DEMO_POLLS {
                    s.polls = 0;
                    s.provision_state = match s.provision_state {
                        ProvisionState::Downloading => ProvisionState::Applying,
                        ProvisionState::Applying => {
                            s.provisioned = true;
                            ProvisionState::Success
                        }
                        other => other,
                    };
                }
            }
            s.provision_state
        })
    }

    fn is_provisioned(&self) -> bool {
        self.0.with(|s| s.provisioned)
    }
}

struct SimStorage(Sim);

impl StorageService for SimStorage {
    fn state(&self) -> StorageState {
        self.0.with(|s| s.storage_state)
    }

    fn info(&self) -> StorageInfo {
        self.0.with(|s| {
            let mut info = StorageInfo::new(s.storage_state);
            if matches!(s.storage_state, StorageState::Ready | StorageState::Full) {
                info.total_bytes = Some(32 << 30);
                info.free_bytes = Some(if s.storage_state == StorageState::Full { 0 } else { 20 << 30 });
            }
            info
        })
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        self.0.with(|s| {
            s.storage_calls.push("stop");
            match s.storage_error.clone() {
                Some(e) => Err(e),
                None => {
                    s.storage_state = StorageState::Stopping;
                    Ok(())
                }
            }
        })
    }

    fn format(&mut self) -> Result<(), ServiceError> {
        self.0.with(|s| {
            s.storage_calls.push("format");
            match s.storage_error.clone() {
                Some(e) => Err(e),
                None => {
                    s.storage_state = StorageState::Formatting;
                    Ok(())
                }
            }
        })
    }
}

struct SimSystem(Sim);

impl SystemService for SimSystem {
    fn device_id(&self) -> String {
        self.0.with(|s| s.device_id.clone())
    }

    fn firmware_version(&self) -> String {
        self.0.with(|s| s.version.clone())
    }

    fn update_config(&mut self, config: &Value) -> Result<(), ServiceError> {
        if !config.is_object() {
            return Err(ServiceError::BadConfig("config must be an object".into()));
        }
        self.0.with(|s| s.config_updates.push(config.clone()));
        Ok(())
    }

    fn check_update(&mut self) -> Result<Value, ServiceError> {
        self.0.with(|s| Ok(json!({ "current": s.version, "available": false })))
    }
}
