//! Request routing and the one-shot request handlers

use log::*;
use provd_proto::{
    EdgeProvisionRequest, Envelope, LteConfig, ProvisionRequest, RequestHeader, RequestType,
    Status, WifiConfig, PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::engine::Engine;
use crate::transport::Indicate;
use crate::{ActivationLink, ProvisionTarget, ServiceError};

/// Why a request got no normal answer
enum Rejection {
    /// Unusable body; logged and dropped, the client retries
    Malformed(String),
    Failed(ServiceError),
}

impl From<ServiceError> for Rejection {
    fn from(e: ServiceError) -> Self {
        Rejection::Failed(e)
    }
}

type Handled = Result<(), Rejection>;

/// Deserialize the request body
fn body<T: DeserializeOwned>(request: &Envelope) -> Result<T, Rejection> {
    let data = request
        .data
        .clone()
        .ok_or_else(|| Rejection::Malformed("missing data".to_string()))?;
    serde_json::from_value(data).map_err(|e| Rejection::Malformed(e.to_string()))
}

fn require(enabled: bool, api: &'static str) -> Result<(), ServiceError> {
    if enabled {
        Ok(())
    } else {
        Err(ServiceError::Disabled(api))
    }
}

impl<I: Indicate> Engine<I> {
    /// Route a complete request to its handler
    pub(crate) fn dispatch(&mut self, request: Envelope, now: Instant) {
        let header = request.header();
        info!("Processing request: {}", header.msg_type);

        self.scan.cancel();
        self.inactivity.rearm(now);

        let kind = RequestType::parse(&header.msg_type);
        if kind != Some(RequestType::Version) && request.version > PROTOCOL_VERSION {
            warn!(
                "Request version {} is newer than {PROTOCOL_VERSION}",
                request.version
            );
            self.respond(&header, Status::ErrInvalid, None, now);
            return;
        }
        let Some(kind) = kind else {
            warn!("Unknown request type {}", header.msg_type);
            self.respond(&header, Status::ErrInvalid, None, now);
            return;
        };

        match self.handle_request(kind, &header, &request, now) {
            Ok(()) => {}
            Err(Rejection::Malformed(e)) => {
                warn!("Invalid {} request, ignoring: {e}", header.msg_type);
            }
            Err(Rejection::Failed(e)) => {
                warn!("{} failed: {e}", header.msg_type);
                self.respond(&header, e.status(), None, now);
            }
        }
    }

    fn handle_request(
        &mut self,
        kind: RequestType,
        header: &RequestHeader,
        request: &Envelope,
        now: Instant,
    ) -> Handled {
        match kind {
            RequestType::Version => {
                self.respond(header, Status::Success, None, now);
            }
            RequestType::GetDeviceId => {
                let data = json!({
                    "deviceId": self.services.system.device_id(),
                    "name": self.device_name,
                    "version": self.services.system.firmware_version(),
                });
                self.respond(header, Status::Success, Some(data), now);
            }
            RequestType::GetDeviceCaps => self.device_caps(header, now),
            RequestType::GetAccessPoints => {
                require(self.caps.wifi, "wifi")?;
                self.ensure_unprovisioned()?;
                let reply = self.scan.start(header.clone(), self.services.network.as_mut())?;
                self.emit(reply, now);
            }
            RequestType::ConnectAp => {
                require(self.caps.wifi, "wifi")?;
                self.ensure_unprovisioned()?;
                let config: WifiConfig = body(request)?;
                config.security().map_err(ServiceError::from)?;
                self.wifi.ensure_idle()?;
                let profile = self.services.network.activate(&config)?;
                let reply = self.wifi.start(header.clone(), profile, now);
                self.emit(reply, now);
            }
            RequestType::UpdateAps => {
                require(self.caps.wifi, "wifi")?;
                let configs: Vec<WifiConfig> = body(request)?;
                for config in &configs {
                    config.security().map_err(ServiceError::from)?;
                }
                self.services.network.save_profiles(&configs)?;
                info!("Saved {} Wi-Fi profile(s)", configs.len());
                self.respond(header, Status::Success, None, now);
            }
            RequestType::GetAps => {
                require(self.caps.wifi, "wifi")?;
                let aps: Vec<Value> = self
                    .services
                    .network
                    .saved_profiles()
                    .into_iter()
                    .map(|ssid| json!({ "ssid": ssid }))
                    .collect();
                self.respond(header, Status::Success, Some(Value::Array(aps)), now);
            }
            RequestType::ConnectLte => {
                require(self.caps.lte, "lte")?;
                self.ensure_unprovisioned()?;
                let config: LteConfig = body(request)?;
                config.validate().map_err(ServiceError::from)?;
                self.lte.ensure_idle()?;
                let cellular = self
                    .services
                    .cellular
                    .as_deref_mut()
                    .ok_or(ServiceError::Disabled("lte"))?;
                let profile = cellular.connect(&config)?;
                let reply = self.lte.start(header.clone(), profile, now);
                self.emit(reply, now);
            }
            RequestType::ProvisionUrl => {
                require(self.caps.provisioning, "provisioning")?;
                let target = ProvisionTarget::Url(body::<ProvisionRequest>(request)?);
                self.start_provisioning(header, target, now)?;
            }
            RequestType::ProvisionEdge => {
                require(self.caps.edge, "edge")?;
                let target = ProvisionTarget::Edge(body::<EdgeProvisionRequest>(request)?);
                self.start_provisioning(header, target, now)?;
            }
            RequestType::GetStorageInfo => {
                require(self.caps.storage, "storage")?;
                let storage = self
                    .services
                    .storage
                    .as_deref()
                    .ok_or(ServiceError::Disabled("storage"))?;
                let data = serde_json::to_value(storage.info()).unwrap_or_default();
                self.respond(header, Status::Success, Some(data), now);
            }
            RequestType::ExtStorageSwap => {
                require(self.caps.storage, "storage")?;
                let storage = self
                    .services
                    .storage
                    .as_deref_mut()
                    .ok_or(ServiceError::Disabled("storage"))?;
                let reply = self.storage.start(header.clone(), storage, now)?;
                self.emit(reply, now);
            }
            RequestType::GetLteInfo => {
                require(self.caps.lte, "lte")?;
                let cellular = self
                    .services
                    .cellular
                    .as_deref()
                    .ok_or(ServiceError::Disabled("lte"))?;
                let data = Value::Object(cellular.info());
                self.respond(header, Status::Success, Some(data), now);
            }
            RequestType::GetLteStatus => {
                require(self.caps.lte, "lte")?;
                let cellular = self
                    .services
                    .cellular
                    .as_deref()
                    .ok_or(ServiceError::Disabled("lte"))?;
                let link = cellular.activation_status().link;
                let data = json!({
                    "status": link.code(),
                    "state": link.name(),
                });
                self.respond(header, Status::Success, Some(data), now);
            }
            RequestType::ConnCheck => {
                let data = json!({ "connectivity": self.services.network.connectivity() });
                self.respond(header, Status::Success, Some(data), now);
            }
            RequestType::UpdateConfig => {
                require(self.caps.config_update, "config")?;
                let config: Value = body(request)?;
                self.services.system.update_config(&config)?;
                self.respond(header, Status::Success, None, now);
            }
            RequestType::CheckUpdate => {
                require(self.caps.config_update, "update")?;
                let report = self.services.system.check_update()?;
                self.respond(header, Status::Success, Some(report), now);
            }
        }
        Ok(())
    }

    fn device_caps(&mut self, header: &RequestHeader, now: Instant) {
        let mut data = serde_json::Map::new();
        if self.caps.provisioning {
            let provisioned = self.is_provisioned();
            data.insert(
                "isProvisioned".to_string(),
                json!(if provisioned { "True" } else { "False" }),
            );
        }
        let caps = self.caps.device_caps();
        if !caps.is_empty() {
            data.insert("deviceCaps".to_string(), json!(caps));
        }
        self.respond(header, Status::Success, Some(Value::Object(data)), now);
    }

    fn is_provisioned(&self) -> bool {
        self.services
            .provisioning
            .as_deref()
            .is_some_and(|p| p.is_provisioned())
    }

    /// Network changes are locked once the gateway is provisioned
    fn ensure_unprovisioned(&self) -> Result<(), ServiceError> {
        if self.caps.provisioning && self.is_provisioned() {
            return Err(ServiceError::invalid("gateway is already provisioned"));
        }
        Ok(())
    }

    fn start_provisioning(
        &mut self,
        header: &RequestHeader,
        target: ProvisionTarget,
        now: Instant,
    ) -> Result<(), ServiceError> {
        if target.url().trim().is_empty() {
            return Err(ServiceError::BadConfig("empty provisioning url".into()));
        }
        self.provision.ensure_idle()?;
        let provisioning = self
            .services
            .provisioning
            .as_deref_mut()
            .ok_or(ServiceError::Disabled("provisioning"))?;
        if provisioning.is_provisioned() {
            return Err(ServiceError::invalid("gateway is already provisioned"));
        }

        let initial = provisioning.start(&target);
        let reply = self.provision.start(header.clone(), initial, now);
        if reply.status.is_terminal() {
            self.finish_provision(reply, now);
        } else {
            self.emit(reply, now);
        }
        Ok(())
    }
}
