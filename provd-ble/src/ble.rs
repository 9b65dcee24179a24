//! BLE client for provd gateways
//!
//! Provides functions to scan for gateways and to run requests over the
//! provisioning service.

use std::pin::Pin;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use log::*;
use serde_json::Value;
use uuid::Uuid;

use provd_proto::ble::{DEFAULT_CHUNK_SIZE, RX_UUID, SERVICE_UUID, TX_UUID};
use provd_proto::{encode, Envelope};

use crate::frames::{fragments, ResponseReader};

type BoxError = Box<dyn std::error::Error>;
type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// A discovered BLE device
#[derive(Debug, Clone)]
pub struct ProvdDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    /// Advertises the provisioning service
    pub is_provd: bool,
}

fn service_uuid() -> Result<Uuid, BoxError> {
    Ok(Uuid::parse_str(SERVICE_UUID)?)
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, BoxError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or_else(|| "No Bluetooth adapter found".into())
}

/// Scan for BLE devices
///
/// Gateways advertising the provisioning service have `is_provd = true`.
pub async fn scan(duration_secs: u64) -> Result<Vec<ProvdDevice>, BoxError> {
    let adapter = get_adapter().await?;
    let service = service_uuid()?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            devices.push(ProvdDevice {
                name: props.local_name.unwrap_or_else(|| "Unknown".to_string()),
                address: peripheral.address().to_string(),
                rssi: props.rssi,
                is_provd: props.services.contains(&service),
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find a gateway by name/address pattern, or the first one advertising
/// the provisioning service
pub async fn find_device(target: Option<&str>) -> Result<Peripheral, BoxError> {
    let adapter = get_adapter().await?;
    let service = service_uuid()?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let addr = peripheral.address().to_string();

            let matches = match target {
                Some(t) => name.contains(t) || addr.contains(t),
                None => props.services.contains(&service),
            };

            if matches {
                adapter.stop_scan().await?;
                info!("Found device: {name} ({addr})");
                return Ok(peripheral);
            }
        }
    }

    adapter.stop_scan().await?;
    Err("No provd gateway found".into())
}

/// A connected gateway with the response characteristic subscribed
pub struct Session {
    device: Peripheral,
    rx: Characteristic,
    tx: Characteristic,
    notifications: Notifications,
    reader: ResponseReader,
    next_id: u64,
    timeout: Duration,
}

impl Session {
    /// Connect to a gateway and subscribe to its indications
    pub async fn open(target: Option<&str>) -> Result<Self, BoxError> {
        let device = find_device(target).await?;

        info!("Connecting...");
        device.connect().await?;
        device.discover_services().await?;

        let rx_uuid = Uuid::parse_str(RX_UUID)?;
        let tx_uuid = Uuid::parse_str(TX_UUID)?;
        let characteristics = device.characteristics();

        let rx = characteristics
            .iter()
            .find(|c| c.uuid == rx_uuid)
            .cloned()
            .ok_or("Request characteristic not found")?;

        let tx = characteristics
            .iter()
            .find(|c| c.uuid == tx_uuid)
            .cloned()
            .ok_or("Response characteristic not found")?;

        device.subscribe(&tx).await?;
        let notifications = device.notifications().await?;
        info!("Connected");

        Ok(Self {
            device,
            rx,
            tx,
            notifications,
            reader: ResponseReader::new(),
            next_id: 1,
            timeout: Duration::from_secs(120),
        })
    }

    /// Give up on a request when no response fragment arrives for this long
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send one request and wait for its terminal response
    ///
    /// Intermediate responses are handed to `on_intermediate` as they
    /// arrive. Responses carrying another request id are skipped.
    pub async fn request(
        &mut self,
        msg_type: &str,
        data: Option<Value>,
        mut on_intermediate: impl FnMut(&Envelope),
    ) -> Result<Envelope, BoxError> {
        let id = self.next_id;
        self.next_id += 1;

        let wire = encode(&Envelope::request(id, msg_type, data));
        debug!("Sending {msg_type} (id {id}, {} bytes)", wire.len());
        for part in fragments(&wire, DEFAULT_CHUNK_SIZE) {
            self.device.write(&self.rx, part, WriteType::WithResponse).await?;
        }

        loop {
            let envelope = self.next_envelope().await?;
            if envelope.id != Value::from(id) {
                warn!("Skipping response for id {} ({})", envelope.id, envelope.msg_type);
                continue;
            }
            if envelope.status.is_terminal() {
                return Ok(envelope);
            }
            on_intermediate(&envelope);
        }
    }

    async fn next_envelope(&mut self) -> Result<Envelope, BoxError> {
        loop {
            let notification = tokio::time::timeout(self.timeout, self.notifications.next())
                .await
                .map_err(|_| "Timed out waiting for a response")?
                .ok_or("Gateway disconnected")?;

            if notification.uuid != self.tx.uuid {
                continue;
            }

            match self.reader.push(&notification.value) {
                Ok(Some(envelope)) => return Ok(envelope),
                Ok(None) => {}
                Err(e) => warn!("Dropping unreadable response: {e}"),
            }
        }
    }

    /// Unsubscribe and disconnect, ignoring failures from a gateway that
    /// already went away
    pub async fn close(self) {
        if let Err(e) = self.device.unsubscribe(&self.tx).await {
            debug!("unsubscribe failed: {e}");
        }
        let _ = self.device.disconnect().await;
    }
}
