//! provd BLE provisioning tool
//!
//! Talks to a gateway's provisioning service from a laptop or phone-less
//! bench setup.

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use provd_ble::ble::{self, Session};
use provd_proto::{Envelope, Status};

#[derive(Parser)]
#[command(name = "provd-ble")]
#[command(about = "BLE provisioning tool for provd gateways")]
struct Cli {
    /// Device name or address pattern (defaults to the first gateway found)
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Seconds to wait for each response before giving up
    #[arg(long, global = true, default_value = "120")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for BLE devices
    Scan {
        /// Scan duration in seconds
        #[arg(long, default_value = "5")]
        duration: u64,
    },
    /// Query the protocol version
    Version,
    /// Show device id, name and firmware version
    DeviceId,
    /// Show provisioning state and optional capabilities
    Caps,
    /// List visible Wi-Fi networks
    Aps,
    /// Join a Wi-Fi network
    ConnectAp {
        /// Network name; read with the passphrase from --file when omitted
        ssid: Option<String>,
        /// WPA passphrase
        #[arg(long)]
        psk: Option<String>,
        /// File with the SSID on the first line and passphrase on the second
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Bring up the cellular link
    ConnectLte {
        apn: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Provision the gateway against a management endpoint
    Provision {
        url: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Show external storage state
    StorageInfo,
    /// Walk through an external storage card swap
    StorageSwap,
    /// Show modem information
    LteInfo,
    /// Show network reachability
    ConnCheck,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let (msg_type, data) = match cli.command {
        Commands::Scan { duration } => return scan_devices(duration).await,
        Commands::Version => ("version", None),
        Commands::DeviceId => ("getDeviceId", None),
        Commands::Caps => ("getDeviceCaps", None),
        Commands::Aps => ("getAccessPoints", None),
        Commands::ConnectAp { ssid, psk, file } => {
            let (ssid, psk) = match (ssid, file) {
                (Some(ssid), _) => (ssid, psk),
                (None, Some(file)) => {
                    let (ssid, psk) = read_wifi_credentials(&file)?;
                    (ssid, Some(psk))
                }
                (None, None) => return Err("Give an SSID or --file".into()),
            };
            let mut body = json!({ "ssid": ssid });
            if let Some(psk) = psk {
                body["psk"] = json!(psk);
            }
            ("connectAP", Some(body))
        }
        Commands::ConnectLte { apn, username, password } => {
            let mut body = json!({ "apn": apn });
            if let Some(username) = username {
                body["username"] = json!(username);
            }
            if let Some(password) = password {
                body["password"] = json!(password);
            }
            ("connectLTE", Some(body))
        }
        Commands::Provision { url, username, password } => (
            "provisionURL",
            Some(json!({ "url": url, "username": username, "password": password })),
        ),
        Commands::StorageInfo => ("getStorageInfo", None),
        Commands::StorageSwap => ("extStorageSwap", None),
        Commands::LteInfo => ("getLTEInfo", None),
        Commands::ConnCheck => ("connCheck", None),
    };

    let mut session = Session::open(cli.device.as_deref()).await?;
    session.set_timeout(Duration::from_secs(cli.timeout));

    let result = session.request(msg_type, data, print_progress).await;
    session.close().await;
    let reply = result?;

    print_data(&reply);
    if reply.status.is_error() {
        return Err(format!("{msg_type} failed: {}", describe(reply.status)).into());
    }
    Ok(())
}

fn read_wifi_credentials(file: &str) -> Result<(String, String), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let mut lines = content.lines();
    let ssid = lines.next().ok_or("Missing SSID in credentials file")?.trim().to_string();
    let password = lines.next().ok_or("Missing password in credentials file")?.trim().to_string();
    Ok((ssid, password))
}

async fn scan_devices(duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for provd gateways ({duration} seconds)...");

    let devices = ble::scan(duration).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device.rssi.map(|r| format!("{r} dBm")).unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_provd { " [PROVD]" } else { "" };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }
    Ok(())
}

fn print_progress(envelope: &Envelope) {
    match &envelope.data {
        Some(data) => println!("... {data}"),
        None => println!("..."),
    }
}

fn print_data(envelope: &Envelope) {
    if let Some(data) = &envelope.data {
        match serde_json::to_string_pretty(data) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{data}"),
        }
    } else if !envelope.status.is_error() {
        println!("OK");
    }
}

fn describe(status: Status) -> &'static str {
    match status {
        Status::ErrInvalid => "invalid request",
        Status::ErrTimeout => "timed out",
        Status::ErrAuth => "authentication failed",
        Status::ErrNotFound => "not found",
        Status::ErrNoConn => "no connection",
        Status::ErrDevice => "device error",
        Status::ErrApiDisabled => "not supported by this gateway",
        Status::ErrNoSim => "no SIM card",
        Status::ErrBadConfig => "bad configuration",
        Status::ErrUnknown | Status::Success | Status::Intermediate => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_connect_ap() {
        let cli = Cli::parse_from(["provd-ble", "-d", "gw-01", "connect-ap", "lab", "--psk", "password1"]);
        assert_eq!(cli.device.as_deref(), Some("gw-01"));
        match cli.command {
            Commands::ConnectAp { ssid, psk, file } => {
                assert_eq!(ssid.as_deref(), Some("lab"));
                assert_eq!(psk.as_deref(), Some("password1"));
                assert!(file.is_none());
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn cli_parses_global_timeout_after_subcommand() {
        let cli = Cli::parse_from(["provd-ble", "storage-swap", "--timeout", "900"]);
        assert_eq!(cli.timeout, 900);
        assert!(matches!(cli.command, Commands::StorageSwap));
    }
}
