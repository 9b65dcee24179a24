//! Line bridge to an external GATT host
//!
//! The BLE host process (or a person at a terminal) drives the engine
//! over stdin with one command per line:
//!
//! ```text
//! w <hex>     fragment written to the request characteristic
//! c           indication confirmed
//! s / u       client subscribed / unsubscribed
//! b           short press of the config button
//! p <code>    provisioning agent state changed
//! x <code>    storage state changed
//! q           quit
//! ```
//!
//! Indications go to stdout as `i <hex>`, radio controls as `ctl ...`.

use std::io::Write;
use std::sync::Arc;

use data_encoding::HEXLOWER_PERMISSIVE;
use log::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use provd::peripheral::{Peripheral, Radio};
use provd::sim::Sim;
use provd::{Config, Engine, EngineHandle, Indicate, ProvisionState};
use provd_proto::StorageState;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Write(Vec<u8>),
    Confirm,
    Subscribe,
    Unsubscribe,
    Button,
    Provision(ProvisionState),
    Storage(StorageState),
    Quit,
}

pub fn parse_line(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
    let arg = arg.trim();
    let code = || arg.parse::<i32>().map_err(|e| format!("bad code {arg:?}: {e}"));

    Ok(match cmd {
        "w" => Command::Write(
            HEXLOWER_PERMISSIVE
                .decode(arg.as_bytes())
                .map_err(|e| format!("bad hex: {e}"))?,
        ),
        "c" => Command::Confirm,
        "s" => Command::Subscribe,
        "u" => Command::Unsubscribe,
        "b" => Command::Button,
        "p" => {
            let code = code()?;
            Command::Provision(
                ProvisionState::from_code(code)
                    .ok_or_else(|| format!("unknown provisioning state {code}"))?,
            )
        }
        "x" => Command::Storage(StorageState::try_from(code()?).map_err(|e| e.to_string())?),
        "q" => Command::Quit,
        other => return Err(format!("unknown command {other:?}")),
    })
}

fn emit(line: std::fmt::Arguments) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_fmt(line);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

struct LineIndicator;

impl Indicate for LineIndicator {
    fn indicate(&self, chunk: &[u8]) {
        emit(format_args!("i {}", HEXLOWER_PERMISSIVE.encode(chunk)));
    }
}

struct LinePeripheral;

impl Peripheral for LinePeripheral {
    fn set_powered(&self, on: bool) {
        emit(format_args!("ctl power {}", if on { "on" } else { "off" }));
    }

    fn set_application(&self, registered: bool) {
        emit(format_args!(
            "ctl application {}",
            if registered { "register" } else { "unregister" }
        ));
    }

    fn set_advertising(&self, on: bool) {
        emit(format_args!("ctl advertising {}", if on { "on" } else { "off" }));
    }

    fn disconnect_all(&self) {
        emit(format_args!("ctl disconnect"));
    }
}

enum Control {
    Stop,
    Button,
    Quit,
}

/// Run the engine against the simulated backend until stdin closes
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let sim = Sim::demo();
    let radio = Arc::new(Radio::new(LinePeripheral, config.shutdown_delay()));
    let (ctl_tx, mut ctl_rx) = mpsc::unbounded_channel();

    let (engine, events) = Engine::new(&config, sim.services(), LineIndicator);
    let stop = ctl_tx.clone();
    let engine = engine.on_provisioned(move || {
        let _ = stop.send(Control::Stop);
    });
    let handle = engine.handle();
    let engine_task = tokio::spawn(engine.run(events));

    let provisioned = || sim.with(|s| s.provisioned);
    if provisioned() {
        info!("Device is provisioned, skipping BLE service");
    } else {
        radio.enable();
    }

    match provd::notify::notify_ready() {
        Ok(true) => info!("Startup complete"),
        Ok(false) => {}
        Err(e) => warn!("Failed to notify service manager: {e}"),
    }

    tokio::spawn(read_commands(handle.clone(), ctl_tx.clone()));

    while let Some(control) = ctl_rx.recv().await {
        match control {
            Control::Stop => {
                handle.clear_inactivity_timeout();
                let radio = radio.clone();
                tokio::spawn(async move { radio.stop().await });
            }
            Control::Button => {
                if !provisioned() {
                    continue;
                }
                info!("Config button pressed, enabling BLE service");
                radio.enable();
                handle.prescan();
                if let Some(delay) = config.inactivity_timeout() {
                    let stop = ctl_tx.clone();
                    handle.set_inactivity_timeout(delay, move || {
                        let _ = stop.send(Control::Stop);
                    });
                }
            }
            Control::Quit => break,
        }
    }

    handle.shutdown();
    engine_task.await?;
    Ok(())
}

async fn read_commands(handle: EngineHandle, control: mpsc::UnboundedSender<Control>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(Command::Write(bytes)) => {
                handle.write(&bytes);
            }
            Ok(Command::Confirm) => {
                handle.confirm();
            }
            Ok(Command::Subscribe) => {
                handle.subscribed();
            }
            Ok(Command::Unsubscribe) => {
                handle.unsubscribed();
            }
            Ok(Command::Provision(state)) => {
                handle.provision_state_changed(state);
            }
            Ok(Command::Storage(state)) => {
                handle.storage_state_changed(state);
            }
            Ok(Command::Button) => {
                let _ = control.send(Control::Button);
            }
            Ok(Command::Quit) => break,
            Err(e) => warn!("Ignoring input line: {e}"),
        }
    }
    let _ = control.send(Control::Quit);
}
