//! Radio lifecycle around the GATT service
//!
//! The engine only moves bytes; registering the application, advertising
//! and powering the controller are the host's job. [`Radio`] sequences
//! those steps for start-up, button press and shutdown.

use std::sync::Mutex;
use std::time::Duration;

use log::*;

/// BLE host controls the daemon needs
pub trait Peripheral: Send + Sync {
    fn set_powered(&self, on: bool);

    /// Register or remove the GATT application
    fn set_application(&self, registered: bool);

    fn set_advertising(&self, on: bool);

    fn disconnect_all(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Power {
    Off,
    On,
    /// Advertising is off and teardown waits for the shutdown delay
    Stopping,
}

#[derive(Debug)]
struct RadioState {
    power: Power,
    /// Bumped by every stop and every enable; a stop only tears down if
    /// nothing happened during its delay
    generation: u64,
}

pub struct Radio<P> {
    peripheral: P,
    shutdown_delay: Duration,
    state: Mutex<RadioState>,
}

impl<P: Peripheral> Radio<P> {
    pub fn new(peripheral: P, shutdown_delay: Duration) -> Self {
        Self {
            peripheral,
            shutdown_delay,
            state: Mutex::new(RadioState {
                power: Power::Off,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RadioState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// Up and advertising, with no teardown pending
    pub fn is_enabled(&self) -> bool {
        self.lock().power == Power::On
    }

    /// Bring the service up, or call off a pending stop
    pub fn enable(&self) {
        let mut state = self.lock();
        match state.power {
            Power::On => {}
            Power::Stopping => {
                info!("Re-enabling BLE service, shutdown cancelled");
                state.power = Power::On;
                state.generation += 1;
                self.peripheral.set_advertising(true);
            }
            Power::Off => {
                info!("Enabling BLE service");
                state.power = Power::On;
                state.generation += 1;
                self.peripheral.set_application(true);
                self.peripheral.set_advertising(true);
                self.peripheral.set_powered(true);
            }
        }
    }

    /// Stop advertising now, then tear the service down once the last
    /// response had time to go out
    ///
    /// The GATT application is deregistered before the controller is
    /// powered off. A [`Radio::enable`] during the delay cancels the
    /// teardown.
    pub async fn stop(&self) {
        let generation = {
            let mut state = self.lock();
            if state.power != Power::On {
                return;
            }
            state.power = Power::Stopping;
            state.generation += 1;
            self.peripheral.set_advertising(false);
            state.generation
        };

        tokio::time::sleep(self.shutdown_delay).await;

        let mut state = self.lock();
        if state.power != Power::Stopping || state.generation != generation {
            debug!("BLE shutdown superseded");
            return;
        }
        info!("Disabling BLE service");
        state.power = Power::Off;
        self.peripheral.disconnect_all();
        self.peripheral.set_application(false);
        self.peripheral.set_powered(false);
    }
}
