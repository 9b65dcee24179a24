//! BLE GATT constants for the provisioning virtual serial port
//!
//! The service exposes one characteristic the client writes request
//! fragments to, and one it subscribes to for indications carrying
//! response fragments.

/// BLE Service UUID: be98076e-8e8d-11e8-9eb6-529269fb1459
pub const SERVICE_UUID: &str = "be98076e-8e8d-11e8-9eb6-529269fb1459";

/// Request characteristic UUID (write)
pub const RX_UUID: &str = "be980b1a-8e8d-11e8-9eb6-529269fb1459";

/// Response characteristic UUID (indicate)
pub const TX_UUID: &str = "be980d72-8e8d-11e8-9eb6-529269fb1459";

/// Largest fragment sent in one indication or write
///
/// Fits the 20-byte ATT payload of the default 23-byte MTU with room to
/// spare on older centrals.
pub const DEFAULT_CHUNK_SIZE: usize = 16;
