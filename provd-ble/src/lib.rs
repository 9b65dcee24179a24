//! provd BLE client
//!
//! Central side of the provisioning link: finds a gateway advertising the
//! provisioning service, writes chunked requests and collects the
//! indicated responses.
//!
//! # Example
//!
//! ```ignore
//! use provd_ble::ble;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     for device in ble::scan(5).await? {
//!         println!("{} ({})", device.name, device.address);
//!     }
//!
//!     let mut session = ble::Session::open(None).await?;
//!     let reply = session.request("getDeviceId", None, |_| {}).await?;
//!     println!("{:?}", reply.data);
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod frames;
