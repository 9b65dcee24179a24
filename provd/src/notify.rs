//! Service manager readiness notification (`sd_notify` protocol)

use std::os::unix::net::UnixDatagram;

use log::*;

/// Send `READY=1` to `$NOTIFY_SOCKET`
///
/// Returns false when no supervisor asked for notifications.
pub fn notify_ready() -> std::io::Result<bool> {
    let Some(path) = std::env::var_os("NOTIFY_SOCKET") else {
        return Ok(false);
    };
    let socket = UnixDatagram::unbound()?;
    let bytes = path.as_encoded_bytes();

    match bytes.strip_prefix(b"@") {
        #[cfg(target_os = "linux")]
        Some(name) => {
            use std::os::linux::net::SocketAddrExt;
            let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
            socket.send_to_addr(b"READY=1", &addr)?;
        }
        #[cfg(not(target_os = "linux"))]
        Some(_) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "abstract notify socket",
            ));
        }
        None => {
            socket.send_to(b"READY=1", &path)?;
        }
    }

    debug!("Notified service manager of readiness");
    Ok(true)
}
