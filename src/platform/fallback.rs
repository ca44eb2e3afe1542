//! Provider for operating systems without a native implementation.
//!
//! Port ownership still works through the `listeners` crate; everything
//! else reports `Unsupported`.

use super::PortListeners;
use crate::error::{PlatformError, PlatformResult};

#[cfg(any(not(any(target_os = "linux", target_os = "macos", target_os = "windows")), test))]
pub use unsupported::UnsupportedPlatform;

#[cfg(any(not(any(target_os = "linux", target_os = "macos", target_os = "windows")), test))]
mod unsupported {
    use chrono::{DateTime, Local};

    use super::listeners_on_port;
    use crate::error::{PlatformError, PlatformResult};
    use crate::platform::{Introspect, Os, Platform, PortListeners, ServiceMatch};
    use crate::types::Process;

    pub struct UnsupportedPlatform;

    impl Introspect for UnsupportedPlatform {}

    impl Platform for UnsupportedPlatform {
        fn os(&self) -> Os {
            Os::Other
        }

        fn read_process(&self, _pid: u32) -> PlatformResult<Process> {
            Err(PlatformError::Unsupported("reading processes"))
        }

        fn list_pids(&self) -> PlatformResult<Vec<u32>> {
            Err(PlatformError::Unsupported("listing processes"))
        }

        fn boot_time(&self) -> DateTime<Local> {
            Local::now()
        }

        fn port_listeners(&self, port: u16) -> PlatformResult<PortListeners> {
            listeners_on_port(port)
        }

        fn service_pid(&self, _name: &str) -> Option<ServiceMatch> {
            None
        }
    }
}

/// Port ownership through the `listeners` crate.
pub(crate) fn listeners_on_port(port: u16) -> PlatformResult<PortListeners> {
    let all = listeners::get_all().map_err(|e| PlatformError::Command {
        command: "listeners".to_string(),
        message: e.to_string(),
    })?;

    let pids: Vec<u32> = all
        .into_iter()
        .filter(|l| matches!(l.protocol, listeners::Protocol::TCP) && l.socket.port() == port)
        .map(|l| l.process.pid)
        .collect();

    Ok(PortListeners {
        sockets: pids.len(),
        pids,
    })
}

/// Listening sockets held by one PID, as `(port, address)` pairs.
pub(crate) fn listeners_for_pid(pid: u32) -> Vec<(u16, String)> {
    let Ok(all) = listeners::get_all() else {
        return Vec::new();
    };

    let mut out: Vec<(u16, String)> = all
        .into_iter()
        .filter(|l| matches!(l.protocol, listeners::Protocol::TCP) && l.process.pid == pid)
        .map(|l| (l.socket.port(), l.socket.ip().to_string()))
        .collect();
    out.sort();
    out.dedup();
    out
}
