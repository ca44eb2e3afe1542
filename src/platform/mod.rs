//! Process snapshot providers, one per supported OS.
//!
//! The resolver, walker, classifier and tree builder only talk to the
//! [`Platform`] trait. [`current`] picks the implementation for the target
//! the binary was compiled for.

use std::process::Command;

use chrono::{DateTime, Local};
use tracing::{debug, trace};

use crate::error::{PlatformError, PlatformResult};
use crate::types::Process;

#[cfg(target_os = "linux")]
pub mod linux;
// Built under test everywhere so their output parsers are exercised on any host.
#[cfg(any(target_os = "macos", test))]
pub mod macos;
#[cfg(any(target_os = "windows", test))]
pub mod windows;

#[cfg(any(not(any(target_os = "linux", target_os = "macos")), test))]
mod fallback;

#[cfg(test)]
pub mod fake;

/// Operating system family, used to pick the classifier's detector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Os {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            Os::Other
        }
    }
}

/// Owners of listening sockets on one port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortListeners {
    /// Matching listening sockets, IPv4 and IPv6 together.
    pub sockets: usize,
    /// PIDs holding any of those sockets, unordered, may repeat.
    pub pids: Vec<u32>,
}

/// Minimal per-process data used for name matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub pid: u32,
    pub command: String,
    pub cmdline: String,
}

impl From<&Process> for NameEntry {
    fn from(p: &Process) -> Self {
        NameEntry {
            pid: p.pid,
            command: p.command.clone(),
            cmdline: p.cmdline.clone(),
        }
    }
}

/// A running unit the service manager associates with a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMatch {
    pub pid: u32,
    pub unit: String,
}

/// Secondary lookups the origin classifier may perform.
///
/// Every method is best effort: `None` means "no evidence", never an error.
pub trait Introspect {
    /// Service-manager unit owning `pid`, from its control group.
    fn unit_for_pid(&self, _pid: u32) -> Option<String> {
        None
    }

    /// One property of a unit; `key` is a unit name or a raw PID.
    fn unit_property(&self, _property: &str, _key: &str) -> Option<String> {
        None
    }

    /// launchd label of the job that owns `pid`.
    fn launchd_label(&self, _pid: u32) -> Option<String> {
        None
    }

    /// On-disk plist defining a launchd job.
    fn launchd_plist(&self, _label: &str) -> Option<String> {
        None
    }

    /// Human readable name for an opaque container id.
    fn container_name(&self, _runtime: &str, _id: &str) -> Option<String> {
        None
    }
}

/// Everything the engine needs from the operating system.
pub trait Platform: Introspect {
    fn os(&self) -> Os;

    /// Read one process. Fails with `ProcessNotFound` if it no longer exists.
    fn read_process(&self, pid: u32) -> PlatformResult<Process>;

    fn list_pids(&self) -> PlatformResult<Vec<u32>>;

    fn boot_time(&self) -> DateTime<Local>;

    /// Owners of TCP listening sockets bound to `port`.
    fn port_listeners(&self, port: u16) -> PlatformResult<PortListeners>;

    /// A unit or service whose name matches `name`, if it is running.
    fn service_pid(&self, name: &str) -> Option<ServiceMatch>;

    /// Name and command line of every live process.
    fn name_entries(&self) -> PlatformResult<Vec<NameEntry>> {
        Ok(self.list_processes()?.iter().map(NameEntry::from).collect())
    }

    /// One snapshot of every readable process.
    ///
    /// Processes that exit between listing and reading are skipped.
    fn list_processes(&self) -> PlatformResult<Vec<Process>> {
        let pids = self.list_pids()?;
        let mut processes = Vec::with_capacity(pids.len());
        for pid in pids {
            match self.read_process(pid) {
                Ok(p) => processes.push(p),
                Err(e) => trace!(pid, error = %e, "skipping unreadable process"),
            }
        }
        Ok(processes)
    }
}

/// A provider viewed through the classifier's lookup seam.
pub struct Lookups<'a>(pub &'a dyn Platform);

impl Introspect for Lookups<'_> {
    fn unit_for_pid(&self, pid: u32) -> Option<String> {
        self.0.unit_for_pid(pid)
    }

    fn unit_property(&self, property: &str, key: &str) -> Option<String> {
        self.0.unit_property(property, key)
    }

    fn launchd_label(&self, pid: u32) -> Option<String> {
        self.0.launchd_label(pid)
    }

    fn launchd_plist(&self, label: &str) -> Option<String> {
        self.0.launchd_plist(label)
    }

    fn container_name(&self, runtime: &str, id: &str) -> Option<String> {
        self.0.container_name(runtime, id)
    }
}

/// The provider for the OS this binary was built for.
pub fn current() -> Box<dyn Platform> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxPlatform::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacPlatform::new())
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::WindowsPlatform::new())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Box::new(fallback::UnsupportedPlatform)
    }
}

/// Run an external command and return trimmed stdout on success.
///
/// Any failure (missing binary, non-zero exit, bad UTF-8) is logged and
/// reported as `None`; callers treat it as absence of evidence.
pub(crate) fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    match try_command_stdout(program, args) {
        Ok(out) => Some(out),
        Err(e) => {
            debug!(program, error = %e, "external command yielded no evidence");
            None
        }
    }
}

pub(crate) fn try_command_stdout(program: &str, args: &[&str]) -> PlatformResult<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| PlatformError::Command {
            command: program.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(PlatformError::Command {
            command: program.to_string(),
            message: format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Last path component of a command, with either separator.
pub(crate) fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
