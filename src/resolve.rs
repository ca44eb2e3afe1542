//! Target resolution: PID, listening port, or name to concrete PIDs.
//!
//! Name lookups never guess. When a name matches more than one distinct
//! process the caller gets every candidate back in
//! [`ResolveError::Ambiguous`] and decides how to present it.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Candidate, CandidateOrigin, ResolveError};
use crate::platform::{NameEntry, Platform, ServiceMatch};
use crate::types::{Target, TargetKind};

/// Command lines containing this are our own invocation, never a match.
pub const TOOL_NAME: &str = "witr";

/// The resolving process and its parent, excluded from name matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfIds {
    pub pid: u32,
    pub ppid: u32,
}

impl SelfIds {
    #[cfg(unix)]
    pub fn current(_platform: &dyn Platform) -> Self {
        SelfIds {
            pid: nix::unistd::getpid().as_raw() as u32,
            ppid: nix::unistd::getppid().as_raw() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn current(platform: &dyn Platform) -> Self {
        let pid = std::process::id();
        let ppid = platform.read_process(pid).map(|p| p.ppid).unwrap_or(0);
        SelfIds { pid, ppid }
    }
}

/// Resolve a target to one or more PIDs.
pub fn resolve(
    platform: &dyn Platform,
    target: &Target,
    me: SelfIds,
) -> Result<Vec<u32>, ResolveError> {
    match target.kind {
        TargetKind::Pid => {
            let pid = parse_pid(&target.value)?;
            Ok(vec![pid])
        }
        TargetKind::Port => {
            let port = parse_port(&target.value)?;
            Ok(vec![resolve_port(platform, port)?])
        }
        TargetKind::Name => resolve_name(platform, &target.value, me),
    }
}

fn parse_pid(value: &str) -> Result<u32, ResolveError> {
    match value.trim().parse::<u32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(ResolveError::InvalidTarget {
            kind: TargetKind::Pid,
            value: value.to_string(),
        }),
    }
}

fn parse_port(value: &str) -> Result<u16, ResolveError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ResolveError::InvalidTarget {
            kind: TargetKind::Port,
            value: value.to_string(),
        }),
    }
}

/// PID of the process listening on `port`.
///
/// When several processes hold sockets on the port (pre-fork servers,
/// `SO_REUSEPORT`), the lowest PID is taken as the canonical listener.
pub fn resolve_port(platform: &dyn Platform, port: u16) -> Result<u32, ResolveError> {
    let listeners = platform.port_listeners(port)?;
    debug!(
        port,
        sockets = listeners.sockets,
        owners = listeners.pids.len(),
        "port lookup"
    );

    if let Some(pid) = listeners.pids.iter().copied().min() {
        return Ok(pid);
    }

    if listeners.sockets > 0 {
        Err(ResolveError::NotFound(format!(
            "socket found on port {} but owning process not detected (try running as root)",
            port
        )))
    } else {
        Err(ResolveError::NotFound(format!(
            "no process listening on port {}",
            port
        )))
    }
}

/// PIDs whose command name or command line contains `name`.
pub fn resolve_name(
    platform: &dyn Platform,
    name: &str,
    me: SelfIds,
) -> Result<Vec<u32>, ResolveError> {
    let needle = name.to_lowercase();
    let entries = platform.name_entries()?;

    let matches: Vec<&NameEntry> = entries
        .iter()
        .filter(|e| matches_name(e, &needle, me))
        .collect();
    let service = platform.service_pid(name);

    debug!(
        name,
        process_matches = matches.len(),
        service = service.as_ref().map(|s| s.unit.as_str()),
        "name lookup"
    );

    merge_candidates(name, service, &matches)
}

fn matches_name(entry: &NameEntry, needle: &str, me: SelfIds) -> bool {
    if entry.pid == me.pid || entry.pid == me.ppid {
        return false;
    }
    // A bare number is a PID, not a name fragment of that PID.
    if needle == entry.pid.to_string() {
        return false;
    }

    let command = entry.command.to_lowercase();
    let cmdline = entry.cmdline.to_lowercase();
    if command.contains("grep") || cmdline.contains("grep") || cmdline.contains(TOOL_NAME) {
        return false;
    }

    command.contains(needle) || cmdline.contains(needle)
}

fn merge_candidates(
    name: &str,
    service: Option<ServiceMatch>,
    matches: &[&NameEntry],
) -> Result<Vec<u32>, ResolveError> {
    let mut distinct: BTreeSet<u32> = matches.iter().map(|e| e.pid).collect();
    if let Some(ref svc) = service {
        distinct.insert(svc.pid);
    }

    if distinct.len() > 1 {
        let mut candidates = Vec::with_capacity(distinct.len());
        if let Some(ref svc) = service {
            let command = matches
                .iter()
                .find(|e| e.pid == svc.pid)
                .map(|e| e.command.clone())
                .unwrap_or_else(|| name.to_string());
            candidates.push(Candidate {
                pid: svc.pid,
                command,
                origin: CandidateOrigin::Service(svc.unit.clone()),
            });
        }

        let mut seen = BTreeSet::new();
        for entry in matches {
            if service.as_ref().is_some_and(|s| s.pid == entry.pid) || !seen.insert(entry.pid) {
                continue;
            }
            candidates.push(Candidate {
                pid: entry.pid,
                command: entry.command.clone(),
                origin: CandidateOrigin::Process,
            });
        }

        return Err(ResolveError::Ambiguous {
            name: name.to_string(),
            candidates,
        });
    }

    if let Some(svc) = service {
        return Ok(vec![svc.pid]);
    }

    match distinct.into_iter().next() {
        Some(pid) => Ok(vec![pid]),
        None => Err(ResolveError::NotFound(format!(
            "no running process or service named \"{}\"",
            name
        ))),
    }
}
