//! Process ancestry and origin detection ("why is this running?").
//!
//! Answers the causality question: given a process, trace its parent chain
//! up to the root of the process tree and identify which launcher is
//! responsible for it.

mod source;

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, trace};

use crate::platform::Platform;
use crate::types::{AncestryChain, Process};

pub use source::{classify, detectors_for, Detector};

/// Walk parent links from `pid` to the root of the process tree.
///
/// Returns the chain outermost ancestor first, `pid` last. Never fails: if
/// a process disappears mid-walk the chain collected so far is returned,
/// and an unreadable `pid` yields an empty chain.
pub fn walk(platform: &dyn Platform, pid: u32) -> AncestryChain {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = pid;

    loop {
        if !visited.insert(current) {
            debug!(pid = current, "cycle in parent links, stopping walk");
            break;
        }

        let process = match platform.read_process(current) {
            Ok(p) => p,
            Err(e) => {
                debug!(pid = current, error = %e, "ancestor unreadable, returning partial chain");
                break;
            }
        };

        let parent = process.parent();
        trace!(pid = process.pid, ppid = process.ppid, command = %process.command, "ancestry hop");
        chain.push(process);

        match parent {
            Some(ppid) => current = ppid,
            None => break,
        }
    }

    chain.reverse();
    chain
}

/// Health warnings detected for a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthWarning {
    DeletedBinary,
    RunningAsRoot,
    PublicBind { address: String, port: u16 },
    LongRunning { days: i64 },
}

impl fmt::Display for HealthWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthWarning::DeletedBinary => {
                write!(f, "executable was deleted or replaced since the process started")
            }
            HealthWarning::RunningAsRoot => write!(f, "running as root"),
            HealthWarning::PublicBind { address, port } => {
                write!(f, "listening on all interfaces ({}:{})", address, port)
            }
            HealthWarning::LongRunning { days } => write!(f, "running for {} days", days),
        }
    }
}

const LONG_RUNNING_DAYS: i64 = 90;

/// Warnings worth surfacing next to the verdict.
pub fn detect_warnings(process: &Process, now: DateTime<Local>) -> Vec<HealthWarning> {
    let mut warnings = Vec::new();

    if process.exe_deleted {
        warnings.push(HealthWarning::DeletedBinary);
    }

    if process.user == "root" || process.user.eq_ignore_ascii_case(r"NT AUTHORITY\SYSTEM") {
        warnings.push(HealthWarning::RunningAsRoot);
    }

    for (address, port) in process.listeners() {
        if matches!(address, "0.0.0.0" | "::" | "*" | "[::]") {
            warnings.push(HealthWarning::PublicBind {
                address: address.to_string(),
                port,
            });
            break;
        }
    }

    if let Some(started) = process.started_at {
        let days = (now - started).num_days();
        if days >= LONG_RUNNING_DAYS {
            warnings.push(HealthWarning::LongRunning { days });
        }
    }

    warnings
}
