//! Error types for target resolution and platform access.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::types::TargetKind;

/// Why a candidate matched a name lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "unit")]
pub enum CandidateOrigin {
    /// Main PID of a unit known to the service manager.
    Service(String),
    /// Found by scanning the process table.
    Process,
}

/// One of several processes a name could refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub pid: u32,
    pub command: String,
    pub origin: CandidateOrigin,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            CandidateOrigin::Service(unit) => {
                write!(f, "PID {}   {} (service {})", self.pid, self.command, unit)
            }
            CandidateOrigin::Process => write!(f, "PID {}   {} (process)", self.pid, self.command),
        }
    }
}

/// Failure to turn a target into concrete PIDs.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid {kind}: '{value}'")]
    InvalidTarget { kind: TargetKind, value: String },

    #[error("{0}")]
    NotFound(String),

    #[error("ambiguous target \"{name}\" matches {} processes", .candidates.len())]
    Ambiguous {
        name: String,
        candidates: Vec<Candidate>,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound(_))
    }
}

/// Errors raised by a process snapshot provider.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl PlatformError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        PlatformError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_message_counts_candidates() {
        let err = ResolveError::Ambiguous {
            name: "node".into(),
            candidates: vec![
                Candidate {
                    pid: 200,
                    command: "node".into(),
                    origin: CandidateOrigin::Process,
                },
                Candidate {
                    pid: 300,
                    command: "node".into(),
                    origin: CandidateOrigin::Process,
                },
            ],
        };
        assert_eq!(err.to_string(), "ambiguous target \"node\" matches 2 processes");
    }

    #[test]
    fn test_invalid_target_message() {
        let err = ResolveError::InvalidTarget {
            kind: TargetKind::Pid,
            value: "abc".into(),
        };
        assert_eq!(err.to_string(), "invalid pid: 'abc'");
    }

    #[test]
    fn test_candidate_display_labels_services() {
        let svc = Candidate {
            pid: 100,
            command: "nginx".into(),
            origin: CandidateOrigin::Service("nginx.service".into()),
        };
        assert!(svc.to_string().contains("(service nginx.service)"));
    }
}
