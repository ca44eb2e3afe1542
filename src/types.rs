//! Core data types: processes, targets, origin verdicts and trees.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Point-in-time snapshot of one OS process.
///
/// Fields the current platform cannot provide are left empty. `env` is
/// `None` when environment variables could not be read at all, which is
/// different from a process that has none.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Process {
    pub pid: u32,
    pub ppid: u32,
    pub command: String,
    pub cmdline: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub exe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Local>>,
    pub user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    /// Parallel to `bind_addresses`: index i is one listening socket.
    pub listening_ports: Vec<u16>,
    pub bind_addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    pub exe_deleted: bool,
}

impl Process {
    pub fn new(pid: u32, ppid: u32, command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            pid,
            ppid,
            cmdline: command.clone(),
            command,
            ..Default::default()
        }
    }

    /// Parent PID, or `None` at the root of the tree.
    ///
    /// A process that claims itself as its parent is treated as a root.
    pub fn parent(&self) -> Option<u32> {
        if self.ppid == 0 || self.ppid == self.pid {
            None
        } else {
            Some(self.ppid)
        }
    }

    /// Record one listening socket, keeping ports and addresses aligned.
    pub fn push_listener(&mut self, port: u16, address: impl Into<String>) {
        self.listening_ports.push(port);
        self.bind_addresses.push(address.into());
    }

    /// Listening sockets as `(address, port)` pairs.
    pub fn listeners(&self) -> impl Iterator<Item = (&str, u16)> {
        self.bind_addresses
            .iter()
            .map(String::as_str)
            .zip(self.listening_ports.iter().copied())
    }
}

/// Container or orchestrator identity a process belongs to.
///
/// `id` is either a human readable name or an opaque runtime identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRef {
    pub runtime: String,
    pub id: String,
}

impl ContainerRef {
    pub fn new(runtime: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            id: id.into(),
        }
    }

    /// True for hex runtime ids like the 64-character Docker/CRI ids.
    pub fn is_opaque(&self) -> bool {
        self.id.len() >= 12 && self.id.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// First 12 characters of an opaque id, the whole id otherwise.
    pub fn short_id(&self) -> &str {
        if self.is_opaque() {
            &self.id[..12]
        } else {
            &self.id
        }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.runtime)
        } else {
            write!(f, "{}: {}", self.runtime, self.short_id())
        }
    }
}

/// Ordered ancestry: index 0 is the outermost ancestor, the last element
/// is the process that was asked about.
pub type AncestryChain = Vec<Process>;

/// How a process came to exist.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum SourceType {
    #[serde(rename = "container")]
    Container,
    #[serde(rename = "supervisor")]
    Supervisor,
    #[serde(rename = "init-systemd")]
    Systemd,
    #[serde(rename = "init-launchd")]
    Launchd,
    #[serde(rename = "cron")]
    Cron,
    #[serde(rename = "shell")]
    Shell,
    #[serde(rename = "windows-service")]
    WindowsService,
    #[serde(rename = "unknown")]
    Unknown,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Container => write!(f, "container"),
            SourceType::Supervisor => write!(f, "supervisor"),
            SourceType::Systemd => write!(f, "init-systemd"),
            SourceType::Launchd => write!(f, "init-launchd"),
            SourceType::Cron => write!(f, "cron"),
            SourceType::Shell => write!(f, "shell"),
            SourceType::WindowsService => write!(f, "windows-service"),
            SourceType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Confidence assigned when no detector produced a verdict.
pub const UNKNOWN_CONFIDENCE: f64 = 0.2;

/// Classification verdict for one ancestry chain.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_file: Option<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl Source {
    pub fn new(source_type: SourceType, name: impl Into<String>, confidence: f64) -> Self {
        Self {
            source_type,
            name: name.into(),
            description: None,
            unit_file: None,
            confidence: confidence.clamp(0.0, 1.0),
            details: BTreeMap::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(SourceType::Unknown, "unknown", UNKNOWN_CONFIDENCE)
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_unit_file(mut self, unit_file: Option<String>) -> Self {
        self.unit_file = unit_file;
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Which kind of identifier the user supplied.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Pid,
    Port,
    Name,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Pid => write!(f, "pid"),
            TargetKind::Port => write!(f, "port"),
            TargetKind::Name => write!(f, "name"),
        }
    }
}

/// User input naming the process to explain.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Target {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub value: String,
}

impl Target {
    pub fn new(kind: TargetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Pid => write!(f, "PID {}", self.value),
            TargetKind::Port => write!(f, "port {}", self.value),
            TargetKind::Name => write!(f, "\"{}\"", self.value),
        }
    }
}

/// A process with its descendants, children ordered by ascending PID.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProcessTree {
    pub process: Process,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ProcessTree>,
}

impl ProcessTree {
    pub fn leaf(process: Process) -> Self {
        Self {
            process,
            children: Vec::new(),
        }
    }

    /// Total number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}
