//! In-memory provider for unit tests.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Local, TimeZone};

use super::{Introspect, NameEntry, Os, Platform, PortListeners, ServiceMatch};
use crate::error::{PlatformError, PlatformResult};
use crate::types::Process;

#[derive(Default)]
pub struct FakePlatform {
    pub os: Option<Os>,
    pub processes: BTreeMap<u32, Process>,
    /// port -> (socket count, owning pids)
    pub ports: HashMap<u16, (usize, Vec<u32>)>,
    pub services: HashMap<String, ServiceMatch>,
    pub units: HashMap<u32, String>,
    /// (property, key) -> value
    pub unit_properties: HashMap<(String, String), String>,
    pub launchd_labels: HashMap<u32, String>,
    pub containers: HashMap<String, String>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, process: Process) -> Self {
        self.processes.insert(process.pid, process);
        self
    }

    pub fn with_process(self, pid: u32, ppid: u32, command: &str) -> Self {
        self.with(Process::new(pid, ppid, command))
    }

    pub fn with_port(mut self, port: u16, pids: &[u32]) -> Self {
        self.ports.insert(port, (pids.len(), pids.to_vec()));
        self
    }

    pub fn with_service(mut self, name: &str, unit: &str, pid: u32) -> Self {
        self.services.insert(
            name.to_lowercase(),
            ServiceMatch {
                pid,
                unit: unit.to_string(),
            },
        );
        self
    }

    pub fn with_unit(mut self, pid: u32, unit: &str) -> Self {
        self.units.insert(pid, unit.to_string());
        self
    }

    pub fn with_unit_property(mut self, property: &str, key: &str, value: &str) -> Self {
        self.unit_properties
            .insert((property.to_string(), key.to_string()), value.to_string());
        self
    }

    pub fn with_container_name(mut self, id: &str, name: &str) -> Self {
        self.containers.insert(id.to_string(), name.to_string());
        self
    }
}

impl Introspect for FakePlatform {
    fn unit_for_pid(&self, pid: u32) -> Option<String> {
        self.units.get(&pid).cloned()
    }

    fn unit_property(&self, property: &str, key: &str) -> Option<String> {
        self.unit_properties
            .get(&(property.to_string(), key.to_string()))
            .cloned()
    }

    fn launchd_label(&self, pid: u32) -> Option<String> {
        self.launchd_labels.get(&pid).cloned()
    }

    fn container_name(&self, _runtime: &str, id: &str) -> Option<String> {
        self.containers.get(id).cloned()
    }
}

impl Platform for FakePlatform {
    fn os(&self) -> Os {
        self.os.unwrap_or(Os::Linux)
    }

    fn read_process(&self, pid: u32) -> PlatformResult<Process> {
        self.processes
            .get(&pid)
            .cloned()
            .ok_or(PlatformError::ProcessNotFound { pid })
    }

    fn list_pids(&self) -> PlatformResult<Vec<u32>> {
        Ok(self.processes.keys().copied().collect())
    }

    fn boot_time(&self) -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn port_listeners(&self, port: u16) -> PlatformResult<PortListeners> {
        Ok(self
            .ports
            .get(&port)
            .map(|(sockets, pids)| PortListeners {
                sockets: *sockets,
                pids: pids.clone(),
            })
            .unwrap_or_default())
    }

    fn service_pid(&self, name: &str) -> Option<ServiceMatch> {
        self.services.get(&name.to_lowercase()).cloned()
    }

    fn name_entries(&self) -> PlatformResult<Vec<NameEntry>> {
        Ok(self.processes.values().map(NameEntry::from).collect())
    }
}
