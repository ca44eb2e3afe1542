//! Windows provider. Process data comes from CIM through PowerShell,
//! socket ownership from the `listeners` crate.

use std::path::Path;

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::fallback::{listeners_for_pid, listeners_on_port};
use super::{
    basename, command_stdout, try_command_stdout, Introspect, Os, Platform, PortListeners,
    ServiceMatch,
};
use crate::error::{PlatformError, PlatformResult};
use crate::types::Process;

/// `ConvertTo-Json` emits a bare object for one result and an array for more.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(t) => vec![t],
        }
    }
}

fn parse_json_rows<T: DeserializeOwned>(output: &str) -> Vec<T> {
    if output.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<OneOrMany<T>>(output) {
        Ok(rows) => rows.into_vec(),
        Err(e) => {
            debug!(error = %e, "unexpected PowerShell JSON");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimProcess {
    process_id: u32,
    #[serde(default)]
    parent_process_id: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    executable_path: Option<String>,
    #[serde(default)]
    command_line: Option<String>,
    #[serde(default)]
    creation_date: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

impl CimProcess {
    fn into_process(self) -> Process {
        let command = self
            .executable_path
            .as_deref()
            .map(basename)
            .or(self.name.as_deref())
            .unwrap_or_default()
            .to_string();
        let mut process = Process::new(self.process_id, self.parent_process_id, command);
        if let Some(cmdline) = self.command_line.filter(|c| !c.trim().is_empty()) {
            process.cmdline = cmdline.trim().to_string();
        }
        process.started_at = self.creation_date.as_deref().and_then(parse_timestamp);
        process.user = match (self.domain, self.user) {
            (Some(domain), Some(user)) if !domain.is_empty() => format!("{}\\{}", domain, user),
            (_, Some(user)) => user,
            _ => String::new(),
        };
        process.exe = self.executable_path.unwrap_or_default();
        process
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimService {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    process_id: u32,
}

/// Parse a round-trip (`ToString('o')`) timestamp.
fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}

fn powershell(script: &str) -> PlatformResult<String> {
    try_command_stdout(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
    )
}

fn process_script(pid: u32) -> String {
    format!(
        "$p = Get-CimInstance Win32_Process -Filter \"ProcessId={pid}\"; \
         if ($p) {{ $o = Invoke-CimMethod -InputObject $p -MethodName GetOwner; \
         [pscustomobject]@{{ ProcessId = $p.ProcessId; ParentProcessId = $p.ParentProcessId; \
         Name = $p.Name; ExecutablePath = $p.ExecutablePath; CommandLine = $p.CommandLine; \
         CreationDate = if ($p.CreationDate) {{ $p.CreationDate.ToString('o') }} else {{ $null }}; \
         Domain = $o.Domain; User = $o.User }} | ConvertTo-Json -Compress }}"
    )
}

const TABLE_SCRIPT: &str = "Get-CimInstance Win32_Process | \
     Select-Object ProcessId,ParentProcessId,Name,ExecutablePath,CommandLine | \
     ConvertTo-Json -Compress";

const SERVICES_SCRIPT: &str = "Get-CimInstance Win32_Service -Filter \"State='Running'\" | \
     Select-Object Name,DisplayName,ProcessId | ConvertTo-Json -Compress";

const BOOT_SCRIPT: &str = "(Get-CimInstance Win32_OperatingSystem).LastBootUpTime.ToString('o')";

/// Best match for `name` among running services: exact service name first,
/// then a substring of the service or display name.
fn match_service(services: &[CimService], name: &str) -> Option<ServiceMatch> {
    let needle = name.to_lowercase();
    let running = || services.iter().filter(|s| s.process_id > 0);

    running()
        .find(|s| s.name.to_lowercase() == needle)
        .or_else(|| {
            running().find(|s| {
                s.name.to_lowercase().contains(&needle)
                    || s
                        .display_name
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
        })
        .map(|s| ServiceMatch {
            pid: s.process_id,
            unit: s.name.clone(),
        })
}

pub struct WindowsPlatform;

impl WindowsPlatform {
    pub fn new() -> Self {
        WindowsPlatform
    }
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Introspect for WindowsPlatform {
    fn container_name(&self, runtime: &str, id: &str) -> Option<String> {
        crate::docker::container_name(runtime, id)
    }
}

impl Platform for WindowsPlatform {
    fn os(&self) -> Os {
        Os::Windows
    }

    fn read_process(&self, pid: u32) -> PlatformResult<Process> {
        let out = powershell(&process_script(pid))?;
        let mut process = parse_json_rows::<CimProcess>(&out)
            .into_iter()
            .next()
            .ok_or(PlatformError::ProcessNotFound { pid })?
            .into_process();

        process.exe_deleted = !process.exe.is_empty() && !Path::new(&process.exe).exists();
        process.service = command_stdout(
            "powershell",
            &[
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                &format!(
                    "Get-CimInstance Win32_Service -Filter \"ProcessId={}\" | Select-Object -ExpandProperty Name",
                    pid
                ),
            ],
        )
        .and_then(|out| out.lines().next().map(|l| l.trim().to_string()))
        .filter(|s| !s.is_empty());
        process.container = crate::docker::container_from_cmdline(&process.cmdline);

        for (port, addr) in listeners_for_pid(pid) {
            process.push_listener(port, addr);
        }

        Ok(process)
    }

    fn list_pids(&self) -> PlatformResult<Vec<u32>> {
        Ok(self.list_processes()?.iter().map(|p| p.pid).collect())
    }

    fn boot_time(&self) -> DateTime<Local> {
        powershell(BOOT_SCRIPT)
            .ok()
            .and_then(|out| parse_timestamp(&out))
            .unwrap_or_else(Local::now)
    }

    fn port_listeners(&self, port: u16) -> PlatformResult<PortListeners> {
        listeners_on_port(port)
    }

    fn service_pid(&self, name: &str) -> Option<ServiceMatch> {
        let out = powershell(SERVICES_SCRIPT).ok()?;
        match_service(&parse_json_rows::<CimService>(&out), name)
    }

    fn list_processes(&self) -> PlatformResult<Vec<Process>> {
        let out = powershell(TABLE_SCRIPT)?;
        Ok(parse_json_rows::<CimProcess>(&out)
            .into_iter()
            .map(CimProcess::into_process)
            .collect())
    }
}
