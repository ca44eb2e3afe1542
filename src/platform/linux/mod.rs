//! Linux provider backed by `/proc`, with `systemctl` for unit lookups.

pub mod cgroup;
pub mod proc_fd;
pub mod proc_parser;
pub mod proc_stat;

use std::collections::HashSet;
use std::fs;
use std::io;

use chrono::{DateTime, Local, TimeZone};
use nix::unistd::{sysconf, SysconfVar, Uid, User};
use tracing::{debug, trace};

use super::{command_stdout, Introspect, Os, Platform, PortListeners, ServiceMatch};
use crate::error::{PlatformError, PlatformResult};
use crate::types::Process;
use proc_parser::{display_addr, listening_sockets, SocketEntry};
use proc_stat::{parse_btime, parse_stat, parse_uid, split_nul, StatLine};

const TCP_TABLES: [&str; 2] = ["/proc/net/tcp", "/proc/net/tcp6"];

pub struct LinuxPlatform {
    clock_ticks: u64,
}

impl LinuxPlatform {
    pub fn new() -> Self {
        let clock_ticks = match sysconf(SysconfVar::CLK_TCK) {
            Ok(Some(ticks)) if ticks > 0 => ticks as u64,
            _ => 100,
        };
        Self { clock_ticks }
    }

    fn read_stat(&self, pid: u32) -> PlatformResult<StatLine> {
        let path = format!("/proc/{}/stat", pid);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PlatformError::ProcessNotFound { pid },
            _ => PlatformError::io(path.clone(), e),
        })?;
        parse_stat(&content).ok_or_else(|| {
            PlatformError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidData, "malformed stat line"),
            )
        })
    }

    /// PID, parent and names only. Used for whole-table scans.
    fn read_basic(&self, pid: u32) -> PlatformResult<Process> {
        Ok(basic_process(pid, &self.read_stat(pid)?))
    }

    fn start_time(&self, start_ticks: u64) -> Option<DateTime<Local>> {
        let btime = fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|c| parse_btime(&c))?;
        let secs = btime + (start_ticks / self.clock_ticks) as i64;
        Local.timestamp_opt(secs, 0).single()
    }
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn basic_process(pid: u32, stat: &StatLine) -> Process {
    let command = read_comm(pid).unwrap_or_else(|| stat.comm.clone());
    let mut process = Process::new(pid, stat.ppid, command);
    let argv = read_cmdline(pid);
    if !argv.is_empty() {
        process.cmdline = argv.join(" ");
    }
    process
}

fn read_comm(pid: u32) -> Option<String> {
    fs::read_to_string(format!("/proc/{}/comm", pid))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_cmdline(pid: u32) -> Vec<String> {
    fs::read(format!("/proc/{}/cmdline", pid))
        .map(|raw| split_nul(&raw))
        .unwrap_or_default()
}

fn read_user(pid: u32) -> String {
    let Some(uid) = fs::read_to_string(format!("/proc/{}/status", pid))
        .ok()
        .and_then(|s| parse_uid(&s))
    else {
        return String::new();
    };
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn read_link_string(path: &str) -> Option<String> {
    fs::read_link(path)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

fn read_cgroup(pid: u32) -> Option<String> {
    fs::read_to_string(format!("/proc/{}/cgroup", pid)).ok()
}

fn read_listening_sockets() -> Vec<SocketEntry> {
    TCP_TABLES
        .iter()
        .filter_map(|table| match fs::read_to_string(table) {
            Ok(content) => Some(listening_sockets(&content)),
            Err(e) => {
                trace!(table, error = %e, "tcp table unreadable");
                None
            }
        })
        .flatten()
        .collect()
}

fn list_proc_pids() -> PlatformResult<Vec<u32>> {
    let entries = fs::read_dir("/proc").map_err(|e| PlatformError::io("/proc", e))?;
    Ok(entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse().ok()))
        .collect())
}

impl Introspect for LinuxPlatform {
    fn unit_for_pid(&self, pid: u32) -> Option<String> {
        read_cgroup(pid).and_then(|c| cgroup::unit_from_cgroup(&c))
    }

    fn unit_property(&self, property: &str, key: &str) -> Option<String> {
        let value = command_stdout("systemctl", &["show", "-p", property, "--value", key])?;
        if value.is_empty() || value.contains("not set") {
            return None;
        }
        Some(value)
    }

    fn container_name(&self, runtime: &str, id: &str) -> Option<String> {
        crate::docker::container_name(runtime, id)
    }
}

impl Platform for LinuxPlatform {
    fn os(&self) -> Os {
        Os::Linux
    }

    fn read_process(&self, pid: u32) -> PlatformResult<Process> {
        let stat = self.read_stat(pid)?;
        let mut process = basic_process(pid, &stat);
        process.started_at = self.start_time(stat.start_ticks);
        process.user = read_user(pid);

        if let Some(exe) = read_link_string(&format!("/proc/{}/exe", pid)) {
            match exe.strip_suffix(" (deleted)") {
                Some(path) => {
                    process.exe = path.to_string();
                    process.exe_deleted = true;
                }
                None => process.exe = exe,
            }
        }

        process.working_dir = read_link_string(&format!("/proc/{}/cwd", pid)).unwrap_or_default();
        process.env = fs::read(format!("/proc/{}/environ", pid))
            .ok()
            .map(|raw| split_nul(&raw));

        if let Some(content) = read_cgroup(pid) {
            process.service = cgroup::service_from_cgroup(&content);
            process.container = cgroup::container_from_cgroup(&content);
        }

        if let Ok(inodes) = proc_fd::socket_inodes(pid) {
            let held: HashSet<u64> = inodes.into_iter().collect();
            let mut seen = HashSet::new();
            for socket in read_listening_sockets() {
                if held.contains(&socket.inode) && seen.insert((socket.local_port, socket.local_addr)) {
                    process.push_listener(socket.local_port, display_addr(&socket.local_addr));
                }
            }
        }

        if let Some(ctx) = crate::git::detect(&process.working_dir) {
            process.git_repo = Some(ctx.repo);
            process.git_branch = ctx.branch;
        }

        Ok(process)
    }

    fn list_pids(&self) -> PlatformResult<Vec<u32>> {
        list_proc_pids()
    }

    fn boot_time(&self) -> DateTime<Local> {
        fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|c| parse_btime(&c))
            .and_then(|secs| Local.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Local::now)
    }

    fn port_listeners(&self, port: u16) -> PlatformResult<PortListeners> {
        let inodes: HashSet<u64> = read_listening_sockets()
            .into_iter()
            .filter(|s| s.local_port == port)
            .map(|s| s.inode)
            .collect();
        if inodes.is_empty() {
            return Ok(PortListeners::default());
        }

        let pids = proc_fd::owners_of(&list_proc_pids()?, &inodes);
        debug!(port, sockets = inodes.len(), owners = pids.len(), "port ownership");
        Ok(PortListeners {
            sockets: inodes.len(),
            pids,
        })
    }

    fn service_pid(&self, name: &str) -> Option<ServiceMatch> {
        let unit = if name.ends_with(".service") {
            name.to_string()
        } else {
            format!("{}.service", name)
        };
        let out = command_stdout("systemctl", &["show", &unit, "-p", "MainPID", "--value"])?;
        match out.parse::<u32>() {
            Ok(pid) if pid > 0 => Some(ServiceMatch { pid, unit }),
            _ => None,
        }
    }

    fn list_processes(&self) -> PlatformResult<Vec<Process>> {
        let mut processes = Vec::new();
        for pid in list_proc_pids()? {
            match self.read_basic(pid) {
                Ok(p) => processes.push(p),
                Err(e) => trace!(pid, error = %e, "skipping unreadable process"),
            }
        }
        Ok(processes)
    }
}
