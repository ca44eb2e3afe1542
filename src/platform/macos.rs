//! macOS provider built on `ps`, `lsof`, `sysctl` and `launchctl`.

use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use regex::Regex;
use tracing::debug;

use super::{
    basename, command_stdout, try_command_stdout, Introspect, NameEntry, Os, Platform,
    PortListeners, ServiceMatch,
};
use crate::error::{PlatformError, PlatformResult};
use crate::types::Process;

static BOOT_SECONDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"sec\s*=\s*(\d+)").unwrap());

const LSTART_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

pub struct MacPlatform;

impl MacPlatform {
    pub fn new() -> Self {
        MacPlatform
    }
}

impl Default for MacPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// One process from `ps -o ppid=,user=,lstart=,args=` plus `ps -o comm=`.
///
/// `comm` comes from its own call because app-bundle paths contain spaces.
#[derive(Debug, Clone, PartialEq)]
struct PsRecord {
    ppid: u32,
    command: String,
    user: String,
    started_at: Option<DateTime<Local>>,
    cmdline: String,
}

fn parse_ps_record(line: &str, comm: &str) -> Option<PsRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    // ppid, user, five lstart words, then args.
    if fields.len() < 7 {
        return None;
    }

    let comm = comm.trim();
    let command = basename(comm).to_string();
    let lstart = fields[2..7].join(" ");
    let started_at = NaiveDateTime::parse_from_str(&lstart, LSTART_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).single());
    let cmdline = if fields.len() > 7 {
        fields[7..].join(" ")
    } else if !comm.is_empty() {
        comm.to_string()
    } else {
        command.clone()
    };

    Some(PsRecord {
        ppid: fields[0].parse().ok()?,
        command,
        user: fields[1].to_string(),
        started_at,
        cmdline,
    })
}

/// `(port, address)` pairs from `lsof -i -P -n` LISTEN rows, deduplicated.
fn parse_lsof_listeners(output: &str) -> Vec<(u16, String)> {
    let mut found: Vec<(u16, String)> = Vec::new();
    for line in output.lines().filter(|l| l.contains("(LISTEN)")) {
        let Some(name) = line
            .split_whitespace()
            .find(|f| f.contains(':') && !f.starts_with('('))
        else {
            continue;
        };
        let Some((addr, port)) = name.rsplit_once(':') else {
            continue;
        };
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        let addr = match addr {
            "*" => "0.0.0.0".to_string(),
            other => other.trim_start_matches('[').trim_end_matches(']').to_string(),
        };
        if !found.iter().any(|(p, a)| *p == port && *a == addr) {
            found.push((port, addr));
        }
    }
    found
}

/// Working directory from `lsof -a -p PID -d cwd -Fn`.
fn parse_lsof_cwd(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .filter(|path| !path.is_empty())
        .map(str::to_string)
}

fn parse_boot_seconds(output: &str) -> Option<i64> {
    BOOT_SECONDS.captures(output)?.get(1)?.as_str().parse().ok()
}

fn parse_pid_lines(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Rows of `launchctl list` as `(pid, label)`; jobs that are not running
/// (PID `-`) are skipped.
fn parse_launchctl_list(output: &str) -> Vec<(u32, String)> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return None;
            }
            let pid: u32 = fields[0].parse().ok().filter(|&p| p > 0)?;
            Some((pid, fields[2].to_string()))
        })
        .collect()
}

fn parse_procinfo_label(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("label = "))
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
}

/// `ps -axo pid=,comm=,args=` rows for name matching.
fn parse_name_rows(output: &str) -> Vec<NameEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let command = basename(fields.next()?).to_string();
            let args: Vec<&str> = fields.collect();
            let cmdline = if args.is_empty() {
                command.clone()
            } else {
                args.join(" ")
            };
            Some(NameEntry {
                pid,
                command,
                cmdline,
            })
        })
        .collect()
}

/// `ps -axo pid=,ppid=,comm=` rows; `comm` is the rest of the line.
fn parse_table_rows(output: &str) -> Vec<Process> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let pid = tokens.next()?.parse().ok()?;
            let ppid = tokens.next()?.parse().ok()?;
            let comm = tokens.collect::<Vec<&str>>().join(" ");
            if comm.is_empty() {
                return None;
            }
            let mut process = Process::new(pid, ppid, basename(&comm));
            process.cmdline = comm;
            Some(process)
        })
        .collect()
}

fn launchd_search_dirs() -> Vec<PathBuf> {
    let mut search = Vec::new();
    if let Some(home) = dirs::home_dir() {
        search.push(home.join("Library/LaunchAgents"));
    }
    search.extend(
        [
            "/Library/LaunchAgents",
            "/Library/LaunchDaemons",
            "/System/Library/LaunchAgents",
            "/System/Library/LaunchDaemons",
        ]
        .map(PathBuf::from),
    );
    search
}

impl Introspect for MacPlatform {
    fn launchd_label(&self, pid: u32) -> Option<String> {
        let out = command_stdout("launchctl", &["procinfo", &pid.to_string()])?;
        parse_procinfo_label(&out)
    }

    fn launchd_plist(&self, label: &str) -> Option<String> {
        let file = format!("{}.plist", label);
        launchd_search_dirs()
            .into_iter()
            .map(|dir| dir.join(&file))
            .find(|path| path.is_file())
            .map(|path| path.to_string_lossy().into_owned())
    }

    fn container_name(&self, runtime: &str, id: &str) -> Option<String> {
        crate::docker::container_name(runtime, id)
    }
}

impl Platform for MacPlatform {
    fn os(&self) -> Os {
        Os::MacOs
    }

    fn read_process(&self, pid: u32) -> PlatformResult<Process> {
        let pid_arg = pid.to_string();
        let out = try_command_stdout(
            "ps",
            &["-p", &pid_arg, "-o", "ppid=,user=,lstart=,args="],
        )
        .map_err(|_| PlatformError::ProcessNotFound { pid })?;
        let comm = command_stdout("ps", &["-p", &pid_arg, "-o", "comm="]).unwrap_or_default();
        let record = out
            .lines()
            .next()
            .and_then(|line| parse_ps_record(line, &comm))
            .ok_or(PlatformError::ProcessNotFound { pid })?;

        let mut process = Process::new(pid, record.ppid, record.command);
        process.cmdline = record.cmdline;
        process.user = record.user;
        process.started_at = record.started_at;

        if let Some(out) = command_stdout("lsof", &["-a", "-p", &pid_arg, "-d", "cwd", "-Fn"]) {
            process.working_dir = parse_lsof_cwd(&out).unwrap_or_default();
        }
        if let Some(out) = command_stdout("lsof", &["-a", "-p", &pid_arg, "-i", "-P", "-n"]) {
            for (port, addr) in parse_lsof_listeners(&out) {
                process.push_listener(port, addr);
            }
        }
        process.container = crate::docker::container_from_cmdline(&process.cmdline);
        if let Some(ctx) = crate::git::detect(&process.working_dir) {
            process.git_repo = Some(ctx.repo);
            process.git_branch = ctx.branch;
        }

        Ok(process)
    }

    fn list_pids(&self) -> PlatformResult<Vec<u32>> {
        Ok(parse_pid_lines(&try_command_stdout("ps", &["-axo", "pid="])?))
    }

    fn boot_time(&self) -> DateTime<Local> {
        command_stdout("sysctl", &["-n", "kern.boottime"])
            .and_then(|out| parse_boot_seconds(&out))
            .and_then(|secs| Local.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Local::now)
    }

    fn port_listeners(&self, port: u16) -> PlatformResult<PortListeners> {
        let spec = format!("-iTCP:{}", port);
        // lsof exits 1 when nothing matches.
        let pids = command_stdout("lsof", &[&spec, "-sTCP:LISTEN", "-t", "-P", "-n"])
            .map(|out| parse_pid_lines(&out))
            .unwrap_or_default();
        debug!(port, owners = pids.len(), "lsof port ownership");
        Ok(PortListeners {
            sockets: pids.len(),
            pids,
        })
    }

    fn service_pid(&self, name: &str) -> Option<ServiceMatch> {
        let out = command_stdout("launchctl", &["list"])?;
        let needle = name.to_lowercase();
        parse_launchctl_list(&out)
            .into_iter()
            .find(|(_, label)| label.to_lowercase().contains(&needle))
            .map(|(pid, unit)| ServiceMatch { pid, unit })
    }

    fn name_entries(&self) -> PlatformResult<Vec<NameEntry>> {
        Ok(parse_name_rows(&try_command_stdout(
            "ps",
            &["-axo", "pid=,comm=,args="],
        )?))
    }

    fn list_processes(&self) -> PlatformResult<Vec<Process>> {
        Ok(parse_table_rows(&try_command_stdout(
            "ps",
            &["-axo", "pid=,ppid=,comm="],
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_ps_record() {
        let line = "    1 root  Mon Dec  1 10:30:00 2025 nginx: master process /usr/sbin/nginx";
        let rec = parse_ps_record(line, "/usr/sbin/nginx").unwrap();
        assert_eq!(rec.ppid, 1);
        assert_eq!(rec.command, "nginx");
        assert_eq!(rec.user, "root");
        assert_eq!(rec.cmdline, "nginx: master process /usr/sbin/nginx");
        let started = rec.started_at.unwrap();
        assert_eq!((started.year(), started.month(), started.day()), (2025, 12, 1));
        assert_eq!(started.hour(), 10);
    }

    #[test]
    fn test_parse_ps_record_app_bundle_with_spaces() {
        let comm = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome\n";
        let line = "    1 dev  Mon Dec  1 10:30:00 2025 /Applications/Google Chrome.app/Contents/MacOS/Google Chrome --type=gpu";
        let rec = parse_ps_record(line, comm).unwrap();
        assert_eq!(rec.command, "Google Chrome");
        assert_eq!(rec.user, "dev");
        assert_eq!(rec.started_at.unwrap().day(), 1);
        assert!(rec.cmdline.ends_with("Google Chrome --type=gpu"));
    }

    #[test]
    fn test_parse_ps_record_without_args() {
        let line = "1 root Tue Jan 14 08:00:00 2025";
        let rec = parse_ps_record(line, "/sbin/launchd").unwrap();
        assert_eq!(rec.command, "launchd");
        assert_eq!(rec.cmdline, "/sbin/launchd");
    }

    #[test]
    fn test_parse_ps_record_short() {
        assert!(parse_ps_record("1 root", "launchd").is_none());
    }

    #[test]
    fn test_parse_lsof_listeners() {
        let out = "COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME
node    4242 dev  23u IPv4 0x1     0t0  TCP *:3000 (LISTEN)
node    4242 dev  24u IPv6 0x2     0t0  TCP [::1]:3000 (LISTEN)
node    4242 dev  25u IPv4 0x3     0t0  TCP *:3000 (LISTEN)
node    4242 dev  26u IPv4 0x4     0t0  TCP 127.0.0.1:3000->127.0.0.1:51234 (ESTABLISHED)";
        assert_eq!(
            parse_lsof_listeners(out),
            vec![(3000, "0.0.0.0".to_string()), (3000, "::1".to_string())]
        );
    }

    #[test]
    fn test_parse_lsof_cwd() {
        let out = "p4242\nfcwd\nn/Users/dev/shop-api\n";
        assert_eq!(parse_lsof_cwd(out).as_deref(), Some("/Users/dev/shop-api"));
        assert_eq!(parse_lsof_cwd("p4242\n"), None);
    }

    #[test]
    fn test_parse_boot_seconds() {
        let out = "{ sec = 1735200000, usec = 123456 } Thu Dec 26 08:00:00 2024";
        assert_eq!(parse_boot_seconds(out), Some(1_735_200_000));
        assert_eq!(parse_boot_seconds("garbage"), None);
    }

    #[test]
    fn test_parse_launchctl_list() {
        let out = "PID\tStatus\tLabel\n512\t0\tcom.example.api\n-\t0\tcom.example.idle\n88\t0\thomebrew.mxcl.postgresql@16\n";
        assert_eq!(
            parse_launchctl_list(out),
            vec![
                (512, "com.example.api".to_string()),
                (88, "homebrew.mxcl.postgresql@16".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_procinfo_label() {
        let out = "program path = /usr/local/bin/api\n\tlabel = com.example.api\n";
        assert_eq!(parse_procinfo_label(out).as_deref(), Some("com.example.api"));
        assert_eq!(parse_procinfo_label("nothing here"), None);
    }

    #[test]
    fn test_parse_name_rows() {
        let out = "  1 /sbin/launchd /sbin/launchd\n 501 /usr/local/bin/node node server.js\n";
        let rows = parse_name_rows(out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].pid, 501);
        assert_eq!(rows[1].command, "node");
        assert_eq!(rows[1].cmdline, "node server.js");
    }

    #[test]
    fn test_parse_table_rows() {
        let out = "    1     0 /sbin/launchd\n  501     1 /Applications/My App.app/Contents/MacOS/My App\n";
        let rows = parse_table_rows(out);
        assert_eq!(rows[0].pid, 1);
        assert_eq!(rows[1].ppid, 1);
        assert_eq!(rows[1].command, "My App");
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_reads_own_process() {
        let platform = MacPlatform::new();
        let me = std::process::id();
        let process = platform.read_process(me).unwrap();
        assert_eq!(process.pid, me);
        assert!(process.ppid > 0);
    }
}
