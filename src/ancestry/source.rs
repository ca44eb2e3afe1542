//! Origin classification over an ancestry chain.
//!
//! Detectors are tried in a fixed, per-platform order and the first verdict
//! wins. More specific launchers come first: a containerized process is also
//! a descendant of init, but the container is the useful answer.
//!
//!   Linux:   container → supervisor → systemd → cron → shell
//!   macOS:   supervisor → launchd → cron → shell
//!   Windows: service control manager → supervisor → cron → shell
//!
//! Anything else is `unknown` at confidence 0.2.

use tracing::debug;

use crate::platform::{Introspect, Os};
use crate::types::{Process, Source, SourceType};

/// One heuristic: inspect the chain, maybe produce a verdict.
///
/// Detectors only read the chain. Lookups through `Introspect` are best
/// effort and a failed lookup is just missing evidence.
pub type Detector = fn(&[Process], &dyn Introspect) -> Option<Source>;

const LINUX_DETECTORS: &[(&str, Detector)] = &[
    ("container", detect_container),
    ("supervisor", detect_supervisor),
    ("systemd", detect_systemd),
    ("cron", detect_cron),
    ("shell", detect_shell),
];

// Containers on macOS live inside a Linux VM; host ancestry can't see them.
const MACOS_DETECTORS: &[(&str, Detector)] = &[
    ("supervisor", detect_supervisor),
    ("launchd", detect_launchd),
    ("cron", detect_cron),
    ("shell", detect_shell),
];

const WINDOWS_DETECTORS: &[(&str, Detector)] = &[
    ("windows-service", detect_windows_service),
    ("supervisor", detect_supervisor),
    ("cron", detect_cron),
    ("shell", detect_shell),
];

const GENERIC_DETECTORS: &[(&str, Detector)] = &[
    ("supervisor", detect_supervisor),
    ("cron", detect_cron),
    ("shell", detect_shell),
];

/// Detector order for a platform, highest priority first.
pub fn detectors_for(os: Os) -> &'static [(&'static str, Detector)] {
    match os {
        Os::Linux => LINUX_DETECTORS,
        Os::MacOs => MACOS_DETECTORS,
        Os::Windows => WINDOWS_DETECTORS,
        Os::Other => GENERIC_DETECTORS,
    }
}

/// Classify how the last process in `chain` came to exist.
///
/// Never fails. `chain` is ordered outermost ancestor first.
pub fn classify(chain: &[Process], os: Os, lookups: &dyn Introspect) -> Source {
    if chain.is_empty() {
        return Source::unknown();
    }

    for (name, detector) in detectors_for(os) {
        if let Some(source) = detector(chain, lookups) {
            debug!(detector = name, source = %source.source_type, "origin detected");
            return source;
        }
    }

    Source::unknown()
}

// ── Name tables ─────────────────────────────────────────────────────────────

/// Container engines and their per-container control processes.
const CONTAINER_ENGINES: &[(&str, &str)] = &[
    ("containerd-shim", "containerd"),
    ("containerd-shim-runc-v2", "containerd"),
    ("dockerd", "docker"),
    ("docker-proxy", "docker"),
    ("conmon", "podman"),
    ("podman", "podman"),
    ("runc", "runc"),
    ("crun", "crun"),
    ("lxc-start", "lxc"),
    ("kubelet", "kubernetes"),
];

/// Long-lived process supervision daemons.
const SUPERVISORS: &[(&str, &str)] = &[
    ("pm2", "pm2"),
    ("god daemon", "pm2"),
    ("supervisord", "supervisord"),
    ("gunicorn", "gunicorn"),
    ("uwsgi", "uwsgi"),
    ("runsv", "runit"),
    ("runsvdir", "runit"),
    ("s6-svscan", "s6"),
    ("s6-supervise", "s6"),
    ("supervise", "daemontools"),
    ("svscan", "daemontools"),
    ("circusd", "circus"),
    ("forever", "forever"),
    ("nodemon", "nodemon"),
    ("monit", "monit"),
    ("tmux", "tmux"),
    ("screen", "screen"),
];

const CRON_NAMES: &[&str] = &[
    "cron",
    "crond",
    "anacron",
    "atd",
    "fcron",
    "busybox-crond",
    "crondaemon",
    "taskeng",
    "taskhostw",
];

const SHELLS: &[&str] = &[
    "bash", "sh", "zsh", "fish", "dash", "ksh", "mksh", "tcsh", "csh", "nu", "xonsh", "elvish",
    "pwsh", "powershell", "cmd",
];

const SERVICE_CONTROL_MANAGER: &str = "services";

const SERVICES_REGISTRY: &str = r"HKLM\SYSTEM\CurrentControlSet\Services\";

/// Lowercase, strip a leading login dash and a trailing `.exe`.
fn normalize(command: &str) -> String {
    let lower = command.trim().to_lowercase();
    let lower = lower.strip_prefix('-').unwrap_or(&lower);
    lower.strip_suffix(".exe").unwrap_or(lower).to_string()
}

/// `name` is `pattern`, or starts with it followed by a separator
/// (`tmux: server`, `PM2 v5.3.0: God Daemon`, `gunicorn: master`).
fn name_matches(name: &str, pattern: &str) -> bool {
    match name.strip_prefix(pattern) {
        Some("") => true,
        Some(rest) => rest.starts_with([' ', ':', '[']),
        None => false,
    }
}

fn lookup(table: &[(&str, &'static str)], command: &str) -> Option<&'static str> {
    let name = normalize(command);
    table
        .iter()
        .find(|(pattern, _)| name_matches(&name, pattern))
        .map(|(_, label)| *label)
}

/// Ancestors of the target, outermost first (the target itself excluded).
fn ancestors(chain: &[Process]) -> &[Process] {
    &chain[..chain.len().saturating_sub(1)]
}

fn target(chain: &[Process]) -> &Process {
    &chain[chain.len() - 1]
}

// ── Detectors ───────────────────────────────────────────────────────────────

fn detect_container(chain: &[Process], lookups: &dyn Introspect) -> Option<Source> {
    // Nearest tagged process wins; the target usually carries the cgroup.
    if let Some(container) = chain.iter().rev().find_map(|p| p.container.as_ref()) {
        let resolved = if container.is_opaque() {
            lookups.container_name(&container.runtime, &container.id)
        } else {
            None
        };
        let name = resolved.unwrap_or_else(|| match container.short_id() {
            "" => container.runtime.clone(),
            short => short.to_string(),
        });

        let mut source = Source::new(SourceType::Container, name, 0.9)
            .with_description(Some(format!("{} container", container.runtime)))
            .with_detail("runtime", container.runtime.clone());
        if !container.id.is_empty() {
            source = source.with_detail("id", container.id.clone());
        }
        return Some(source);
    }

    let (engine, process) = ancestors(chain)
        .iter()
        .rev()
        .find_map(|p| lookup(CONTAINER_ENGINES, &p.command).map(|engine| (engine, p)))?;

    Some(
        Source::new(SourceType::Container, engine, 0.75)
            .with_description(Some(format!("{} container", engine)))
            .with_detail("runtime", engine)
            .with_detail("manager", format!("{} (pid {})", process.command, process.pid)),
    )
}

fn detect_supervisor(chain: &[Process], _lookups: &dyn Introspect) -> Option<Source> {
    // Top-down so the highest-level supervisor wins.
    ancestors(chain).iter().find_map(|p| {
        lookup(SUPERVISORS, &p.command).map(|label| {
            Source::new(SourceType::Supervisor, label, 0.85)
                .with_description(Some(format!("managed by {}", label)))
                .with_detail("manager", format!("{} (pid {})", p.command, p.pid))
        })
    })
}

fn detect_systemd(chain: &[Process], lookups: &dyn Introspect) -> Option<Source> {
    let root = chain.iter().find(|p| p.pid == 1)?;
    if !matches!(normalize(&root.command).as_str(), "systemd" | "init") {
        return None;
    }

    let target = target(chain);
    let unit = lookups
        .unit_for_pid(target.pid)
        .or_else(|| target.service.clone());
    let unit_file = unit_property(lookups, unit.as_deref(), target.pid, &["FragmentPath", "SourcePath"]);
    let description = unit_property(lookups, unit.as_deref(), target.pid, &["Description"]);

    let confidence = if unit.is_some() || unit_file.is_some() {
        0.95
    } else {
        0.8
    };
    let mut source = Source::new(SourceType::Systemd, "systemd", confidence)
        .with_description(description)
        .with_unit_file(unit_file);
    if let Some(unit) = unit {
        source = source.with_detail("unit", unit);
    }
    Some(source)
}

/// First non-empty property, queried by unit name and then by raw PID.
fn unit_property(
    lookups: &dyn Introspect,
    unit: Option<&str>,
    pid: u32,
    properties: &[&str],
) -> Option<String> {
    let pid_key = pid.to_string();
    let keys = unit.into_iter().chain(std::iter::once(pid_key.as_str()));
    for key in keys {
        for property in properties {
            if let Some(value) = lookups.unit_property(property, key) {
                return Some(value);
            }
        }
    }
    None
}

fn detect_launchd(chain: &[Process], lookups: &dyn Introspect) -> Option<Source> {
    let root = chain.iter().find(|p| p.pid == 1)?;
    if normalize(&root.command) != "launchd" {
        return None;
    }

    let target = target(chain);
    let label = lookups.launchd_label(target.pid);
    let plist = label.as_deref().and_then(|l| lookups.launchd_plist(l));

    let confidence = if label.is_some() { 0.9 } else { 0.8 };
    let mut source = Source::new(SourceType::Launchd, "launchd", confidence).with_unit_file(plist);
    if let Some(label) = label {
        source = source
            .with_description(Some(format!("launchd job {}", label)))
            .with_detail("label", label);
    }
    Some(source)
}

fn detect_cron(chain: &[Process], _lookups: &dyn Introspect) -> Option<Source> {
    ancestors(chain).iter().rev().find_map(|p| {
        let name = normalize(&p.command);
        CRON_NAMES.contains(&name.as_str()).then(|| {
            Source::new(SourceType::Cron, name, 0.7)
                .with_description(Some("scheduled task".to_string()))
                .with_detail("manager", format!("{} (pid {})", p.command, p.pid))
        })
    })
}

fn detect_shell(chain: &[Process], _lookups: &dyn Introspect) -> Option<Source> {
    // Nearest shell: that is the session the user typed into.
    ancestors(chain).iter().rev().find_map(|p| {
        let name = normalize(&p.command);
        SHELLS.contains(&name.as_str()).then(|| {
            Source::new(SourceType::Shell, name, 0.5)
                .with_description(Some("started from an interactive shell".to_string()))
                .with_detail("shell", format!("{} (pid {})", p.command, p.pid))
        })
    })
}

fn detect_windows_service(chain: &[Process], _lookups: &dyn Introspect) -> Option<Source> {
    // 1. An explicit service name, preferring the target end of the chain.
    if let Some(service) = chain.iter().rev().find_map(|p| p.service.as_deref()) {
        return Some(
            Source::new(SourceType::WindowsService, service, 0.9)
                .with_unit_file(Some(format!("{}{}", SERVICES_REGISTRY, service)))
                .with_detail("manager", "services.exe")
                .with_detail("service", service),
        );
    }

    let is_scm = |p: &Process| normalize(&p.command) == SERVICE_CONTROL_MANAGER;

    // 2. Direct child of services.exe: derive a tentative name from the image.
    if chain.len() >= 2 && is_scm(&chain[chain.len() - 2]) {
        let command = &target(chain).command;
        let name = command
            .strip_suffix(".exe")
            .or_else(|| command.strip_suffix(".EXE"))
            .unwrap_or(command);
        return Some(
            Source::new(SourceType::WindowsService, name, 0.6)
                .with_unit_file(Some(format!("{}{}", SERVICES_REGISTRY, name)))
                .with_detail("manager", "services.exe"),
        );
    }

    // 3. services.exe somewhere above, service unknown.
    if ancestors(chain).iter().any(is_scm) {
        return Some(
            Source::new(SourceType::WindowsService, "Service Control Manager", 0.7)
                .with_detail("manager", "services.exe"),
        );
    }

    None
}
