//! Service unit and container identity from `/proc/<pid>/cgroup`.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::ContainerRef;

static DOCKER_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"docker-([0-9a-f]{12,64})\.scope").unwrap());
static CONTAINERD_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"cri-containerd-([0-9a-f]{12,64})\.scope").unwrap());
static CRIO_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"crio-([0-9a-f]{12,64})\.scope").unwrap());
static PODMAN_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"libpod-([0-9a-f]{12,64})\.scope").unwrap());
static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}$").unwrap());

/// Split a cgroup line into (controllers, path).
fn split_line(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.splitn(3, ':');
    let _hierarchy = parts.next()?;
    let controllers = parts.next()?;
    let path = parts.next()?;
    Some((controllers, path.trim()))
}

/// Unit name (`*.service` or `*.scope`) from the systemd hierarchy.
///
/// Only the unified hierarchy (empty controller list) and the named
/// systemd hierarchy are considered. The innermost matching segment wins.
pub fn unit_from_cgroup(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(split_line)
        .filter(|(controllers, _)| controllers.is_empty() || controllers.contains("systemd"))
        .find_map(|(_, path)| {
            path.rsplit('/')
                .find(|seg| seg.ends_with(".service") || seg.ends_with(".scope"))
                .map(str::to_string)
        })
}

/// Like [`unit_from_cgroup`] but only accepts `.service` units.
pub fn service_from_cgroup(content: &str) -> Option<String> {
    unit_from_cgroup(content).filter(|unit| unit.ends_with(".service"))
}

/// Container runtime and id if the process lives inside one.
pub fn container_from_cgroup(content: &str) -> Option<ContainerRef> {
    for (_, path) in content.lines().filter_map(split_line) {
        let scoped = [
            (&*CONTAINERD_SCOPE, "containerd"),
            (&*CRIO_SCOPE, "cri-o"),
            (&*PODMAN_SCOPE, "podman"),
            (&*DOCKER_SCOPE, "docker"),
        ];
        for (re, runtime) in scoped {
            if let Some(caps) = re.captures(path) {
                return Some(ContainerRef::new(runtime, &caps[1]));
            }
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        // cgroupfs driver: /docker/<id>, /kubepods/<qos>/<pod>/<id>
        if let Some(id) = segments.last().filter(|s| BARE_ID.is_match(s)) {
            let runtime = if segments.iter().any(|s| s.starts_with("kubepods")) {
                "kubernetes"
            } else if segments.contains(&"docker") {
                "docker"
            } else {
                "container"
            };
            return Some(ContainerRef::new(runtime, *id));
        }

        if let Some(pos) = segments.iter().position(|s| *s == "lxc" || *s == "lxc.payload") {
            if let Some(name) = segments.get(pos + 1) {
                return Some(ContainerRef::new("lxc", *name));
            }
        }
        if let Some(name) = segments.iter().find_map(|s| s.strip_prefix("lxc.payload.")) {
            return Some(ContainerRef::new("lxc", name));
        }
    }
    None
}
