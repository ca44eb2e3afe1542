//! Container runtime integration.
//!
//! Turns opaque container ids found in cgroups into the names users gave
//! them, and recognises container CLIs from a bare command line on hosts
//! without cgroups.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::platform::command_stdout;
use crate::types::ContainerRef;

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
}

/// Name of the container `id` belongs to, asking the matching runtime CLI.
///
/// `id` may be the full 64-character id or any prefix of it.
pub fn container_name(runtime: &str, id: &str) -> Option<String> {
    if id.is_empty() || !cfg!(feature = "docker") {
        return None;
    }

    let name = match runtime {
        "docker" => ps_name("docker", id),
        "podman" => ps_name("podman", id),
        "containerd" | "cri-o" | "kubernetes" => crictl_name(id).or_else(|| ps_name("docker", id)),
        _ => None,
    };
    debug!(runtime, id, name = ?name, "container name lookup");
    name
}

fn ps_name(cli: &str, id: &str) -> Option<String> {
    let out = command_stdout(cli, &["ps", "--no-trunc", "--format", "{{json .}}"])?;
    name_from_ps(&out, id)
}

fn name_from_ps(output: &str, id: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<PsLine>(line).ok())
        .find(|c| ids_match(&c.id, id))
        .and_then(|c| {
            // Several names are comma separated; the first is the primary.
            c.names
                .split(',')
                .next()
                .map(|n| n.trim().trim_start_matches('/').to_string())
        })
        .filter(|n| !n.is_empty())
}

fn crictl_name(id: &str) -> Option<String> {
    let out = command_stdout("crictl", &["inspect", id])?;
    name_from_crictl(&out)
}

fn name_from_crictl(output: &str) -> Option<String> {
    let doc: serde_json::Value = serde_json::from_str(output).ok()?;
    let status = doc.get("status")?;
    status
        .pointer("/labels/io.kubernetes.container.name")
        .or_else(|| status.pointer("/metadata/name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn ids_match(full: &str, wanted: &str) -> bool {
    !full.is_empty() && (full.starts_with(wanted) || wanted.starts_with(full))
}

static LONG_HEX_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9a-f]{64}\b").unwrap());

/// Container identity from the command line of a container CLI or shim.
///
/// Used where cgroups are unavailable. The id is the `--name` given on the
/// command line when present, empty otherwise.
pub fn container_from_cmdline(cmdline: &str) -> Option<ContainerRef> {
    if cmdline.is_empty() {
        return None;
    }
    let lower = cmdline.to_lowercase();
    let tokens: Vec<&str> = cmdline.split_whitespace().collect();
    let program = tokens
        .first()
        .map(|t| crate::platform::basename(t).to_lowercase())
        .unwrap_or_default();
    let program = program.trim_end_matches(".exe");

    let named = |runtime: &str, flags: &[&str]| {
        Some(ContainerRef::new(
            runtime,
            flag_value(&tokens, flags).unwrap_or_default(),
        ))
    };

    if lower.contains("docker") {
        named("docker", &["--name"])
    } else if lower.contains("podman") {
        named("podman", &["--name"])
    } else if lower.contains("minikube") {
        named("kubernetes", &["-p", "--profile"])
    } else if program == "kind" {
        named("kubernetes", &["--name"])
    } else if lower.contains("kubepods") {
        let id = LONG_HEX_ID.find(&lower).map(|m| m.as_str().to_string());
        let resolved = id.as_deref().and_then(|id| container_name("kubernetes", id));
        Some(ContainerRef::new(
            "kubernetes",
            resolved.or(id).unwrap_or_default(),
        ))
    } else if lower.contains("nerdctl") || lower.contains("containerd") {
        named("containerd", &["--name"])
    } else {
        None
    }
}

/// Value of the first of `flags` present, as `--flag value` or `--flag=value`.
fn flag_value(tokens: &[&str], flags: &[&str]) -> Option<String> {
    for (i, token) in tokens.iter().enumerate() {
        for flag in flags {
            if token == flag {
                if let Some(value) = tokens.get(i + 1) {
                    return Some(value.trim_matches('"').to_string());
                }
            } else if let Some(value) = token
                .strip_prefix(flag)
                .and_then(|rest| rest.strip_prefix('='))
            {
                return Some(value.trim_matches('"').to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_ps_prefix_match() {
        let out = r#"{"ID":"3f4e5d6c7b8a","Names":"shop-db","Ports":"0.0.0.0:5432->5432/tcp"}
{"ID":"aaaabbbbcccc","Names":"cache,cache-alias","Ports":""}"#;
        let full = "3f4e5d6c7b8a9f0e1d2c3b4a5f6e7d8c9b0a1f2e3d4c5b6a7f8e9d0c1b2a3f4e";
        assert_eq!(name_from_ps(out, full).as_deref(), Some("shop-db"));
        assert_eq!(name_from_ps(out, "aaaabbbb").as_deref(), Some("cache"));
        assert_eq!(name_from_ps(out, "ffff"), None);
    }

    #[test]
    fn test_name_from_ps_skips_bad_lines() {
        let out = "garbage\n\n{\"ID\":\"abc123abc123\",\"Names\":\"/web\"}";
        assert_eq!(name_from_ps(out, "abc123").as_deref(), Some("web"));
    }

    #[test]
    fn test_name_from_crictl() {
        let out = r#"{"status":{"metadata":{"name":"api"},"labels":{"io.kubernetes.container.name":"api-main"}}}"#;
        assert_eq!(name_from_crictl(out).as_deref(), Some("api-main"));

        let out = r#"{"status":{"metadata":{"name":"api"}}}"#;
        assert_eq!(name_from_crictl(out).as_deref(), Some("api"));

        assert_eq!(name_from_crictl("not json"), None);
    }

    #[test]
    fn test_cmdline_docker_with_name() {
        let c = container_from_cmdline("docker run --rm --name web nginx:latest").unwrap();
        assert_eq!(c, ContainerRef::new("docker", "web"));
    }

    #[test]
    fn test_cmdline_equals_form() {
        let c = container_from_cmdline("podman run --name=db postgres").unwrap();
        assert_eq!(c, ContainerRef::new("podman", "db"));
    }

    #[test]
    fn test_cmdline_runtime_without_name() {
        let c = container_from_cmdline(r"C:\Program Files\Docker\dockerd.exe").unwrap();
        assert_eq!(c.runtime, "docker");
        assert!(c.id.is_empty());
    }

    #[test]
    fn test_cmdline_minikube_profile() {
        let c = container_from_cmdline("minikube start -p dev").unwrap();
        assert_eq!(c, ContainerRef::new("kubernetes", "dev"));
    }

    #[test]
    fn test_cmdline_kind_requires_program_name() {
        let c = container_from_cmdline("kind create cluster --name lab").unwrap();
        assert_eq!(c, ContainerRef::new("kubernetes", "lab"));
        assert!(container_from_cmdline("python mankind.py").is_none());
    }

    #[test]
    fn test_cmdline_plain_process() {
        assert!(container_from_cmdline("node server.js").is_none());
        assert!(container_from_cmdline("").is_none());
    }
}
