//! Human readable renderings of a [`Report`].
//!
//! Every function returns the text instead of printing it. Colors come from
//! `colored`, which the CLI switches off globally for `--no-color`.

use std::fmt::Write as _;

use chrono::{DateTime, Local};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, ContentArrangement, Table};

use crate::platform::Os;
use crate::report::Report;
use crate::types::{Process, ProcessTree, SourceType};

const LABEL_WIDTH: usize = 12;
const CMDLINE_WIDTH: usize = 72;

fn line(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(
        out,
        "{} {}",
        format!("{:<width$}:", label, width = LABEL_WIDTH).dimmed(),
        value
    );
}

fn proc_label(p: &Process) -> String {
    format!("{} (pid {})", p.command, p.pid)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// `3 days ago`, `5 hours ago`, `just now`.
pub fn relative_age(started: DateTime<Local>, now: DateTime<Local>) -> String {
    let age = now - started;
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    };
    if age.num_days() > 0 {
        plural(age.num_days(), "day")
    } else if age.num_hours() > 0 {
        plural(age.num_hours(), "hour")
    } else if age.num_minutes() > 0 {
        plural(age.num_minutes(), "minute")
    } else {
        "just now".to_string()
    }
}

fn source_line(report: &Report) -> String {
    let source = &report.source;
    let kind = source.source_type.to_string();
    match source.source_type {
        SourceType::Unknown => "unknown".yellow().to_string(),
        SourceType::Systemd => match source.details.get("unit") {
            Some(unit) => format!("{} ({})", unit.green().bold(), kind),
            None => format!("{} ({})", source.name.green().bold(), kind),
        },
        _ => format!("{} ({})", source.name.green().bold(), kind),
    }
}

/// The full process card.
pub fn render_card(report: &Report, now: DateTime<Local>) -> String {
    let mut out = String::new();
    let p = &report.process;

    line(&mut out, "Target", report.target.to_string().bold());
    out.push('\n');

    line(
        &mut out,
        "Process",
        format!("{} (pid {})", p.command.bold(), p.pid.to_string().yellow()),
    );
    if !p.user.is_empty() {
        line(&mut out, "User", &p.user);
    }
    if let Some(container) = &p.container {
        line(&mut out, "Container", container);
    }
    if let Some(service) = &p.service {
        line(&mut out, "Service", service);
    }
    line(&mut out, "Command", truncate(&p.cmdline, CMDLINE_WIDTH));
    if let Some(started) = p.started_at {
        line(
            &mut out,
            "Started",
            format!(
                "{} ({})",
                relative_age(started, now),
                started.format("%a %Y-%m-%d %H:%M:%S %z")
            ),
        );
    }

    out.push('\n');
    let _ = writeln!(out, "{}", "Why It Exists:".cyan().bold());
    let _ = writeln!(out, "  {}", render_chain(&report.ancestry));

    out.push('\n');
    line(&mut out, "Source", source_line(report));
    if let Some(description) = &report.source.description {
        line(&mut out, "Description", description);
    }
    if let Some(unit_file) = &report.source.unit_file {
        line(&mut out, "Unit File", unit_file);
    }
    for (key, value) in &report.source.details {
        if key == "unit" {
            continue;
        }
        line(&mut out, &capitalize(key), value);
    }
    line(
        &mut out,
        "Confidence",
        format!("{:.0}%", report.source.confidence * 100.0),
    );

    let has_context = !p.working_dir.is_empty() || p.git_repo.is_some() || !p.listening_ports.is_empty();
    if has_context {
        out.push('\n');
    }
    if !p.working_dir.is_empty() {
        line(&mut out, "Working Dir", &p.working_dir);
    }
    if let Some(repo) = &p.git_repo {
        let branch = p
            .git_branch
            .as_deref()
            .map(|b| format!(" ({})", b.green()))
            .unwrap_or_default();
        line(&mut out, "Git Repo", format!("{}{}", repo, branch));
    }
    let listeners: Vec<String> = p
        .listeners()
        .map(|(addr, port)| {
            if addr.contains(':') {
                format!("[{}]:{}", addr, port)
            } else {
                format!("{}:{}", addr, port)
            }
        })
        .collect();
    if !listeners.is_empty() {
        line(&mut out, "Listening", listeners.join(", "));
    }

    if report.has_warnings() {
        out.push('\n');
        let _ = writeln!(out, "{}", "Warnings:".red().bold());
        for warning in &report.warnings {
            let _ = writeln!(out, "  {} {}", "•".red(), warning);
        }
    }

    if let Some(children) = &report.children {
        out.push('\n');
        out.push_str(&render_children(&report.process, children));
    }
    if let Some(tree) = &report.descendants {
        out.push('\n');
        let _ = writeln!(out, "{}", "Descendants:".cyan().bold());
        out.push_str(&render_descendants(tree));
    }

    out
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `systemd (pid 1) → sshd (pid 812) → bash (pid 4410)`.
pub fn render_chain(chain: &[Process]) -> String {
    let last = chain.len().saturating_sub(1);
    chain
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if i == last {
                proc_label(p).bold().to_string()
            } else {
                proc_label(p)
            }
        })
        .collect::<Vec<_>>()
        .join(&format!(" {} ", "→".magenta()))
}

/// One-line output for `--short`.
pub fn render_short(report: &Report) -> String {
    format!("{}\n", render_chain(&report.ancestry))
}

/// Ancestry as an indented tree for `--tree`, root first.
pub fn render_tree(chain: &[Process]) -> String {
    let mut out = String::new();
    for (depth, p) in chain.iter().enumerate() {
        let branch = if depth == 0 {
            String::new()
        } else {
            format!("{}{} ", "  ".repeat(depth), "└─".magenta())
        };
        let _ = writeln!(out, "{}{}", branch, proc_label(p));
    }
    out
}

/// Direct children as a table.
pub fn render_children(parent: &Process, children: &[Process]) -> String {
    if children.is_empty() {
        return format!(
            "{}\n",
            format!("{} has no child processes", proc_label(parent)).yellow()
        );
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("PID").add_attribute(Attribute::Bold),
            Cell::new("Command").add_attribute(Attribute::Bold),
            Cell::new("Command Line").add_attribute(Attribute::Bold),
        ]);
    if !colored::control::SHOULD_COLORIZE.should_colorize() {
        table.force_no_tty();
    }
    for child in children {
        table.add_row(vec![
            Cell::new(child.pid).fg(Color::Yellow),
            Cell::new(&child.command).fg(Color::Cyan),
            Cell::new(truncate(&child.cmdline, CMDLINE_WIDTH)),
        ]);
    }

    format!(
        "{} {}\n{}\n",
        "Children of".cyan().bold(),
        proc_label(parent).bold(),
        table
    )
}

/// Descendant tree for `--descendants`, the root on the first line.
pub fn render_descendants(tree: &ProcessTree) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", proc_label(&tree.process));
    write_subtree(&mut out, &tree.children, "");
    out
}

fn write_subtree(out: &mut String, children: &[ProcessTree], prefix: &str) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let connector = if last { "└─" } else { "├─" };
        let _ = writeln!(
            out,
            "{}{} {}",
            prefix,
            connector.magenta(),
            proc_label(&child.process)
        );
        let nested = format!("{}{}", prefix, if last { "   " } else { "│  " });
        write_subtree(out, &child.children, &nested);
    }
}

/// Command and environment only, for `--env`.
pub fn render_env(process: &Process, os: Os) -> String {
    let mut out = String::new();
    line(&mut out, "Command", &process.cmdline);
    match process.env.as_deref() {
        Some(env) if !env.is_empty() => {
            let _ = writeln!(out, "{}", "Environment:".blue().bold());
            for var in env {
                let _ = writeln!(out, "  {}", var);
            }
        }
        None if os == Os::MacOs => {
            let _ = writeln!(
                out,
                "{}",
                "Environment variable extraction is not available on macOS.".yellow()
            );
        }
        Some(_) => {
            let _ = writeln!(out, "{}", "No environment variables found.".red());
        }
        None => {
            let _ = writeln!(
                out,
                "{}",
                "Environment not readable for this process.".yellow()
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ancestry::HealthWarning;
    use crate::types::{Source, Target, TargetKind};
    use chrono::Duration;

    fn plain() {
        colored::control::set_override(false);
    }

    fn chain() -> Vec<Process> {
        vec![
            Process::new(1, 0, "systemd"),
            Process::new(812, 1, "sshd"),
            Process::new(4410, 812, "bash"),
        ]
    }

    fn report() -> Report {
        let chain = chain();
        let mut process = chain[2].clone();
        process.user = "dev".into();
        process.working_dir = "/home/dev/shop-api".into();
        process.git_repo = Some("shop-api".into());
        process.git_branch = Some("main".into());
        process.push_listener(8080, "0.0.0.0");
        Report {
            target: Target::new(TargetKind::Name, "bash"),
            process,
            ancestry: chain,
            source: Source::new(SourceType::Systemd, "systemd", 0.95)
                .with_detail("unit", "ssh.service")
                .with_unit_file(Some("/lib/systemd/system/ssh.service".into())),
            warnings: vec![HealthWarning::PublicBind {
                address: "0.0.0.0".into(),
                port: 8080,
            }],
            children: None,
            descendants: None,
        }
    }

    #[test]
    fn test_render_tree() {
        plain();
        assert_eq!(
            render_tree(&chain()),
            "systemd (pid 1)\n  └─ sshd (pid 812)\n    └─ bash (pid 4410)\n"
        );
    }

    #[test]
    fn test_render_short() {
        plain();
        assert_eq!(
            render_short(&report()),
            "systemd (pid 1) → sshd (pid 812) → bash (pid 4410)\n"
        );
    }

    #[test]
    fn test_render_card_sections() {
        plain();
        let out = render_card(&report(), Local::now());
        assert!(out.contains("Target      : \"bash\""));
        assert!(out.contains("Process     : bash (pid 4410)"));
        assert!(out.contains("Source      : ssh.service (init-systemd)"));
        assert!(out.contains("Unit File   : /lib/systemd/system/ssh.service"));
        assert!(out.contains("Git Repo    : shop-api (main)"));
        assert!(out.contains("Listening   : 0.0.0.0:8080"));
        assert!(out.contains("listening on all interfaces (0.0.0.0:8080)"));
        assert!(out.contains("Confidence  : 95%"));
    }

    #[test]
    fn test_render_descendants() {
        plain();
        let tree = ProcessTree {
            process: Process::new(300, 1, "nginx"),
            children: vec![
                ProcessTree {
                    process: Process::new(301, 300, "nginx"),
                    children: vec![ProcessTree::leaf(Process::new(400, 301, "helper"))],
                },
                ProcessTree::leaf(Process::new(302, 300, "nginx")),
            ],
        };
        assert_eq!(
            render_descendants(&tree),
            "nginx (pid 300)\n├─ nginx (pid 301)\n│  └─ helper (pid 400)\n└─ nginx (pid 302)\n"
        );
    }

    #[test]
    fn test_render_children_empty() {
        plain();
        let parent = Process::new(42, 1, "sleep");
        assert_eq!(
            render_children(&parent, &[]),
            "sleep (pid 42) has no child processes\n"
        );
    }

    #[test]
    fn test_render_children_table() {
        plain();
        let parent = Process::new(300, 1, "nginx");
        let kids = vec![Process::new(301, 300, "nginx"), Process::new(302, 300, "nginx")];
        let out = render_children(&parent, &kids);
        assert!(out.starts_with("Children of nginx (pid 300)"));
        assert!(out.contains("301"));
        assert!(out.contains("302"));
    }

    #[test]
    fn test_render_env() {
        plain();
        let mut p = Process::new(7, 1, "node");
        p.cmdline = "node server.js".into();
        p.env = Some(vec!["PORT=8080".into(), "NODE_ENV=production".into()]);
        let out = render_env(&p, Os::Linux);
        assert_eq!(
            out,
            "Command     : node server.js\nEnvironment:\n  PORT=8080\n  NODE_ENV=production\n"
        );

        p.env = None;
        assert!(render_env(&p, Os::MacOs).contains("not available on macOS"));
        let unreadable = render_env(&p, Os::Linux);
        assert!(unreadable.contains("Environment not readable"));
        assert!(!unreadable.contains("No environment variables found."));

        p.env = Some(Vec::new());
        assert!(render_env(&p, Os::Linux).contains("No environment variables found."));
        assert!(render_env(&p, Os::Windows).contains("No environment variables found."));
    }

    #[test]
    fn test_relative_age() {
        let now = Local::now();
        assert_eq!(relative_age(now - Duration::days(3), now), "3 days ago");
        assert_eq!(relative_age(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(relative_age(now - Duration::seconds(5), now), "just now");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
