//! The default command: resolve a target, explain each matching process.

use anyhow::Result;
use chrono::{DateTime, Local};
use colored::Colorize;
use tracing::debug;

use crate::cli::Settings;
use crate::error::{Candidate, PlatformError, ResolveError};
use crate::output::{self, json, text, Mode, View};
use crate::platform::{self, Platform};
use crate::report::{self, Report};
use crate::resolve::{self, SelfIds};
use crate::types::Target;

/// What a lookup produced, before anything is printed.
#[derive(Debug)]
pub enum Outcome {
    Reports(Vec<Report>),
    NotFound(String),
    Ambiguous {
        name: String,
        candidates: Vec<Candidate>,
    },
}

/// Resolve `target` and build one report per matching PID.
///
/// Invalid targets and platform failures are errors; a target that
/// matches nothing or too much is an [`Outcome`].
pub fn investigate(
    platform: &dyn Platform,
    target: &Target,
    settings: &Settings,
    me: SelfIds,
    now: DateTime<Local>,
) -> Result<Outcome> {
    let pids = match resolve::resolve(platform, target, me) {
        Ok(pids) => pids,
        Err(ResolveError::NotFound(msg)) => return Ok(Outcome::NotFound(msg)),
        Err(ResolveError::Ambiguous { name, candidates }) => {
            return Ok(Outcome::Ambiguous { name, candidates })
        }
        Err(e) => return Err(e.into()),
    };

    let mut reports = Vec::with_capacity(pids.len());
    for pid in pids {
        match report::build(platform, target, pid, settings.expand, now) {
            Ok(r) => reports.push(r),
            Err(PlatformError::ProcessNotFound { pid }) => {
                debug!(pid, "process exited before it could be read");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if reports.is_empty() {
        return Ok(Outcome::NotFound(format!("no running process found for {}", target)));
    }
    Ok(Outcome::Reports(reports))
}

/// Text for one report in a human readable view.
pub fn render_report(report: &Report, view: View, platform: &dyn Platform, now: DateTime<Local>) -> String {
    let mut out = match view {
        View::Card => return text::render_card(report, now),
        View::Env => return text::render_env(&report.process, platform.os()),
        View::Tree => text::render_tree(&report.ancestry),
        View::Short => text::render_short(report),
    };

    if let Some(children) = &report.children {
        out.push('\n');
        out.push_str(&text::render_children(&report.process, children));
    }
    if let Some(tree) = &report.descendants {
        out.push('\n');
        out.push_str(&text::render_descendants(tree));
    }
    out
}

/// Run the lookup against the live system and print the result.
///
/// Returns `false` when the target was ambiguous.
pub fn execute(target: &Target, settings: &Settings) -> Result<bool> {
    let platform = platform::current();
    let platform = platform.as_ref();
    let me = SelfIds::current(platform);
    let now = Local::now();
    let json_mode = settings.mode == Mode::Json;

    match investigate(platform, target, settings, me, now)? {
        Outcome::Reports(reports) => {
            match settings.mode {
                Mode::Json => println!("{}", json::render_reports(&reports)),
                Mode::Text(view) => {
                    let rendered: Vec<String> = reports
                        .iter()
                        .map(|r| render_report(r, view, platform, now))
                        .collect();
                    print!("{}", rendered.join("\n"));
                }
            }
            Ok(true)
        }
        Outcome::NotFound(msg) => {
            if json_mode {
                println!("[]");
            } else {
                eprintln!("{} {}", "Error:".red().bold(), msg);
            }
            Ok(true)
        }
        Outcome::Ambiguous { name, candidates } => {
            if json_mode {
                println!("{}", json::render_ambiguous(&name, &candidates));
            } else {
                print!("{}", output::render_ambiguity_menu(&name, &candidates));
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;
    use crate::report::Expand;
    use crate::types::{Process, SourceType, TargetKind};

    const ME: SelfIds = SelfIds { pid: 9000, ppid: 8999 };

    fn settings(mode: Mode, expand: Expand) -> Settings {
        Settings {
            color: false,
            mode,
            expand,
            verbosity: 0,
        }
    }

    fn dev_box() -> FakePlatform {
        let mut node = Process::new(4410, 812, "node");
        node.cmdline = "node server.js".into();
        node.push_listener(3000, "127.0.0.1");
        FakePlatform::new()
            .with_process(1, 0, "systemd")
            .with_process(812, 1, "bash")
            .with(node)
            .with_process(4500, 4410, "esbuild")
            .with_port(3000, &[4410])
    }

    #[test]
    fn test_port_lookup_explains_listener() {
        let target = Target::new(TargetKind::Port, "3000");
        let outcome = investigate(
            &dev_box(),
            &target,
            &settings(Mode::Text(View::Card), Expand::None),
            ME,
            Local::now(),
        )
        .unwrap();
        let Outcome::Reports(reports) = outcome else {
            panic!("expected reports");
        };
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].process.pid, 4410);
        assert_eq!(reports[0].source.source_type, SourceType::Systemd);
        assert_eq!(reports[0].ancestry.len(), 3);
    }

    #[test]
    fn test_unused_port_is_not_found() {
        let target = Target::new(TargetKind::Port, "5432");
        let outcome = investigate(
            &dev_box(),
            &target,
            &settings(Mode::Text(View::Card), Expand::None),
            ME,
            Local::now(),
        )
        .unwrap();
        assert!(matches!(outcome, Outcome::NotFound(msg) if msg.contains("5432")));
    }

    #[test]
    fn test_vanished_pid_is_not_found() {
        let target = Target::new(TargetKind::Pid, "31337");
        let outcome = investigate(
            &dev_box(),
            &target,
            &settings(Mode::Text(View::Card), Expand::None),
            ME,
            Local::now(),
        )
        .unwrap();
        assert!(matches!(outcome, Outcome::NotFound(_)));
    }

    #[test]
    fn test_invalid_target_is_an_error() {
        let target = Target::new(TargetKind::Port, "http");
        let err = investigate(
            &dev_box(),
            &target,
            &settings(Mode::Text(View::Card), Expand::None),
            ME,
            Local::now(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid port: 'http'");
    }

    #[test]
    fn test_ambiguous_name() {
        let fake = dev_box().with_process(5000, 1, "node");
        let target = Target::new(TargetKind::Name, "node");
        let outcome = investigate(
            &fake,
            &target,
            &settings(Mode::Text(View::Card), Expand::None),
            ME,
            Local::now(),
        )
        .unwrap();
        let Outcome::Ambiguous { name, candidates } = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(name, "node");
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_short_view_with_children() {
        colored::control::set_override(false);
        let fake = dev_box();
        let target = Target::new(TargetKind::Pid, "4410");
        let now = Local::now();
        let Outcome::Reports(reports) = investigate(
            &fake,
            &target,
            &settings(Mode::Text(View::Short), Expand::Children),
            ME,
            now,
        )
        .unwrap() else {
            panic!("expected reports");
        };
        let out = render_report(&reports[0], View::Short, &fake, now);
        assert!(out.starts_with("systemd (pid 1) → bash (pid 812) → node (pid 4410)"));
        assert!(out.contains("esbuild"));
    }

    #[test]
    fn test_env_view_without_environment() {
        colored::control::set_override(false);
        let fake = dev_box();
        let target = Target::new(TargetKind::Pid, "4410");
        let now = Local::now();
        let Outcome::Reports(reports) = investigate(
            &fake,
            &target,
            &settings(Mode::Text(View::Env), Expand::None),
            ME,
            now,
        )
        .unwrap() else {
            panic!("expected reports");
        };
        let out = render_report(&reports[0], View::Env, &fake, now);
        assert!(out.contains("node server.js"));
        assert!(out.contains("Environment not readable"));
    }
}
