pub mod json;
pub mod text;

use std::fmt::Write as _;

use colored::Colorize;

use crate::error::{Candidate, CandidateOrigin};

/// Output shape selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text(View),
    Json,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Text(View::default())
    }
}

/// Human readable layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Card,
    Tree,
    Short,
    Env,
}

/// The numbered menu shown when a name matches several processes.
pub fn render_ambiguity_menu(name: &str, candidates: &[Candidate]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} \"{}\"\n", "Ambiguous target:".yellow().bold(), name);
    let _ = writeln!(out, "The name matches multiple entities:\n");
    for (i, c) in candidates.iter().enumerate() {
        let role = match &c.origin {
            CandidateOrigin::Service(unit) => format!("master process   (service {})", unit),
            CandidateOrigin::Process => "process          (manual)".to_string(),
        };
        let _ = writeln!(
            out,
            "[{}] PID {:<7} {}: {}",
            i + 1,
            c.pid.to_string().yellow(),
            c.command,
            role
        );
    }
    let _ = writeln!(out, "\nwitr cannot determine intent safely.");
    let _ = writeln!(out, "Please re-run with an explicit PID:");
    let _ = writeln!(out, "  {}", "witr --pid <pid>".cyan());
    out
}
