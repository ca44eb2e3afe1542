use clap::builder::FalseyValueParser;
use clap::{ArgGroup, Parser, Subcommand};
use clap_complete::Shell;

use crate::output::{Mode, View};
use crate::report::Expand;
use crate::types::{Target, TargetKind};

#[derive(Parser)]
#[command(name = "witr")]
#[command(version, about = "Why is this running? Trace a process back to whatever launched it")]
#[command(group(ArgGroup::new("target").args(["pid", "port", "name"])))]
#[command(group(ArgGroup::new("view").args(["tree", "short", "env"])))]
pub struct Cli {
    /// Process or service name to explain
    pub name: Option<String>,

    /// Explain the process with this PID
    #[arg(long, value_name = "PID")]
    pub pid: Option<String>,

    /// Explain the process listening on this TCP port
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Output the whole report as JSON
    #[arg(long, env = "WITR_JSON", value_parser = FalseyValueParser::new())]
    pub json: bool,

    /// Show the ancestry as a tree
    #[arg(long)]
    pub tree: bool,

    /// Show the ancestry on one line
    #[arg(long)]
    pub short: bool,

    /// List direct child processes
    #[arg(long, conflicts_with = "descendants")]
    pub children: bool,

    /// Show the full descendant tree
    #[arg(long)]
    pub descendants: bool,

    /// Show only the command and its environment
    #[arg(long)]
    pub env: bool,

    /// Disable colored output
    #[arg(long, env = "WITR_NO_COLOR", value_parser = FalseyValueParser::new())]
    pub no_color: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Presentation choices derived from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub color: bool,
    pub mode: Mode,
    pub expand: Expand,
    pub verbosity: u8,
}

impl Cli {
    /// The target named on the command line, if any.
    pub fn target(&self) -> Option<Target> {
        if let Some(pid) = &self.pid {
            Some(Target::new(TargetKind::Pid, pid.as_str()))
        } else if let Some(port) = &self.port {
            Some(Target::new(TargetKind::Port, port.as_str()))
        } else {
            self.name
                .as_ref()
                .map(|name| Target::new(TargetKind::Name, name.as_str()))
        }
    }

    pub fn settings(&self) -> Settings {
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Settings {
            color: !(self.no_color || no_color_env),
            mode: self.mode(),
            expand: self.expand(),
            verbosity: self.verbose,
        }
    }

    fn mode(&self) -> Mode {
        if self.json {
            Mode::Json
        } else if self.env {
            Mode::Text(View::Env)
        } else if self.tree {
            Mode::Text(View::Tree)
        } else if self.short {
            Mode::Text(View::Short)
        } else {
            Mode::Text(View::Card)
        }
    }

    fn expand(&self) -> Expand {
        if self.descendants {
            Expand::Descendants
        } else if self.children {
            Expand::Children
        } else {
            Expand::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("witr").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_name_target() {
        let cli = parse(&["nginx"]);
        assert_eq!(cli.target(), Some(Target::new(TargetKind::Name, "nginx")));
        assert_eq!(cli.settings().mode, Mode::Text(View::Card));
    }

    #[test]
    fn test_pid_kept_verbatim() {
        let cli = parse(&["--pid", "abc"]);
        assert_eq!(cli.target(), Some(Target::new(TargetKind::Pid, "abc")));
    }

    #[test]
    fn test_port_with_children() {
        let cli = parse(&["--port", "8080", "--children", "--short"]);
        assert_eq!(cli.target(), Some(Target::new(TargetKind::Port, "8080")));
        let settings = cli.settings();
        assert_eq!(settings.mode, Mode::Text(View::Short));
        assert_eq!(settings.expand, Expand::Children);
    }

    #[test]
    fn test_json_wins_over_view() {
        let cli = parse(&["--pid", "1", "--json", "--tree"]);
        assert_eq!(cli.settings().mode, Mode::Json);
    }

    #[test]
    fn test_text_views() {
        assert_eq!(parse(&["nginx", "--env"]).settings().mode, Mode::Text(View::Env));
        assert_eq!(parse(&["nginx", "--tree"]).settings().mode, Mode::Text(View::Tree));
        assert_eq!(Mode::default(), Mode::Text(View::Card));
    }

    #[test]
    fn test_targets_conflict() {
        assert!(Cli::try_parse_from(["witr", "--pid", "1", "--port", "80"]).is_err());
        assert!(Cli::try_parse_from(["witr", "nginx", "--pid", "1"]).is_err());
    }

    #[test]
    fn test_views_conflict() {
        assert!(Cli::try_parse_from(["witr", "nginx", "--tree", "--short"]).is_err());
        assert!(Cli::try_parse_from(["witr", "nginx", "--children", "--descendants"]).is_err());
    }

    #[test]
    fn test_verbosity_counts() {
        assert_eq!(parse(&["-vv", "nginx"]).settings().verbosity, 2);
    }

    #[test]
    fn test_completions_subcommand() {
        let cli = parse(&["completions", "bash"]);
        assert!(matches!(cli.command, Some(Commands::Completions { .. })));
        assert!(cli.target().is_none());
    }
}
