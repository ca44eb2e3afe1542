//! Everything known about one resolved process, assembled for rendering.

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use crate::ancestry::{self, HealthWarning};
use crate::error::{PlatformError, PlatformResult};
use crate::platform::{Lookups, Platform};
use crate::tree;
use crate::types::{AncestryChain, Process, ProcessTree, Source, Target};

/// How much of the process tree below the target to include.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expand {
    #[default]
    None,
    Children,
    Descendants,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub target: Target,
    pub process: Process,
    /// Outermost ancestor first, the process itself last.
    pub ancestry: AncestryChain,
    pub source: Source,
    pub warnings: Vec<HealthWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Process>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descendants: Option<ProcessTree>,
}

impl Report {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Ancestors only, without the process itself.
    pub fn ancestors(&self) -> &[Process] {
        &self.ancestry[..self.ancestry.len().saturating_sub(1)]
    }
}

/// Walk, classify and inspect `pid`.
///
/// Fails only when `pid` itself cannot be read. Children and descendants
/// are best effort: a failed process-table scan leaves them empty.
pub fn build(
    platform: &dyn Platform,
    target: &Target,
    pid: u32,
    expand: Expand,
    now: DateTime<Local>,
) -> PlatformResult<Report> {
    let ancestry = ancestry::walk(platform, pid);
    let Some(process) = ancestry.last().cloned() else {
        return Err(PlatformError::ProcessNotFound { pid });
    };

    let source = ancestry::classify(&ancestry, platform.os(), &Lookups(platform));
    let warnings = ancestry::detect_warnings(&process, now);
    debug!(
        pid,
        depth = ancestry.len(),
        source = %source.source_type,
        warnings = warnings.len(),
        "report assembled"
    );

    let (children, descendants) = match expand {
        Expand::None => (None, None),
        Expand::Children => {
            let kids = tree::build_children(platform, pid).unwrap_or_else(|e| {
                debug!(pid, error = %e, "children unavailable");
                Vec::new()
            });
            (Some(kids), None)
        }
        Expand::Descendants => {
            let descendants = tree::build_descendants(platform, &process).unwrap_or_else(|e| {
                debug!(pid, error = %e, "descendants unavailable");
                ProcessTree::leaf(process.clone())
            });
            (None, Some(descendants))
        }
    };

    Ok(Report {
        target: target.clone(),
        process,
        ancestry,
        source,
        warnings,
        children,
        descendants,
    })
}
