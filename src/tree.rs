//! Children and descendant trees built from one process snapshot.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::PlatformResult;
use crate::platform::Platform;
use crate::types::{Process, ProcessTree};

/// Map each PID to its direct children, each group sorted by PID.
///
/// Self-parented entries are roots and never their own child.
pub fn children_index(processes: &[Process]) -> HashMap<u32, Vec<&Process>> {
    let mut index: HashMap<u32, Vec<&Process>> = HashMap::new();
    for process in processes {
        if let Some(ppid) = process.parent() {
            index.entry(ppid).or_default().push(process);
        }
    }
    for children in index.values_mut() {
        children.sort_by_key(|p| p.pid);
    }
    index
}

/// Direct children of `pid` in `processes`, ascending PID.
pub fn children_of(processes: &[Process], pid: u32) -> Vec<Process> {
    children_index(processes)
        .remove(&pid)
        .unwrap_or_default()
        .into_iter()
        .cloned()
        .collect()
}

/// Descendant tree of `root` over `processes`.
///
/// Expansion keeps a visited set: a PID met a second time (only possible
/// with corrupt parent links) becomes a childless leaf.
pub fn build_tree(processes: &[Process], root: &Process) -> ProcessTree {
    let index = children_index(processes);
    let mut visited = HashSet::new();
    expand(root, &index, &mut visited)
}

fn expand(
    process: &Process,
    index: &HashMap<u32, Vec<&Process>>,
    visited: &mut HashSet<u32>,
) -> ProcessTree {
    if !visited.insert(process.pid) {
        debug!(pid = process.pid, "process revisited while building tree");
        return ProcessTree::leaf(process.clone());
    }

    let children = index
        .get(&process.pid)
        .map(|kids| kids.iter().map(|c| expand(c, index, visited)).collect())
        .unwrap_or_default();

    ProcessTree {
        process: process.clone(),
        children,
    }
}

/// Live direct children of `pid`.
pub fn build_children(platform: &dyn Platform, pid: u32) -> PlatformResult<Vec<Process>> {
    let processes = platform.list_processes()?;
    Ok(children_of(&processes, pid))
}

/// Live descendant tree of `root`.
pub fn build_descendants(platform: &dyn Platform, root: &Process) -> PlatformResult<ProcessTree> {
    let processes = platform.list_processes()?;
    Ok(build_tree(&processes, root))
}
