//! Socket ownership through `/proc/<pid>/fd`.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use tracing::trace;

/// Inodes of every socket `pid` holds open.
///
/// Fails if the fd directory is unreadable (process gone, or not ours).
pub fn socket_inodes(pid: u32) -> io::Result<Vec<u64>> {
    let fd_dir = fs::read_dir(format!("/proc/{}/fd", pid))?;

    Ok(fd_dir
        .flatten()
        .filter_map(|entry| fs::read_link(entry.path()).ok())
        .filter_map(|target| parse_socket_link(&target))
        .collect())
}

/// PIDs holding at least one of `inodes`, ascending.
///
/// Processes whose descriptors we may not read are skipped silently.
pub fn owners_of(pids: &[u32], inodes: &HashSet<u64>) -> Vec<u32> {
    let mut owners: Vec<u32> = pids
        .iter()
        .copied()
        .filter(|&pid| match socket_inodes(pid) {
            Ok(held) => held.iter().any(|inode| inodes.contains(inode)),
            Err(e) => {
                trace!(pid, error = %e, "fd table unreadable");
                false
            }
        })
        .collect();
    owners.sort_unstable();
    owners
}

/// Inode out of a `socket:[N]` link target.
pub fn parse_socket_link(path: &Path) -> Option<u64> {
    path.to_str()?
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}
