//! Parsers for per-process `/proc` files and `/proc/stat`.

/// Fields of `/proc/<pid>/stat` the snapshot needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatLine {
    pub comm: String,
    pub ppid: u32,
    /// Clock ticks after boot at which the process started.
    pub start_ticks: u64,
}

/// Parse `/proc/<pid>/stat`.
///
/// Format: `pid (comm) state ppid ... starttime ...`. `comm` may contain
/// spaces and parentheses, so fields are counted from the last `)`.
pub fn parse_stat(content: &str) -> Option<StatLine> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let comm = content.get(open + 1..close)?.to_string();

    // After ") ": field 3 (state) is index 0, ppid index 1, starttime index 19.
    let fields: Vec<&str> = content.get(close + 1..)?.split_whitespace().collect();
    let ppid = fields.get(1)?.parse().ok()?;
    let start_ticks = fields.get(19)?.parse().ok()?;

    Some(StatLine {
        comm,
        ppid,
        start_ticks,
    })
}

/// Boot time in Unix seconds from the `btime` line of `/proc/stat`.
pub fn parse_btime(content: &str) -> Option<i64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime"))
        .and_then(|rest| rest.trim().parse().ok())
}

/// Real UID from the `Uid:` line of `/proc/<pid>/status`.
pub fn parse_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

/// Split a NUL separated file (`cmdline`, `environ`) into its entries.
pub fn split_nul(raw: &[u8]) -> Vec<String> {
    raw.split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}
