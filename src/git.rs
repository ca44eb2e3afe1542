//! Git repository context for a process working directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitContext {
    /// Name of the directory holding `.git`.
    pub repo: String,
    /// Checked-out branch, or an abbreviated commit on a detached HEAD.
    pub branch: Option<String>,
}

/// Find the repository enclosing `cwd`, walking up to the filesystem root.
///
/// Daemons usually chdir to `/`; system directories are never searched.
pub fn detect(cwd: &str) -> Option<GitContext> {
    if cwd.is_empty() || cwd == "/" || cwd.starts_with("/usr") || cwd.starts_with("/var/run") {
        return None;
    }

    let mut dir = PathBuf::from(cwd);
    loop {
        let dot_git = dir.join(".git");
        if let Some(git_dir) = resolve_git_dir(&dot_git) {
            let repo = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.to_string_lossy().into_owned());
            let branch = fs::read_to_string(git_dir.join("HEAD"))
                .ok()
                .and_then(|head| branch_from_head(&head));
            return Some(GitContext { repo, branch });
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// `.git` is a directory in a normal checkout and a `gitdir:` file in a
/// worktree or submodule.
fn resolve_git_dir(dot_git: &Path) -> Option<PathBuf> {
    if dot_git.is_dir() {
        return Some(dot_git.to_path_buf());
    }
    let pointer = fs::read_to_string(dot_git).ok()?;
    let target = pointer.trim().strip_prefix("gitdir:")?.trim();
    let target = Path::new(target);
    Some(if target.is_absolute() {
        target.to_path_buf()
    } else {
        dot_git.parent()?.join(target)
    })
}

fn branch_from_head(head: &str) -> Option<String> {
    let head = head.trim();
    if head.is_empty() {
        return None;
    }
    match head.strip_prefix("ref:") {
        Some(reference) => {
            let reference = reference.trim();
            Some(
                reference
                    .strip_prefix("refs/heads/")
                    .unwrap_or(reference)
                    .to_string(),
            )
        }
        None => Some(head.chars().take(8).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_with_head(head: &str) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let git = tmp.path().join("shop-api").join(".git");
        fs::create_dir_all(&git).unwrap();
        fs::write(git.join("HEAD"), head).unwrap();
        tmp
    }

    #[test]
    fn test_branch_from_nested_dir() {
        let tmp = repo_with_head("ref: refs/heads/main\n");
        let nested = tmp.path().join("shop-api").join("src").join("bin");
        fs::create_dir_all(&nested).unwrap();

        let ctx = detect(nested.to_str().unwrap()).unwrap();
        assert_eq!(ctx.repo, "shop-api");
        assert_eq!(ctx.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_branch_with_slashes() {
        let tmp = repo_with_head("ref: refs/heads/feature/login\n");
        let ctx = detect(tmp.path().join("shop-api").to_str().unwrap()).unwrap();
        assert_eq!(ctx.branch.as_deref(), Some("feature/login"));
    }

    #[test]
    fn test_detached_head_short_hash() {
        let tmp = repo_with_head("9fceb02d0ae598e95dc970b74767f19372d61af8\n");
        let ctx = detect(tmp.path().join("shop-api").to_str().unwrap()).unwrap();
        assert_eq!(ctx.branch.as_deref(), Some("9fceb02d"));
    }

    #[test]
    fn test_worktree_pointer_file() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("store");
        fs::create_dir_all(&real).unwrap();
        fs::write(real.join("HEAD"), "ref: refs/heads/hotfix\n").unwrap();

        let checkout = tmp.path().join("wt");
        fs::create_dir_all(&checkout).unwrap();
        fs::write(checkout.join(".git"), format!("gitdir: {}\n", real.display())).unwrap();

        let ctx = detect(checkout.to_str().unwrap()).unwrap();
        assert_eq!(ctx.repo, "wt");
        assert_eq!(ctx.branch.as_deref(), Some("hotfix"));
    }

    #[test]
    fn test_system_dirs_skipped() {
        assert!(detect("/").is_none());
        assert!(detect("/usr/bin").is_none());
        assert!(detect("/var/run/myservice").is_none());
        assert!(detect("").is_none());
    }

    #[test]
    fn test_no_repo() {
        assert!(detect("/nonexistent_path_xyz_12345/deeper").is_none());
    }
}
