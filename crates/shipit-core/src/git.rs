//! Git integration for reading the trigger message from a checkout.

use std::path::Path;
use std::process::Command;

use crate::domain::error::{Result, ShipitError};

/// Full message of the HEAD commit, used as the trigger message.
///
/// Runs `git log -1 --format=%B` in the given directory. Trailing whitespace
/// is trimmed; an empty message is returned as-is (it simply carries no intent).
pub fn head_commit_message(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["log", "-1", "--format=%B"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| ShipitError::GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ShipitError::GitError(format!(
            "git log -1 failed: {}",
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
