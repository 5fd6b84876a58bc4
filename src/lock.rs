//! One bisection session per checkout.
//!
//! The lock is a directory created atomically under a shared root; its
//! presence means a session owns the checkout's bisect state and working copy.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const OWNER_FILE: &str = "owner.json";

/// Who holds a lock, for the error message a second session sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub repo: PathBuf,
    pub acquired_at_epoch_ms: u128,
}

/// Held for the whole session; dropping it releases the lock.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    pub fn acquire(root: &Path, repo_dir: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("create lock root {}", root.display()))?;
        let path = root.join(lock_name(repo_dir));
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let holder = read_owner(&path)
                    .map(|owner| format!(" (held by pid {})", owner.pid))
                    .unwrap_or_default();
                return Err(anyhow!(
                    "another bisection session holds {}{holder}; remove it if that session is gone",
                    path.display()
                ));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("create lock {}", path.display()));
            }
        }
        let lock = Self { path };
        lock.write_owner(repo_dir)?;
        tracing::debug!(path = %lock.path.display(), "acquired session lock");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_owner(&self, repo_dir: &Path) -> Result<()> {
        let owner = LockOwner {
            pid: std::process::id(),
            repo: repo_dir.to_path_buf(),
            acquired_at_epoch_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("compute timestamp")?
                .as_millis(),
        };
        let text = serde_json::to_string_pretty(&owner).context("serialize lock owner")?;
        let path = self.path.join(OWNER_FILE);
        fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release session lock");
        } else {
            tracing::debug!(path = %self.path.display(), "released session lock");
        }
    }
}

/// `<root>/autobisect/locks`, under the platform's local data directory.
pub fn default_lock_root() -> Result<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .map(|base| base.join("autobisect").join("locks"))
        .ok_or_else(|| anyhow!("no local data or home directory; pass --lock-dir"))
}

/// Lock directory name for a checkout: its canonical path with separators
/// escaped, so checkouts sharing a basename get distinct locks.
fn lock_name(repo_dir: &Path) -> String {
    let canonical = repo_dir
        .canonicalize()
        .unwrap_or_else(|_| repo_dir.to_path_buf());
    let text = canonical.to_string_lossy();
    let mut name = String::with_capacity(text.len() + 5);
    for ch in text.trim_start_matches(['/', '\\']).chars() {
        match ch {
            '%' => name.push_str("%25"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            ':' => name.push_str("%3A"),
            other => name.push(other),
        }
    }
    if name.is_empty() {
        name.push_str("repo");
    }
    name.push_str("-lock");
    name
}

fn read_owner(path: &Path) -> Option<LockOwner> {
    let bytes = fs::read(path.join(OWNER_FILE)).ok()?;
    serde_json::from_slice(&bytes).ok()
}
