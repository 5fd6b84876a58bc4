//! Shared test infrastructure for integration tests.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Result of one `autobisect` invocation.
#[derive(Debug)]
pub struct RunResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn assert_failed_with(&self, needle: &str) {
        assert_ne!(self.code, Some(0), "expected failure, stderr:\n{}", self.stderr);
        assert!(
            self.stderr.contains(needle),
            "expected {needle:?} in stderr:\n{}",
            self.stderr
        );
    }
}

/// Scratch checkout, lock root, and an empty PATH so no real `hg` is found.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        std::fs::create_dir(dir.path().join("repo"))?;
        std::fs::create_dir(dir.path().join("bin"))?;
        Ok(Self { dir })
    }

    pub fn repo(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    pub fn lock_root(&self) -> PathBuf {
        self.dir.path().join("locks")
    }

    /// Lock directory the binary derives from the checkout's canonical path.
    pub fn lock_path(&self) -> PathBuf {
        let repo = self.repo().canonicalize().unwrap_or_else(|_| self.repo());
        let mut name = String::new();
        for ch in repo.to_string_lossy().trim_start_matches(['/', '\\']).chars() {
            match ch {
                '%' => name.push_str("%25"),
                '/' => name.push_str("%2F"),
                '\\' => name.push_str("%5C"),
                ':' => name.push_str("%3A"),
                other => name.push(other),
            }
        }
        self.lock_root().join(format!("{name}-lock"))
    }

    pub fn write(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Run with the checkout, lock root and a build command filled in.
    pub fn run(&self, args: &[&str]) -> anyhow::Result<RunResult> {
        let output = Command::new(env!("CARGO_BIN_EXE_autobisect"))
            .arg("-R")
            .arg(self.repo())
            .arg("--lock-dir")
            .arg(self.lock_root())
            .args(["--build-cmd", "make", "--artifact", "js"])
            .args(args)
            .env("PATH", self.dir.path().join("bin"))
            .env("RUST_LOG", "info")
            .current_dir(self.dir.path())
            .output()?;
        Ok(RunResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub fn path_arg(path: &Path) -> String {
    path.display().to_string()
}
