//! Process supervisor (spec.md §9 "Global mutable JOB_LIST" redesign
//! note). The source spawns `args.workers` OS processes into a module-
//! level `JOB_LIST = []` and never reaps them. Here a [`Supervisor`]
//! owns the `Vec<Child>` itself: each child is the same binary re-exec'd
//! with [`crate::cli::WORKER_INDEX_ENV_VAR`] set to its index, and
//! `shutdown` sends a kill + wait to every child instead of leaking them.

use std::process::Child;
use std::process::Command;

use tracing::info;
use tracing::warn;

pub struct Supervisor {
    children: Vec<Child>,
}

impl Supervisor {
    /// Re-execs the current binary `count` times, passing through argv
    /// and setting the worker-index env var on each child. The
    /// supervisor itself never serves; it only manages the children.
    pub fn spawn(count: u32) -> anyhow::Result<Self> {
        let exe = std::env::current_exe()?;
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut children = Vec::with_capacity(count as usize);
        for index in 0..count {
            let child = Command::new(&exe)
                .args(&args)
                .env(crate::cli::WORKER_INDEX_ENV_VAR, index.to_string())
                .spawn()?;
            info!(index, pid = child.id(), "spawned worker child process");
            children.push(child);
        }
        Ok(Self { children })
    }

    /// Sends a termination request to every child and waits for exit,
    /// logging but not failing on individual reap errors.
    pub fn shutdown(&mut self) {
        for child in &mut self.children {
            if let Err(err) = child.kill() {
                warn!(pid = child.id(), error = %err, "failed to kill worker child");
            }
            if let Err(err) = child.wait() {
                warn!(pid = child.id(), error = %err, "failed to reap worker child");
            }
        }
        self.children.clear();
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
