//! FD soft-limit bump (spec.md §6.5), replacing the original's
//! `resource.setrlimit` with the `rlimit` crate. Never fatal: a failure
//! is logged and the worker keeps starting, mirroring the original's
//! `except (ValueError, AttributeError)` swallow.

use rlimit::Resource;
use tracing::warn;

pub fn raise_nofile(min: u64) -> anyhow::Result<(u64, u64)> {
    let (soft, hard) = Resource::NOFILE.get()?;
    let new_soft = soft.max(min);
    let new_hard = hard.max(new_soft);
    if let Err(err) = Resource::NOFILE.set(new_soft, new_hard) {
        warn!(error = %err, "failed to raise NOFILE soft limit, continuing with existing limits");
        return Ok((soft, hard));
    }
    Ok((new_soft, new_hard))
}
