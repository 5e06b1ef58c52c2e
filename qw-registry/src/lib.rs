//! Shared key/list registry client (spec.md §4.C).
//!
//! A thin wrapper over `redis`'s async connection manager, grounded on the
//! same crate other production Rust task-queue services in the corpus use
//! for their worker registries. Failures are logged and returned as an
//! `anyhow::Result`; per spec.md they are never fatal to the calling
//! worker — the caller decides whether to continue serving.

use anyhow::Context;
use anyhow::Result;
use qw_messages::WorkerIdentity;
use redis::AsyncCommands;
use tracing::warn;

pub const DEFAULT_WORKER_LIST_KEY: &str = "QW_WORKER_LIST";

/// Registry client keyed by a fixed, configurable list name.
pub struct RegistryClient {
    manager: redis::aio::ConnectionManager,
    list_key: String,
}

impl RegistryClient {
    pub async fn connect(url: &str, list_key: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid registry URL")?;
        let manager = client
            .get_connection_manager()
            .await
            .context("connecting to registry")?;
        Ok(Self {
            manager,
            list_key: list_key.into(),
        })
    }

    /// `LPUSH` the worker's `{"<name>": ["<addr>", port]}` encoding onto
    /// the list. Logged and swallowed on failure.
    pub async fn push(&self, identity: &WorkerIdentity) -> Result<()> {
        let value = serde_json::to_string(&identity.announce_payload())
            .context("encoding registry value")?;
        let mut manager = self.manager.clone();
        let result: Result<i64, redis::RedisError> =
            manager.lpush(&self.list_key, &value).await;
        if let Err(err) = &result {
            warn!(error = %err, worker = %identity.name, "failed to push worker into registry");
        }
        result.map(|_| ()).context("registry push failed")
    }

    /// Remove exactly one occurrence of this worker's entry (`LREM count=1`).
    pub async fn remove(&self, identity: &WorkerIdentity) -> Result<()> {
        let value = serde_json::to_string(&identity.announce_payload())
            .context("encoding registry value")?;
        let mut manager = self.manager.clone();
        let result: Result<i64, redis::RedisError> =
            manager.lrem(&self.list_key, 1, &value).await;
        if let Err(err) = &result {
            warn!(error = %err, worker = %identity.name, "failed to remove worker from registry");
        }
        result.map(|_| ()).context("registry remove failed")
    }

    /// Current registry snapshot, parsed back into `(name, host, port)`
    /// triples.
    pub async fn list(&self) -> Result<Vec<(String, String, u16)>> {
        let mut manager = self.manager.clone();
        let raw: Vec<String> = manager
            .lrange(&self.list_key, 0, -1)
            .await
            .context("listing registry")?;

        let mut workers = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str::<serde_json::Value>(&entry) {
                Ok(serde_json::Value::Object(obj)) => {
                    for (name, addr) in obj {
                        if let Some((host, port)) = parse_addr(&addr) {
                            workers.push((name, host, port));
                        }
                    }
                },
                Ok(_) | Err(_) => {
                    warn!(entry = %entry, "ignoring malformed registry entry");
                },
            }
        }
        Ok(workers)
    }

    /// Delete the whole list key (teardown).
    pub async fn clear(&self) -> Result<()> {
        let mut manager = self.manager.clone();
        let result: Result<i64, redis::RedisError> = manager.del(&self.list_key).await;
        if let Err(err) = &result {
            warn!(error = %err, "failed to delete registry key");
        }
        result.map(|_| ()).context("registry clear failed")
    }
}

fn parse_addr(value: &serde_json::Value) -> Option<(String, u16)> {
    let arr = value.as_array()?;
    let host = arr.first()?.as_str()?.to_string();
    let port = arr.get(1)?.as_u64()? as u16;
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_addr_shape() {
        let value = serde_json::json!(["127.0.0.1", 8181]);
        assert_eq!(
            parse_addr(&value),
            Some(("127.0.0.1".to_string(), 8181))
        );
    }

    #[test]
    fn rejects_malformed_addr() {
        let value = serde_json::json!("not-an-array");
        assert_eq!(parse_addr(&value), None);
    }
}
