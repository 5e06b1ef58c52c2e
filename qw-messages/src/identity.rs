use serde_derive::Deserialize;
use serde_derive::Serialize;

/// A worker's stable identity for the lifetime of the process (spec.md
/// §3 "Worker identity").
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerIdentity {
    /// `"<base>-<port>_<index>"`.
    pub name: String,
    pub worker_id: u32,
    pub host: String,
    pub port: u16,
    pub pid: u32,
}

impl WorkerIdentity {
    pub fn new(base: &str, host: String, port: u16, worker_id: u32, pid: u32) -> Self {
        Self {
            name: format!("{base}-{port}_{worker_id}"),
            worker_id,
            host,
            port,
            pid,
        }
    }

    /// The `{"<name>": ["<addr>", port]}` JSON payload shared verbatim by
    /// the registry value encoding and the discovery announce datagram
    /// (spec.md §6).
    pub fn announce_payload(&self) -> serde_json::Value {
        serde_json::json!({ self.name.clone(): [self.host.clone(), self.port] })
    }
}
