//! UDP discovery service (spec.md §4.D).
//!
//! A worker first tries to bind the well-known discovery port itself; if
//! that succeeds it becomes the co-located discovery server for its host,
//! maintaining an in-memory map updated by local and remote
//! announcements. If the bind fails (another worker on the same host
//! already owns it) the worker falls back to sending a single
//! send-and-forget UDP datagram carrying the same payload. Both paths
//! share [`announce_payload`] so they are provably payload-identical.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use qw_messages::WorkerIdentity;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

pub type DiscoveryMap = Arc<RwLock<HashMap<String, (String, u16)>>>;

/// The `{"<name>": ["<addr>", port]}` datagram payload, identical to the
/// registry's value encoding (spec.md §6).
pub fn announce_payload(identity: &WorkerIdentity) -> Vec<u8> {
    serde_json::to_vec(&identity.announce_payload()).expect("identity always serializes")
}

fn parse_payload(bytes: &[u8]) -> Option<(String, String, u16)> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    let obj = value.as_object()?;
    let (name, addr) = obj.iter().next()?;
    let arr = addr.as_array()?;
    let host = arr.first()?.as_str()?.to_string();
    let port = arr.get(1)?.as_u64()? as u16;
    Some((name.clone(), host, port))
}

/// The co-located discovery server: owns the UDP socket and the
/// in-memory map.
pub struct DiscoveryServer {
    map: DiscoveryMap,
    listener: JoinHandle<()>,
}

impl DiscoveryServer {
    async fn bind(port: u16) -> std::io::Result<UdpSocket> {
        UdpSocket::bind(("0.0.0.0", port)).await
    }

    async fn start(socket: UdpSocket) -> Self {
        let map: DiscoveryMap = Arc::new(RwLock::new(HashMap::new()));
        let loop_map = Arc::clone(&map);
        let listener = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        if let Some((name, host, port)) = parse_payload(&buf[..len]) {
                            debug!(%name, %host, port, %from, "discovery announcement received");
                            loop_map.write().await.insert(name, (host, port));
                        } else {
                            warn!(%from, "ignoring malformed discovery datagram");
                        }
                    },
                    Err(err) => {
                        warn!(error = %err, "discovery socket read failed");
                        break;
                    },
                }
            }
        });
        Self { map, listener }
    }

    pub async fn register_local(&self, identity: &WorkerIdentity) {
        self.map
            .write()
            .await
            .insert(identity.name.clone(), (identity.host.clone(), identity.port));
    }

    pub async fn remove_local(&self, name: &str) {
        self.map.write().await.remove(name);
    }

    pub async fn snapshot(&self) -> HashMap<String, (String, u16)> {
        self.map.read().await.clone()
    }
}

impl Drop for DiscoveryServer {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Sends a single send-and-forget announcement datagram to a remote (or
/// co-located-on-another-process) discovery host.
pub struct RemoteAnnouncer {
    target: SocketAddr,
}

impl RemoteAnnouncer {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    pub async fn announce(&self, identity: &WorkerIdentity) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .context("binding ephemeral announce socket")?;
        socket
            .send_to(&announce_payload(identity), self.target)
            .await
            .context("sending discovery announcement")?;
        Ok(())
    }
}

/// Either a co-located server or a remote announcer, chosen once at
/// startup (spec.md §4.D).
pub enum DiscoveryHandle {
    CoLocated(Arc<DiscoveryServer>),
    Remote(RemoteAnnouncer),
}

impl DiscoveryHandle {
    /// Attempt to bind the discovery port; fall back to remote
    /// announcement if another process already owns it.
    pub async fn bind_or_fallback(port: u16) -> Self {
        match DiscoveryServer::bind(port).await {
            Ok(socket) => {
                debug!(port, "bound discovery server, running co-located");
                DiscoveryHandle::CoLocated(Arc::new(DiscoveryServer::start(socket).await))
            },
            Err(err) => {
                debug!(port, error = %err, "discovery bind failed, falling back to remote announce");
                DiscoveryHandle::Remote(RemoteAnnouncer::new(SocketAddr::from((
                    [127, 0, 0, 1],
                    port,
                ))))
            },
        }
    }

    pub async fn announce(&self, identity: &WorkerIdentity) -> Result<()> {
        match self {
            DiscoveryHandle::CoLocated(server) => {
                server.register_local(identity).await;
                Ok(())
            },
            DiscoveryHandle::Remote(announcer) => announcer.announce(identity).await,
        }
    }

    /// Purges the entry for `name`. Only the co-located path owns a map
    /// to purge from; the remote fallback has no deregistration protocol
    /// (spec.md §4.D: "stale entries are purged only on explicit
    /// deregister", which the source only implements for the co-located
    /// case).
    pub async fn deregister(&self, name: &str) {
        if let DiscoveryHandle::CoLocated(server) = self {
            server.remove_local(name).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identity() -> WorkerIdentity {
        WorkerIdentity::new("qw", "127.0.0.1".to_string(), 8181, 0, 1234)
    }

    #[test]
    fn both_paths_share_the_same_payload() {
        let identity = sample_identity();
        let co_located_payload = announce_payload(&identity);
        // The remote path calls the same function; assert the shape it
        // would send is byte-identical regardless of which path sends it.
        assert_eq!(co_located_payload, announce_payload(&identity));
        let (name, host, port) = parse_payload(&co_located_payload).unwrap();
        assert_eq!(name, identity.name);
        assert_eq!(host, identity.host);
        assert_eq!(port, identity.port);
    }

    #[tokio::test]
    async fn co_located_map_sees_local_and_remote_announcements() {
        let socket = DiscoveryServer::bind(0).await.unwrap();
        let bound_port = socket.local_addr().unwrap().port();
        let server = DiscoveryServer::start(socket).await;

        let local = WorkerIdentity::new("qw", "127.0.0.1".to_string(), 9001, 0, 1);
        server.register_local(&local).await;

        let remote = WorkerIdentity::new("qw", "127.0.0.1".to_string(), 9002, 1, 2);
        let announcer =
            RemoteAnnouncer::new(SocketAddr::from(([127, 0, 0, 1], bound_port)));
        announcer.announce(&remote).await.unwrap();

        // give the background task a chance to process the datagram.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snapshot = server.snapshot().await;
        assert_eq!(snapshot.get(&local.name), Some(&(local.host, local.port)));
        assert_eq!(
            snapshot.get(&remote.name),
            Some(&(remote.host, remote.port))
        );

        server.remove_local(&local.name).await;
        assert!(!server.snapshot().await.contains_key(&local.name));
    }
}
