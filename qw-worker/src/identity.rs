//! Worker identity construction (spec.md §3). The listener binds to the
//! configured host (often `0.0.0.0`), but the registry/discovery
//! announcement needs a routable address other processes can dial, so we
//! resolve one the same way the original `spawn_process` does via
//! `socket.gethostbyname(socket.gethostname())` — here, by asking the OS
//! which local address it would use to reach the outside world.

use std::net::UdpSocket;

use qw_messages::WorkerIdentity;

pub fn resolve_announce_host(configured_host: &str) -> String {
    if configured_host != "0.0.0.0" && configured_host != "::" {
        return configured_host.to_string();
    }
    local_ip().unwrap_or_else(|| "127.0.0.1".to_string())
}

fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

pub fn build_identity(
    base: &str,
    announce_host: String,
    port: u16,
    worker_id: u32,
) -> WorkerIdentity {
    WorkerIdentity::new(base, announce_host, port, worker_id, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_explicit_host() {
        assert_eq!(resolve_announce_host("10.1.2.3"), "10.1.2.3");
    }

    #[test]
    fn identity_name_matches_spec_format() {
        let identity = build_identity("qw", "127.0.0.1".to_string(), 8181, 3);
        assert_eq!(identity.name, "qw-8181_3");
    }
}
