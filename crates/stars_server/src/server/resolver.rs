//! Peer host resolution and admission.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::connection::PeerHost;
use crate::resources::ResourceLoader;
use crate::security::peer_admitted;

/// Resolves the hostname of `addr` off the async runtime.
///
/// Falls back to the IP text when resolution is disabled or fails, so the
/// result can always be checked against host lists.
pub async fn resolve_peer(addr: SocketAddr, resolve_hostnames: bool) -> PeerHost {
    if !resolve_hostnames {
        return PeerHost::from_ip(&addr);
    }

    let ip = addr.ip();
    match tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip)).await {
        Ok(Ok(hostname)) => {
            debug!("🔎 {} resolved to {}", ip, hostname);
            PeerHost::new(hostname, ip.to_string())
        }
        Ok(Err(e)) => {
            debug!("🔎 No hostname for {}: {}", ip, e);
            PeerHost::from_ip(&addr)
        }
        Err(e) => {
            warn!("⚠️ Hostname lookup task for {} failed: {}", ip, e);
            PeerHost::from_ip(&addr)
        }
    }
}

/// Checks `peer` against the global host list on the blocking pool.
///
/// A failed check task refuses the peer.
pub async fn screen_peer(resources: Arc<dyn ResourceLoader>, peer: &PeerHost) -> bool {
    let candidate = peer.clone();
    match tokio::task::spawn_blocking(move || peer_admitted(resources.as_ref(), &candidate)).await {
        Ok(admitted) => admitted,
        Err(e) => {
            warn!("⚠️ Host check task for {} failed: {}", peer.hostname, e);
            false
        }
    }
}
