//! Top-level node: wires the mesh controller and dissemination engine
//! together and owns both listening sockets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::network::api_connection;
use crate::network::dissemination::Dissemination;
use crate::network::mesh::Mesh;
use crate::network::subscribers::ApiId;
use crate::settings::Settings;

pub struct GossipNode {
    pub mesh: Arc<Mesh>,
    pub dissemination: Arc<Dissemination>,
    shutdown: watch::Sender<bool>,
    next_api_id: AtomicU64,
}

impl GossipNode {
    pub fn new(settings: Settings) -> Arc<Self> {
        let (shutdown, _rx) = watch::channel(false);
        let mesh = Mesh::new(settings, shutdown.clone());
        let dissemination = Dissemination::new(Arc::downgrade(&mesh), mesh.settings().cache_size, mesh.settings().degree);
        mesh.bind_dissemination(Arc::downgrade(&dissemination));
        Arc::new(Self {
            mesh,
            dissemination,
            shutdown,
            next_api_id: AtomicU64::new(1),
        })
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn next_api_id(&self) -> ApiId {
        self.next_api_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs the startup sequence, then the API listener's accept loop,
    /// until cooperative shutdown is requested. The peer listener runs as
    /// an independent task alongside it.
    pub async fn run(self: &Arc<Self>) -> std::io::Result<()> {
        self.mesh.startup().await;

        let api_sock = self
            .mesh
            .settings()
            .api_address
            .to_socket_addr()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad api_address"))?;
        let api_listener = TcpListener::bind(api_sock).await?;
        info!(%api_sock, "api listener bound");

        let peer_node = Arc::clone(self);
        let peer_shutdown = self.shutdown.subscribe();
        let peer_listener_task = tokio::spawn(async move { peer_node.mesh.run_peer_listener(peer_shutdown).await });

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = api_listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let id = self.next_api_id();
                    api_connection::spawn(id, stream, Arc::downgrade(&self.dissemination));
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        let _ = peer_listener_task.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn test_settings(p2p_port: u16, api_port: u16) -> Settings {
        Settings::from_toml_str(&format!(
            r#"
            cache_size = 8
            degree = 2
            min_connections = 0
            max_connections = 4
            search_cooldown = 3600
            challenge_cooldown = 3600
            bootstrapper = "127.0.0.1:{p2p_port}"
            p2p_address = "127.0.0.1:{p2p_port}"
            api_address = "127.0.0.1:{api_port}"
            known_peers = []
            "#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn node_constructs_with_empty_peer_sets() {
        let node = GossipNode::new(test_settings(0, 0));
        let (u, pu, ps) = node.mesh.peer_counts().await;
        assert_eq!((u, pu, ps), (0, 0, 0));
    }
}
