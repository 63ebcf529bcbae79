//! End-to-end handshake and mesh-join test between two full `GossipNode`
//! instances talking over real TCP sockets on loopback.

use std::time::Duration;

use tokio::net::TcpStream;

use nova_protocol::codec::{self, Message};
use nova_protocol::network::GossipNode;
use nova_protocol::Settings;

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn settings_toml(p2p_port: u16, api_port: u16, known_peer_port: Option<u16>) -> String {
    let known = known_peer_port
        .map(|p| format!("[\"127.0.0.1:{p}\"]"))
        .unwrap_or_else(|| "[]".to_string());
    format!(
        r#"
        cache_size = 8
        degree = 2
        min_connections = 1
        max_connections = 4
        search_cooldown = 3600
        challenge_cooldown = 1
        bootstrapper = "127.0.0.1:{p2p_port}"
        p2p_address = "127.0.0.1:{p2p_port}"
        api_address = "127.0.0.1:{api_port}"
        known_peers = {known}
        "#
    )
}

async fn wait_until<F>(mut condition: F, timeout: Duration)
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within timeout");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn two_nodes_handshake_and_join_mesh() {
    let a_p2p = free_port().await;
    let a_api = free_port().await;
    let b_p2p = free_port().await;
    let b_api = free_port().await;

    let node_a = GossipNode::new(Settings::from_toml_str(&settings_toml(a_p2p, a_api, None)).unwrap());
    let node_b = GossipNode::new(Settings::from_toml_str(&settings_toml(b_p2p, b_api, Some(a_p2p))).unwrap());

    let run_a = node_a.clone();
    tokio::spawn(async move {
        let _ = run_a.run().await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let run_b = node_b.clone();
    tokio::spawn(async move {
        let _ = run_b.run().await;
    });

    let check_a = node_a.clone();
    wait_until(
        move || {
            let check_a = check_a.clone();
            Box::pin(async move {
                let (_, _, ps) = check_a.mesh.peer_counts().await;
                ps == 1
            })
        },
        Duration::from_secs(30),
    )
    .await;

    let (a_u, a_pu, a_ps) = node_a.mesh.peer_counts().await;
    let (_, b_pu, b_ps) = node_b.mesh.peer_counts().await;

    assert_eq!(a_ps, 1, "node A should have validated node B into its push set");
    assert_eq!(a_pu, 0, "node A made no outbound connections");
    assert_eq!(a_u, 0, "node A's unverified entry should graduate to push");
    assert_eq!(b_pu, 1, "node B should have node A in its pull set");
    assert_eq!(b_ps, 0, "node B accepted no inbound connections");

    // A handshaked peer must be fully validated in both directions, or the
    // dissemination engine has no fan-out targets and discovery never fires.
    let a_targets = node_a.mesh.sample_validated_peers(1, None).await;
    assert_eq!(a_targets.len(), 1, "node A's push peer should be fully validated");
    let b_targets = node_b.mesh.sample_validated_peers(1, None).await;
    assert_eq!(b_targets.len(), 1, "node B's pull peer should be fully validated");

    // A subscriber on node B, connected through the public API socket, must
    // actually receive an announcement node A originates and forwards to it.
    let data_type: u16 = 42;
    let mut b_api_conn = TcpStream::connect(
        node_b.mesh.settings().api_address.to_socket_addr().unwrap(),
    )
    .await
    .unwrap();
    let notify = Message::GossipNotify { data_type }.encode();
    tokio::io::AsyncWriteExt::write_all(&mut b_api_conn, &notify).await.unwrap();

    let mut a_api_conn = TcpStream::connect(
        node_a.mesh.settings().api_address.to_socket_addr().unwrap(),
    )
    .await
    .unwrap();
    let announce = Message::GossipAnnounce {
        ttl: 4,
        data_type,
        payload: b"hello".to_vec(),
    }
    .encode();
    tokio::io::AsyncWriteExt::write_all(&mut a_api_conn, &announce).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(10), codec::read_frame(&mut b_api_conn))
        .await
        .expect("timed out waiting for forwarded announcement")
        .unwrap();
    let received = Message::parse(&frame).unwrap();
    match received {
        Message::GossipNotification { data_type: dt, payload, .. } => {
            assert_eq!(dt, data_type);
            assert_eq!(payload, b"hello");
        }
        other => panic!("expected a GossipNotification, got {other:?}"),
    }
}
