//! Dissemination engine: message IDs, the seen-ID cache, subscriber
//! fan-out, and the pending-validation hold-queue that gates forwarding on
//! subscriber acknowledgement.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use rand::Rng;
use tokio::sync::Mutex;
use tracing::info;

use crate::boundedset::BoundedSet;
use crate::codec::Message;
use crate::network::mesh::{Mesh, PeerId};
use crate::network::subscribers::{ApiHandle, ApiId, SubscriberRegistry};

/// An announcement delivered to local subscribers but not yet forwarded to
/// peers; lives until every awaiting subscriber acks positively (forward)
/// or any acks negatively (drop).
struct PendingEntry {
    ttl: u8,
    data_type: u16,
    payload: Vec<u8>,
    origin: Option<PeerId>,
    awaiting: HashSet<ApiId>,
}

#[derive(Default)]
pub struct DisseminationCounters {
    pub forwarded: AtomicU64,
    pub dropped_duplicate: AtomicU64,
    pub dropped_no_subscriber: AtomicU64,
    pub dropped_negative_validation: AtomicU64,
}

pub struct Dissemination {
    mesh: Weak<Mesh>,
    degree: usize,
    seen: Mutex<BoundedSet<u64>>,
    pending: Mutex<HashMap<u64, PendingEntry>>,
    // The wire format truncates message ids to u16 in GOSSIP_NOTIFICATION
    // and GOSSIP_VALIDATION bodies, while the peer protocol and the
    // seen-ID cache use the full 64-bit id; this maps a truncated id back
    // to the pending entry's real key. A collision between two
    // simultaneously-pending low-16-bits is possible but vanishingly
    // unlikely given the cache sizes this runs at.
    wire_to_full: Mutex<HashMap<u16, u64>>,
    subscribers: Mutex<SubscriberRegistry>,
    pub counters: DisseminationCounters,
}

impl Dissemination {
    pub fn new(mesh: Weak<Mesh>, cache_size: usize, degree: usize) -> Arc<Self> {
        Arc::new(Self {
            mesh,
            degree,
            seen: Mutex::new(BoundedSet::new(cache_size)),
            pending: Mutex::new(HashMap::new()),
            wire_to_full: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(SubscriberRegistry::new()),
            counters: DisseminationCounters::default(),
        })
    }

    pub async fn add_subscriber(&self, data_type: u16, api: ApiHandle) {
        self.subscribers.lock().await.add(data_type, api);
    }

    pub async fn remove_subscriber(&self, api_id: ApiId) {
        self.subscribers.lock().await.remove(api_id);
        let mut pending = self.pending.lock().await;
        for entry in pending.values_mut() {
            entry.awaiting.remove(&api_id);
        }
    }

    /// Local origination (GOSSIP_ANNOUNCE from a subscriber). Generates a
    /// fresh message id, inserts it into the seen cache, and fans out a
    /// PEER_ANNOUNCE to up to `degree` fully validated peers.
    pub async fn local_originate(&self, ttl: u8, data_type: u16, payload: Vec<u8>) {
        let Some(mesh) = self.mesh.upgrade() else { return };

        let msg_id = {
            let mut seen = self.seen.lock().await;
            loop {
                let candidate: u64 = rand::thread_rng().gen();
                if !seen.contains(&candidate) {
                    seen.put(candidate);
                    break candidate;
                }
            }
        };

        let targets = mesh.sample_validated_peers(self.degree, None).await;
        for (_, handle) in &targets {
            handle.send(Message::PeerAnnounce {
                msg_id,
                ttl,
                data_type,
                payload: payload.clone(),
            });
        }
        self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
        info!(msg_id, ttl, data_type, peer_count = targets.len(), "local announcement originated");
    }

    pub async fn add_notify(&self, data_type: u16, api: ApiHandle) {
        self.add_subscriber(data_type, api).await;
    }

    /// Remote receipt (PEER_ANNOUNCE from peer `origin`).
    pub async fn handle_remote_announce(&self, origin: PeerId, msg_id: u64, ttl: u8, data_type: u16, payload: Vec<u8>) {
        {
            let mut seen = self.seen.lock().await;
            if seen.contains(&msg_id) {
                self.counters.dropped_duplicate.fetch_add(1, Ordering::Relaxed);
                return;
            }
            seen.put(msg_id);
        }

        if ttl == 1 {
            self.deliver_only(msg_id, data_type, &payload).await;
            return;
        }

        let new_ttl = if ttl == 0 { 0 } else { ttl - 1 };
        let subs = {
            let reg = self.subscribers.lock().await;
            reg.subscribers_for(data_type)
        };
        if subs.is_empty() {
            self.counters.dropped_no_subscriber.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let awaiting: HashSet<ApiId> = subs.iter().map(|h| h.id).collect();
        let wire_id = (msg_id & 0xffff) as u16;
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                msg_id,
                PendingEntry {
                    ttl: new_ttl,
                    data_type,
                    payload: payload.clone(),
                    origin: Some(origin),
                    awaiting,
                },
            );
            self.wire_to_full.lock().await.insert(wire_id, msg_id);
        }
        for h in &subs {
            h.send(Message::GossipNotification {
                msg_id: wire_id,
                data_type,
                payload: payload.clone(),
            });
        }
    }

    async fn deliver_only(&self, msg_id: u64, data_type: u16, payload: &[u8]) {
        let subs = {
            let reg = self.subscribers.lock().await;
            reg.subscribers_for(data_type)
        };
        let wire_id = (msg_id & 0xffff) as u16;
        for h in &subs {
            h.send(Message::GossipNotification {
                msg_id: wire_id,
                data_type,
                payload: payload.to_vec(),
            });
        }
    }

    /// Subscriber validation (GOSSIP_VALIDATION).
    pub async fn handle_subscriber_validation(&self, api_id: ApiId, wire_msg_id: u16, valid: bool) {
        let Some(full_id) = self.wire_to_full.lock().await.get(&wire_msg_id).copied() else {
            return; // unknown msg_id: ignored silently
        };

        if !valid {
            self.pending.lock().await.remove(&full_id);
            self.wire_to_full.lock().await.remove(&wire_msg_id);
            self.counters.dropped_negative_validation.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let ready = {
            let mut pending = self.pending.lock().await;
            match pending.get_mut(&full_id) {
                Some(entry) => {
                    entry.awaiting.remove(&api_id);
                    entry.awaiting.is_empty()
                }
                None => return,
            }
        };
        if !ready {
            return;
        }

        let Some(entry) = self.pending.lock().await.remove(&full_id) else {
            return;
        };
        self.wire_to_full.lock().await.remove(&wire_msg_id);

        let Some(mesh) = self.mesh.upgrade() else { return };
        let targets = mesh.sample_validated_peers(self.degree, entry.origin).await;
        for (_, handle) in &targets {
            handle.send(Message::PeerAnnounce {
                msg_id: full_id,
                ttl: entry.ttl,
                data_type: entry.data_type,
                payload: entry.payload.clone(),
            });
        }
        self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
        info!(
            msg_id = full_id,
            ttl = entry.ttl,
            data_type = entry.data_type,
            peer_count = targets.len(),
            "forward decision"
        );
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn seen_count(&self) -> usize {
        self.seen.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use tokio::sync::{mpsc, watch};

    fn test_settings() -> Settings {
        Settings::from_toml_str(
            r#"
            cache_size = 8
            degree = 2
            min_connections = 1
            max_connections = 4
            search_cooldown = 3600
            challenge_cooldown = 3600
            bootstrapper = "127.0.0.1:1"
            p2p_address = "127.0.0.1:0"
            api_address = "127.0.0.1:0"
            known_peers = []
            "#,
        )
        .unwrap()
    }

    fn api_handle(id: ApiId) -> (ApiHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ApiHandle::new(id, tx), rx)
    }

    #[tokio::test]
    async fn duplicate_announce_is_dropped_silently() {
        let (tx, _rx) = watch::channel(false);
        let mesh = Mesh::new(test_settings(), tx);
        let diss = Dissemination::new(Arc::downgrade(&mesh), 8, 2);
        diss.handle_remote_announce(1, 42, 3, 7, b"x".to_vec()).await;
        diss.handle_remote_announce(2, 42, 3, 7, b"x".to_vec()).await;
        assert_eq!(diss.counters.dropped_duplicate.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn ttl_one_delivers_without_pending_entry() {
        let (tx, _rx) = watch::channel(false);
        let mesh = Mesh::new(test_settings(), tx);
        let diss = Dissemination::new(Arc::downgrade(&mesh), 8, 2);
        let (h, mut rx) = api_handle(1);
        diss.add_subscriber(7, h).await;
        diss.handle_remote_announce(1, 1, 1, 7, b"x".to_vec()).await;
        assert_eq!(diss.pending_count().await, 0);
        let notification = rx.recv().await.expect("notification delivered");
        assert!(matches!(notification, Message::GossipNotification { .. }));
    }

    #[tokio::test]
    async fn no_subscribers_drops_without_forwarding() {
        let (tx, _rx) = watch::channel(false);
        let mesh = Mesh::new(test_settings(), tx);
        let diss = Dissemination::new(Arc::downgrade(&mesh), 8, 2);
        diss.handle_remote_announce(1, 5, 3, 99, b"x".to_vec()).await;
        assert_eq!(diss.counters.dropped_no_subscriber.load(Ordering::Relaxed), 1);
        assert_eq!(diss.pending_count().await, 0);
    }

    #[tokio::test]
    async fn negative_validation_removes_pending_entry_without_forward() {
        let (tx, _rx) = watch::channel(false);
        let mesh = Mesh::new(test_settings(), tx);
        let diss = Dissemination::new(Arc::downgrade(&mesh), 8, 2);
        let (h, mut rx) = api_handle(1);
        diss.add_subscriber(7, h.clone()).await;
        diss.handle_remote_announce(1, 42, 3, 7, b"x".to_vec()).await;
        let Message::GossipNotification { msg_id, .. } = rx.recv().await.unwrap() else {
            panic!("expected notification");
        };
        diss.handle_subscriber_validation(h.id, msg_id, false).await;
        assert_eq!(diss.pending_count().await, 0);
        assert_eq!(diss.counters.forwarded.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn unknown_msg_id_validation_is_ignored() {
        let (tx, _rx) = watch::channel(false);
        let mesh = Mesh::new(test_settings(), tx);
        let diss = Dissemination::new(Arc::downgrade(&mesh), 8, 2);
        diss.handle_subscriber_validation(1, 999, true).await;
        assert_eq!(diss.pending_count().await, 0);
    }
}
