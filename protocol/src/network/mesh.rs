//! Mesh controller: owns the unverified/push/pull peer sets, runs the
//! discovery and challenge loops, and services peer offers.
//!
//! Lock acquisition order, when more than one set is needed at once, is
//! always `U_lock -> PU_lock -> PS_lock`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::addr::Endpoint;
use crate::codec::Message;
use crate::error::{GossipError, Result};
use crate::network::connection::{self, ConnState, Direction, PeerHandle};
use crate::network::dissemination::Dissemination;
use crate::pow;
use crate::settings::Settings;

pub type PeerId = u64;

const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(300);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_OUTSTANDING_DISCOVERY: usize = 8;

pub struct PeerRecord {
    pub handle: PeerHandle,
    pub direction: Direction,
    pub remote: Endpoint,
    pub p2p_listen_port: Option<u16>,
    pub validated_them: bool,
    pub validated_us: bool,
    pub state: ConnState,
    pub outstanding_challenge: Option<(u64, Instant)>,
    pub outstanding_discovery: VecDeque<(u64, Instant)>,
}

impl PeerRecord {
    fn new(handle: PeerHandle, direction: Direction, remote: Endpoint, state: ConnState) -> Self {
        Self {
            handle,
            direction,
            remote,
            p2p_listen_port: None,
            validated_them: false,
            validated_us: false,
            state,
            outstanding_challenge: None,
            outstanding_discovery: VecDeque::new(),
        }
    }

    fn advertised_endpoint(&self) -> Option<Endpoint> {
        self.p2p_listen_port.map(|port| Endpoint::new(self.remote.host(), port))
    }
}

/// A fixed-capacity membership set with FIFO insertion order, used for the
/// three peer sets. PS and U evict the oldest entry on overflow; PU refuses
/// the insert instead (`try_insert`).
struct PeerSet {
    capacity: usize,
    order: VecDeque<PeerId>,
    records: HashMap<PeerId, PeerRecord>,
}

impl PeerSet {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            records: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    fn contains(&self, id: &PeerId) -> bool {
        self.records.contains_key(id)
    }

    /// Inserts `rec`, evicting the oldest entry first if full.
    fn insert_evicting(&mut self, id: PeerId, rec: PeerRecord) -> Option<(PeerId, PeerRecord)> {
        let evicted = if self.records.len() >= self.capacity {
            self.order.pop_front().map(|old_id| {
                let old = self.records.remove(&old_id).expect("order/records in sync");
                (old_id, old)
            })
        } else {
            None
        };
        self.order.push_back(id);
        self.records.insert(id, rec);
        evicted
    }

    /// Inserts `rec` only if there is room; returns `rec` back if full.
    fn try_insert(&mut self, id: PeerId, rec: PeerRecord) -> std::result::Result<(), PeerRecord> {
        if self.is_full() {
            return Err(rec);
        }
        self.order.push_back(id);
        self.records.insert(id, rec);
        Ok(())
    }

    fn remove(&mut self, id: &PeerId) -> Option<PeerRecord> {
        let rec = self.records.remove(id)?;
        if let Some(pos) = self.order.iter().position(|x| x == id) {
            self.order.remove(pos);
        }
        Some(rec)
    }

    fn get(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.records.get(id)
    }

    fn get_mut(&mut self, id: &PeerId) -> Option<&mut PeerRecord> {
        self.records.get_mut(id)
    }

    fn iter(&self) -> impl Iterator<Item = (&PeerId, &PeerRecord)> {
        self.records.iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = (&PeerId, &mut PeerRecord)> {
        self.records.iter_mut()
    }
}

#[derive(Default)]
pub struct MeshCounters {
    pub handshake_success: AtomicU64,
    pub handshake_failure: AtomicU64,
    pub evictions: AtomicU64,
}

pub struct Mesh {
    settings: Settings,
    next_id: AtomicU64,
    unverified: Mutex<PeerSet>,
    pull: Mutex<PeerSet>,
    push: Mutex<PeerSet>,
    dissemination: OnceLock<Weak<Dissemination>>,
    shutdown: watch::Sender<bool>,
    pub counters: MeshCounters,
}

impl Mesh {
    pub fn new(settings: Settings, shutdown: watch::Sender<bool>) -> Arc<Self> {
        let unverified_cap = settings.cache_size;
        let max_pull = settings.max_pull;
        let max_push = settings.max_push;
        Arc::new(Self {
            settings,
            next_id: AtomicU64::new(1),
            unverified: Mutex::new(PeerSet::new(unverified_cap)),
            pull: Mutex::new(PeerSet::new(max_pull)),
            push: Mutex::new(PeerSet::new(max_push)),
            dissemination: OnceLock::new(),
            shutdown,
            counters: MeshCounters::default(),
        })
    }

    /// Must be called exactly once after the matching `Dissemination` is
    /// constructed, closing the `Mesh <-> Dissemination` reference cycle
    /// without either owning the other strongly in both directions.
    pub fn bind_dissemination(&self, dissemination: Weak<Dissemination>) {
        let _ = self.dissemination.set(dissemination);
    }

    fn dissemination(&self) -> Option<Arc<Dissemination>> {
        self.dissemination.get().and_then(Weak::upgrade)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn local_p2p_port(&self) -> u16 {
        self.settings.p2p_address.port()
    }

    fn next_id(&self) -> PeerId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn peer_counts(&self) -> (usize, usize, usize) {
        let u = self.unverified.lock().await.len();
        let pu = self.pull.lock().await.len();
        let ps = self.push.lock().await.len();
        (u, pu, ps)
    }

    pub async fn validation_flags(&self, id: PeerId) -> Option<(bool, bool)> {
        if let Some(r) = self.unverified.lock().await.get(&id) {
            return Some((r.validated_them, r.validated_us));
        }
        if let Some(r) = self.pull.lock().await.get(&id) {
            return Some((r.validated_them, r.validated_us));
        }
        if let Some(r) = self.push.lock().await.get(&id) {
            return Some((r.validated_them, r.validated_us));
        }
        None
    }

    // -- connection admission -------------------------------------------------

    /// Accepts a freshly-connected inbound socket: allocates an id, spawns
    /// its connection task, and admits it into U (evicting the oldest U
    /// member if full).
    pub async fn accept_inbound(self: &Arc<Self>, stream: TcpStream, remote: Endpoint) {
        let id = self.next_id();
        let handle = connection::spawn(id, stream, Direction::Inbound, remote.clone(), Arc::downgrade(self));
        let mut rec = PeerRecord::new(handle, Direction::Inbound, remote, ConnState::Fresh);
        // A peer that dials us trusts us by connecting; we still have to
        // prove ourselves to it via the challenge/verification exchange.
        rec.validated_us = true;
        let evicted = self.unverified.lock().await.insert_evicting(id, rec);
        info!(peer_id = id, "inbound connection admitted to unverified set");
        if let Some((old_id, old)) = evicted {
            debug!(peer_id = old_id, "evicted oldest unverified peer on capacity overflow");
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            old.handle.request_close();
        }
    }

    /// Dials `remote` and, on success, admits the connection into PU.
    /// Returns `true` on a successful admission.
    pub async fn connect_outbound(self: &Arc<Self>, remote: Endpoint) -> bool {
        let Some(sock) = remote.to_socket_addr() else {
            warn!(%remote, "cannot resolve outbound address");
            return false;
        };
        let stream = match TcpStream::connect(sock).await {
            Ok(s) => s,
            Err(e) => {
                debug!(%remote, error = %e, "outbound connect failed");
                return false;
            }
        };
        let id = self.next_id();
        let handle = connection::spawn(id, stream, Direction::Outbound, remote.clone(), Arc::downgrade(self));
        let mut rec = PeerRecord::new(handle.clone(), Direction::Outbound, remote, ConnState::InfoSent);
        // We trust a peer we chose to dial; it still has to prove itself
        // to us via the challenge/verification exchange.
        rec.validated_them = true;
        match self.pull.lock().await.try_insert(id, rec) {
            Ok(()) => {
                info!(peer_id = id, "outbound connection admitted to pull set");
                true
            }
            Err(rec) => {
                debug!(peer_id = id, "pull set full, dropping fresh outbound connection");
                rec.handle.request_close();
                false
            }
        }
    }

    /// Removes `id` from whichever set holds it and asks its connection
    /// task to stop. Idempotent.
    pub async fn close_peer(&self, id: PeerId) {
        if let Some(r) = self.unverified.lock().await.remove(&id) {
            r.handle.request_close();
            return;
        }
        if let Some(r) = self.pull.lock().await.remove(&id) {
            r.handle.request_close();
            return;
        }
        if let Some(r) = self.push.lock().await.remove(&id) {
            r.handle.request_close();
        }
    }

    // -- handshake callbacks ---------------------------------------------------

    pub async fn handle_peer_info(&self, id: PeerId, port: u16) -> Result<()> {
        for set in [&self.unverified, &self.pull, &self.push] {
            let mut guard = set.lock().await;
            if let Some(r) = guard.get_mut(&id) {
                r.p2p_listen_port = Some(port);
                return Ok(());
            }
        }
        Err(GossipError::ProtocolViolation("peer_info for unknown peer".into()))
    }

    /// We are the initiator: the acceptor challenged us. Solve the PoW and
    /// reply with PEER_VERIFICATION.
    pub async fn handle_peer_challenge(self: &Arc<Self>, id: PeerId, challenge: u64) -> Result<()> {
        let handle = {
            let mut guard = self.pull.lock().await;
            let Some(r) = guard.get_mut(&id) else {
                return Err(GossipError::ProtocolViolation("challenge for unknown peer".into()));
            };
            r.state = ConnState::Challenged;
            r.handle.clone()
        };
        let cancel = self.shutdown.subscribe();
        tokio::spawn(async move {
            match pow::produce_challenge_nonce(challenge, cancel).await {
                Some(nonce) => {
                    handle.send(Message::PeerVerification { nonce });
                }
                None => {
                    debug!(peer_id = id, "abandoning challenge response, no nonce found in time");
                }
            }
        });
        Ok(())
    }

    /// We are the acceptor: the initiator sent us a verification nonce for
    /// a challenge we issued.
    pub async fn handle_peer_verification(&self, id: PeerId, nonce: u64) -> Result<()> {
        let mut guard = self.unverified.lock().await;
        let Some(r) = guard.get_mut(&id) else {
            return Err(GossipError::ProtocolViolation("verification for unknown peer".into()));
        };
        let Some((challenge, expiry)) = r.outstanding_challenge else {
            return Err(GossipError::ProtocolViolation("verification without outstanding challenge".into()));
        };
        let valid = Instant::now() <= expiry && pow::challenge_hash_valid(challenge, nonce);
        r.handle.send(Message::PeerValidation { valid });
        if !valid {
            warn!(peer_id = id, "peer verification failed, closing");
            self.counters.handshake_failure.fetch_add(1, Ordering::Relaxed);
            let rec = guard.remove(&id).expect("just looked up");
            drop(guard);
            rec.handle.request_close();
            return Ok(());
        }
        r.validated_them = true;
        r.state = ConnState::Verified;
        info!(peer_id = id, "peer verified, moving unverified -> push");
        self.counters.handshake_success.fetch_add(1, Ordering::Relaxed);
        let rec = guard.remove(&id).expect("just looked up");
        drop(guard);
        let evicted = self.push.lock().await.insert_evicting(id, rec);
        if let Some((old_id, old)) = evicted {
            debug!(peer_id = old_id, "evicted oldest push peer on capacity overflow");
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            old.handle.request_close();
        }
        Ok(())
    }

    /// We are the initiator: received the acceptor's verdict on our
    /// verification.
    pub async fn handle_peer_validation(&self, id: PeerId, valid: bool) -> Result<()> {
        if !valid {
            warn!(peer_id = id, "received negative peer validation, closing");
            self.close_peer(id).await;
            return Ok(());
        }
        let mut guard = self.pull.lock().await;
        let Some(r) = guard.get_mut(&id) else {
            return Err(GossipError::ProtocolViolation("validation for unknown peer".into()));
        };
        r.validated_us = true;
        r.state = ConnState::Validated;
        info!(peer_id = id, "peer validated us, handshake complete");
        Ok(())
    }

    // -- discovery/offer ---------------------------------------------------

    pub async fn handle_peer_discovery(self: &Arc<Self>, id: PeerId, challenge: u64) -> Result<()> {
        let requester_endpoint = {
            let mut found = None;
            for set in [&self.pull, &self.push] {
                let guard = set.lock().await;
                if let Some(r) = guard.get(&id) {
                    found = Some(r.remote.clone());
                    break;
                }
            }
            found
        };

        let mut addresses = Vec::new();
        {
            let pull = self.pull.lock().await;
            let push = self.push.lock().await;
            for (_, r) in pull.iter().chain(push.iter()) {
                if !(r.validated_them && r.validated_us) {
                    continue;
                }
                if requester_endpoint.as_ref() == Some(&r.remote) {
                    continue;
                }
                if let Some(ep) = r.advertised_endpoint() {
                    addresses.push(ep.normalized());
                }
            }
        }

        let handle = self.peer_handle(id).await;
        let Some(handle) = handle else {
            return Err(GossipError::ProtocolViolation("discovery from unknown peer".into()));
        };
        let cancel = self.shutdown.subscribe();
        tokio::spawn(async move {
            if let Some(nonce) = pow::produce_offer_nonce(challenge, &addresses, cancel).await {
                handle.send(Message::PeerOffer {
                    challenge,
                    nonce,
                    addresses,
                });
            }
        });
        Ok(())
    }

    async fn peer_handle(&self, id: PeerId) -> Option<PeerHandle> {
        for set in [&self.unverified, &self.pull, &self.push] {
            if let Some(r) = set.lock().await.get(&id) {
                return Some(r.handle.clone());
            }
        }
        None
    }

    pub async fn handle_peer_offer(
        self: &Arc<Self>,
        id: PeerId,
        challenge: u64,
        nonce: u64,
        addresses: Vec<String>,
        _remote: &Endpoint,
    ) -> Result<()> {
        // Find and consume the matching outstanding discovery challenge.
        let matched = {
            let mut pull = self.pull.lock().await;
            let mut push = self.push.lock().await;
            let rec = pull.get_mut(&id).or_else(|| push.get_mut(&id));
            let Some(rec) = rec else {
                return Err(GossipError::ProtocolViolation("offer from unknown peer".into()));
            };
            let now = Instant::now();
            let pos = rec
                .outstanding_discovery
                .iter()
                .position(|(c, exp)| *c == challenge && *exp >= now);
            match pos {
                Some(i) => {
                    rec.outstanding_discovery.remove(i);
                    true
                }
                None => false,
            }
        };
        if !matched {
            return Err(GossipError::ProtocolViolation(
                "peer offer without a matching unexpired discovery".into(),
            ));
        }

        let frame = Message::PeerOffer {
            challenge,
            nonce,
            addresses: addresses.clone(),
        }
        .encode();
        if !pow::offer_hash_valid(&frame) {
            return Err(GossipError::ProofFailure);
        }
        if addresses.is_empty() {
            return Err(GossipError::ProtocolViolation("empty peer offer".into()));
        }

        let local = self.settings.p2p_address.normalized();
        let mut parsed = Vec::with_capacity(addresses.len());
        for a in &addresses {
            let ep: Endpoint = a
                .parse()
                .map_err(|_| GossipError::ProtocolViolation(format!("unparsable address in offer: {a}")))?;
            if ep.normalized() == local {
                return Err(GossipError::ProtocolViolation("offer contains local address".into()));
            }
            parsed.push(ep);
        }

        // Drop addresses already known in the unverified, pull, or push sets.
        let mut known = std::collections::HashSet::new();
        for set in [&self.unverified, &self.pull, &self.push] {
            let guard = set.lock().await;
            for (_, r) in guard.iter() {
                known.insert(r.remote.normalized());
            }
        }
        let mut candidates: Vec<Endpoint> = parsed.into_iter().filter(|e| !known.contains(&e.normalized())).collect();
        candidates.shuffle(&mut rand::thread_rng());

        loop {
            let room = {
                let pull = self.pull.lock().await;
                self.settings.max_pull.saturating_sub(pull.len())
            };
            if room == 0 || candidates.is_empty() {
                break;
            }
            let batch: Vec<Endpoint> = candidates.drain(..room.min(candidates.len())).collect();
            let mut any_connected = false;
            for ep in batch {
                if self.connect_outbound(ep).await {
                    any_connected = true;
                }
            }
            if !any_connected {
                break;
            }
        }
        Ok(())
    }

    // -- dissemination delegation -------------------------------------------

    pub async fn handle_peer_announce(
        &self,
        origin: PeerId,
        msg_id: u64,
        ttl: u8,
        data_type: u16,
        payload: Vec<u8>,
    ) -> Result<()> {
        let Some(dissemination) = self.dissemination() else {
            return Ok(());
        };
        dissemination.handle_remote_announce(origin, msg_id, ttl, data_type, payload).await;
        Ok(())
    }

    /// Returns up to `count` fully validated peer handles, excluding
    /// `exclude`, sampled uniformly without replacement.
    pub async fn sample_validated_peers(&self, count: usize, exclude: Option<PeerId>) -> Vec<(PeerId, PeerHandle)> {
        let mut pool = Vec::new();
        for set in [&self.pull, &self.push] {
            let guard = set.lock().await;
            for (id, r) in guard.iter() {
                if r.validated_them && r.validated_us && Some(*id) != exclude {
                    pool.push((*id, r.handle.clone()));
                }
            }
        }
        pool.shuffle(&mut rand::thread_rng());
        pool.truncate(count);
        pool
    }

    // -- background loops ----------------------------------------------------

    pub fn spawn_background_loops(self: &Arc<Self>) {
        let discovery_mesh = Arc::clone(self);
        let mut discovery_shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(discovery_mesh.settings.search_cooldown)) => {
                        discovery_mesh.run_discovery_round().await;
                    }
                    _ = discovery_shutdown.changed() => {
                        if *discovery_shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        let challenge_mesh = Arc::clone(self);
        let mut challenge_shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(challenge_mesh.settings.challenge_cooldown)) => {
                        challenge_mesh.run_challenge_round().await;
                    }
                    _ = challenge_shutdown.changed() => {
                        if *challenge_shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    async fn run_discovery_round(self: &Arc<Self>) {
        let (_, pu, ps) = self.peer_counts().await;
        let min = self.settings.min_connections;
        let should_discover = pu < self.settings.max_pull && (ps + pu < min || pu < min.div_ceil(2));
        if !should_discover {
            return;
        }

        let targets: Vec<PeerHandle> = {
            let mut out = Vec::new();
            let mut pull = self.pull.lock().await;
            let mut push = self.push.lock().await;
            for (_, r) in pull.iter_mut().chain(push.iter_mut()) {
                if r.validated_them && r.validated_us {
                    if r.outstanding_discovery.len() >= MAX_OUTSTANDING_DISCOVERY {
                        continue;
                    }
                    let challenge: u64 = rand::random();
                    r.outstanding_discovery.push_back((challenge, Instant::now() + DISCOVERY_TIMEOUT));
                    out.push((r.handle.clone(), challenge));
                }
            }
            out.into_iter()
                .filter_map(|(h, c)| h.send(Message::PeerDiscovery { challenge: c }).then_some(h))
                .collect()
        };
        debug!(count = targets.len(), "discovery round sent");
    }

    async fn run_challenge_round(&self) {
        let mut guard = self.unverified.lock().await;
        let now = Instant::now();
        let mut to_close = Vec::new();
        for (id, r) in guard.iter() {
            match r.outstanding_challenge {
                Some((_, expiry)) if expiry < now => to_close.push(*id),
                Some(_) => {}
                None => {}
            }
        }
        let mut to_send = Vec::new();
        for (id, r) in guard.iter_mut() {
            if to_close.contains(id) {
                continue;
            }
            if r.outstanding_challenge.is_none() {
                let challenge: u64 = rand::random();
                r.outstanding_challenge = Some((challenge, now + CHALLENGE_TIMEOUT));
                to_send.push((r.handle.clone(), challenge));
            }
        }
        for id in &to_close {
            if let Some(r) = guard.remove(id) {
                warn!(peer_id = id, "unverified peer's challenge expired, closing");
                r.handle.request_close();
            }
        }
        drop(guard);
        for (handle, challenge) in to_send {
            handle.send(Message::PeerChallenge { challenge });
        }
    }

    /// Startup sequence: connect to known peers, fall back to
    /// the bootstrapper if none landed in PU, then start the background
    /// loops. Listener binding is the caller's responsibility (node.rs).
    pub async fn startup(self: &Arc<Self>) {
        let known = self.settings.known_peers.clone();
        let mut handles = Vec::with_capacity(known.len());
        for ep in known {
            let mesh = Arc::clone(self);
            handles.push(tokio::spawn(async move { mesh.connect_outbound(ep).await }));
        }
        for h in handles {
            let _ = h.await;
        }

        if self.pull.lock().await.len() == 0 {
            let bootstrapper = self.settings.bootstrapper.clone();
            self.connect_outbound(bootstrapper).await;
        }

        self.spawn_background_loops();
    }

    /// Binds and runs the peer listener until shutdown is signalled.
    pub async fn run_peer_listener(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let sock = self
            .settings
            .p2p_address
            .to_socket_addr()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad p2p_address"))?;
        let listener = TcpListener::bind(sock).await?;
        info!(%sock, "peer listener bound");
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = accepted?;
                    self.accept_inbound(stream, Endpoint::from(peer_addr)).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings::from_toml_str(
            r#"
            cache_size = 4
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

    #[tokio::test]
    async fn invariants_hold_on_fresh_mesh() {
        let (tx, _rx) = watch::channel(false);
        let mesh = Mesh::new(test_settings(), tx);
        let (u, pu, ps) = mesh.peer_counts().await;
        assert_eq!((u, pu, ps), (0, 0, 0));
    }

    #[tokio::test]
    async fn inbound_peer_is_admitted_to_unverified_set() {
        let (tx, _rx) = watch::channel(false);
        let mesh = Mesh::new(test_settings(), tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server_side, remote) = listener.accept().await.unwrap();
        let _client_side = connector.await.unwrap();
        mesh.accept_inbound(server_side, Endpoint::from(remote)).await;
        let (u, _, _) = mesh.peer_counts().await;
        assert_eq!(u, 1);
    }

    #[tokio::test]
    async fn unverified_set_evicts_oldest_on_overflow() {
        let (tx, _rx) = watch::channel(false);
        let mut settings = test_settings();
        settings.cache_size = 1;
        let mesh = Mesh::new(settings, tx);

        for _ in 0..2 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let connector = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
            let (server_side, remote) = listener.accept().await.unwrap();
            let _client_side = connector.await.unwrap();
            mesh.accept_inbound(server_side, Endpoint::from(remote)).await;
        }
        let (u, _, _) = mesh.peer_counts().await;
        assert_eq!(u, 1);
    }
}
