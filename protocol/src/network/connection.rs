//! Connection: one task per TCP peer socket, driving the handshake and
//! message-gating state machine.
//!
//! The task owns nothing but its socket and its own inbound/outbound
//! queues; it never extends the mesh's lifetime past its own termination
//! (it only ever holds a `Weak<Mesh>`).

use std::sync::Weak;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::addr::Endpoint;
use crate::codec::{self, Message};
use crate::error::GossipError;
use crate::network::mesh::{Mesh, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Per-connection lifecycle state. Kept mostly for logging and
/// test assertions; the actual gating decision is driven by the
/// `validated_them`/`validated_us` flags on the mesh's peer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Fresh,
    InfoSent,
    Challenged,
    Verified,
    Validated,
    Closed,
}

/// What the mesh controller (and dissemination engine) use to push outbound
/// frames to a peer, and to request the connection task to stop.
#[derive(Clone)]
pub struct PeerHandle {
    pub id: PeerId,
    outbound: mpsc::UnboundedSender<Message>,
    close: watch::Sender<bool>,
}

impl PeerHandle {
    /// Enqueues `msg` for this peer. Returns `false` if the connection task
    /// has already exited.
    pub fn send(&self, msg: Message) -> bool {
        self.outbound.send(msg).is_ok()
    }

    pub fn request_close(&self) {
        let _ = self.close.send(true);
    }
}

/// Spawns the connection task and returns the handle the mesh uses to talk
/// to it.
pub fn spawn(id: PeerId, stream: TcpStream, direction: Direction, remote: Endpoint, mesh: Weak<Mesh>) -> PeerHandle {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = watch::channel(false);
    let handle = PeerHandle {
        id,
        outbound: out_tx,
        close: close_tx,
    };
    tokio::spawn(run(id, stream, direction, remote, mesh, out_rx, close_rx));
    handle
}

async fn run(
    id: PeerId,
    mut stream: TcpStream,
    direction: Direction,
    remote: Endpoint,
    mesh: Weak<Mesh>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    mut close_rx: watch::Receiver<bool>,
) {
    let (mut read_half, mut write_half) = stream.split();

    if direction == Direction::Outbound {
        let Some(m) = mesh.upgrade() else { return };
        let info = Message::PeerInfo {
            p2p_listen_port: m.local_p2p_port(),
        };
        if write_half.write_all(&info.encode()).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            biased;
            changed = close_rx.changed() => {
                if changed.is_err() || *close_rx.borrow() {
                    break;
                }
            }
            frame = codec::read_frame(&mut read_half) => {
                let Some(m) = mesh.upgrade() else { break };
                match frame {
                    Ok(bytes) => match Message::parse(&bytes) {
                        Ok(msg) => {
                            if let Err(e) = handle_message(id, &remote, msg, &m).await {
                                debug!(peer_id = id, %e, "closing connection after message error");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!(peer_id = id, hex = %hex::encode(&bytes), "malformed frame");
                            break;
                        }
                    },
                    Err(_) => break,
                }
            }
            out = outbound_rx.recv() => {
                match out {
                    Some(msg) => {
                        if write_half.write_all(&msg.encode()).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(m) = mesh.upgrade() {
        m.close_peer(id).await;
    }
}

fn message_allowed(msg_type: u16, validated_them: bool, validated_us: bool) -> bool {
    if validated_them && validated_us {
        return true;
    }
    let mut allowed = false;
    if !validated_them {
        allowed |= matches!(msg_type, codec::PEER_INFO | codec::PEER_VERIFICATION);
    }
    if !validated_us {
        allowed |= matches!(msg_type, codec::PEER_CHALLENGE | codec::PEER_VALIDATION);
    }
    allowed
}

async fn handle_message(
    id: PeerId,
    remote: &Endpoint,
    msg: Message,
    mesh: &std::sync::Arc<Mesh>,
) -> Result<(), GossipError> {
    if !msg.is_peer_message() {
        return Err(GossipError::ProtocolViolation(
            "api-only message received on peer connection".into(),
        ));
    }
    let (validated_them, validated_us) = mesh
        .validation_flags(id)
        .await
        .ok_or_else(|| GossipError::ProtocolViolation("unknown peer id".into()))?;

    if !message_allowed(msg.type_code(), validated_them, validated_us) {
        return Err(GossipError::ProtocolViolation(format!(
            "message type {} disallowed in current state",
            msg.type_code()
        )));
    }

    use Message::*;
    match msg {
        PeerInfo { p2p_listen_port } => mesh.handle_peer_info(id, p2p_listen_port).await,
        PeerChallenge { challenge } => mesh.handle_peer_challenge(id, challenge).await,
        PeerVerification { nonce } => mesh.handle_peer_verification(id, nonce).await,
        PeerValidation { valid } => mesh.handle_peer_validation(id, valid).await,
        PeerDiscovery { challenge } => mesh.handle_peer_discovery(id, challenge).await,
        PeerOffer {
            challenge,
            nonce,
            addresses,
        } => mesh.handle_peer_offer(id, challenge, nonce, addresses, remote).await,
        PeerAnnounce {
            msg_id,
            ttl,
            data_type,
            payload,
        } => mesh.handle_peer_announce(id, msg_id, ttl, data_type, payload).await,
        _ => unreachable!("is_peer_message() guarantees one of the above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unvalidated_them_accepts_only_info_and_verification() {
        assert!(message_allowed(codec::PEER_INFO, false, true));
        assert!(message_allowed(codec::PEER_VERIFICATION, false, true));
        assert!(!message_allowed(codec::PEER_DISCOVERY, false, true));
    }

    #[test]
    fn unvalidated_us_accepts_only_challenge_and_validation() {
        assert!(message_allowed(codec::PEER_CHALLENGE, true, false));
        assert!(message_allowed(codec::PEER_VALIDATION, true, false));
        assert!(!message_allowed(codec::PEER_OFFER, true, false));
    }

    #[test]
    fn fully_validated_accepts_any_peer_message() {
        assert!(message_allowed(codec::PEER_ANNOUNCE, true, true));
        assert!(message_allowed(codec::PEER_OFFER, true, true));
    }

    #[test]
    fn fresh_connection_rejects_peer_announce() {
        assert!(!message_allowed(codec::PEER_ANNOUNCE, false, false));
    }
}
