//! Wire-protocol codec: length-prefixed binary framing.
//!
//! A 2-byte big-endian `size` (total frame length, header included), a
//! 2-byte big-endian `type`, then the type-specific body.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{GossipError, Result};

pub const GOSSIP_ANNOUNCE: u16 = 500;
pub const GOSSIP_NOTIFY: u16 = 501;
pub const GOSSIP_NOTIFICATION: u16 = 502;
pub const GOSSIP_VALIDATION: u16 = 503;
pub const PEER_ANNOUNCE: u16 = 504;
pub const PEER_DISCOVERY: u16 = 505;
pub const PEER_OFFER: u16 = 506;
pub const PEER_INFO: u16 = 507;
pub const PEER_CHALLENGE: u16 = 508;
pub const PEER_VERIFICATION: u16 = 509;
pub const PEER_VALIDATION: u16 = 510;

const HEADER_LEN: usize = 4;

/// A fully decoded protocol message. Each variant's fields mirror the
/// wire body layout for its type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    GossipAnnounce {
        ttl: u8,
        data_type: u16,
        payload: Vec<u8>,
    },
    GossipNotify {
        data_type: u16,
    },
    GossipNotification {
        msg_id: u16,
        data_type: u16,
        payload: Vec<u8>,
    },
    GossipValidation {
        msg_id: u16,
        valid: bool,
    },
    PeerAnnounce {
        msg_id: u64,
        ttl: u8,
        data_type: u16,
        payload: Vec<u8>,
    },
    PeerDiscovery {
        challenge: u64,
    },
    PeerOffer {
        challenge: u64,
        nonce: u64,
        addresses: Vec<String>,
    },
    PeerInfo {
        p2p_listen_port: u16,
    },
    PeerChallenge {
        challenge: u64,
    },
    PeerVerification {
        nonce: u64,
    },
    PeerValidation {
        valid: bool,
    },
}

impl Message {
    pub fn type_code(&self) -> u16 {
        match self {
            Message::GossipAnnounce { .. } => GOSSIP_ANNOUNCE,
            Message::GossipNotify { .. } => GOSSIP_NOTIFY,
            Message::GossipNotification { .. } => GOSSIP_NOTIFICATION,
            Message::GossipValidation { .. } => GOSSIP_VALIDATION,
            Message::PeerAnnounce { .. } => PEER_ANNOUNCE,
            Message::PeerDiscovery { .. } => PEER_DISCOVERY,
            Message::PeerOffer { .. } => PEER_OFFER,
            Message::PeerInfo { .. } => PEER_INFO,
            Message::PeerChallenge { .. } => PEER_CHALLENGE,
            Message::PeerVerification { .. } => PEER_VERIFICATION,
            Message::PeerValidation { .. } => PEER_VALIDATION,
        }
    }

    /// True for message types accepted on the peer listener (504-510).
    pub fn is_peer_message(&self) -> bool {
        self.type_code() >= PEER_ANNOUNCE
    }

    /// True for message types a client may send on the API listener.
    /// GOSSIP_NOTIFICATION (502) is excluded: it only ever flows server to
    /// client, so a client sending one is a protocol violation.
    pub fn is_api_message(&self) -> bool {
        matches!(self.type_code(), GOSSIP_ANNOUNCE | GOSSIP_NOTIFY | GOSSIP_VALIDATION)
    }

    /// Encodes to a complete frame: size prefix, type, body.
    pub fn encode(&self) -> BytesMut {
        let mut body = BytesMut::new();
        match self {
            Message::GossipAnnounce {
                ttl,
                data_type,
                payload,
            } => {
                body.put_u8(*ttl);
                body.put_u8(0);
                body.put_u16(*data_type);
                body.put_slice(payload);
            }
            Message::GossipNotify { data_type } => {
                body.put_u16(0);
                body.put_u16(*data_type);
            }
            Message::GossipNotification {
                msg_id,
                data_type,
                payload,
            } => {
                body.put_u16(*msg_id);
                body.put_u16(*data_type);
                body.put_slice(payload);
            }
            Message::GossipValidation { msg_id, valid } => {
                body.put_u16(*msg_id);
                body.put_u16(if *valid { 1 } else { 0 });
            }
            Message::PeerAnnounce {
                msg_id,
                ttl,
                data_type,
                payload,
            } => {
                body.put_u64(*msg_id);
                body.put_u8(*ttl);
                body.put_u8(0);
                body.put_u16(*data_type);
                body.put_slice(payload);
            }
            Message::PeerDiscovery { challenge } => {
                body.put_u64(*challenge);
            }
            Message::PeerOffer {
                challenge,
                nonce,
                addresses,
            } => {
                body.put_u64(*challenge);
                body.put_u64(*nonce);
                body.put_slice(addresses.join(",").as_bytes());
            }
            Message::PeerInfo { p2p_listen_port } => {
                body.put_u16(0);
                body.put_u16(*p2p_listen_port);
            }
            Message::PeerChallenge { challenge } => {
                body.put_u64(*challenge);
            }
            Message::PeerVerification { nonce } => {
                body.put_u64(*nonce);
            }
            Message::PeerValidation { valid } => {
                body.put_u16(0);
                body.put_u16(if *valid { 1 } else { 0 });
            }
        }

        let size = (HEADER_LEN + body.len()) as u16;
        let mut frame = BytesMut::with_capacity(size as usize);
        frame.put_u16(size);
        frame.put_u16(self.type_code());
        frame.extend_from_slice(&body);
        frame
    }

    /// Parses a complete frame (size prefix through body). `declared size`
    /// must equal `frame.len()` exactly; extra or missing bytes are a
    /// `MalformedFrame`.
    pub fn parse(frame: &[u8]) -> Result<Message> {
        if frame.len() < HEADER_LEN {
            return Err(GossipError::MalformedFrame);
        }
        let mut buf = frame;
        let size = buf.get_u16() as usize;
        if size != frame.len() {
            return Err(GossipError::MalformedFrame);
        }
        let type_code = buf.get_u16();
        let body = buf;

        let msg = match type_code {
            GOSSIP_ANNOUNCE => {
                if body.len() < 4 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                let ttl = b.get_u8();
                let _reserved = b.get_u8();
                let data_type = b.get_u16();
                Message::GossipAnnounce {
                    ttl,
                    data_type,
                    payload: b.to_vec(),
                }
            }
            GOSSIP_NOTIFY => {
                if body.len() != 4 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                let _reserved = b.get_u16();
                let data_type = b.get_u16();
                Message::GossipNotify { data_type }
            }
            GOSSIP_NOTIFICATION => {
                if body.len() < 4 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                let msg_id = b.get_u16();
                let data_type = b.get_u16();
                Message::GossipNotification {
                    msg_id,
                    data_type,
                    payload: b.to_vec(),
                }
            }
            GOSSIP_VALIDATION => {
                if body.len() != 4 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                let msg_id = b.get_u16();
                let flags = b.get_u16();
                Message::GossipValidation {
                    msg_id,
                    valid: flags & 1 == 1,
                }
            }
            PEER_ANNOUNCE => {
                if body.len() < 12 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                let msg_id = b.get_u64();
                let ttl = b.get_u8();
                let _reserved = b.get_u8();
                let data_type = b.get_u16();
                Message::PeerAnnounce {
                    msg_id,
                    ttl,
                    data_type,
                    payload: b.to_vec(),
                }
            }
            PEER_DISCOVERY => {
                if body.len() != 8 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                Message::PeerDiscovery {
                    challenge: b.get_u64(),
                }
            }
            PEER_OFFER => {
                if body.len() < 16 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                let challenge = b.get_u64();
                let nonce = b.get_u64();
                let addr_text = std::str::from_utf8(b)
                    .map_err(|_| GossipError::MalformedFrame)?;
                let addresses: Vec<String> = if addr_text.is_empty() {
                    Vec::new()
                } else {
                    addr_text.split(',').map(|s| s.to_string()).collect()
                };
                Message::PeerOffer {
                    challenge,
                    nonce,
                    addresses,
                }
            }
            PEER_INFO => {
                if body.len() != 4 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                let _reserved = b.get_u16();
                let p2p_listen_port = b.get_u16();
                Message::PeerInfo { p2p_listen_port }
            }
            PEER_CHALLENGE => {
                if body.len() != 8 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                Message::PeerChallenge {
                    challenge: b.get_u64(),
                }
            }
            PEER_VERIFICATION => {
                if body.len() != 8 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                Message::PeerVerification { nonce: b.get_u64() }
            }
            PEER_VALIDATION => {
                if body.len() != 4 {
                    return Err(GossipError::MalformedFrame);
                }
                let mut b = body;
                let _reserved = b.get_u16();
                let flags = b.get_u16();
                Message::PeerValidation {
                    valid: flags & 1 == 1,
                }
            }
            _ => return Err(GossipError::MalformedFrame),
        };
        Ok(msg)
    }
}

/// Reads one complete frame off `r`: a 2-byte size prefix followed by
/// `size - 2` more bytes. Returns the full frame (size prefix included) so
/// callers needing the raw bytes for PoW verification don't have to
/// re-encode. A short read before EOF is `MalformedFrame`.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>> {
    let size = r.read_u16().await.map_err(|_| GossipError::MalformedFrame)?;
    if (size as usize) < HEADER_LEN {
        return Err(GossipError::MalformedFrame);
    }
    let mut rest = vec![0u8; size as usize - 2];
    r.read_exact(&mut rest)
        .await
        .map_err(|_| GossipError::MalformedFrame)?;
    let mut frame = Vec::with_capacity(size as usize);
    frame.extend_from_slice(&size.to_be_bytes());
    frame.extend_from_slice(&rest);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Message) {
        let frame = msg.encode();
        let parsed = Message::parse(&frame).expect("parse");
        assert_eq!(parsed, msg);
    }

    #[test]
    fn roundtrips_all_variants() {
        roundtrip(Message::GossipAnnounce {
            ttl: 3,
            data_type: 7,
            payload: b"hello".to_vec(),
        });
        roundtrip(Message::GossipNotify { data_type: 7 });
        roundtrip(Message::GossipNotification {
            msg_id: 42,
            data_type: 7,
            payload: b"world".to_vec(),
        });
        roundtrip(Message::GossipValidation {
            msg_id: 42,
            valid: true,
        });
        roundtrip(Message::PeerAnnounce {
            msg_id: 99,
            ttl: 2,
            data_type: 7,
            payload: b"x".to_vec(),
        });
        roundtrip(Message::PeerDiscovery { challenge: 123 });
        roundtrip(Message::PeerOffer {
            challenge: 1,
            nonce: 2,
            addresses: vec!["1.2.3.4:9000".into(), "5.6.7.8:9001".into()],
        });
        roundtrip(Message::PeerOffer {
            challenge: 1,
            nonce: 2,
            addresses: vec![],
        });
        roundtrip(Message::PeerInfo {
            p2p_listen_port: 7777,
        });
        roundtrip(Message::PeerChallenge { challenge: 55 });
        roundtrip(Message::PeerVerification { nonce: 66 });
        roundtrip(Message::PeerValidation { valid: false });
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut frame = Message::PeerDiscovery { challenge: 1 }.encode();
        frame[1] += 1; // corrupt the low byte of size
        assert!(matches!(
            Message::parse(&frame),
            Err(GossipError::MalformedFrame)
        ));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut frame = Message::PeerDiscovery { challenge: 1 }.encode();
        frame[2] = 0xff;
        frame[3] = 0xff;
        assert!(matches!(
            Message::parse(&frame),
            Err(GossipError::MalformedFrame)
        ));
    }

    #[test]
    fn rejects_short_fixed_body() {
        let frame = Message::PeerChallenge { challenge: 1 }.encode();
        let truncated = &frame[..frame.len() - 2];
        // size field still claims the original length -> mismatch
        assert!(matches!(
            Message::parse(truncated),
            Err(GossipError::MalformedFrame)
        ));
    }

    #[test]
    fn peer_offer_nonce_follows_challenge_at_fixed_offset() {
        let msg = Message::PeerOffer {
            challenge: 0xAAAA_BBBB_CCCC_DDDD,
            nonce: 0x1111_2222_3333_4444,
            addresses: vec!["1.2.3.4:9000".into()],
        };
        let frame = msg.encode();
        // header(4) + challenge(8) = nonce starts at byte 12
        let nonce_bytes = &frame[12..20];
        assert_eq!(nonce_bytes, &0x1111_2222_3333_4444u64.to_be_bytes());
    }
}
