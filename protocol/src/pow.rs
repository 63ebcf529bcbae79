//! Proof-of-work engine: hash-prefix proofs for offers and challenges.
//!
//! Cancellation reuses the `tokio::sync::watch` shutdown idiom used
//! elsewhere in this crate's background loops, plus a duration-based effort
//! bound, so a caller can give up on an unresponsive search.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::codec::Message;

/// Leading zero bits required for a PEER_OFFER's nonce.
pub const OFFER_POW_BITS: u32 = 16;
/// Leading zero bits required for a PEER_CHALLENGE/PEER_VERIFICATION pair.
pub const CHALLENGE_POW_BITS: u32 = 24;

const DEFAULT_EFFORT_BOUND: Duration = Duration::from_secs(30);
const YIELD_EVERY: u64 = 4096;

pub(crate) fn leading_zero_bits(hash: &[u8]) -> u32 {
    let mut count = 0;
    for byte in hash {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// True iff SHA-256 over the full encoded PEER_OFFER frame begins with
/// `OFFER_POW_BITS` zero bits.
pub fn offer_hash_valid(frame: &[u8]) -> bool {
    leading_zero_bits(&Sha256::digest(frame)) >= OFFER_POW_BITS
}

/// True iff SHA-256 over `challenge_be8 || nonce_be8` begins with
/// `CHALLENGE_POW_BITS` zero bits.
pub fn challenge_hash_valid(challenge: u64, nonce: u64) -> bool {
    let mut buf = [0u8; 16];
    buf[0..8].copy_from_slice(&challenge.to_be_bytes());
    buf[8..16].copy_from_slice(&nonce.to_be_bytes());
    leading_zero_bits(&Sha256::digest(buf)) >= CHALLENGE_POW_BITS
}

/// Linear nonce search for a PEER_VERIFICATION answering `challenge`.
/// Cooperative: yields every `YIELD_EVERY` attempts and checks `cancel` and
/// the effort bound there. Returns `None` if cancelled or the bound elapses
/// before a valid nonce is found.
pub async fn produce_challenge_nonce(
    challenge: u64,
    mut cancel: watch::Receiver<bool>,
) -> Option<u64> {
    let deadline = Instant::now() + DEFAULT_EFFORT_BOUND;
    let mut nonce: u64 = rand::random();
    let mut i: u64 = 0;
    loop {
        if challenge_hash_valid(challenge, nonce) {
            return Some(nonce);
        }
        nonce = nonce.wrapping_add(1);
        i += 1;
        if i % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
            if Instant::now() >= deadline || *cancel.borrow() {
                return None;
            }
        }
    }
}

/// Linear nonce search for a PEER_OFFER carrying `addresses`. The nonce is
/// searched by re-encoding the candidate offer each attempt, since the PoW
/// is defined over the whole packet rather than a fixed preimage.
pub async fn produce_offer_nonce(
    challenge: u64,
    addresses: &[String],
    mut cancel: watch::Receiver<bool>,
) -> Option<u64> {
    let deadline = Instant::now() + DEFAULT_EFFORT_BOUND;
    let mut nonce: u64 = rand::random();
    let mut i: u64 = 0;
    loop {
        let candidate = Message::PeerOffer {
            challenge,
            nonce,
            addresses: addresses.to_vec(),
        };
        if offer_hash_valid(&candidate.encode()) {
            return Some(nonce);
        }
        nonce = nonce.wrapping_add(1);
        i += 1;
        if i % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
            if Instant::now() >= deadline || *cancel.borrow() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zero_bits_counts_correctly() {
        assert_eq!(leading_zero_bits(&[0x00, 0x00, 0x0f]), 20);
        assert_eq!(leading_zero_bits(&[0xff]), 0);
        assert_eq!(leading_zero_bits(&[0x00, 0xff]), 8);
    }

    #[tokio::test]
    async fn offer_nonce_search_produces_valid_nonce() {
        let (_tx, rx) = watch::channel(false);
        let addrs = vec!["1.2.3.4:9000".to_string()];
        let nonce = produce_offer_nonce(42, &addrs, rx)
            .await
            .expect("nonce found within effort bound");
        let frame = Message::PeerOffer {
            challenge: 42,
            nonce,
            addresses: addrs,
        }
        .encode();
        assert!(offer_hash_valid(&frame));
    }

    #[tokio::test]
    async fn cancellation_is_observed_immediately() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        // Even with an effectively unbounded search space, a pre-cancelled
        // receiver should stop at the first yield checkpoint.
        let result = produce_challenge_nonce(1, rx).await;
        assert!(result.is_none());
    }

    #[test]
    fn flipping_a_header_byte_breaks_a_valid_offer_with_overwhelming_probability() {
        let (tx, _rx) = watch::channel(false);
        drop(tx);
        let addrs = vec!["1.2.3.4:9000".to_string()];
        let nonce = futures::executor::block_on(produce_offer_nonce(
            7,
            &addrs,
            watch::channel(false).1,
        ))
        .expect("nonce found");
        let mut frame = Message::PeerOffer {
            challenge: 7,
            nonce,
            addresses: addrs,
        }
        .encode();
        assert!(offer_hash_valid(&frame));
        frame[0] ^= 0xff;
        assert!(!offer_hash_valid(&frame));
    }
}
