// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! A peer-to-peer gossip overlay: an unstructured mesh of TCP peers that
//! disseminates application-level announcements to local subscribers
//! attached over a control API.
//!
//! The core is three tightly coupled subsystems: the mesh controller
//! ([`network::Mesh`]) that maintains push/pull/unverified peer sets behind
//! a proof-of-work-gated handshake, the dissemination engine
//! ([`network::Dissemination`]) that routes announcements with loop
//! suppression and a subscriber-validation hold-queue, and the wire codec
//! ([`codec`]) and per-connection state machine that carries both.

pub mod addr;
pub mod boundedset;
pub mod codec;
pub mod error;
pub mod network;
pub mod pow;
pub mod settings;

pub use addr::Endpoint;
pub use error::{GossipError, Result};
pub use network::GossipNode;
pub use settings::Settings;
