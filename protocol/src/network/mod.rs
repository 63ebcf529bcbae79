//! # Network Module
//!
//! Peer-to-peer gossip overlay: mesh membership, the wire-protocol
//! connection state machine, and message dissemination.
//!
//! ```text
//! connection.rs      — per-peer-socket state machine
//! api_connection.rs  — per-subscriber-socket handling
//! mesh.rs            — peer set ownership, discovery/challenge loops
//! dissemination.rs   — message ids, seen-cache, fan-out, pending validation
//! subscribers.rs      — data-type -> subscriber registry
//! node.rs            — wires mesh + dissemination + both listeners together
//! ```
//!
//! ## Design decisions
//!
//! - The mesh controller is the single facade connection tasks call back
//!   into (`validate_peer`-style narrow methods); it holds a `Weak` handle
//!   to the dissemination engine rather than the reverse, so neither side
//!   strongly owns the other. Connections hold only a `Weak<Mesh>` so their
//!   tasks never outlive the mesh they belong to.
//! - Peer-set mutation always locks `unverified -> pull -> push`, matching
//!   the acquisition order documented in the mesh module.

pub mod api_connection;
pub mod connection;
pub mod dissemination;
pub mod mesh;
pub mod node;
pub mod subscribers;

pub use connection::{ConnState, Direction, PeerHandle};
pub use dissemination::Dissemination;
pub use mesh::{Mesh, PeerId};
pub use node::GossipNode;
pub use subscribers::{ApiHandle, ApiId, SubscriberRegistry};
