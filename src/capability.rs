//! Capabilities injected into core components instead of back-references or
//! a process-global singleton.
//!
//! The source this overlay is modeled on reaches an `RpcManager` through a
//! process-adjacent singleton and gives edges a cyclic back-reference into
//! their owning listener. Both are replaced here with narrow traits: the
//! dependency always points from the core component outward to the
//! capability, never back in.

use crate::address::Address;
use crate::error::Result;
use crate::transport_address::TransportAddress;
use crate::wire::UdpMessage;
use serde::{Deserialize, Serialize};

/// Decides whether a transport address is allowed to establish an edge.
/// Default policy (see [`crate::config::OverlayConfig`]) is allow-all.
pub trait TaAuthorizer: Send + Sync {
    fn authorize(&self, ta: &TransportAddress) -> bool;
}

/// An authorizer that accepts every transport address.
pub struct AllowAll;

impl TaAuthorizer for AllowAll {
    fn authorize(&self, _ta: &TransportAddress) -> bool {
        true
    }
}

impl<F> TaAuthorizer for F
where
    F: Fn(&TransportAddress) -> bool + Send + Sync,
{
    fn authorize(&self, ta: &TransportAddress) -> bool {
        self(ta)
    }
}

/// One neighbor entry in a [`StatusMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusNeighbor {
    pub address: String,
    pub ta: String,
}

/// The payload pushed to a structured neighbor on a connection event: the
/// `max_neighbors_in_status` connections nearest the address that changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub neighbors: Vec<StatusNeighbor>,
}

/// Capability that delivers a [`StatusMessage`] to a peer. Stands in for the
/// `sys:link.GetStatus` RPC call; failures are the caller's to swallow, per
/// the status exchange's best-effort contract.
pub trait StatusSink: Send + Sync {
    fn push_status(&self, target: &TransportAddress, msg: StatusMessage);
}

/// A `StatusSink` that does nothing — for tests, and for deployments with no
/// higher-layer RPC stack wired in yet.
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn push_status(&self, _target: &TransportAddress, _msg: StatusMessage) {}
}

/// Capability an [`crate::edge::Edge`] holds instead of a back-reference to
/// its owning listener. The listener implements this and hands each edge it
/// creates a cheap `Arc` to the send queue.
pub trait SendHandler: Send + Sync {
    fn send(&self, msg: UdpMessage) -> Result<()>;
}

/// Marker used when a status push needs to name "this node's address" as
/// the subject of the message, independent of any particular neighbor.
pub fn neighbor_entry(address: &Address, ta: &TransportAddress) -> StatusNeighbor {
    StatusNeighbor { address: address.to_string(), ta: ta.to_string() }
}
