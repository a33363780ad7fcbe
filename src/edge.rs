//! A logical bidirectional channel multiplexed over the shared UDP socket.
//!
//! `Edge` owns no socket; it holds a [`SendHandler`] capability (provided by
//! the listener that created it) and mutable, lock-guarded endpoint state
//! that the listener's reader thread updates on NAT remaps. Event
//! subscription is an explicit `EdgeObserver` trait instead of delegates.

use crate::capability::SendHandler;
use crate::error::{OverlayError, Result};
use crate::transport_address::TransportAddress;
use crate::wire::UdpMessage;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

/// Observes inbound packets and closure for one edge. Registered once at
/// construction; replaces the source's `ReceivedPacket`/`CloseEvent`
/// delegates.
pub trait EdgeObserver: Send + Sync {
    fn on_receive(&self, payload: &[u8]);
    fn on_close(&self) {}
}

/// An observer that discards everything, for edges nobody is listening to
/// yet (or in tests that only care about the state machine).
pub struct NullObserver;

impl EdgeObserver for NullObserver {
    fn on_receive(&self, _payload: &[u8]) {}
}

struct EdgeState {
    remote_endpoint: SocketAddr,
    peer_view_of_local_ta: Option<TransportAddress>,
}

/// A logical channel to one peer. `local_id` is fixed at construction and
/// always nonzero; `remote_id` starts at `0` on outbound edges awaiting the
/// peer's handshake and is set exactly once thereafter.
pub struct Edge {
    pub local_id: i32,
    remote_id: AtomicI32,
    local_endpoint: SocketAddr,
    state: RwLock<EdgeState>,
    pub is_inbound: bool,
    closed: AtomicBool,
    sender: Arc<dyn SendHandler>,
    observer: Arc<dyn EdgeObserver>,
}

impl Edge {
    pub fn new(
        local_id: i32,
        remote_id: i32,
        local_endpoint: SocketAddr,
        remote_endpoint: SocketAddr,
        is_inbound: bool,
        sender: Arc<dyn SendHandler>,
        observer: Arc<dyn EdgeObserver>,
    ) -> Self {
        assert_ne!(local_id, 0, "local_id must be nonzero");
        Edge {
            local_id,
            remote_id: AtomicI32::new(remote_id),
            local_endpoint,
            state: RwLock::new(EdgeState { remote_endpoint, peer_view_of_local_ta: None }),
            is_inbound,
            closed: AtomicBool::new(false),
            sender,
            observer,
        }
    }

    pub fn remote_id(&self) -> i32 {
        self.remote_id.load(Ordering::SeqCst)
    }

    /// Sets `remote_id` the first time it is observed on the wire. Once
    /// nonzero, further attempts are a silent no-op (monotonic invariant).
    pub fn set_remote_id_once(&self, id: i32) {
        let _ = self.remote_id.compare_exchange(0, id, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn remote_endpoint(&self) -> SocketAddr {
        self.state.read().remote_endpoint
    }

    pub fn local_endpoint(&self) -> SocketAddr {
        self.local_endpoint
    }

    /// Remote NAT remap: the peer's apparent endpoint changed mid-session.
    /// Does not close the edge.
    pub fn remap_remote_endpoint(&self, new_endpoint: SocketAddr) {
        self.state.write().remote_endpoint = new_endpoint;
    }

    pub fn peer_view_of_local_ta(&self) -> Option<TransportAddress> {
        self.state.read().peer_view_of_local_ta.clone()
    }

    pub fn set_peer_view_of_local_ta(&self, ta: TransportAddress) {
        self.state.write().peer_view_of_local_ta = Some(ta);
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Closes the edge. A closed edge never reopens; repeated calls are
    /// idempotent no-ops after the first.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.observer.on_close();
        }
    }

    /// Delivers an inbound payload to this edge's observer, in wire-arrival
    /// order (the caller — the listener's reader thread — guarantees that).
    pub fn deliver(&self, payload: &[u8]) {
        self.observer.on_receive(payload);
    }

    /// Sends application payload on this edge. Fails with `EdgeClosed` if
    /// the edge has already been closed.
    pub fn send(&self, payload: Vec<u8>) -> Result<()> {
        if !self.is_open() {
            return Err(OverlayError::EdgeClosed);
        }
        let destination = self.remote_endpoint();
        let msg = UdpMessage::data(self.local_id, self.remote_id(), payload, destination);
        self.sender.send(msg)
    }
}
