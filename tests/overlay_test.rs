//! End-to-end exercises of the UDP edge listener against real sockets on
//! loopback, covering the handshake state machine, NAT remap, and the
//! control sub-protocol.

use annulus::capability::AllowAll;
use annulus::edge::{Edge, EdgeObserver};
use annulus::listener::{EdgeListener, ListenerObserver, NullListenerObserver};
use annulus::{OverlayConfig, TaType, TransportAddress};

use parking_lot::Mutex;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

struct RecordingObserver {
    received: Mutex<Vec<Vec<u8>>>,
}

impl RecordingObserver {
    fn new() -> Arc<Self> {
        Arc::new(RecordingObserver { received: Mutex::new(Vec::new()) })
    }
}

impl EdgeObserver for RecordingObserver {
    fn on_receive(&self, payload: &[u8]) {
        self.received.lock().push(payload.to_vec());
    }
}

struct CapturingListenerObserver {
    edges: Mutex<Vec<Arc<Edge>>>,
}

impl CapturingListenerObserver {
    fn new() -> Arc<Self> {
        Arc::new(CapturingListenerObserver { edges: Mutex::new(Vec::new()) })
    }
}

impl ListenerObserver for CapturingListenerObserver {
    fn on_new_edge(&self, edge: Arc<Edge>) {
        self.edges.lock().push(edge);
    }
}

fn start_listener() -> Arc<EdgeListener> {
    let config = OverlayConfig { port: 0, ..OverlayConfig::default() };
    let listener = EdgeListener::bind(&config, Arc::new(AllowAll), Arc::new(NullListenerObserver)).unwrap();
    listener.start().unwrap();
    listener
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..150 {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(cond(), "condition did not become true within the timeout");
}

#[test]
fn handshake_then_bidirectional_payload_delivery() {
    let a = start_listener();
    let b_observer = CapturingListenerObserver::new();
    let config_b = OverlayConfig { port: 0, ..OverlayConfig::default() };
    let b = EdgeListener::bind(&config_b, Arc::new(AllowAll), b_observer.clone()).unwrap();
    b.start().unwrap();

    let b_ta = TransportAddress::from_socket_addr(TaType::Udp, b.local_endpoint());
    let a_observer = RecordingObserver::new();
    let a_edge = a.create_edge_to(&b_ta, a_observer.clone()).unwrap();

    wait_until(|| !b_observer.edges.lock().is_empty());
    let b_edge = b_observer.edges.lock()[0].clone();

    b_edge.send(b"hello from b".to_vec()).unwrap();
    wait_until(|| !a_observer.received.lock().is_empty());
    assert_eq!(a_observer.received.lock()[0], b"hello from b");

    a_edge.send(b"hello from a".to_vec()).unwrap();
    wait_until(|| a_edge.is_open() && b_edge.is_open());

    a.stop();
    b.stop();
}

#[test]
fn duplicate_first_packet_from_same_endpoint_reuses_one_edge() {
    let listener = start_listener();
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    let dest = listener.local_endpoint();

    // remote_id = 5 (this peer's self-declared id), local_id = 0 (unhandshaked).
    let datagram = annulus::wire::encode_data(5, 0, b"first");
    peer.send_to(&datagram, dest).unwrap();
    peer.send_to(&datagram, dest).unwrap();

    wait_until(|| listener.edge_count() == 1);
    assert_eq!(listener.edge_count(), 1);

    listener.stop();
}

#[test]
fn unrecognized_local_id_gets_an_edge_closed_reply() {
    let listener = start_listener();
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let dest = listener.local_endpoint();

    // remote_id = 1 (this peer's self-declared id), local_id = 12345 (a
    // target edge id the listener has never allocated).
    let datagram = annulus::wire::encode_data(1, 12345, b"stray");
    peer.send_to(&datagram, dest).unwrap();

    let mut buf = [0u8; 64];
    let (len, _src) = peer.recv_from(&mut buf).expect("expected an EdgeClosed reply");
    let (hdr, payload) = annulus::wire::parse_header(&buf[..len]).unwrap();
    assert!(hdr.is_control());
    let code = i32::from_be_bytes(payload[0..4].try_into().unwrap());
    assert_eq!(annulus::wire::ControlCode::from_i32(code), Some(annulus::wire::ControlCode::EdgeClosed));

    listener.stop();
}

#[test]
fn remote_nat_remap_updates_the_edge_endpoint_and_announces() {
    let observer = CapturingListenerObserver::new();
    let config = OverlayConfig { port: 0, ..OverlayConfig::default() };
    let listener = EdgeListener::bind(&config, Arc::new(AllowAll), observer.clone()).unwrap();
    listener.start().unwrap();

    let peer_old = UdpSocket::bind("127.0.0.1:0").unwrap();
    let dest = listener.local_endpoint();

    // remote_id = 77 (this peer's self-declared id), local_id = 0 (handshake).
    let handshake = annulus::wire::encode_data(77, 0, b"hi");
    peer_old.send_to(&handshake, dest).unwrap();
    wait_until(|| !observer.edges.lock().is_empty());
    let edge = observer.edges.lock()[0].clone();
    let assigned_local_id = edge.local_id;
    assert_eq!(edge.remote_endpoint(), peer_old.local_addr().unwrap());

    let peer_new = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer_new.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    // Still remote_id 77, now addressed to the edge the listener assigned us.
    let remapped = annulus::wire::encode_data(77, assigned_local_id, b"hi again from a new port");
    peer_new.send_to(&remapped, dest).unwrap();

    wait_until(|| edge.remote_endpoint() == peer_new.local_addr().unwrap());

    // The listener announces the new TA back to the peer's new endpoint.
    let mut buf = [0u8; 256];
    let (len, _src) = peer_new.recv_from(&mut buf).expect("expected an EdgeDataAnnounce");
    let (hdr, _payload) = annulus::wire::parse_header(&buf[..len]).unwrap();
    assert!(hdr.is_control());

    listener.stop();
}
