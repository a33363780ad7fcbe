//! The UDP edge listener: multiplexes many [`Edge`]s over one socket with a
//! dedicated reader thread and writer thread, per the concurrency model.

use crate::capability::{AllowAll, SendHandler, TaAuthorizer};
use crate::config::OverlayConfig;
use crate::edge::{Edge, EdgeObserver, NullObserver};
use crate::error::{OverlayError, Result};
use crate::nat::{NatEventKind, NatHistory};
use crate::transport_address::{TaType, TransportAddress};
use crate::wire::{self, ControlCode, EdgeDataAnnounce, Header, UdpMessage};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use rand::Rng;
use rand_pcg::Pcg32;
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Observes new inbound edges. Replaces the source's `EdgeEvent` delegate.
pub trait ListenerObserver: Send + Sync {
    fn on_new_edge(&self, edge: Arc<Edge>);
}

pub struct NullListenerObserver;
impl ListenerObserver for NullListenerObserver {
    fn on_new_edge(&self, _edge: Arc<Edge>) {}
}

struct EdgeTables {
    by_local_id: HashMap<i32, Arc<Edge>>,
    by_remote_id: HashMap<i32, Arc<Edge>>,
}

struct QueueSender {
    tx: Sender<Option<UdpMessage>>,
    soft_cap: usize,
}

impl SendHandler for QueueSender {
    fn send(&self, msg: UdpMessage) -> Result<()> {
        match self.tx.try_send(Some(msg)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(soft_cap = self.soft_cap, "send queue overflow; dropping outbound message");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Ok(()),
        }
    }
}

/// Multiplexes many logical edges over one UDP socket. Exactly two owned
/// threads (reader, writer) are spawned on [`Self::start`]; `start` may be
/// called at most once, `stop` is idempotent.
pub struct EdgeListener {
    socket: Arc<UdpSocket>,
    local_endpoint: SocketAddr,
    local_ta: TransportAddress,
    tables: Mutex<EdgeTables>,
    id_rng: Mutex<Pcg32>,
    ta_authorizer: Arc<dyn TaAuthorizer>,
    listener_observer: Arc<dyn ListenerObserver>,
    nat_hist: NatHistory,
    running: AtomicBool,
    started: AtomicBool,
    shutdown_ack: AtomicBool,
    send_queue_soft_cap: usize,
    queue_tx: Sender<Option<UdpMessage>>,
    queue_rx: Mutex<Option<Receiver<Option<UdpMessage>>>>,
    threads: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl EdgeListener {
    pub fn bind(config: &OverlayConfig, ta_authorizer: Arc<dyn TaAuthorizer>, listener_observer: Arc<dyn ListenerObserver>) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port))?;
        let local_endpoint = socket.local_addr()?;
        let local_ta = if let Some(ta) = config.local_tas.first() {
            ta.clone()
        } else {
            TransportAddress::from_socket_addr(TaType::Udp, local_endpoint)
        };
        let (queue_tx, queue_rx) = bounded(config.send_queue_soft_cap);

        Ok(Arc::new(EdgeListener {
            socket: Arc::new(socket),
            local_endpoint,
            local_ta,
            tables: Mutex::new(EdgeTables { by_local_id: HashMap::new(), by_remote_id: HashMap::new() }),
            id_rng: Mutex::new(Pcg32::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7)),
            ta_authorizer,
            listener_observer,
            nat_hist: NatHistory::new(config.local_tas.clone()),
            running: AtomicBool::new(false),
            started: AtomicBool::new(false),
            shutdown_ack: AtomicBool::new(false),
            send_queue_soft_cap: config.send_queue_soft_cap,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            threads: Mutex::new(None),
        }))
    }

    pub fn with_default_authorizer(config: &OverlayConfig, listener_observer: Arc<dyn ListenerObserver>) -> Result<Arc<Self>> {
        Self::bind(config, Arc::new(AllowAll), listener_observer)
    }

    pub fn local_endpoint(&self) -> SocketAddr {
        self.local_endpoint
    }

    pub fn local_ta(&self) -> &TransportAddress {
        &self.local_ta
    }

    pub fn ta_type(&self) -> TaType {
        TaType::Udp
    }

    pub fn local_tas(&self) -> Vec<TransportAddress> {
        self.nat_hist.ranked_tas().as_ref().clone()
    }

    pub fn edge_count(&self) -> usize {
        self.tables.lock().by_local_id.len()
    }

    /// Actively opens an edge to `ta`: allocates a local id, registers the
    /// edge awaiting the peer's handshake (`remote_id` still `0`), and sends
    /// the first datagram. `observer` is wired in up front so no inbound
    /// packet on the new edge is ever missed.
    pub fn create_edge_to(self: &Arc<Self>, ta: &TransportAddress, observer: Arc<dyn EdgeObserver>) -> Result<Arc<Edge>> {
        if ta.ta_type != TaType::Udp {
            return Err(OverlayError::WrongTaType);
        }
        if !self.running.load(Ordering::SeqCst) {
            return Err(OverlayError::NotStarted);
        }
        let destination = ta.socket_addr().ok_or_else(|| OverlayError::MalformedDatagram {
            reason: format!("unresolvable host in {ta}"),
        })?;

        let mut tables = self.tables.lock();
        let local_id = self.allocate_local_id_locked(&tables);
        let edge = Arc::new(Edge::new(local_id, 0, self.local_endpoint, destination, false, self.sender_handle(), observer));
        tables.by_local_id.insert(local_id, edge.clone());
        drop(tables);

        let handshake = UdpMessage::data(local_id, 0, Vec::new(), destination);
        self.sender_handle().send(handshake)?;
        Ok(edge)
    }

    /// Starts the reader and writer threads. May be called at most once.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(OverlayError::RestartAttempted);
        }
        self.running.store(true, Ordering::SeqCst);

        let reader_self = self.clone();
        let reader = thread::spawn(move || reader_self.reader_loop());

        let queue_rx = self.queue_rx.lock().take().expect("queue receiver taken exactly once");
        let writer_self = self.clone();
        let writer = thread::spawn(move || writer_self.writer_loop(queue_rx));

        *self.threads.lock() = Some((reader, writer));
        Ok(())
    }

    /// Cooperative shutdown: idempotent, joins both threads, closes all
    /// edges.
    pub fn stop(self: &Arc<Self>) {
        if !self.running.swap(false, Ordering::SeqCst) {
            // Already stopped (or never started); still make sure edges are closed.
            self.close_all_edges();
            return;
        }

        for _ in 0..20 {
            if self.shutdown_ack.load(Ordering::SeqCst) {
                break;
            }
            let _ = self.socket.send_to(&wire::encode_control(0, 0, ControlCode::Null, &[]), self.local_endpoint);
            thread::sleep(Duration::from_millis(500));
        }
        let _ = self.queue_tx.send(None);

        if let Some((reader, writer)) = self.threads.lock().take() {
            let _ = reader.join();
            let _ = writer.join();
        }
        self.close_all_edges();
    }

    fn close_all_edges(&self) {
        let tables = self.tables.lock();
        for edge in tables.by_local_id.values() {
            edge.close();
        }
    }

    fn sender_handle(&self) -> Arc<dyn SendHandler> {
        Arc::new(QueueSender { tx: self.queue_tx.clone(), soft_cap: self.send_queue_soft_cap })
    }

    fn allocate_local_id_locked(&self, tables: &EdgeTables) -> i32 {
        let mut rng = self.id_rng.lock();
        loop {
            let candidate = (rng.gen::<u32>() & 0x7FFF_FFFF) as i32;
            if candidate != 0 && !tables.by_local_id.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn reader_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];
        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, src)) => self.handle_datagram(&buf[..len], src),
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        tracing::warn!(error = %e, "transient socket error on recv");
                    }
                }
            }
        }
        self.shutdown_ack.store(true, Ordering::SeqCst);
    }

    fn writer_loop(self: Arc<Self>, rx: Receiver<Option<UdpMessage>>) {
        while let Ok(item) = rx.recv() {
            let Some(msg) = item else { break };
            let datagram = msg.encode();
            if let Err(e) = self.socket.send_to(&datagram, msg.destination) {
                tracing::warn!(error = %e, dest = %msg.destination, "transient socket error on send");
            }
        }
    }

    fn handle_datagram(self: &Arc<Self>, data: &[u8], src: SocketAddr) {
        let Some((hdr, payload)) = wire::parse_header(data) else {
            tracing::warn!(src = %src, len = data.len(), "malformed datagram: too short");
            return;
        };
        if hdr.is_control() {
            self.handle_control(hdr, payload, src);
        } else {
            self.handle_data(hdr, payload, src);
        }
    }

    fn handle_data(self: &Arc<Self>, hdr: Header, payload: &[u8], src: SocketAddr) {
        let local_id = hdr.local_id;
        let remote_id = hdr.remote_id;

        if local_id == 0 {
            let mut tables = self.tables.lock();
            if let Some(existing) = tables.by_remote_id.get(&remote_id).cloned() {
                if existing.remote_endpoint() == src {
                    drop(tables);
                    existing.deliver(payload);
                    return;
                }
                // Different endpoint claiming the same remote_id: a coincidence.
                // Fall through and allocate a fresh edge.
            }

            let candidate_ta = TransportAddress::from_socket_addr(TaType::Udp, src);
            if !self.ta_authorizer.authorize(&candidate_ta) {
                tracing::warn!(src = %src, "rejected inbound handshake: unauthorized TA");
                return;
            }

            let new_local_id = self.allocate_local_id_locked(&tables);
            let observer: Arc<dyn EdgeObserver> = Arc::new(NullObserver);
            let edge = Arc::new(Edge::new(
                new_local_id,
                remote_id,
                self.local_endpoint,
                src,
                true,
                self.sender_handle(),
                observer,
            ));
            tables.by_local_id.insert(new_local_id, edge.clone());
            tables.by_remote_id.insert(remote_id, edge.clone());
            drop(tables);

            self.nat_hist.record(NatEventKind::NewEdge, new_local_id, Some(candidate_ta));
            self.listener_observer.on_new_edge(edge.clone());
            self.announce_edge(&edge, src);
            edge.deliver(payload);
            return;
        }

        let edge = { self.tables.lock().by_local_id.get(&local_id).cloned() };
        let Some(edge) = edge else {
            self.reply_edge_closed(hdr, src);
            return;
        };

        if edge.remote_id() == 0 {
            edge.set_remote_id_once(remote_id);
            self.tables.lock().by_remote_id.insert(remote_id, edge.clone());
            edge.deliver(payload);
            return;
        }

        if edge.remote_id() != remote_id {
            self.reply_edge_closed(hdr, src);
            return;
        }

        if edge.remote_endpoint() != src {
            let candidate_ta = TransportAddress::from_socket_addr(TaType::Udp, src);
            if !self.ta_authorizer.authorize(&candidate_ta) {
                self.reply_edge_closed(hdr, src);
                edge.close();
                return;
            }
            edge.remap_remote_endpoint(src);
            self.nat_hist.record(NatEventKind::RemoteMappingChange, edge.local_id, Some(candidate_ta));
            self.announce_edge(&edge, src);
            edge.deliver(payload);
            return;
        }

        edge.deliver(payload);
    }

    fn handle_control(self: &Arc<Self>, hdr: Header, payload: &[u8], src: SocketAddr) {
        let local_id = !hdr.local_id;
        let edge = { self.tables.lock().by_local_id.get(&local_id).cloned() };
        let Some(edge) = edge else {
            return;
        };
        if payload.len() < 4 {
            tracing::warn!(src = %src, "malformed control body: missing code");
            return;
        }
        let code = i32::from_be_bytes(payload[0..4].try_into().unwrap());
        match ControlCode::from_i32(code) {
            Some(ControlCode::EdgeClosed) => {
                edge.close();
            }
            Some(ControlCode::EdgeDataAnnounce) => match EdgeDataAnnounce::decode(&payload[4..]) {
                Ok(announce) => {
                    let current = edge.peer_view_of_local_ta().map(|ta| ta.to_string());
                    if current.as_deref() != Some(announce.remote_ta.as_str()) {
                        if let Ok(new_ta) = announce.remote_ta.parse() {
                            edge.set_peer_view_of_local_ta(new_ta.clone());
                            self.nat_hist.record(NatEventKind::LocalMappingChange, edge.local_id, Some(new_ta));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(src = %src, error = %e, "malformed EdgeDataAnnounce body");
                }
            },
            Some(ControlCode::Null) => {}
            None => {
                tracing::warn!(src = %src, code, "unrecognized control code");
            }
        }
    }

    fn reply_edge_closed(&self, hdr: Header, src: SocketAddr) {
        let msg = UdpMessage::control(hdr.local_id, hdr.remote_id, ControlCode::EdgeClosed, Vec::new(), src);
        let _ = self.sender_handle().send(msg);
    }

    fn announce_edge(&self, edge: &Arc<Edge>, dest: SocketAddr) {
        let remote_ta = TransportAddress::from_socket_addr(TaType::Udp, dest);
        let body = EdgeDataAnnounce::new(&remote_ta, &self.local_ta).encode();
        let msg = UdpMessage::control(edge.local_id, edge.remote_id(), ControlCode::EdgeDataAnnounce, body, dest);
        let _ = self.sender_handle().send(msg);
    }
}
