//! Append-only NAT event history and the ranked local-TA list derived from
//! it.
//!
//! Writers serialize through one lock; readers of the ranked list never
//! block on writers — the list is swapped as a whole reference via
//! `arc-swap`, giving the copy-on-write semantics the concurrency model
//! requires.

use crate::transport_address::TransportAddress;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatEventKind {
    NewEdge,
    EdgeClose,
    LocalMappingChange,
    RemoteMappingChange,
}

#[derive(Debug, Clone)]
pub struct NatDataPoint {
    pub timestamp: Instant,
    pub edge_local_id: i32,
    pub ta: Option<TransportAddress>,
    pub kind: NatEventKind,
}

/// Ordered, append-only; never mutated in place. Lives for as long as the
/// owning listener does.
pub struct NatHistory {
    points: Mutex<Vec<NatDataPoint>>,
    ranked_tas: ArcSwap<Vec<TransportAddress>>,
}

impl NatHistory {
    pub fn new(initial_local_tas: Vec<TransportAddress>) -> Self {
        NatHistory {
            points: Mutex::new(Vec::new()),
            ranked_tas: ArcSwap::from_pointee(initial_local_tas),
        }
    }

    /// Appends a data point and republishes the ranked TA list.
    pub fn record(&self, kind: NatEventKind, edge_local_id: i32, ta: Option<TransportAddress>) {
        let point = NatDataPoint { timestamp: Instant::now(), edge_local_id, ta, kind };
        let mut points = self.points.lock();
        points.push(point);
        let ranked = rank(&points);
        drop(points);
        self.ranked_tas.store(Arc::new(ranked));
    }

    /// A consistent snapshot of the currently advertised local TAs, ranked
    /// most-likely-correct first.
    pub fn ranked_tas(&self) -> Arc<Vec<TransportAddress>> {
        self.ranked_tas.load_full()
    }

    pub fn len(&self) -> usize {
        self.points.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Local mapping changes (the peer's reported view of our own TA) are
/// counted by distinct value; the most frequently reported TA ranks first,
/// ties broken by recency. TAs never reported via `LocalMappingChange`
/// but present in the seed list are appended last, in their original order.
fn rank(points: &[NatDataPoint]) -> Vec<TransportAddress> {
    let mut counts: HashMap<TransportAddress, (usize, Instant)> = HashMap::new();
    for p in points {
        if p.kind != NatEventKind::LocalMappingChange {
            continue;
        }
        if let Some(ta) = &p.ta {
            let entry = counts.entry(ta.clone()).or_insert((0, p.timestamp));
            entry.0 += 1;
            if p.timestamp > entry.1 {
                entry.1 = p.timestamp;
            }
        }
    }
    let mut ranked: Vec<(TransportAddress, usize, Instant)> =
        counts.into_iter().map(|(ta, (count, last))| (ta, count, last)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));
    ranked.into_iter().map(|(ta, _, _)| ta).collect()
}
