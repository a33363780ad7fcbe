//! Status exchange: on each structured connection event, push a snapshot of
//! nearby connections to the two structured neighbors of whatever changed.

use crate::capability::{neighbor_entry, StatusMessage, StatusSink};
use crate::connection::{Connection, ConnectionClass, ConnectionTable, ConnectionTableObserver};
use std::sync::Arc;

pub const DEFAULT_MAX_NEIGHBORS: usize = 4;

/// Registered as a [`ConnectionTableObserver`]; reacts only to events on
/// `Near` connections (the structured ring), per the source's status
/// exchange scope.
pub struct StatusExchange {
    table: Arc<ConnectionTable>,
    sink: Arc<dyn StatusSink>,
    max_neighbors: usize,
}

impl StatusExchange {
    pub fn new(table: Arc<ConnectionTable>, sink: Arc<dyn StatusSink>, max_neighbors: usize) -> Self {
        StatusExchange { table, sink, max_neighbors }
    }

    fn handle_event(&self, c: &Connection) {
        if c.class != ConnectionClass::Near {
            return;
        }
        let left = self.table.get_left_structured_neighbor_of(&c.address);
        let right = self.table.get_right_structured_neighbor_of(&c.address);

        let mut targets = Vec::new();
        if let Some(l) = left {
            targets.push(l);
        }
        if let Some(r) = right {
            if !targets.iter().any(|t: &Arc<Connection>| t.address == r.address) {
                targets.push(r);
            }
        }

        let nearest = self.table.get_nearest_to(&c.address, self.max_neighbors);
        let msg = StatusMessage {
            neighbors: nearest.iter().map(|conn| neighbor_entry(&conn.address, &conn.ta)).collect(),
        };

        for target in targets {
            let sink = self.sink.clone();
            let ta = target.ta.clone();
            let msg = msg.clone();
            // Pushed on its own thread: status exchange is best-effort and
            // must never stall the connection-table mutation that triggered it.
            std::thread::spawn(move || {
                sink.push_status(&ta, msg);
            });
        }
    }
}

impl ConnectionTableObserver for StatusExchange {
    fn on_connect(&self, c: &Connection) {
        self.handle_event(c);
    }

    fn on_disconnect(&self, c: &Connection) {
        self.handle_event(c);
    }
}
