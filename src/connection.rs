//! The per-node connection table: sorted neighbor sets per connection
//! class, plus a global sorted view the router consults directly.

use crate::address::Address;
use crate::edge::Edge;
use crate::transport_address::TransportAddress;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    Near,
    Shortcut,
    Leaf,
}

/// Relates a neighbor address, its advertised TA, its connection class, and
/// the edge carrying traffic to it. At most one `Connection` exists per
/// `(address, class)` pair at a time.
pub struct Connection {
    pub address: Address,
    pub ta: TransportAddress,
    pub class: ConnectionClass,
    pub edge: Arc<Edge>,
}

/// Registered once per table; fired after a mutation is visible to new
/// readers, replacing the source's `ConnectionEvent`/`DisconnectionEvent`
/// delegates.
pub trait ConnectionTableObserver: Send + Sync {
    fn on_connect(&self, _c: &Connection) {}
    fn on_disconnect(&self, _c: &Connection) {}
}

struct Inner {
    near: Vec<Arc<Connection>>,
    shortcut: Vec<Arc<Connection>>,
    leaf: Vec<Arc<Connection>>,
    global: Vec<Arc<Connection>>,
}

impl Inner {
    fn class_list(&mut self, class: ConnectionClass) -> &mut Vec<Arc<Connection>> {
        match class {
            ConnectionClass::Near => &mut self.near,
            ConnectionClass::Shortcut => &mut self.shortcut,
            ConnectionClass::Leaf => &mut self.leaf,
        }
    }

    fn class_list_ref(&self, class: ConnectionClass) -> &Vec<Arc<Connection>> {
        match class {
            ConnectionClass::Near => &self.near,
            ConnectionClass::Shortcut => &self.shortcut,
            ConnectionClass::Leaf => &self.leaf,
        }
    }
}

/// Mapping from connection class to a sorted sequence of neighbor
/// addresses, plus a global sorted sequence across all classes. All
/// mutations are serialized by one table-scoped lock; readers take a cheap
/// snapshot (an `Arc` clone per connection).
pub struct ConnectionTable {
    inner: RwLock<Inner>,
    observers: RwLock<Vec<Arc<dyn ConnectionTableObserver>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        ConnectionTable {
            inner: RwLock::new(Inner { near: Vec::new(), shortcut: Vec::new(), leaf: Vec::new(), global: Vec::new() }),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn register_observer(&self, observer: Arc<dyn ConnectionTableObserver>) {
        self.observers.write().push(observer);
    }

    /// Inserts preserving sorted order. Returns `false` if `addr` is
    /// already present in `class`.
    pub fn add(&self, connection: Connection) -> bool {
        let connection = Arc::new(connection);
        let fired = {
            let mut inner = self.inner.write();
            let class = connection.class;
            {
                let list = inner.class_list(class);
                let pos = list.partition_point(|c| c.address < connection.address);
                if pos < list.len() && list[pos].address == connection.address {
                    return false;
                }
                list.insert(pos, connection.clone());
            }
            let pos = inner.global.partition_point(|c| c.address < connection.address);
            if pos >= inner.global.len() || inner.global[pos].address != connection.address {
                inner.global.insert(pos, connection.clone());
            }
            connection.clone()
        };
        let observers = self.observers.read();
        for obs in observers.iter() {
            obs.on_connect(&fired);
        }
        true
    }

    /// Removes `addr` from whichever class holds it, and from the global
    /// view, atomically from readers' perspective.
    pub fn remove(&self, addr: &Address) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            let mut found = None;
            for class in [ConnectionClass::Near, ConnectionClass::Shortcut, ConnectionClass::Leaf] {
                let list = inner.class_list(class);
                if let Ok(pos) = list.binary_search_by(|c| c.address.cmp(addr)) {
                    found = Some(list.remove(pos));
                    break;
                }
            }
            if let Some(ref c) = found {
                // The same address may still be registered under a different
                // class (the global view is a dedup-by-address merge), so
                // only drop the global entry once no class holds it anymore.
                let still_present = [ConnectionClass::Near, ConnectionClass::Shortcut, ConnectionClass::Leaf]
                    .iter()
                    .any(|&class| inner.class_list_ref(class).iter().any(|x| x.address == c.address));
                if !still_present {
                    if let Ok(pos) = inner.global.binary_search_by(|x| x.address.cmp(&c.address)) {
                        inner.global.remove(pos);
                    }
                }
            }
            found
        };
        match removed {
            Some(c) => {
                let observers = self.observers.read();
                for obs in observers.iter() {
                    obs.on_disconnect(&c);
                }
                true
            }
            None => false,
        }
    }

    /// Nonnegative position in the global list if `addr` is present;
    /// bitwise complement of the insertion point if absent.
    pub fn index_of(&self, addr: &Address) -> i64 {
        let inner = self.inner.read();
        match inner.global.binary_search_by(|c| c.address.cmp(addr)) {
            Ok(pos) => pos as i64,
            Err(ip) => !(ip as i64),
        }
    }

    /// Indexes into the global list with Python-style negative wrap.
    /// Returns `None` only if the table is empty.
    pub fn get_by_index(&self, i: i64) -> Option<Arc<Connection>> {
        let inner = self.inner.read();
        let len = inner.global.len() as i64;
        if len == 0 {
            return None;
        }
        let idx = i.rem_euclid(len) as usize;
        Some(inner.global[idx].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Neighbor of `a` among Near connections whose address is the first
    /// strictly greater than `a` in ring order (excludes `a` itself).
    pub fn get_left_structured_neighbor_of(&self, a: &Address) -> Option<Arc<Connection>> {
        let inner = self.inner.read();
        left_neighbor_at(&inner.near, a)
    }

    /// Neighbor of `a` among Near connections whose address is the last
    /// strictly less than (or wrapping before) `a` in ring order (excludes
    /// `a` itself).
    pub fn get_right_structured_neighbor_of(&self, a: &Address) -> Option<Arc<Connection>> {
        let inner = self.inner.read();
        right_neighbor_at(&inner.near, a)
    }

    /// The `k` connections (over all classes) whose absolute ring distance
    /// to `a` is smallest, in increasing distance.
    pub fn get_nearest_to(&self, a: &Address, k: usize) -> Vec<Arc<Connection>> {
        let inner = self.inner.read();
        let mut all: Vec<Arc<Connection>> = inner.global.clone();
        all.sort_by_key(|c| c.address.abs_distance_to(a));
        all.truncate(k);
        all
    }

    pub fn get_connections(&self, class: ConnectionClass) -> Vec<Arc<Connection>> {
        self.inner.read().class_list_ref(class).clone()
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// First entry strictly greater than `a` (modular); always excludes `a`
/// itself since the boundary is past every entry `<= a`.
fn left_neighbor_at(near: &[Arc<Connection>], a: &Address) -> Option<Arc<Connection>> {
    if near.is_empty() {
        return None;
    }
    let boundary = near.partition_point(|c| &c.address <= a);
    Some(near[boundary % near.len()].clone())
}

/// Last entry strictly less than `a` (modular); always excludes `a` itself
/// since the boundary sits at the first entry `>= a`, and its predecessor
/// is therefore strictly less.
fn right_neighbor_at(near: &[Arc<Connection>], a: &Address) -> Option<Arc<Connection>> {
    let len = near.len();
    if len == 0 {
        return None;
    }
    let boundary = near.partition_point(|c| &c.address < a);
    let idx = (boundary + len - 1) % len;
    Some(near[idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AllowAll, SendHandler};
    use crate::edge::NullObserver;
    use crate::error::Result;
    use crate::transport_address::TaType;
    use crate::wire::UdpMessage;
    use std::net::SocketAddr;

    struct NullSender;
    impl SendHandler for NullSender {
        fn send(&self, _msg: UdpMessage) -> Result<()> {
            Ok(())
        }
    }

    fn addr(n: u64) -> Address {
        // reach into the crate-private constructor via the public byte path
        let mut buf = [0u8; crate::address::ADDRESS_BYTES];
        let bytes = n.to_be_bytes();
        buf[crate::address::ADDRESS_BYTES - 8..].copy_from_slice(&bytes);
        Address::from_bytes_be(&buf)
    }

    fn connection(n: u64, class: ConnectionClass) -> Connection {
        let sock: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let edge = Arc::new(Edge::new(1, 2, sock, sock, false, Arc::new(NullSender), Arc::new(NullObserver)));
        Connection { address: addr(n), ta: TransportAddress::new(TaType::Udp, "127.0.0.1", 9000), class, edge }
    }

    #[test]
    fn add_rejects_duplicates_in_same_class() {
        let table = ConnectionTable::new();
        assert!(table.add(connection(10, ConnectionClass::Near)));
        assert!(!table.add(connection(10, ConnectionClass::Near)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn index_of_matches_sortedness_invariant() {
        let table = ConnectionTable::new();
        table.add(connection(10, ConnectionClass::Near));
        table.add(connection(30, ConnectionClass::Shortcut));
        table.add(connection(20, ConnectionClass::Near));
        for (i, want) in [(10u64, 0i64), (20, 1), (30, 2)] {
            assert_eq!(table.index_of(&addr(i)), want);
        }
        assert!(table.index_of(&addr(15)) < 0);
    }

    #[test]
    fn remove_is_total_across_views() {
        let table = ConnectionTable::new();
        table.add(connection(10, ConnectionClass::Near));
        assert!(table.remove(&addr(10)));
        assert_eq!(table.len(), 0);
        assert!(table.get_connections(ConnectionClass::Near).is_empty());
        assert!(!table.remove(&addr(10)));
    }

    #[test]
    fn structured_neighbors_exclude_self() {
        let table = ConnectionTable::new();
        table.add(connection(10, ConnectionClass::Near));
        table.add(connection(20, ConnectionClass::Near));
        table.add(connection(30, ConnectionClass::Near));
        let left = table.get_left_structured_neighbor_of(&addr(20)).unwrap();
        let right = table.get_right_structured_neighbor_of(&addr(20)).unwrap();
        assert_eq!(left.address, addr(30));
        assert_eq!(right.address, addr(10));
    }

    #[test]
    fn global_view_dedups_an_address_present_in_two_classes() {
        let table = ConnectionTable::new();
        assert!(table.add(connection(10, ConnectionClass::Near)));
        assert!(table.add(connection(10, ConnectionClass::Shortcut)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.index_of(&addr(10)), 0);

        // Removing the Near registration leaves the Shortcut one in place,
        // so the address must still be visible in the global view.
        assert!(table.remove(&addr(10)));
        assert_eq!(table.len(), 1);
        assert!(table.get_connections(ConnectionClass::Shortcut).iter().any(|c| c.address == addr(10)));
    }

    #[test]
    fn get_by_index_wraps_negative() {
        let table = ConnectionTable::new();
        table.add(connection(10, ConnectionClass::Near));
        table.add(connection(20, ConnectionClass::Near));
        assert_eq!(table.get_by_index(-1).unwrap().address, addr(20));
        assert_eq!(table.get_by_index(2).unwrap().address, addr(10));
    }
}
