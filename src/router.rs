//! Next-hop routing decisions: greedy, exact, and annealing modes over the
//! connection table.

use crate::address::Address;
use crate::connection::ConnectionTable;
use num_bigint::BigUint;
use std::sync::Arc;

pub const DEFAULT_MAX_TTL: u32 = 30;
pub const DEFAULT_MAX_UPHILL_HOPS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    Greedy,
    Exact,
    Annealing,
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub src: Address,
    pub dst: Address,
    pub mode: RoutingMode,
    pub hops: u32,
}

/// Outcome of a next-hop decision: an optional forwarding target plus
/// whether the packet should also be delivered to the local application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub next: Option<Address>,
    pub deliver_locally: bool,
}

impl NextHop {
    fn drop_packet() -> Self {
        NextHop { next: None, deliver_locally: false }
    }

    fn deliver_only() -> Self {
        NextHop { next: None, deliver_locally: true }
    }

    fn forward(to: Address) -> Self {
        NextHop { next: Some(to), deliver_locally: false }
    }
}

pub struct Router {
    local: Address,
    table: Arc<ConnectionTable>,
    max_ttl: u32,
    max_uphill_hops: u32,
}

impl Router {
    pub fn new(local: Address, table: Arc<ConnectionTable>) -> Self {
        Router { local, table, max_ttl: DEFAULT_MAX_TTL, max_uphill_hops: DEFAULT_MAX_UPHILL_HOPS }
    }

    pub fn with_limits(local: Address, table: Arc<ConnectionTable>, max_ttl: u32, max_uphill_hops: u32) -> Self {
        Router { local, table, max_ttl, max_uphill_hops }
    }

    pub fn next_hop(&self, from: Option<&Address>, packet: &Packet) -> NextHop {
        if packet.hops > self.max_ttl {
            return NextHop::drop_packet();
        }
        if self.local == packet.dst {
            return NextHop::deliver_only();
        }
        if self.table.index_of(&packet.dst) >= 0 {
            return NextHop::forward(packet.dst.clone());
        }
        if self.table.is_empty() {
            return NextHop::deliver_only();
        }

        let insertion = (!self.table.index_of(&packet.dst)) as i64;
        let left = self.table.get_by_index(insertion).expect("nonempty table");
        let right = self.table.get_by_index(insertion - 1).expect("nonempty table");
        let l_dist = packet.dst.abs_distance_to(&left.address);
        let r_dist = packet.dst.abs_distance_to(&right.address);
        let (closest, closest_dist, other, closest_idx) = if l_dist <= r_dist {
            (left.address.clone(), l_dist, right.address.clone(), insertion)
        } else {
            (right.address.clone(), r_dist, left.address.clone(), insertion - 1)
        };

        let mode = if matches!(packet.mode, RoutingMode::Exact) { RoutingMode::Greedy } else { packet.mode };

        let decision = match mode {
            RoutingMode::Greedy | RoutingMode::Exact => {
                let our_dist = packet.dst.abs_distance_to(&self.local);
                if closest_dist < our_dist && from != Some(&closest) {
                    NextHop::forward(closest)
                } else {
                    NextHop::deliver_only()
                }
            }
            RoutingMode::Annealing => {
                self.annealing_decision(from, packet, &left.address, &right.address, &closest, &closest_dist, &other, closest_idx)
            }
        };

        if matches!(packet.mode, RoutingMode::Exact) {
            NextHop { next: decision.next, deliver_locally: false }
        } else {
            decision
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn annealing_decision(
        &self,
        from: Option<&Address>,
        packet: &Packet,
        left: &Address,
        right: &Address,
        closest: &Address,
        closest_dist: &BigUint,
        other: &Address,
        closest_idx: i64,
    ) -> NextHop {
        let dst_left_neighbor = self.table.get_left_structured_neighbor_of(&packet.dst);
        let local_left_neighbor = self.table.get_left_structured_neighbor_of(&self.local);
        if let (Some(a), Some(b)) = (&dst_left_neighbor, &local_left_neighbor) {
            if a.address == b.address {
                let next = if self.local.is_left_of(&packet.dst) { right.clone() } else { left.clone() };
                return NextHop { next: Some(next), deliver_locally: true };
            }
        }

        if packet.hops == 0 {
            return NextHop::forward(closest.clone());
        }

        if packet.hops <= self.max_uphill_hops {
            if from == Some(closest) {
                let second = if closest_idx == (!self.table.index_of(&packet.dst)) as i64 {
                    self.table.get_by_index(closest_idx + 1)
                } else {
                    self.table.get_by_index(closest_idx - 1)
                };
                let candidates: Vec<Address> = second
                    .map(|s| s.address.clone())
                    .into_iter()
                    .chain(std::iter::once(other.clone()))
                    .filter(|a| from != Some(a))
                    .collect();
                return match candidates.into_iter().min_by_key(|a| packet.dst.abs_distance_to(a)) {
                    Some(target) => NextHop::forward(target),
                    None => NextHop::drop_packet(),
                };
            }
            return NextHop::forward(closest.clone());
        }

        let prev_dist = match from {
            Some(f) => packet.dst.abs_distance_to(f),
            None => closest_dist.clone() + BigUint::from(1u8),
        };
        if closest_dist < &prev_dist {
            NextHop::forward(closest.clone())
        } else {
            NextHop::drop_packet()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SendHandler;
    use crate::connection::{Connection, ConnectionClass};
    use crate::edge::{Edge, NullObserver};
    use crate::error::Result;
    use crate::transport_address::{TaType, TransportAddress};
    use crate::wire::UdpMessage;
    use std::net::SocketAddr;

    struct NullSender;
    impl SendHandler for NullSender {
        fn send(&self, _msg: UdpMessage) -> Result<()> {
            Ok(())
        }
    }

    fn addr(n: u64) -> Address {
        let mut buf = [0u8; crate::address::ADDRESS_BYTES];
        buf[crate::address::ADDRESS_BYTES - 8..].copy_from_slice(&n.to_be_bytes());
        Address::from_bytes_be(&buf)
    }

    fn connect(table: &ConnectionTable, n: u64, class: ConnectionClass) {
        let sock: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let edge = Arc::new(Edge::new(1, 2, sock, sock, false, Arc::new(NullSender), Arc::new(NullObserver)));
        table.add(Connection { address: addr(n), ta: TransportAddress::new(TaType::Udp, "127.0.0.1", 9000), class, edge });
    }

    #[test]
    fn s1_exact_direct_hop_when_connected() {
        let table = Arc::new(ConnectionTable::new());
        connect(&table, 0x10, ConnectionClass::Near);
        connect(&table, 0x50, ConnectionClass::Near);
        connect(&table, 0xA0, ConnectionClass::Near);
        let router = Router::new(addr(0x10), table);
        let packet = Packet { src: addr(0x10), dst: addr(0xA0), mode: RoutingMode::Exact, hops: 1 };
        let hop = router.next_hop(None, &packet);
        assert_eq!(hop.next, Some(addr(0xA0)));
        assert!(!hop.deliver_locally);
    }

    #[test]
    fn s2_greedy_prefers_disconnected_but_closer_terminus() {
        let table = Arc::new(ConnectionTable::new());
        connect(&table, 0x10, ConnectionClass::Near);
        connect(&table, 0x50, ConnectionClass::Near);
        connect(&table, 0xA0, ConnectionClass::Near);
        let router_at_a0 = Router::new(addr(0xA0), table.clone());
        let packet = Packet { src: addr(0x10), dst: addr(0x90), mode: RoutingMode::Greedy, hops: 1 };
        let hop = router_at_a0.next_hop(Some(&addr(0x50)), &packet);
        assert!(hop.deliver_locally);
    }

    #[test]
    fn delivers_locally_when_destination_matches_local() {
        let table = Arc::new(ConnectionTable::new());
        let router = Router::new(addr(0x10), table);
        let packet = Packet { src: addr(0x10), dst: addr(0x10), mode: RoutingMode::Greedy, hops: 0 };
        let hop = router.next_hop(None, &packet);
        assert_eq!(hop, NextHop { next: None, deliver_locally: true });
    }

    #[test]
    fn drops_beyond_max_ttl() {
        let table = Arc::new(ConnectionTable::new());
        connect(&table, 0x50, ConnectionClass::Near);
        let router = Router::new(addr(0x10), table);
        let packet = Packet { src: addr(0x10), dst: addr(0x90), mode: RoutingMode::Greedy, hops: 31 };
        let hop = router.next_hop(None, &packet);
        assert_eq!(hop, NextHop { next: None, deliver_locally: false });
    }
}
