//! Density-based network size estimate from the spread of Near neighbors.

use crate::address::{full, Address};
use crate::connection::{ConnectionClass, ConnectionTable};
use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// Estimates network size from the ring-distance span of `local`'s Near
/// connections. Falls back to `count + 1` when there are fewer than two
/// Near neighbors, or when the span collapses (`greatest <= least`).
pub fn estimate_size(local: &Address, table: &ConnectionTable) -> u64 {
    let near = table.get_connections(ConnectionClass::Near);
    let count = near.len();
    if count < 2 {
        return (count + 1) as u64;
    }

    let distances: Vec<BigUint> = near.iter().map(|c| local.abs_distance_to(&c.address)).collect();
    let least = distances.iter().min().unwrap().clone();
    let greatest = distances.iter().max().unwrap().clone();

    if greatest <= least {
        return (count + 1) as u64;
    }

    let width = greatest - &least;
    let inv_density = &width / BigUint::from(count as u64);
    if inv_density == BigUint::from(0u8) {
        return (count + 1) as u64;
    }
    let n = full() / inv_density;
    let n = n.to_u64().unwrap_or(u64::MAX);
    n.max((count + 1) as u64)
}
