//! Overlay-wide configuration knobs (§6 of the design).

use crate::transport_address::TransportAddress;
use serde::{Deserialize, Serialize};

/// Default soft cap on the outbound send queue; exceeding it drops the
/// newest message rather than blocking or raising.
pub const DEFAULT_SEND_QUEUE_SOFT_CAP: usize = 1024;
pub const DEFAULT_MAX_NEIGHBORS_IN_STATUS: usize = 4;

/// Everything in §6's configuration table except `ta_authorizer`, which is
/// a predicate and not serializable — it is supplied separately at
/// construction time (see [`crate::capability::TaAuthorizer`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// UDP bind port; `0` means an OS-assigned ephemeral port.
    pub port: u16,
    /// Overrides auto-detected local interface TAs when non-empty.
    pub local_tas: Vec<TransportAddress>,
    pub max_uphill_hops: u32,
    pub max_ttl: u32,
    pub max_neighbors_in_status: usize,
    pub send_queue_soft_cap: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            port: 0,
            local_tas: Vec::new(),
            max_uphill_hops: crate::router::DEFAULT_MAX_UPHILL_HOPS,
            max_ttl: crate::router::DEFAULT_MAX_TTL,
            max_neighbors_in_status: DEFAULT_MAX_NEIGHBORS_IN_STATUS,
            send_queue_soft_cap: DEFAULT_SEND_QUEUE_SOFT_CAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let cfg = OverlayConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.max_uphill_hops, 1);
        assert_eq!(cfg.max_ttl, 30);
        assert_eq!(cfg.max_neighbors_in_status, 4);
        assert_eq!(cfg.send_queue_soft_cap, 1024);
    }
}
