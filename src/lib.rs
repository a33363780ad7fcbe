//! A structured peer-to-peer overlay: a 160-bit ring of addresses, a
//! per-node connection table, router, and UDP edge transport.
//!
//! This crate owns no global state and installs no logging subscriber of
//! its own — wire it into a binary with `tracing-subscriber` and supply a
//! [`capability::TaAuthorizer`] / [`capability::StatusSink`] appropriate to
//! the deployment.

pub mod address;
pub mod capability;
pub mod config;
pub mod connection;
pub mod edge;
pub mod error;
pub mod estimator;
pub mod listener;
pub mod nat;
pub mod router;
pub mod shortcut;
pub mod status;
pub mod transport_address;
pub mod wire;

pub use address::{Address, ADDRESS_BITS, ADDRESS_BYTES};
pub use capability::{AllowAll, NullStatusSink, SendHandler, StatusSink, TaAuthorizer};
pub use config::OverlayConfig;
pub use connection::{Connection, ConnectionClass, ConnectionTable, ConnectionTableObserver};
pub use edge::{Edge, EdgeObserver, NullObserver};
pub use error::{OverlayError, Result};
pub use estimator::estimate_size;
pub use listener::{EdgeListener, ListenerObserver, NullListenerObserver};
pub use nat::{NatDataPoint, NatEventKind, NatHistory};
pub use router::{NextHop, Packet, Router, RoutingMode};
pub use shortcut::sample_target;
pub use status::StatusExchange;
pub use transport_address::{TaType, TransportAddress};
