//! Opaque endpoint descriptors ("TAs") and their canonical string form.
//!
//! Grounded on the `NetAddress` shape in the teacher's `net/types.rs`
//! (constructor, `SocketAddr` conversion, routability check), adapted to the
//! scheme-qualified URI form this overlay's wire protocol requires.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Transport types this core core knows how to name. `Tls` is carried as a
/// recognized scheme even though no listener in this crate serves it; higher
/// layers are free to mint `TransportAddress { ta_type: TaType::Tls, .. }`
/// values and route around this crate's UDP-only listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaType {
    Udp,
    Tcp,
    Tls,
}

impl TaType {
    fn scheme(self) -> &'static str {
        match self {
            TaType::Udp => "udp",
            TaType::Tcp => "tcp",
            TaType::Tls => "tls",
        }
    }

    fn from_scheme(s: &str) -> Option<Self> {
        match s {
            "udp" => Some(TaType::Udp),
            "tcp" => Some(TaType::Tcp),
            "tls" => Some(TaType::Tls),
            _ => None,
        }
    }
}

/// An opaque endpoint descriptor: transport type, host, and port. Equality
/// is structural (host strings, not resolved addresses, so `"127.0.0.1"` and
/// `"localhost"` are distinct TAs even if they resolve identically).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportAddress {
    pub ta_type: TaType,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum TaParseError {
    #[error("transport address missing scheme separator: {0}")]
    MissingScheme(String),
    #[error("unrecognized transport address scheme: {0}")]
    UnknownScheme(String),
    #[error("transport address missing host:port: {0}")]
    MissingAuthority(String),
    #[error("invalid port in transport address: {0}")]
    InvalidPort(String),
}

impl TransportAddress {
    pub fn new(ta_type: TaType, host: impl Into<String>, port: u16) -> Self {
        TransportAddress { ta_type, host: host.into(), port }
    }

    pub fn from_socket_addr(ta_type: TaType, addr: SocketAddr) -> Self {
        TransportAddress { ta_type, host: addr.ip().to_string(), port: addr.port() }
    }

    /// Best-effort resolution to a `SocketAddr`, assuming `host` is already
    /// a literal IP (the common case for this overlay; DNS resolution of
    /// TAs is a higher-layer concern).
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let ip: IpAddr = self.host.parse().ok()?;
        Some(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "brunet.{}://{}:{}", self.ta_type.scheme(), self.host, self.port)
    }
}

impl FromStr for TransportAddress {
    type Err = TaParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("brunet.").ok_or_else(|| TaParseError::MissingScheme(s.to_string()))?;
        let (scheme, rest) = rest.split_once("://").ok_or_else(|| TaParseError::MissingScheme(s.to_string()))?;
        let ta_type = TaType::from_scheme(scheme).ok_or_else(|| TaParseError::UnknownScheme(scheme.to_string()))?;
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| TaParseError::MissingAuthority(rest.to_string()))?;
        let port: u16 = port.parse().map_err(|_| TaParseError::InvalidPort(port.to_string()))?;
        Ok(TransportAddress { ta_type, host: host.to_string(), port })
    }
}
