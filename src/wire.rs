//! UDP wire format: header layout, control codes, and the one structured
//! control-packet body (`EdgeDataAnnounce`) the overlay needs.
//!
//! Every datagram is `[i32 remote_id][i32 local_id][payload...]`,
//! big-endian. `local_id < 0` marks a control packet whose payload begins
//! with an `i32` [`ControlCode`].

use crate::transport_address::TransportAddress;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    EdgeClosed = 1,
    EdgeDataAnnounce = 2,
    Null = 3,
}

impl ControlCode {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(ControlCode::EdgeClosed),
            2 => Some(ControlCode::EdgeDataAnnounce),
            3 => Some(ControlCode::Null),
            _ => None,
        }
    }
}

/// The `EdgeDataAnnounce` control body. Field names are named from the
/// *sender's* perspective and kept as the literal wire strings
/// `"RemoteTA"` / `"LocalTA"` for interop with the string-keyed dictionary
/// the original protocol used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeDataAnnounce {
    #[serde(rename = "RemoteTA")]
    pub remote_ta: String,
    #[serde(rename = "LocalTA")]
    pub local_ta: String,
}

impl EdgeDataAnnounce {
    pub fn new(remote_ta: &TransportAddress, local_ta: &TransportAddress) -> Self {
        EdgeDataAnnounce { remote_ta: remote_ta.to_string(), local_ta: local_ta.to_string() }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("EdgeDataAnnounce always serializes")
    }

    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// A decoded header: ids as seen by the local endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub remote_id: i32,
    pub local_id: i32,
}

impl Header {
    pub fn is_control(&self) -> bool {
        self.local_id < 0
    }
}

/// Parses the 8-byte header off the front of a datagram, returning it plus
/// the remaining payload slice. Returns `None` if the datagram is shorter
/// than [`HEADER_LEN`] (a `MalformedDatagram` at the call site).
pub fn parse_header(datagram: &[u8]) -> Option<(Header, &[u8])> {
    if datagram.len() < HEADER_LEN {
        return None;
    }
    let remote_id = i32::from_be_bytes(datagram[0..4].try_into().unwrap());
    let local_id = i32::from_be_bytes(datagram[4..8].try_into().unwrap());
    Some((Header { remote_id, local_id }, &datagram[HEADER_LEN..]))
}

/// Builds a full datagram for a data (non-control) send. Ids are taken
/// from the receiver's perspective of its peer's view: the wire's
/// `remoteid` slot gets the sender's own `local_id`, and the wire's
/// `localid` slot gets the sender's belief of the peer's id (`remote_id`).
pub fn encode_data(local_id: i32, remote_id: i32, payload: &[u8]) -> Vec<u8> {
    encode_raw(local_id, remote_id, payload)
}

/// Builds a full datagram for a control send: the wire's `remoteid` slot
/// carries the sender's own `local_id` (unnegated), and the wire's
/// `localid` slot carries `!remote_id`, so the receiver sees a negative
/// `localid` field and recognizes the control marker. The receiver then
/// recovers the edge it should act on via `!localid`.
pub fn encode_control(local_id: i32, remote_id: i32, code: ControlCode, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + body.len());
    payload.extend_from_slice(&(code as i32).to_be_bytes());
    payload.extend_from_slice(body);
    encode_raw(local_id, !remote_id, &payload)
}

fn encode_raw(remote_id: i32, local_id: i32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&remote_id.to_be_bytes());
    out.extend_from_slice(&local_id.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// A send-queue record: the outbound datagram plus its destination.
#[derive(Debug, Clone)]
pub struct UdpMessage {
    pub local_id: i32,
    pub remote_id: i32,
    pub payload: Vec<u8>,
    pub is_control: bool,
    pub control_code: Option<ControlCode>,
    pub destination: SocketAddr,
}

impl UdpMessage {
    pub fn data(local_id: i32, remote_id: i32, payload: Vec<u8>, destination: SocketAddr) -> Self {
        UdpMessage { local_id, remote_id, payload, is_control: false, control_code: None, destination }
    }

    pub fn control(local_id: i32, remote_id: i32, code: ControlCode, body: Vec<u8>, destination: SocketAddr) -> Self {
        UdpMessage { local_id, remote_id, payload: body, is_control: true, control_code: Some(code), destination }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self.control_code {
            Some(code) => encode_control(self.local_id, self.remote_id, code, &self.payload),
            None => encode_data(self.local_id, self.remote_id, &self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let dg = encode_data(5, 9, b"hello");
        let (hdr, payload) = parse_header(&dg).unwrap();
        assert_eq!(hdr.remote_id, 5);
        assert_eq!(hdr.local_id, 9);
        assert!(!hdr.is_control());
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn control_header_carries_inverted_local_id_in_the_localid_slot() {
        let dg = encode_control(5, 9, ControlCode::EdgeClosed, &[]);
        let (hdr, payload) = parse_header(&dg).unwrap();
        // remoteid slot = sender's own local_id (unnegated); localid slot = !remote_id
        assert_eq!(hdr.remote_id, 5);
        assert_eq!(hdr.local_id, !9);
        assert!(hdr.is_control());
        let code = i32::from_be_bytes(payload[0..4].try_into().unwrap());
        assert_eq!(ControlCode::from_i32(code), Some(ControlCode::EdgeClosed));
    }

    #[test]
    fn short_datagram_is_rejected() {
        assert!(parse_header(&[0u8; 4]).is_none());
    }

    #[test]
    fn edge_data_announce_uses_wire_literal_keys() {
        let ta = TransportAddress { ta_type: crate::transport_address::TaType::Udp, host: "1.2.3.4".into(), port: 9 };
        let ann = EdgeDataAnnounce::new(&ta, &ta);
        let encoded = ann.encode();
        let text = String::from_utf8(encoded).unwrap();
        assert!(text.contains("\"RemoteTA\""));
        assert!(text.contains("\"LocalTA\""));
    }
}
