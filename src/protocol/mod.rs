//! Protocol header decoders
//!
//! Each decoder is a pure function over a byte slice that yields an owned
//! header record, or `Error::Parse` when the slice is too short.

pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod types;
pub mod udp;

pub use types::*;

use std::net::IpAddr;

/// Endpoint addresses exposed by a network-layer header, handed to the
/// transport header when rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrPair {
    pub src: IpAddr,
    pub dst: IpAddr,
    /// Length field of the carrying header
    pub length: usize,
}
