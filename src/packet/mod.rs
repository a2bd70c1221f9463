//! Packet record and decoded header chain.
//!
//! A [`Packet`] owns the captured bytes of one frame plus everything the
//! decoder learned about them. The record is meant to be reused: the batch
//! buffer overwrites it in place on every draw, keeping the data and header
//! allocations.

mod chain;
mod decode;
mod display;

pub use chain::HeaderChain;
pub use display::{format_time, hex_dump, render_summary};

use crate::protocol::arp::ArpHeader;
use crate::protocol::icmp::IcmpHeader;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use crate::protocol::tcp::TcpHeader;
use crate::protocol::udp::UdpHeader;
use crate::protocol::{AddrPair, MacAddr};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::Range;

/// Per-frame payload capacity of a batch slot
pub const MAX_PKT_CAPLEN: usize = 576;
/// Most headers one packet can carry
pub const MAX_HEADERS: usize = 4;
/// Deepest IP-in-IP / IPv6-in-IPv6 nesting the decoder follows
pub const MAX_ENCAP_DEPTH: usize = 3;

/// Datalink framing of a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkType {
    #[default]
    Ethernet,
    /// Bare IPv4/IPv6 datagrams, no link header
    RawIp,
}

impl LinkType {
    /// Map a pcap LINKTYPE / DLT value
    ///
    /// 101 is LINKTYPE_RAW; 12 and 14 are the DLT_RAW values some platforms
    /// write into file headers.
    pub fn from_dlt(value: i32) -> Result<Self> {
        match value {
            1 => Ok(LinkType::Ethernet),
            12 | 14 | 101 => Ok(LinkType::RawIp),
            other => Err(Error::UnsupportedLinkType(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LinkType::Ethernet => "EN10MB",
            LinkType::RawIp => "RAW",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LinkType::Ethernet => "Ethernet",
            LinkType::RawIp => "Raw IP",
        }
    }
}

/// Protocol layer, used to say where decoding stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Link,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmp,
    Arp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Link => "link",
            Layer::Ipv4 => "IPv4",
            Layer::Ipv6 => "IPv6",
            Layer::Tcp => "TCP",
            Layer::Udp => "UDP",
            Layer::Icmp => "ICMP",
            Layer::Arp => "ARP",
        };
        f.write_str(name)
    }
}

/// How decoding of a packet ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Walked as far as the decoder goes
    #[default]
    Complete,
    /// Ethertype not handled; no headers
    Unsupported,
    /// Ran out of bytes at `layer`
    Malformed { layer: Layer },
    /// A fifth header was refused
    ChainOverflow,
    /// Encapsulation deeper than [`MAX_ENCAP_DEPTH`]
    RecursionLimit,
}

/// One decoded header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Ipv4(Ipv4Header),
    Ipv6(Ipv6Header),
    Tcp(TcpHeader),
    Udp(UdpHeader),
    Icmp(IcmpHeader),
    Arp(ArpHeader),
}

impl Header {
    pub fn layer(&self) -> Layer {
        match self {
            Header::Ipv4(_) => Layer::Ipv4,
            Header::Ipv6(_) => Layer::Ipv6,
            Header::Tcp(_) => Layer::Tcp,
            Header::Udp(_) => Layer::Udp,
            Header::Icmp(_) => Layer::Icmp,
            Header::Arp(_) => Layer::Arp,
        }
    }

    /// Type name used by the `unknown [...]` rendering
    pub fn kind_name(&self) -> &'static str {
        match self {
            Header::Ipv4(_) => "Ipv4Header",
            Header::Ipv6(_) => "Ipv6Header",
            Header::Tcp(_) => "TcpHeader",
            Header::Udp(_) => "UdpHeader",
            Header::Icmp(_) => "IcmpHeader",
            Header::Arp(_) => "ArpHeader",
        }
    }

    /// Source and destination, for network-layer headers only
    pub fn addresses(&self) -> Option<AddrPair> {
        match self {
            Header::Ipv4(h) => Some(h.addresses()),
            Header::Ipv6(h) => Some(h.addresses()),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Header::Ipv4(h) => h.describe(),
            Header::Ipv6(h) => h.describe(),
            Header::Tcp(h) => h.describe(),
            Header::Udp(h) => h.describe(),
            Header::Icmp(h) => h.describe(),
            Header::Arp(h) => h.describe(),
        }
    }

    /// Describe a transport header using its carrier's addresses, `None`
    /// for headers that do not render that way
    pub fn describe_with(&self, addrs: &AddrPair) -> Option<String> {
        match self {
            Header::Tcp(h) => Some(h.describe_with(addrs)),
            Header::Udp(h) => Some(h.describe_with(addrs)),
            Header::Icmp(h) => Some(h.describe_with(addrs)),
            _ => None,
        }
    }
}

/// One captured frame under analysis
#[derive(Debug, Clone)]
pub struct Packet {
    pub capture_time: DateTime<Utc>,
    /// Bytes held in `data`; at most [`MAX_PKT_CAPLEN`] once assembled from
    /// a batch slot
    pub captured_length: u32,
    /// Bytes seen on the wire
    pub original_length: u32,
    /// Bytes cut off when the frame was clamped to its slot
    pub truncated_bytes: u32,
    /// Batch number, shared by every packet of one bulk dispatch
    pub sequence: u32,
    pub link_type: LinkType,
    /// Resolved protocol type after any VLAN tags
    pub ether_type: u16,
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub data: Vec<u8>,
    /// Bytes of `data` not consumed by any header
    pub payload: Range<usize>,
    pub headers: HeaderChain,
    pub outcome: Outcome,
}

/// Frame length as carried in capture metadata, saturating at `u32::MAX`
pub(crate) fn frame_length(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    /// Empty record with room for one full slot
    pub fn new() -> Self {
        Self {
            capture_time: DateTime::<Utc>::default(),
            captured_length: 0,
            original_length: 0,
            truncated_bytes: 0,
            sequence: 0,
            link_type: LinkType::Ethernet,
            ether_type: 0,
            dst_mac: MacAddr::ZERO,
            src_mac: MacAddr::ZERO,
            data: Vec::with_capacity(MAX_PKT_CAPLEN),
            payload: 0..0,
            headers: HeaderChain::new(),
            outcome: Outcome::Complete,
        }
    }

    /// Build a record from raw frame bytes and decode it
    ///
    /// Lengths are taken from `data`; the timestamp is left at the epoch.
    pub fn from_bytes(
        link_type: LinkType,
        data: &[u8],
        observer: &dyn crate::telemetry::CaptureObserver,
    ) -> Self {
        let mut packet = Self::new();
        packet.link_type = link_type;
        packet.data.extend_from_slice(data);
        packet.captured_length = frame_length(data.len());
        packet.original_length = packet.captured_length;
        packet.decode(observer);
        packet
    }

    /// Clear everything the last draw left behind, keeping allocations
    pub fn reset(&mut self) {
        self.capture_time = DateTime::<Utc>::default();
        self.captured_length = 0;
        self.original_length = 0;
        self.truncated_bytes = 0;
        self.sequence = 0;
        self.ether_type = 0;
        self.dst_mac = MacAddr::ZERO;
        self.src_mac = MacAddr::ZERO;
        self.data.clear();
        self.payload = 0..0;
        self.headers.clear();
        self.outcome = Outcome::Complete;
    }

    /// Undecoded remainder of the frame
    pub fn payload(&self) -> &[u8] {
        self.data.get(self.payload.clone()).unwrap_or(&[])
    }

    pub fn headers(&self) -> &[Header] {
        self.headers.as_slice()
    }

    /// tcpdump-style one-line summary
    pub fn summary(&self) -> String {
        render_summary(self)
    }
}
