//! IPv4 protocol - RFC 791

use super::types::{be_u16, ip_proto};
use super::AddrPair;
use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Fragment flags
pub mod flags {
    /// Don't Fragment
    pub const DF: u8 = 0b010;
    /// More Fragments
    pub const MF: u8 = 0b001;
}

/// Decoded IPv4 header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    /// Header length in 32-bit words
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    /// Upper 3 bits of the flags/fragment field
    pub flags: u8,
    /// Lower 13 bits of the flags/fragment field
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Decode the fixed part of an IPv4 header
    ///
    /// The version nibble and IHL are recorded as found; they are not
    /// validated, so a bogus IHL only narrows the payload.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 header too short".into()));
        }

        let flags_frag = be_u16(buffer, 6);

        Ok(Self {
            version: buffer[0] >> 4,
            ihl: buffer[0] & 0x0F,
            tos: buffer[1],
            total_length: be_u16(buffer, 2),
            identification: be_u16(buffer, 4),
            flags: (flags_frag >> 13) as u8,
            fragment_offset: flags_frag & 0x1FFF,
            ttl: buffer[8],
            protocol: buffer[9],
            checksum: be_u16(buffer, 10),
            src: Ipv4Addr::new(buffer[12], buffer[13], buffer[14], buffer[15]),
            dst: Ipv4Addr::new(buffer[16], buffer[17], buffer[18], buffer[19]),
        })
    }

    /// Start and end of the datagram payload within a buffer of `available`
    /// bytes
    ///
    /// The end is the total length capped at what was captured; the start
    /// is the header length capped at that end.
    pub fn payload_bounds(&self, available: usize) -> (usize, usize) {
        let end = (self.total_length as usize).min(available);
        let start = (self.ihl as usize * 4).min(end);
        (start, end)
    }

    pub fn dont_fragment(&self) -> bool {
        (self.flags & flags::DF) != 0
    }

    pub fn more_fragments(&self) -> bool {
        (self.flags & flags::MF) != 0
    }

    /// Check if this is a fragment (MF set or offset > 0)
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset > 0
    }

    pub fn addresses(&self) -> AddrPair {
        AddrPair {
            src: IpAddr::V4(self.src),
            dst: IpAddr::V4(self.dst),
            length: self.total_length as usize,
        }
    }

    pub fn describe(&self) -> String {
        let mut out = format!(
            "IP {} > {}: {} ttl {} id {} len {}",
            self.src,
            self.dst,
            protocol_name(self.protocol),
            self.ttl,
            self.identification,
            self.total_length
        );
        if self.is_fragment() {
            out.push_str(&format!(" frag {}", self.fragment_offset as u32 * 8));
        }
        out
    }
}

/// Short name for an IP protocol number, the number itself when unknown
pub fn protocol_name(protocol: u8) -> String {
    match protocol {
        ip_proto::ICMP => "icmp".into(),
        ip_proto::IPIP => "ipip".into(),
        ip_proto::TCP => "tcp".into(),
        ip_proto::UDP => "udp".into(),
        ip_proto::IPV6 => "ipv6".into(),
        ip_proto::ICMPV6 => "icmp6".into(),
        other => format!("proto {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ipv4_header() -> Vec<u8> {
        let mut pkt = Vec::new();
        // Version (4) + IHL (5)
        pkt.push(0x45);
        // DSCP + ECN
        pkt.push(0x10);
        // Total length: 28 (20 header + 8 payload)
        pkt.extend_from_slice(&[0x00, 0x1c]);
        // Identification
        pkt.extend_from_slice(&[0x12, 0x34]);
        // Flags (DF) + Fragment offset
        pkt.extend_from_slice(&[0x40, 0x00]);
        // TTL
        pkt.push(64);
        // Protocol: UDP
        pkt.push(17);
        // Checksum
        pkt.extend_from_slice(&[0xab, 0xcd]);
        // Source IP: 192.168.1.1
        pkt.extend_from_slice(&[192, 168, 1, 1]);
        // Destination IP: 192.168.1.2
        pkt.extend_from_slice(&[192, 168, 1, 2]);
        // Payload
        pkt.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        pkt
    }

    #[test]
    fn test_ipv4_parse() {
        let data = make_ipv4_header();
        let hdr = Ipv4Header::parse(&data).unwrap();

        assert_eq!(hdr.version, 4);
        assert_eq!(hdr.ihl, 5);
        assert_eq!(hdr.tos, 0x10);
        assert_eq!(hdr.total_length, 28);
        assert_eq!(hdr.identification, 0x1234);
        assert_eq!(hdr.flags, flags::DF);
        assert_eq!(hdr.fragment_offset, 0);
        assert_eq!(hdr.ttl, 64);
        assert_eq!(hdr.protocol, 17);
        assert_eq!(hdr.checksum, 0xabcd);
        assert_eq!(hdr.src, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hdr.dst, Ipv4Addr::new(192, 168, 1, 2));
        assert!(hdr.dont_fragment());
        assert!(!hdr.is_fragment());
    }

    #[test]
    fn test_ipv4_too_short() {
        let data = make_ipv4_header();
        assert!(Ipv4Header::parse(&data[..19]).is_err());
    }

    #[test]
    fn test_ipv4_fragment_fields() {
        let mut data = make_ipv4_header();
        // MF set, offset 0x0123
        data[6] = 0x21;
        data[7] = 0x23;
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.flags, flags::MF);
        assert_eq!(hdr.fragment_offset, 0x0123);
        assert!(hdr.more_fragments());
        assert!(hdr.is_fragment());
    }

    #[test]
    fn test_payload_bounds_normal() {
        let data = make_ipv4_header();
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload_bounds(data.len()), (20, 28));
    }

    #[test]
    fn test_payload_bounds_ethernet_padding() {
        // Trailing padding beyond total_length is excluded
        let mut data = make_ipv4_header();
        data.extend_from_slice(&[0u8; 18]);
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload_bounds(data.len()), (20, 28));
    }

    #[test]
    fn test_payload_bounds_truncated_capture() {
        // total_length claims more than was captured
        let mut data = make_ipv4_header();
        data[2] = 0x05;
        data[3] = 0xdc;
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload_bounds(data.len()), (20, 28));
    }

    #[test]
    fn test_payload_bounds_ihl_beyond_end() {
        // IHL of 15 words (60 bytes) but only 28 bytes of datagram
        let mut data = make_ipv4_header();
        data[0] = 0x4f;
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload_bounds(data.len()), (28, 28));
    }

    #[test]
    fn test_payload_bounds_total_length_below_header() {
        let mut data = make_ipv4_header();
        data[2] = 0x00;
        data[3] = 0x0a;
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload_bounds(data.len()), (10, 10));
    }

    #[test]
    fn test_ipv4_describe() {
        let data = make_ipv4_header();
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(
            hdr.describe(),
            "IP 192.168.1.1 > 192.168.1.2: udp ttl 64 id 4660 len 28"
        );
    }

    #[test]
    fn test_ipv4_addresses() {
        let data = make_ipv4_header();
        let hdr = Ipv4Header::parse(&data).unwrap();
        let addrs = hdr.addresses();
        assert_eq!(addrs.src, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(addrs.dst, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)));
        assert_eq!(addrs.length, 28);
    }

    #[test]
    fn test_protocol_name() {
        assert_eq!(protocol_name(6), "tcp");
        assert_eq!(protocol_name(4), "ipip");
        assert_eq!(protocol_name(47), "proto 47");
    }
}
