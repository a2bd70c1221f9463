//! IPv6 protocol - RFC 8200

use super::ipv4::protocol_name;
use super::types::{be_u16, be_u32};
use super::AddrPair;
use crate::{Error, Result};
use std::net::{IpAddr, Ipv6Addr};

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Decoded IPv6 fixed header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Header {
    pub version: u8,
    pub traffic_class: u8,
    /// 20-bit flow label
    pub flow_label: u32,
    pub payload_length: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
}

impl Ipv6Header {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("IPv6 header too short".into()));
        }

        let mut src = [0u8; 16];
        src.copy_from_slice(&buffer[8..24]);
        let mut dst = [0u8; 16];
        dst.copy_from_slice(&buffer[24..40]);

        Ok(Self {
            version: buffer[0] >> 4,
            // Spans the low nibble of byte 0 and the high nibble of byte 1
            traffic_class: ((be_u16(buffer, 0) >> 4) & 0xFF) as u8,
            flow_label: be_u32(buffer, 0) & 0x000F_FFFF,
            payload_length: be_u16(buffer, 4),
            next_header: buffer[6],
            hop_limit: buffer[7],
            src: Ipv6Addr::from(src),
            dst: Ipv6Addr::from(dst),
        })
    }

    pub fn addresses(&self) -> AddrPair {
        AddrPair {
            src: IpAddr::V6(self.src),
            dst: IpAddr::V6(self.dst),
            length: self.payload_length as usize,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "IP6 {} > {}: {} hlim {} len {}",
            self.src,
            self.dst,
            protocol_name(self.next_header),
            self.hop_limit,
            self.payload_length
        )
    }
}
