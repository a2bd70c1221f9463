//! UDP protocol - RFC 768

use super::types::be_u16;
use super::AddrPair;
use crate::{Error, Result};

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Decoded UDP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Length (header + data)
    pub length: u16,
    /// 0 means checksum not computed (valid for UDP over IPv4)
    pub checksum: u16,
}

impl UdpHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("UDP header too short".into()));
        }

        Ok(Self {
            src_port: be_u16(buffer, 0),
            dst_port: be_u16(buffer, 2),
            length: be_u16(buffer, 4),
            checksum: be_u16(buffer, 6),
        })
    }

    pub fn describe(&self) -> String {
        format!(
            "UDP {} > {} len {}",
            self.src_port, self.dst_port, self.length
        )
    }

    pub fn describe_with(&self, addrs: &AddrPair) -> String {
        format!(
            "UDP {}:{} > {}:{} len {}",
            addrs.src, self.src_port, addrs.dst, self.dst_port, self.length
        )
    }
}
