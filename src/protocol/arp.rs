//! ARP (Address Resolution Protocol) - RFC 826
//!
//! Address sizes are taken from the packet, so non-Ethernet/IPv4 bindings
//! decode too; only Ethernet/IPv4 gets the friendly rendering.

use super::types::be_u16;
use super::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Fixed prefix: types, sizes and operation
pub const FIXED_SIZE: usize = 8;

/// Hardware type for Ethernet
pub const HW_TYPE_ETHERNET: u16 = 1;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// Decoded ARP header with variable-size addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpHeader {
    pub hw_type: u16,
    pub proto_type: u16,
    pub hw_size: u8,
    pub proto_size: u8,
    pub operation: u16,
    pub sender_hw: Vec<u8>,
    pub sender_proto: Vec<u8>,
    pub target_hw: Vec<u8>,
    pub target_proto: Vec<u8>,
}

/// Bytes an ARP packet with these address sizes occupies
pub fn required_len(hw_size: u8, proto_size: u8) -> usize {
    FIXED_SIZE + 2 * hw_size as usize + 2 * proto_size as usize
}

impl ArpHeader {
    /// Parse an ARP packet from buffer
    ///
    /// A zero hardware size, or fewer bytes than the declared sizes need,
    /// is a parse error.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < FIXED_SIZE {
            return Err(Error::Parse("ARP packet too short".into()));
        }

        let hw_size = buffer[4];
        let proto_size = buffer[5];

        if hw_size == 0 {
            return Err(Error::Parse("ARP hardware address size is zero".into()));
        }
        if buffer.len() < required_len(hw_size, proto_size) {
            return Err(Error::Parse("ARP addresses truncated".into()));
        }

        let hw = hw_size as usize;
        let proto = proto_size as usize;
        let mut offset = FIXED_SIZE;
        let mut take = |len: usize| {
            let field = buffer[offset..offset + len].to_vec();
            offset += len;
            field
        };

        let sender_hw = take(hw);
        let sender_proto = take(proto);
        let target_hw = take(hw);
        let target_proto = take(proto);

        Ok(Self {
            hw_type: be_u16(buffer, 0),
            proto_type: be_u16(buffer, 2),
            hw_size,
            proto_size,
            operation: be_u16(buffer, 6),
            sender_hw,
            sender_proto,
            target_hw,
            target_proto,
        })
    }

    /// Bytes consumed by this header
    pub fn wire_len(&self) -> usize {
        required_len(self.hw_size, self.proto_size)
    }

    pub fn op(&self) -> Option<ArpOp> {
        ArpOp::from_u16(self.operation)
    }

    fn is_ethernet_ipv4(&self) -> bool {
        self.hw_type == HW_TYPE_ETHERNET
            && self.proto_type == EtherType::Ipv4 as u16
            && self.hw_size == 6
            && self.proto_size == 4
    }

    pub fn sender_ip(&self) -> Option<Ipv4Addr> {
        to_ipv4(&self.sender_proto)
    }

    pub fn target_ip(&self) -> Option<Ipv4Addr> {
        to_ipv4(&self.target_proto)
    }

    pub fn sender_mac(&self) -> Option<MacAddr> {
        MacAddr::from_slice(&self.sender_hw)
    }

    pub fn describe(&self) -> String {
        if self.is_ethernet_ipv4() {
            if let (Some(sender_ip), Some(target_ip), Some(sender_mac)) =
                (self.sender_ip(), self.target_ip(), self.sender_mac())
            {
                match self.op() {
                    Some(ArpOp::Request) => {
                        return format!("ARP request who-has {} tell {}", target_ip, sender_ip)
                    }
                    Some(ArpOp::Reply) => {
                        return format!("ARP reply {} is-at {}", sender_ip, sender_mac)
                    }
                    None => {}
                }
            }
        }
        format!(
            "ARP op {} hw {} proto {:#06x} sizes {}/{}",
            self.operation, self.hw_type, self.proto_type, self.hw_size, self.proto_size
        )
    }
}

fn to_ipv4(bytes: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = bytes.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}
