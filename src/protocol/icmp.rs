//! ICMP (Internet Control Message Protocol) - RFC 792, RFC 4443
//!
//! Only the common 8-byte prefix is decoded. The identifier and sequence
//! fields carry meaning for echo messages and are raw rest-of-header bytes
//! otherwise.

use super::types::be_u16;
use super::AddrPair;
use crate::{Error, Result};

/// ICMP header size (minimum)
pub const ICMP_HEADER_SIZE: usize = 8;

/// ICMP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    Redirect = 5,
    EchoRequest = 8,
    TimeExceeded = 11,
    ParameterProblem = 12,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            5 => Some(IcmpType::Redirect),
            8 => Some(IcmpType::EchoRequest),
            11 => Some(IcmpType::TimeExceeded),
            12 => Some(IcmpType::ParameterProblem),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IcmpType::EchoReply => "echo reply",
            IcmpType::DestinationUnreachable => "unreachable",
            IcmpType::Redirect => "redirect",
            IcmpType::EchoRequest => "echo request",
            IcmpType::TimeExceeded => "time exceeded",
            IcmpType::ParameterProblem => "parameter problem",
        }
    }
}

/// Names for the ICMPv6 types seen most often on a link
fn icmpv6_type_name(value: u8) -> Option<&'static str> {
    match value {
        1 => Some("unreachable"),
        2 => Some("packet too big"),
        3 => Some("time exceeded"),
        128 => Some("echo request"),
        129 => Some("echo reply"),
        133 => Some("router solicitation"),
        134 => Some("router advertisement"),
        135 => Some("neighbor solicitation"),
        136 => Some("neighbor advertisement"),
        _ => None,
    }
}

/// Decoded ICMP / ICMPv6 header prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    /// Carried by IPv6 (next header 58) rather than IPv4
    pub v6: bool,
}

impl IcmpHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(Error::Parse("ICMP packet too short".into()));
        }

        Ok(Self {
            icmp_type: buffer[0],
            code: buffer[1],
            checksum: be_u16(buffer, 2),
            identifier: be_u16(buffer, 4),
            sequence: be_u16(buffer, 6),
            v6: false,
        })
    }

    /// Same layout, typed as ICMPv6
    pub fn parse_v6(buffer: &[u8]) -> Result<Self> {
        let mut header = Self::parse(buffer)?;
        header.v6 = true;
        Ok(header)
    }

    pub fn is_echo(&self) -> bool {
        if self.v6 {
            matches!(self.icmp_type, 128 | 129)
        } else {
            matches!(self.icmp_type, 0 | 8)
        }
    }

    fn label(&self) -> &'static str {
        if self.v6 {
            "ICMP6"
        } else {
            "ICMP"
        }
    }

    fn body(&self) -> String {
        let name = if self.v6 {
            icmpv6_type_name(self.icmp_type)
        } else {
            IcmpType::from_u8(self.icmp_type).map(|t| t.name())
        };

        let mut out = match name {
            Some(name) => name.to_string(),
            None => format!("type {}", self.icmp_type),
        };
        if self.is_echo() {
            out.push_str(&format!(", id {}, seq {}", self.identifier, self.sequence));
        } else {
            out.push_str(&format!(" code {}", self.code));
        }
        out
    }

    pub fn describe(&self) -> String {
        format!("{} {}", self.label(), self.body())
    }

    pub fn describe_with(&self, addrs: &AddrPair) -> String {
        format!(
            "{} {} > {}: {}",
            self.label(),
            addrs.src,
            addrs.dst,
            self.body()
        )
    }
}
