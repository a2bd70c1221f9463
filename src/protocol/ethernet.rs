//! Ethernet link entry: MAC addresses, EtherType and 802.1Q / 802.1ad tags

use super::{EtherType, MacAddr};
use crate::{Error, Result};

/// Minimum Ethernet frame size (without FCS)
pub const MIN_FRAME_SIZE: usize = 14;
/// Offset of the EtherType behind a single 802.1Q tag
const VLAN_ETHERTYPE_OFFSET: usize = 16;
/// Offset of the EtherType behind an 802.1ad tag
const QINQ_ETHERTYPE_OFFSET: usize = 20;

/// Parsed Ethernet framing (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    ethertype: u16,
    payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame from a buffer
    ///
    /// One 802.1Q tag (0x8100) is skipped and the EtherType re-read at
    /// offset 16; an 802.1ad tag (0x88A8) moves it to offset 20. Nested
    /// tags beyond that are not followed.
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_FRAME_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }

        let outer = u16::from_be_bytes([buffer[12], buffer[13]]);

        let type_offset = match EtherType::from_u16(outer) {
            Some(EtherType::Vlan) => VLAN_ETHERTYPE_OFFSET,
            Some(EtherType::QinQ) => QINQ_ETHERTYPE_OFFSET,
            _ => {
                return Ok(Self {
                    buffer,
                    ethertype: outer,
                    payload_offset: MIN_FRAME_SIZE,
                })
            }
        };

        if buffer.len() < type_offset + 2 {
            return Err(Error::Parse("VLAN frame too short".into()));
        }

        Ok(Self {
            buffer,
            ethertype: u16::from_be_bytes([buffer[type_offset], buffer[type_offset + 1]]),
            payload_offset: type_offset + 2,
        })
    }

    pub fn dst_mac(&self) -> MacAddr {
        MacAddr::from_slice(&self.buffer[0..6]).unwrap_or_default()
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr::from_slice(&self.buffer[6..12]).unwrap_or_default()
    }

    /// EtherType after any skipped tag
    pub fn ethertype(&self) -> u16 {
        self.ethertype
    }

    pub fn is_tagged(&self) -> bool {
        self.payload_offset > MIN_FRAME_SIZE
    }

    /// Offset of the first byte after the link header
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload_offset..]
    }
}
