//! TCP protocol - RFC 793

use super::types::{be_u16, be_u32};
use super::AddrPair;
use crate::{Error, Result};
use std::fmt;

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// TCP flags (9 bits, including the ECN nonce bit)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
    pub ns: bool,
}

impl TcpFlags {
    /// Parse from the low 9 bits of the offset/flags word (bytes 12-13)
    pub fn from_bits(bits: u16) -> Self {
        Self {
            fin: (bits & 0x001) != 0,
            syn: (bits & 0x002) != 0,
            rst: (bits & 0x004) != 0,
            psh: (bits & 0x008) != 0,
            ack: (bits & 0x010) != 0,
            urg: (bits & 0x020) != 0,
            ece: (bits & 0x040) != 0,
            cwr: (bits & 0x080) != 0,
            ns: (bits & 0x100) != 0,
        }
    }

    pub fn bits(&self) -> u16 {
        [
            self.fin, self.syn, self.rst, self.psh, self.ack, self.urg, self.ece, self.cwr, self.ns,
        ]
        .iter()
        .enumerate()
        .fold(0u16, |acc, (i, set)| if *set { acc | (1 << i) } else { acc })
    }

    /// Check if this is a connection establishment (SYN without ACK)
    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack
    }

    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

impl fmt::Display for TcpFlags {
    /// tcpdump letters: `S` `F` `R` `P` `U` `E` `W` `N`, with `.` for ACK
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letters = [
            (self.syn, 'S'),
            (self.fin, 'F'),
            (self.rst, 'R'),
            (self.psh, 'P'),
            (self.urg, 'U'),
            (self.ece, 'E'),
            (self.cwr, 'W'),
            (self.ns, 'N'),
            (self.ack, '.'),
        ];
        let mut any = false;
        for (set, letter) in letters {
            if set {
                write!(f, "{}", letter)?;
                any = true;
            }
        }
        if !any {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// Decoded TCP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in 32-bit words
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    /// Parse TCP header from buffer
    ///
    /// The data offset is not validated here; see [`TcpHeader::header_len`].
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP header too short".into()));
        }

        Ok(Self {
            src_port: be_u16(buffer, 0),
            dst_port: be_u16(buffer, 2),
            seq: be_u32(buffer, 4),
            ack: be_u32(buffer, 8),
            data_offset: buffer[12] >> 4,
            flags: TcpFlags::from_bits(be_u16(buffer, 12) & 0x1FF),
            window: be_u16(buffer, 14),
            checksum: be_u16(buffer, 16),
            urgent: be_u16(buffer, 18),
        })
    }

    /// Header length including options, capped at `available` bytes
    pub fn header_len(&self, available: usize) -> usize {
        (self.data_offset as usize * 4).min(available)
    }

    pub fn describe(&self) -> String {
        format!(
            "TCP {} > {} [{}] seq {} ack {} win {}",
            self.src_port, self.dst_port, self.flags, self.seq, self.ack, self.window
        )
    }

    pub fn describe_with(&self, addrs: &AddrPair) -> String {
        format!(
            "TCP {}:{} > {}:{} [{}] seq {} ack {} win {} len {}",
            addrs.src,
            self.src_port,
            addrs.dst,
            self.dst_port,
            self.flags,
            self.seq,
            self.ack,
            self.window,
            addrs.length
        )
    }
}
