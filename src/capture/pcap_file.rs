//! Offline capture source: classic pcap files

use super::{BatchFill, CaptureSource, Dispatch, SourceStats};
use crate::packet::LinkType;
use crate::{Error, Result};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Initial read buffer; doubled whenever a record does not fit
const READ_BUFFER_SIZE: usize = 65536;
/// Read buffer ceiling; a record that needs more is a source error
const MAX_READ_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// File magics of the nanosecond-resolution variant, either byte order
const NANOSECOND_MAGICS: [u32; 2] = [0xa1b2_3c4d, 0x4d3c_b2a1];

/// Replays a pcap file, one record per frame
///
/// Never times out: a dispatch returns as soon as it has `max_frames`
/// frames or the file ends.
pub struct PcapFileSource<R: Read> {
    reader: LegacyPcapReader<R>,
    buffer_size: usize,
    link_type: LinkType,
    nanosecond: bool,
    received: u64,
    exhausted: bool,
    last_error: String,
}

impl PcapFileSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!(path = %path.display(), "Opened capture file");
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Send> PcapFileSource<R> {
    /// Read the file header from `reader` and resolve its link type
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut reader = LegacyPcapReader::new(READ_BUFFER_SIZE, reader)
            .map_err(|e| Error::Parse(format!("not a pcap file: {}", e)))?;

        let header = loop {
            match reader.next() {
                Ok((offset, PcapBlockOwned::LegacyHeader(header))) => {
                    reader.consume(offset);
                    break header;
                }
                Ok((offset, _)) => reader.consume(offset),
                Err(PcapError::Incomplete(_)) => {
                    if reader.reader_exhausted() {
                        return Err(Error::Parse("pcap header truncated".into()));
                    }
                    reader
                        .refill()
                        .map_err(|e| Error::Parse(format!("pcap header: {}", e)))?;
                }
                Err(e) => return Err(Error::Parse(format!("pcap header: {}", e))),
            }
        };

        let link_type = LinkType::from_dlt(header.network.0)?;
        let nanosecond = NANOSECOND_MAGICS.contains(&header.magic_number);

        debug!(
            link_type = link_type.name(),
            snaplen = header.snaplen,
            nanosecond,
            "Read pcap file header"
        );

        Ok(Self {
            reader,
            buffer_size: READ_BUFFER_SIZE,
            link_type,
            nanosecond,
            received: 0,
            exhausted: false,
            last_error: String::new(),
        })
    }

    /// Double the read buffer for a record that does not fit, then refill
    fn grow_buffer(&mut self) -> Result<()> {
        if self.buffer_size >= MAX_READ_BUFFER_SIZE {
            let message = format!("capture record exceeds {} bytes", MAX_READ_BUFFER_SIZE);
            return Err(self.fail(message));
        }
        let size = self.buffer_size.saturating_mul(2).min(MAX_READ_BUFFER_SIZE);
        self.reader.grow(size);
        self.buffer_size = size;
        debug!(size, "Grew pcap read buffer");

        if let Err(e) = self.reader.refill() {
            let message = format!("capture file read failed: {}", e);
            return Err(self.fail(message));
        }
        Ok(())
    }

    fn fail(&mut self, message: String) -> Error {
        self.last_error = message.clone();
        Error::Source(message)
    }
}

impl<R: Read + Send> CaptureSource for PcapFileSource<R> {
    fn bulk_dispatch(&mut self, max_frames: usize, fill: &mut BatchFill<'_>) -> Result<Dispatch> {
        if self.exhausted {
            return Ok(Dispatch::EndOfStream);
        }

        let mut delivered = 0;
        while delivered < max_frames {
            match self.reader.next() {
                Ok((offset, PcapBlockOwned::Legacy(block))) => {
                    let ts_usec = if self.nanosecond {
                        block.ts_usec / 1_000
                    } else {
                        block.ts_usec
                    };
                    fill.push(block.ts_sec as i64, ts_usec, block.origlen, block.data);
                    self.reader.consume(offset);
                    delivered += 1;
                }
                Ok((offset, _)) => self.reader.consume(offset),
                Err(PcapError::Eof) => {
                    self.exhausted = true;
                    info!(frames = self.received + delivered as u64, "End of capture file");
                    break;
                }
                Err(PcapError::Incomplete(_)) => {
                    if self.reader.reader_exhausted() {
                        return Err(self.fail("capture file ends inside a record".into()));
                    }
                    if let Err(e) = self.reader.refill() {
                        let message = format!("capture file read failed: {}", e);
                        return Err(self.fail(message));
                    }
                }
                Err(PcapError::BufferTooSmall) => self.grow_buffer()?,
                Err(e) => {
                    let message = format!("malformed capture file: {}", e);
                    return Err(self.fail(message));
                }
            }
        }

        self.received += delivered as u64;

        if delivered == 0 && self.exhausted {
            Ok(Dispatch::EndOfStream)
        } else {
            Ok(Dispatch::Filled(delivered))
        }
    }

    fn datalink(&self) -> LinkType {
        self.link_type
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }

    fn stats(&self) -> Option<SourceStats> {
        Some(SourceStats {
            received: self.received,
            dropped: 0,
        })
    }
}
