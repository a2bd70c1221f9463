//! Batch buffer: bulk dispatch in, one packet per draw out.

use super::{
    BatchStorage, CaptureSource, Dispatch, FrameMeta, SourceStats, DISPATCH_OVERFLOW,
    MAX_BATCH_CAPACITY, MAX_PACKETS,
};
use crate::packet::{LinkType, Packet, MAX_PKT_CAPLEN};
use crate::protocol::arp;
use crate::protocol::types::be_u16;
use crate::protocol::EtherType;
use crate::telemetry::{CaptureEvent, CaptureObserver, NullObserver};
use crate::{Error, Result};
use chrono::DateTime;
use std::sync::Arc;

/// What a draw produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStatus {
    /// The packet record holds a freshly decoded frame
    Delivered,
    /// Read timeout with no frames; draw again or give up
    Retry,
    /// The source is exhausted; every later draw says the same
    EndOfStream,
}

/// Why the stream ended, kept so later draws report it again
#[derive(Debug, Clone)]
enum Terminal {
    EndOfStream,
    Failed(String),
}

impl Terminal {
    fn status(&self) -> Result<DrawStatus> {
        match self {
            Terminal::EndOfStream => Ok(DrawStatus::EndOfStream),
            Terminal::Failed(message) => Err(Error::Source(message.clone())),
        }
    }
}

/// Pull-based packet iterator over a bulk-dispatch capture source
///
/// Each bulk dispatch asks the source for `capacity` frames but provides
/// `capacity * DISPATCH_OVERFLOW` slots, so a source that overshoots its
/// request still lands in owned storage. Packets drawn from one dispatch
/// share a batch sequence number.
pub struct CaptureBatchBuffer<S: CaptureSource> {
    source: S,
    storage: BatchStorage,
    capacity: usize,
    filled: usize,
    consumed: usize,
    batch_sequence: u32,
    link_type: LinkType,
    observer: Arc<dyn CaptureObserver>,
    terminal: Option<Terminal>,
}

impl<S: CaptureSource> CaptureBatchBuffer<S> {
    /// Buffer asking for [`MAX_PACKETS`] frames per dispatch
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, MAX_PACKETS)
    }

    /// Buffer asking for `capacity` frames per dispatch, clamped to
    /// `1..=MAX_BATCH_CAPACITY`
    pub fn with_capacity(source: S, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_BATCH_CAPACITY);
        let link_type = source.datalink();
        Self {
            source,
            storage: BatchStorage::new(capacity.saturating_mul(DISPATCH_OVERFLOW)),
            capacity,
            filled: 0,
            consumed: 0,
            batch_sequence: 0,
            link_type,
            observer: Arc::new(NullObserver),
            terminal: None,
        }
    }

    /// Report capture and decode events to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn CaptureObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Datalink of the source, resolved when the buffer was built
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Sequence number of the most recent non-empty batch
    pub fn batch_sequence(&self) -> u32 {
        self.batch_sequence
    }

    /// Frames of the current batch not yet drawn
    pub fn pending(&self) -> usize {
        self.filled - self.consumed
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_stats(&self) -> Option<SourceStats> {
        self.source.stats()
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Draw the next packet into `packet`
    ///
    /// Serves from the current batch while it lasts, otherwise performs one
    /// bulk dispatch (which may block up to the source's read timeout).
    /// A source error comes back as `Err(Error::Source)`; both it and
    /// end-of-stream are terminal and repeat on every later draw.
    pub fn next_packet(&mut self, packet: &mut Packet) -> Result<DrawStatus> {
        packet.reset();

        if self.filled > self.consumed {
            self.assemble(self.consumed, packet);
            self.consumed += 1;
            return Ok(DrawStatus::Delivered);
        }

        if let Some(terminal) = &self.terminal {
            return terminal.status();
        }

        self.consumed = 0;
        self.filled = 0;

        let mut fill = self.storage.fill();
        let result = self.source.bulk_dispatch(self.capacity, &mut fill);
        let stored = fill.stored();
        let discarded = fill.discarded();

        if discarded > 0 {
            self.observer
                .on_event(&CaptureEvent::Overflow { discarded });
        }

        match result {
            Ok(Dispatch::Filled(_)) | Ok(Dispatch::Timeout) => {}
            Ok(Dispatch::EndOfStream) => {
                self.observer.on_event(&CaptureEvent::EndOfStream);
                self.terminal = Some(Terminal::EndOfStream);
            }
            Err(e) => {
                let mut message = self.source.last_error();
                if message.is_empty() {
                    message = e.to_string();
                }
                self.observer.on_event(&CaptureEvent::SourceError {
                    message: message.clone(),
                });
                self.terminal = Some(Terminal::Failed(message));
            }
        }

        // Frames that made it into storage are served even when the same
        // dispatch also ended the stream; the terminal status follows them.
        if stored == 0 {
            return match &self.terminal {
                Some(terminal) => terminal.status(),
                None => {
                    self.observer.on_event(&CaptureEvent::Timeout);
                    Ok(DrawStatus::Retry)
                }
            };
        }

        self.filled = stored;
        self.batch_sequence = self.batch_sequence.wrapping_add(1);
        self.observer.on_event(&CaptureEvent::BatchFilled {
            sequence: self.batch_sequence,
            frames: stored,
        });

        self.assemble(0, packet);
        self.consumed = 1;
        Ok(DrawStatus::Delivered)
    }

    /// Like [`next_packet`](Self::next_packet), allocating a record when
    /// none is supplied
    pub fn draw(&mut self, packet: Option<Packet>) -> Result<(Packet, DrawStatus)> {
        let mut packet = packet.unwrap_or_default();
        let status = self.next_packet(&mut packet)?;
        Ok((packet, status))
    }

    /// Materialize slot `index` into `packet` and decode it
    fn assemble(&self, index: usize, packet: &mut Packet) {
        let Some((meta, bytes)) = self.storage.slot(index) else {
            return;
        };

        packet.capture_time = capture_time(meta);
        packet.original_length = meta.len;
        packet.captured_length = meta.caplen;
        packet.truncated_bytes = 0;
        packet.sequence = self.batch_sequence;
        packet.link_type = self.link_type;

        if meta.caplen as usize > MAX_PKT_CAPLEN {
            packet.truncated_bytes = meta.caplen - MAX_PKT_CAPLEN as u32;
            packet.captured_length = MAX_PKT_CAPLEN as u32;
            self.observer.on_event(&CaptureEvent::Truncated {
                sequence: self.batch_sequence,
                captured: meta.caplen,
                truncated: packet.truncated_bytes,
            });
        }

        packet.data.clear();
        packet.data.extend_from_slice(bytes);

        if self.link_type == LinkType::Ethernet {
            if let Some(proto_size) = zero_hardware_size_arp(bytes) {
                self.observer.on_event(&CaptureEvent::ArpZeroHardwareSize {
                    sequence: self.batch_sequence,
                    length: bytes.len(),
                    proto_size,
                });
            }
        }

        packet.decode(&*self.observer);

        self.observer.on_event(&CaptureEvent::Delivered {
            sequence: self.batch_sequence,
            captured_length: packet.captured_length,
            headers: packet.headers.len(),
        });
    }
}

/// Seconds plus microseconds as a UTC timestamp
fn capture_time(meta: &FrameMeta) -> chrono::DateTime<chrono::Utc> {
    let secs = meta.ts_sec + (meta.ts_usec / 1_000_000) as i64;
    let nanos = (meta.ts_usec % 1_000_000) * 1_000;
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}

/// Protocol size of an Ethernet ARP frame whose hardware size byte is zero,
/// when the frame holds the bytes those sizes imply
fn zero_hardware_size_arp(frame: &[u8]) -> Option<u8> {
    if frame.len() < 20 || be_u16(frame, 12) != EtherType::Arp as u16 || frame[18] != 0 {
        return None;
    }
    let proto_size = frame[19];
    (frame.len() >= arp::required_len(0, proto_size)).then_some(proto_size)
}
