//! Capture sources and the batch buffer that drains them
//!
//! A [`CaptureSource`] fills a [`BatchFill`] with up to `max_frames`
//! frames per bulk dispatch. The [`CaptureBatchBuffer`] owns the slot
//! storage and turns those bulk calls into one packet per draw.
//!
//! Sources:
//! - AF_PACKET: live capture on one Linux interface
//! - pcap file: offline replay of a classic pcap file

#[cfg(target_os = "linux")]
mod af_packet;
mod batch;
mod pcap_file;

#[cfg(target_os = "linux")]
pub use af_packet::AfPacketSource;
pub use batch::{CaptureBatchBuffer, DrawStatus};
pub use pcap_file::PcapFileSource;

use crate::packet::{frame_length, LinkType, MAX_PKT_CAPLEN};
use crate::Result;

/// Frames a bulk dispatch is asked for
pub const MAX_PACKETS: usize = 10;
/// Storage headroom over [`MAX_PACKETS`] for sources that overshoot
pub const DISPATCH_OVERFLOW: usize = 5;
/// Largest number of frames a bulk dispatch may ask for
pub const MAX_BATCH_CAPACITY: usize = 10_000;
/// Largest slot count a [`BatchStorage`] allocates
pub const MAX_SLOTS: usize = MAX_BATCH_CAPACITY * DISPATCH_OVERFLOW;
/// Largest frame a live source reads in one receive
pub const MAX_SNAPLEN: usize = 262_144;

/// Per-frame capture metadata, as the source reported it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameMeta {
    pub ts_sec: i64,
    pub ts_usec: u32,
    /// Bytes the source captured, before any clamping to the slot size
    pub caplen: u32,
    /// Bytes on the wire
    pub len: u32,
}

/// Result of one bulk dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// `n` frames were handed to the fill
    Filled(usize),
    /// Nothing arrived before the read timeout
    Timeout,
    /// The source is exhausted
    EndOfStream,
}

/// Counters kept by the source itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub received: u64,
    pub dropped: u64,
}

/// Provider of raw frames
pub trait CaptureSource: Send {
    /// Block up to the read timeout, then hand up to `max_frames` frames
    /// to `fill`
    fn bulk_dispatch(&mut self, max_frames: usize, fill: &mut BatchFill<'_>) -> Result<Dispatch>;

    /// Framing of every frame this source produces
    fn datalink(&self) -> LinkType;

    /// Human-readable description of the most recent failure
    fn last_error(&self) -> String;

    /// Receive/drop counters, when the source keeps any
    fn stats(&self) -> Option<SourceStats> {
        None
    }
}

/// Fixed slot storage: one metadata record and one `MAX_PKT_CAPLEN`-byte
/// payload region per slot
#[derive(Debug)]
pub struct BatchStorage {
    meta: Vec<FrameMeta>,
    data: Vec<u8>,
    slots: usize,
}

impl BatchStorage {
    /// Storage for `slots` frames, capped at [`MAX_SLOTS`]
    pub fn new(slots: usize) -> Self {
        let slots = slots.min(MAX_SLOTS);
        Self {
            meta: vec![FrameMeta::default(); slots],
            data: vec![0u8; slots * MAX_PKT_CAPLEN],
            slots,
        }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Metadata and stored bytes of slot `index`
    pub fn slot(&self, index: usize) -> Option<(&FrameMeta, &[u8])> {
        let meta = self.meta.get(index)?;
        let start = index * MAX_PKT_CAPLEN;
        let stored = (meta.caplen as usize).min(MAX_PKT_CAPLEN);
        let bytes = self.data.get(start..start + stored)?;
        Some((meta, bytes))
    }

    /// Begin filling from slot 0
    pub fn fill(&mut self) -> BatchFill<'_> {
        BatchFill {
            storage: self,
            stored: 0,
            discarded: 0,
        }
    }
}

/// Write handle a source pushes frames into during one bulk dispatch
///
/// Frames past the last slot are counted and dropped; bytes past
/// `MAX_PKT_CAPLEN` are not copied, but the frame's full captured length
/// is kept in its metadata.
#[derive(Debug)]
pub struct BatchFill<'a> {
    storage: &'a mut BatchStorage,
    stored: usize,
    discarded: usize,
}

impl BatchFill<'_> {
    /// Store one frame; `false` if storage was already full
    pub fn push(&mut self, ts_sec: i64, ts_usec: u32, len: u32, frame: &[u8]) -> bool {
        if self.stored >= self.storage.slots {
            self.discarded += 1;
            return false;
        }

        let index = self.stored;
        let copy = frame.len().min(MAX_PKT_CAPLEN);
        let start = index * MAX_PKT_CAPLEN;
        self.storage.data[start..start + copy].copy_from_slice(&frame[..copy]);
        self.storage.meta[index] = FrameMeta {
            ts_sec,
            ts_usec,
            caplen: frame_length(frame.len()),
            len,
        };
        self.stored += 1;
        true
    }

    pub fn stored(&self) -> usize {
        self.stored
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn is_full(&self) -> bool {
        self.stored >= self.storage.slots
    }
}
