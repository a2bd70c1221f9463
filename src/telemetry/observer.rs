//! Capture and decode event sink.
//!
//! The batch buffer and the decoder never log directly; they report
//! structured events to an injected [`CaptureObserver`]. The stock sinks
//! are [`TracingObserver`] (log lines), [`MetricsRegistry`] (counters) and
//! [`NullObserver`]; a tuple of two observers fans out to both.
//!
//! [`MetricsRegistry`]: super::MetricsRegistry

use crate::packet::Layer;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Something worth reporting while filling batches or decoding frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A bulk dispatch stored `frames` frames as batch `sequence`
    BatchFilled { sequence: u32, frames: usize },
    /// A bulk dispatch returned nothing before the read timeout
    Timeout,
    /// The source has no more frames
    EndOfStream,
    /// The source failed; the stream is over
    SourceError { message: String },
    /// Frames the source produced past the end of batch storage
    Overflow { discarded: usize },
    /// A frame longer than its slot was clamped
    Truncated {
        sequence: u32,
        captured: u32,
        truncated: u32,
    },
    /// A packet was handed to the caller
    Delivered {
        sequence: u32,
        captured_length: u32,
        headers: usize,
    },
    /// Encapsulation nested deeper than the decoder follows
    RecursionLimit {
        sequence: u32,
        layer: Layer,
        depth: usize,
    },
    /// A header was decoded but the chain was already full
    ChainOverflow { sequence: u32, limit: usize },
    /// Ethernet ARP frame whose hardware size byte is zero
    ArpZeroHardwareSize {
        sequence: u32,
        length: usize,
        proto_size: u8,
    },
    /// ARP body too short for its declared address sizes
    MalformedArp {
        sequence: u32,
        length: usize,
        hw_size: u8,
        proto_size: u8,
    },
    /// Not enough bytes for the header at `layer`
    Malformed {
        sequence: u32,
        layer: Layer,
        available: usize,
    },
    /// Ethertype not handled by the decoder
    Unsupported { sequence: u32, ether_type: u16 },
}

/// Receives capture and decode events
pub trait CaptureObserver: Send + Sync {
    fn on_event(&self, event: &CaptureEvent);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl CaptureObserver for NullObserver {
    fn on_event(&self, _event: &CaptureEvent) {}
}

/// Writes events as `tracing` records
///
/// Per-frame events go out at `trace`, per-batch at `debug`, diagnostics
/// and losses at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CaptureObserver for TracingObserver {
    fn on_event(&self, event: &CaptureEvent) {
        match event {
            CaptureEvent::BatchFilled { sequence, frames } => {
                debug!(sequence, frames, "Batch filled");
            }
            CaptureEvent::Timeout => trace!("Read timeout, no frames"),
            CaptureEvent::EndOfStream => info!("Capture source reached end of stream"),
            CaptureEvent::SourceError { message } => {
                warn!(error = %message, "Capture source failed");
            }
            CaptureEvent::Overflow { discarded } => {
                warn!(discarded, "Batch storage full, frames discarded");
            }
            CaptureEvent::Truncated {
                sequence,
                captured,
                truncated,
            } => {
                trace!(sequence, captured, truncated, "Frame truncated to slot size");
            }
            CaptureEvent::Delivered {
                sequence,
                captured_length,
                headers,
            } => {
                trace!(sequence, captured_length, headers, "Packet delivered");
            }
            CaptureEvent::RecursionLimit {
                sequence,
                layer,
                depth,
            } => {
                info!(sequence, %layer, depth, "More than 3 levels of IP encapsulation, decode stopped");
            }
            CaptureEvent::ChainOverflow { sequence, limit } => {
                warn!(sequence, limit, "Too many headers, decode stopped");
            }
            CaptureEvent::ArpZeroHardwareSize {
                sequence,
                length,
                proto_size,
            } => {
                warn!(sequence, length, proto_size, "ARP frame with zero hardware address size");
            }
            CaptureEvent::MalformedArp {
                sequence,
                length,
                hw_size,
                proto_size,
            } => {
                info!(sequence, length, hw_size, proto_size, "Malformed ARP header");
            }
            CaptureEvent::Malformed {
                sequence,
                layer,
                available,
            } => {
                trace!(sequence, %layer, available, "Truncated header");
            }
            CaptureEvent::Unsupported {
                sequence,
                ether_type,
            } => {
                trace!(sequence, ether_type, "Unsupported protocol");
            }
        }
    }
}

impl<A: CaptureObserver, B: CaptureObserver> CaptureObserver for (A, B) {
    fn on_event(&self, event: &CaptureEvent) {
        self.0.on_event(event);
        self.1.on_event(event);
    }
}

impl<T: CaptureObserver + ?Sized> CaptureObserver for Arc<T> {
    fn on_event(&self, event: &CaptureEvent) {
        (**self).on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<CaptureEvent>>);

    impl CaptureObserver for Recorder {
        fn on_event(&self, event: &CaptureEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_pair_fans_out() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let pair = (first.clone(), second.clone());

        pair.on_event(&CaptureEvent::Timeout);
        pair.on_event(&CaptureEvent::Overflow { discarded: 3 });

        assert_eq!(first.0.lock().unwrap().len(), 2);
        assert_eq!(
            second.0.lock().unwrap().as_slice(),
            &[CaptureEvent::Timeout, CaptureEvent::Overflow { discarded: 3 }]
        );
    }

    #[test]
    fn test_null_observer_accepts_everything() {
        let observer: Arc<dyn CaptureObserver> = Arc::new(NullObserver);
        observer.on_event(&CaptureEvent::EndOfStream);
    }

    #[test]
    #[traced_test]
    fn test_tracing_observer_logs_diagnostics() {
        let observer = TracingObserver;
        observer.on_event(&CaptureEvent::Overflow { discarded: 7 });
        observer.on_event(&CaptureEvent::ChainOverflow {
            sequence: 2,
            limit: 4,
        });
        observer.on_event(&CaptureEvent::RecursionLimit {
            sequence: 2,
            layer: Layer::Ipv4,
            depth: 4,
        });

        assert!(logs_contain("Batch storage full, frames discarded"));
        assert!(logs_contain("discarded=7"));
        assert!(logs_contain("Too many headers"));
        assert!(logs_contain("levels of IP encapsulation"));
    }
}
