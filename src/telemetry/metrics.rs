//! Metrics collection for capture and decode statistics.
//!
//! Provides thread-safe counters fed by [`CaptureEvent`]s, so a
//! registry can be handed to the batch buffer as its observer.

use super::observer::{CaptureEvent, CaptureObserver};
use crate::packet::Layer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Capture statistics, one counter per event kind.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Truncated-header counts keyed by the layer that ran short.
    malformed_by_layer: RwLock<HashMap<Layer, Counter>>,

    // Batch metrics
    /// Bulk dispatches that stored at least one frame.
    pub batches: Counter,
    /// Dispatches that timed out empty.
    pub read_timeouts: Counter,
    /// Frames produced past the end of batch storage.
    pub overflow_discards: Counter,
    /// Source failures.
    pub source_errors: Counter,

    // Packet metrics
    /// Packets handed to the caller.
    pub packets: Counter,
    /// Bytes held by delivered packets.
    pub captured_bytes: Counter,
    /// Packets clamped to the slot size.
    pub truncated_packets: Counter,
    /// Bytes cut off by clamping.
    pub truncated_bytes: Counter,

    // Decode metrics
    /// Frames whose bytes ran out before a header ended.
    pub malformed: Counter,
    /// Frames with an ethertype the decoder does not handle.
    pub unsupported: Counter,
    /// Frames that decoded into more headers than a chain holds.
    pub chain_overflows: Counter,
    /// Frames nested deeper than the decoder follows.
    pub recursion_limits: Counter,
    /// ARP frames whose hardware size byte is zero.
    pub arp_zero_hardware_size: Counter,
    /// ARP bodies too short for their declared sizes.
    pub malformed_arp: Counter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a header that ran short at `layer`.
    pub fn record_malformed(&self, layer: Layer) {
        self.malformed.inc();

        if let Ok(counters) = self.malformed_by_layer.read() {
            if let Some(counter) = counters.get(&layer) {
                counter.inc();
                return;
            }
        }
        if let Ok(mut counters) = self.malformed_by_layer.write() {
            counters.entry(layer).or_default().inc();
        }
    }

    /// Truncated-header count for one layer.
    pub fn malformed_at(&self, layer: Layer) -> u64 {
        self.malformed_by_layer
            .read()
            .ok()
            .and_then(|counters| counters.get(&layer).map(Counter::get))
            .unwrap_or(0)
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("batches".into(), self.batches.get()),
            ("read_timeouts".into(), self.read_timeouts.get()),
            ("overflow_discards".into(), self.overflow_discards.get()),
            ("source_errors".into(), self.source_errors.get()),
            ("packets".into(), self.packets.get()),
            ("captured_bytes".into(), self.captured_bytes.get()),
            ("truncated_packets".into(), self.truncated_packets.get()),
            ("truncated_bytes".into(), self.truncated_bytes.get()),
            ("malformed".into(), self.malformed.get()),
            ("unsupported".into(), self.unsupported.get()),
            ("chain_overflows".into(), self.chain_overflows.get()),
            ("recursion_limits".into(), self.recursion_limits.get()),
            (
                "arp_zero_hardware_size".into(),
                self.arp_zero_hardware_size.get(),
            ),
            ("malformed_arp".into(), self.malformed_arp.get()),
        ];

        // Per-layer breakdown
        if let Ok(counters) = self.malformed_by_layer.read() {
            let mut layers: Vec<(String, u64)> = counters
                .iter()
                .map(|(layer, counter)| {
                    (
                        format!("malformed_{}", layer.to_string().to_lowercase()),
                        counter.get(),
                    )
                })
                .collect();
            layers.sort();
            result.extend(layers);
        }

        result
    }
}

impl CaptureObserver for MetricsRegistry {
    fn on_event(&self, event: &CaptureEvent) {
        match event {
            CaptureEvent::BatchFilled { .. } => self.batches.inc(),
            CaptureEvent::Timeout => self.read_timeouts.inc(),
            CaptureEvent::EndOfStream => {}
            CaptureEvent::SourceError { .. } => self.source_errors.inc(),
            CaptureEvent::Overflow { discarded } => self.overflow_discards.add(*discarded as u64),
            CaptureEvent::Truncated { truncated, .. } => {
                self.truncated_packets.inc();
                self.truncated_bytes.add(*truncated as u64);
            }
            CaptureEvent::Delivered {
                captured_length, ..
            } => {
                self.packets.inc();
                self.captured_bytes.add(*captured_length as u64);
            }
            CaptureEvent::RecursionLimit { .. } => self.recursion_limits.inc(),
            CaptureEvent::ChainOverflow { .. } => self.chain_overflows.inc(),
            CaptureEvent::ArpZeroHardwareSize { .. } => self.arp_zero_hardware_size.inc(),
            CaptureEvent::MalformedArp { .. } => self.malformed_arp.inc(),
            CaptureEvent::Malformed { layer, .. } => self.record_malformed(*layer),
            CaptureEvent::Unsupported { .. } => self.unsupported.inc(),
        }
    }
}
