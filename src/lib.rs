//! pktchain - batched packet capture and header decoding
//!
//! Frames come from a live interface or a pcap file in bulk dispatches,
//! are drawn one at a time from a batch buffer, and are decoded into a
//! short chain of headers (link, network, transport) with a one-line
//! summary.

pub mod capture;
pub mod config;
pub mod error;
pub mod packet;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
