//! Configuration validation

use super::Config;
use crate::capture::{DISPATCH_OVERFLOW, MAX_BATCH_CAPACITY, MAX_SNAPLEN};
use crate::packet::MAX_PKT_CAPLEN;
use crate::telemetry::is_known_level;

/// Largest batch capacity accepted without a warning
const BATCH_CAPACITY_WARN: usize = 1000;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_logging(config, &mut result);
    validate_capture(config, &mut result);
    validate_output(config, &mut result);

    result
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    if !is_known_level(&config.logging.level) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            config.logging.level
        ));
    }
    if !matches!(config.logging.format.as_str(), "pretty" | "compact" | "json") {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            config.logging.format
        ));
    }
}

fn validate_capture(config: &Config, result: &mut ValidationResult) {
    let capture = &config.capture;

    match (&capture.interface, &capture.file) {
        (Some(_), Some(_)) => {
            result.error("capture: interface and file are mutually exclusive");
        }
        (None, None) => {
            result.error("capture: one of interface or file is required");
        }
        (Some(name), None) if name.is_empty() => {
            result.error("capture.interface: must not be empty");
        }
        _ => {}
    }

    if capture.read_timeout_ms == 0 {
        result.error("capture.read_timeout_ms: must be greater than 0");
    }

    if capture.snaplen < MAX_PKT_CAPLEN {
        result.error(format!(
            "capture.snaplen: {} is below the {} byte slot size",
            capture.snaplen, MAX_PKT_CAPLEN
        ));
    } else if capture.snaplen > MAX_SNAPLEN {
        result.error(format!(
            "capture.snaplen: {} exceeds the {} byte maximum",
            capture.snaplen, MAX_SNAPLEN
        ));
    }

    if capture.batch_capacity == 0 {
        result.error("capture.batch_capacity: must be at least 1");
    } else if capture.batch_capacity > MAX_BATCH_CAPACITY {
        result.error(format!(
            "capture.batch_capacity: {} exceeds the maximum of {}",
            capture.batch_capacity, MAX_BATCH_CAPACITY
        ));
    } else if capture.batch_capacity > BATCH_CAPACITY_WARN {
        result.warn(format!(
            "capture.batch_capacity: {} reserves {} slots",
            capture.batch_capacity,
            capture.batch_capacity.saturating_mul(DISPATCH_OVERFLOW)
        ));
    }
}

fn validate_output(config: &Config, result: &mut ValidationResult) {
    if config.output.count == Some(0) {
        result.warn("output.count: 0 stops before the first packet");
    }
}
