//! One-line packet summaries.

use super::{Header, Outcome, Packet};
use chrono::{DateTime, Utc};

/// Timestamp prefix used on every summary line
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// tcpdump-style summary of a decoded packet
///
/// - no headers: `"<time> unsupported protocol <ethertype>"`, or
///   `"<time> truncated <layer> header (<n> bytes)"` when the frame ran out
///   of bytes before the first header
/// - one header: its own description
/// - address header followed by a transport header: the transport header
///   described with those addresses
/// - two address headers in a row: `"<src> > <dst> IP in IP: "` followed by
///   the rendering of the inner chain
/// - anything else: `"unknown [<type names>]"`
pub fn render_summary(packet: &Packet) -> String {
    let time = format_time(&packet.capture_time);

    if packet.headers.is_empty() {
        return match packet.outcome {
            Outcome::Malformed { layer } => format!(
                "{} truncated {} header ({} bytes)",
                time, layer, packet.captured_length
            ),
            _ => format!("{} unsupported protocol {}", time, packet.ether_type),
        };
    }

    format!("{} {}", time, describe_chain(packet.headers.as_slice()))
}

/// Bytes per hex dump line
const HEX_DUMP_WIDTH: usize = 32;

/// Frame bytes as `hh-c` pairs, 32 per line, after a timing line
///
/// Non-printable bytes show `.` in place of the character.
pub fn hex_dump(packet: &Packet) -> String {
    let mut out = format!(
        "time: {}.{:06} caplen: {} len: {}\nData:",
        packet.capture_time.timestamp(),
        packet.capture_time.timestamp_subsec_micros(),
        packet.captured_length,
        packet.original_length
    );
    for (i, byte) in packet.data.iter().enumerate() {
        if i % HEX_DUMP_WIDTH == 0 {
            out.push('\n');
        } else {
            out.push(' ');
        }
        let shown = if byte.is_ascii_graphic() || *byte == b' ' {
            *byte as char
        } else {
            '.'
        };
        out.push_str(&format!("{:02x}-{}", byte, shown));
    }
    out
}

fn describe_chain(headers: &[Header]) -> String {
    match headers {
        [] => String::new(),
        [only] => only.describe(),
        [first, second, ..] => {
            if headers.len() == 2 {
                if let Some(text) = first
                    .addresses()
                    .and_then(|addrs| second.describe_with(&addrs))
                {
                    return text;
                }
            }
            if let (Some(outer), Some(_)) = (first.addresses(), second.addresses()) {
                return format!(
                    "{} > {} IP in IP: {}",
                    outer.src,
                    outer.dst,
                    describe_chain(&headers[1..])
                );
            }
            let names: Vec<&str> = headers.iter().map(Header::kind_name).collect();
            format!("unknown [{}]", names.join(","))
        }
    }
}
