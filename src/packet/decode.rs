//! Header decode walk: link entry, network layer, transport layer.
//!
//! The walk is linear. Each step decodes one header from the current
//! payload window, narrows the window past it and dispatches on the
//! header's protocol field. A short window, a full chain or excessive
//! encapsulation ends the walk early; headers already appended stay valid.

use super::{Header, Layer, LinkType, Outcome, Packet, MAX_ENCAP_DEPTH, MAX_HEADERS};
use crate::protocol::arp::ArpHeader;
use crate::protocol::ethernet::Frame;
use crate::protocol::icmp::{self, IcmpHeader};
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::{self, Ipv6Header};
use crate::protocol::tcp::TcpHeader;
use crate::protocol::udp::{self, UdpHeader};
use crate::protocol::{ip_proto, EtherType, MacAddr};
use crate::telemetry::{CaptureEvent, CaptureObserver};
use std::ops::Range;

/// `Err` carries the reason the walk stopped early
type Step<T = ()> = std::result::Result<T, Outcome>;

impl Packet {
    /// Decode `data` into `headers`, `payload` and `outcome`
    ///
    /// Never panics on short or hostile input. Anything worth a diagnostic
    /// is reported to `observer` and decoding simply stops.
    pub fn decode(&mut self, observer: &dyn CaptureObserver) {
        self.headers.clear();
        self.ether_type = 0;
        self.dst_mac = MacAddr::ZERO;
        self.src_mac = MacAddr::ZERO;

        let mut walk = Walk {
            data: &self.data,
            window: 0..self.data.len(),
            headers: &mut self.headers,
            sequence: self.sequence,
            observer,
        };

        let link = match self.link_type {
            LinkType::Ethernet => walk.ethernet(),
            LinkType::RawIp => walk.raw_ip(),
        };

        let result = link.and_then(|entry| {
            self.ether_type = entry.ether_type;
            self.dst_mac = entry.dst_mac;
            self.src_mac = entry.src_mac;
            walk.dispatch(entry.ether_type)
        });

        self.payload = walk.window;
        self.outcome = match result {
            Ok(()) => Outcome::Complete,
            Err(outcome) => outcome,
        };
    }
}

/// What the link entry resolved
struct LinkEntry {
    ether_type: u16,
    dst_mac: MacAddr,
    src_mac: MacAddr,
}

struct Walk<'a> {
    data: &'a [u8],
    /// Current payload window into `data`
    window: Range<usize>,
    headers: &'a mut super::HeaderChain,
    sequence: u32,
    observer: &'a dyn CaptureObserver,
}

impl<'a> Walk<'a> {
    fn rest(&self) -> &'a [u8] {
        &self.data[self.window.clone()]
    }

    /// Shrink the window to `start..end`, both relative to its current start
    fn narrow(&mut self, start: usize, end: usize) {
        let base = self.window.start;
        self.window = base + start..base + end;
    }

    fn malformed(&self, layer: Layer) -> Outcome {
        self.observer.on_event(&CaptureEvent::Malformed {
            sequence: self.sequence,
            layer,
            available: self.window.len(),
        });
        Outcome::Malformed { layer }
    }

    fn append(&mut self, header: Header) -> Step {
        self.headers.push(header).map_err(|_| {
            self.observer.on_event(&CaptureEvent::ChainOverflow {
                sequence: self.sequence,
                limit: MAX_HEADERS,
            });
            Outcome::ChainOverflow
        })
    }

    fn recursion_limit(&self, layer: Layer, depth: usize) -> Outcome {
        self.observer.on_event(&CaptureEvent::RecursionLimit {
            sequence: self.sequence,
            layer,
            depth,
        });
        Outcome::RecursionLimit
    }

    fn ethernet(&mut self) -> Step<LinkEntry> {
        let frame = Frame::parse(self.rest()).map_err(|_| self.malformed(Layer::Link))?;
        let entry = LinkEntry {
            ether_type: frame.ethertype(),
            dst_mac: frame.dst_mac(),
            src_mac: frame.src_mac(),
        };
        let offset = frame.payload_offset();
        let len = self.window.len();
        self.narrow(offset, len);
        Ok(entry)
    }

    /// Version nibble picks the family; the window stays the whole frame
    fn raw_ip(&mut self) -> Step<LinkEntry> {
        let first = *self.rest().first().ok_or_else(|| self.malformed(Layer::Link))?;
        let ether_type = if first >> 4 == 6 {
            EtherType::Ipv6 as u16
        } else {
            EtherType::Ipv4 as u16
        };
        Ok(LinkEntry {
            ether_type,
            dst_mac: MacAddr::ZERO,
            src_mac: MacAddr::ZERO,
        })
    }

    fn dispatch(&mut self, ether_type: u16) -> Step {
        match EtherType::from_u16(ether_type) {
            Some(EtherType::Ipv4) => self.ipv4(0),
            Some(EtherType::Ipv6) => self.ipv6(0),
            Some(EtherType::Arp) => self.arp(),
            _ => {
                self.observer.on_event(&CaptureEvent::Unsupported {
                    sequence: self.sequence,
                    ether_type,
                });
                Err(Outcome::Unsupported)
            }
        }
    }

    fn ipv4(&mut self, depth: usize) -> Step {
        let header = Ipv4Header::parse(self.rest()).map_err(|_| self.malformed(Layer::Ipv4))?;
        if depth > MAX_ENCAP_DEPTH {
            return Err(self.recursion_limit(Layer::Ipv4, depth));
        }

        let (start, end) = header.payload_bounds(self.window.len());
        self.narrow(start, end);
        let protocol = header.protocol;
        self.append(Header::Ipv4(header))?;

        match protocol {
            ip_proto::TCP => self.tcp(),
            ip_proto::UDP => self.udp(),
            ip_proto::ICMP => self.icmp(false),
            ip_proto::IPIP => self.ipv4(depth + 1),
            _ => Ok(()),
        }
    }

    fn ipv6(&mut self, depth: usize) -> Step {
        let header = Ipv6Header::parse(self.rest()).map_err(|_| self.malformed(Layer::Ipv6))?;
        if depth > MAX_ENCAP_DEPTH {
            return Err(self.recursion_limit(Layer::Ipv6, depth));
        }

        let len = self.window.len();
        self.narrow(ipv6::HEADER_SIZE, len);
        let next_header = header.next_header;
        self.append(Header::Ipv6(header))?;

        match next_header {
            ip_proto::TCP => self.tcp(),
            ip_proto::UDP => self.udp(),
            ip_proto::ICMP => self.icmp(false),
            ip_proto::ICMPV6 => self.icmp(true),
            ip_proto::IPV6 => self.ipv6(depth + 1),
            _ => Ok(()),
        }
    }

    fn tcp(&mut self) -> Step {
        let header = TcpHeader::parse(self.rest()).map_err(|_| self.malformed(Layer::Tcp))?;
        let len = self.window.len();
        self.narrow(header.header_len(len), len);
        self.append(Header::Tcp(header))
    }

    fn udp(&mut self) -> Step {
        let header = UdpHeader::parse(self.rest()).map_err(|_| self.malformed(Layer::Udp))?;
        let len = self.window.len();
        self.narrow(udp::HEADER_SIZE, len);
        self.append(Header::Udp(header))
    }

    fn icmp(&mut self, v6: bool) -> Step {
        let parsed = if v6 {
            IcmpHeader::parse_v6(self.rest())
        } else {
            IcmpHeader::parse(self.rest())
        };
        let header = parsed.map_err(|_| self.malformed(Layer::Icmp))?;
        let len = self.window.len();
        self.narrow(icmp::ICMP_HEADER_SIZE, len);
        self.append(Header::Icmp(header))
    }

    fn arp(&mut self) -> Step {
        let header = match ArpHeader::parse(self.rest()) {
            Ok(header) => header,
            Err(_) => {
                let rest = self.rest();
                self.observer.on_event(&CaptureEvent::MalformedArp {
                    sequence: self.sequence,
                    length: rest.len(),
                    hw_size: rest.get(4).copied().unwrap_or(0),
                    proto_size: rest.get(5).copied().unwrap_or(0),
                });
                return Err(Outcome::Malformed { layer: Layer::Arp });
            }
        };
        let len = self.window.len();
        self.narrow(header.wire_len(), len);
        self.append(Header::Arp(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullObserver;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<CaptureEvent>>);

    impl CaptureObserver for Recorder {
        fn on_event(&self, event: &CaptureEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    impl Recorder {
        fn events(&self) -> Vec<CaptureEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    fn eth_header(ethertype: u16) -> Vec<u8> {
        let mut frame = Vec::new();
        // dst MAC
        frame.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        // src MAC
        frame.extend_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame
    }

    fn ipv4_header(protocol: u8, payload_len: usize, last_octet: u8) -> Vec<u8> {
        let total = (20 + payload_len) as u16;
        let mut hdr = vec![0x45, 0x00];
        hdr.extend_from_slice(&total.to_be_bytes());
        // id, flags/frag
        hdr.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]);
        // TTL, protocol, checksum
        hdr.extend_from_slice(&[64, protocol, 0x00, 0x00]);
        hdr.extend_from_slice(&[10, 0, 0, 1]);
        hdr.extend_from_slice(&[10, 0, 0, last_octet]);
        hdr
    }

    fn ipv6_header(next_header: u8, payload_len: usize) -> Vec<u8> {
        let mut hdr = vec![0x60, 0x00, 0x00, 0x00];
        hdr.extend_from_slice(&(payload_len as u16).to_be_bytes());
        hdr.extend_from_slice(&[next_header, 64]);
        hdr.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        hdr.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        hdr
    }

    fn tcp_syn() -> Vec<u8> {
        let mut hdr = Vec::new();
        hdr.extend_from_slice(&40000u16.to_be_bytes());
        hdr.extend_from_slice(&443u16.to_be_bytes());
        hdr.extend_from_slice(&1u32.to_be_bytes());
        hdr.extend_from_slice(&0u32.to_be_bytes());
        // Data offset 5, SYN
        hdr.extend_from_slice(&[0x50, 0x02]);
        hdr.extend_from_slice(&[0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);
        hdr
    }

    fn udp_dns() -> Vec<u8> {
        let mut hdr = Vec::new();
        hdr.extend_from_slice(&5353u16.to_be_bytes());
        hdr.extend_from_slice(&53u16.to_be_bytes());
        hdr.extend_from_slice(&12u16.to_be_bytes());
        hdr.extend_from_slice(&[0x00, 0x00]);
        hdr
    }

    fn arp_request() -> Vec<u8> {
        let mut pkt = vec![0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01];
        pkt.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        pkt.extend_from_slice(&[192, 168, 1, 1]);
        pkt.extend_from_slice(&[0x00; 6]);
        pkt.extend_from_slice(&[192, 168, 1, 2]);
        pkt
    }

    fn decode(link_type: LinkType, data: &[u8]) -> Packet {
        Packet::from_bytes(link_type, data, &NullObserver)
    }

    #[test]
    fn test_ethernet_ipv4_tcp() {
        let payload = b"hello";
        let mut frame = eth_header(0x0800);
        frame.extend(ipv4_header(6, 20 + payload.len(), 2));
        frame.extend(tcp_syn());
        frame.extend_from_slice(payload);

        let packet = decode(LinkType::Ethernet, &frame);

        assert_eq!(packet.outcome, Outcome::Complete);
        assert_eq!(packet.ether_type, 0x0800);
        assert_eq!(packet.dst_mac, MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(packet.src_mac, MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]));
        assert_eq!(packet.headers.len(), 2);
        match packet.headers.get(0) {
            Some(Header::Ipv4(ip)) => {
                assert_eq!(ip.src, Ipv4Addr::new(10, 0, 0, 1));
                assert_eq!(ip.protocol, 6);
            }
            other => panic!("expected IPv4, got {:?}", other),
        }
        match packet.headers.get(1) {
            Some(Header::Tcp(tcp)) => {
                assert_eq!(tcp.dst_port, 443);
                assert!(tcp.flags.is_syn_only());
            }
            other => panic!("expected TCP, got {:?}", other),
        }
        assert_eq!(packet.payload(), payload);
    }

    #[test]
    fn test_short_ethernet_frame() {
        for len in 0..14 {
            let frame = vec![0x08; len];
            let packet = decode(LinkType::Ethernet, &frame);
            assert!(packet.headers.is_empty());
            assert_eq!(
                packet.outcome,
                Outcome::Malformed { layer: Layer::Link }
            );
        }
    }

    #[test]
    fn test_vlan_offsets() {
        let mut frame = eth_header(0x8100);
        // TCI, inner ethertype IPv4
        frame.extend_from_slice(&[0x00, 0x64, 0x08, 0x00]);
        frame.extend(ipv4_header(17, 8, 2));
        frame.extend(udp_dns());

        let packet = decode(LinkType::Ethernet, &frame);

        assert_eq!(packet.ether_type, 0x0800);
        assert_eq!(packet.headers.len(), 2);
        assert!(matches!(packet.headers.get(1), Some(Header::Udp(_))));
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn test_qinq_offsets() {
        let mut frame = eth_header(0x88a8);
        // S-tag TCI, C-tag, C-tag TCI, inner ethertype IPv6
        frame.extend_from_slice(&[0x00, 0x0a, 0x81, 0x00, 0x00, 0x64, 0x86, 0xdd]);
        frame.extend(ipv6_header(17, 8));
        frame.extend(udp_dns());

        let packet = decode(LinkType::Ethernet, &frame);

        assert_eq!(packet.ether_type, 0x86dd);
        assert_eq!(packet.headers.len(), 2);
        assert!(matches!(packet.headers.get(0), Some(Header::Ipv6(_))));
        assert!(matches!(packet.headers.get(1), Some(Header::Udp(_))));
    }

    #[test]
    fn test_unsupported_ethertype() {
        let recorder = Recorder::default();
        let mut frame = eth_header(0x9999);
        frame.extend_from_slice(&[0u8; 32]);

        let packet = Packet::from_bytes(LinkType::Ethernet, &frame, &recorder);

        assert!(packet.headers.is_empty());
        assert_eq!(packet.outcome, Outcome::Unsupported);
        assert_eq!(packet.ether_type, 0x9999);
        assert_eq!(
            recorder.events(),
            vec![CaptureEvent::Unsupported {
                sequence: 0,
                ether_type: 0x9999
            }]
        );
    }

    #[test]
    fn test_raw_ip_picks_family() {
        let mut v4 = ipv4_header(1, 8, 2);
        v4.extend_from_slice(&[8, 0, 0, 0, 0, 1, 0, 1]);
        let packet = decode(LinkType::RawIp, &v4);
        assert_eq!(packet.ether_type, 0x0800);
        assert_eq!(packet.dst_mac, MacAddr::ZERO);
        assert_eq!(packet.headers.len(), 2);
        assert!(matches!(packet.headers.get(1), Some(Header::Icmp(_))));

        let mut v6 = ipv6_header(58, 8);
        v6.extend_from_slice(&[128, 0, 0, 0, 0, 1, 0, 1]);
        let packet = decode(LinkType::RawIp, &v6);
        assert_eq!(packet.ether_type, 0x86dd);
        match packet.headers.get(1) {
            Some(Header::Icmp(icmp)) => assert!(icmp.v6),
            other => panic!("expected ICMPv6, got {:?}", other),
        }
    }

    #[test]
    fn test_icmp_ends_walk_past_its_header() {
        let mut frame = eth_header(0x0800);
        frame.extend(ipv4_header(1, 12, 2));
        frame.extend_from_slice(&[0, 0, 0, 0, 0, 9, 0, 4]);
        frame.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let packet = decode(LinkType::Ethernet, &frame);

        assert_eq!(packet.outcome, Outcome::Complete);
        assert_eq!(packet.headers.len(), 2);
        assert_eq!(packet.payload(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_raw_ip_empty_frame() {
        let packet = decode(LinkType::RawIp, &[]);
        assert!(packet.headers.is_empty());
        assert_eq!(packet.outcome, Outcome::Malformed { layer: Layer::Link });
    }

    #[test]
    fn test_short_ipv4_is_malformed() {
        let mut frame = eth_header(0x0800);
        frame.extend_from_slice(&[0x45; 19]);
        let packet = decode(LinkType::Ethernet, &frame);
        assert!(packet.headers.is_empty());
        assert_eq!(packet.outcome, Outcome::Malformed { layer: Layer::Ipv4 });
    }

    #[test]
    fn test_short_tcp_keeps_ip_header() {
        let mut frame = eth_header(0x0800);
        frame.extend(ipv4_header(6, 10, 2));
        frame.extend_from_slice(&[0u8; 10]);

        let packet = decode(LinkType::Ethernet, &frame);

        assert_eq!(packet.headers.len(), 1);
        assert_eq!(packet.outcome, Outcome::Malformed { layer: Layer::Tcp });
        // Window still covers the bytes after the IP header
        assert_eq!(packet.payload().len(), 10);
    }

    #[test]
    fn test_ipv4_padding_excluded_from_payload() {
        let mut frame = eth_header(0x0800);
        frame.extend(ipv4_header(17, 8, 2));
        frame.extend(udp_dns());
        // Ethernet minimum-size padding
        frame.extend_from_slice(&[0u8; 18]);

        let packet = decode(LinkType::Ethernet, &frame);

        assert_eq!(packet.headers.len(), 2);
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn test_ip_in_ip_recursion_bound() {
        // Outer header plus four nested IPv4-in-IPv4 headers
        let recorder = Recorder::default();
        let mut frame = eth_header(0x0800);
        for level in 0..5u8 {
            let remaining = (4 - level as usize) * 20;
            frame.extend(ipv4_header(4, remaining, level + 2));
        }

        let packet = Packet::from_bytes(LinkType::Ethernet, &frame, &recorder);

        // Depths 0..=3 appended, depth 4 refused
        assert_eq!(packet.headers.len(), 4);
        assert!(packet
            .headers
            .iter()
            .all(|h| matches!(h, Header::Ipv4(_))));
        assert_eq!(packet.outcome, Outcome::RecursionLimit);
        assert_eq!(
            recorder.events(),
            vec![CaptureEvent::RecursionLimit {
                sequence: 0,
                layer: Layer::Ipv4,
                depth: 4
            }]
        );
        // The refused header is still in the payload
        assert_eq!(packet.payload().len(), 20);
    }

    #[test]
    fn test_ip_in_ip_three_levels() {
        // Outer plus three nested: all four fit
        let mut frame = eth_header(0x0800);
        for level in 0..4u8 {
            let remaining = (3 - level as usize) * 20;
            frame.extend(ipv4_header(4, remaining, level + 2));
        }
        let packet = decode(LinkType::Ethernet, &frame);
        assert_eq!(packet.headers.len(), 4);
        // Innermost has protocol 4 but an empty payload
        assert_eq!(packet.outcome, Outcome::Malformed { layer: Layer::Ipv4 });
    }

    #[test]
    fn test_ipv6_in_ipv6_recursion_bound() {
        let mut frame = eth_header(0x86dd);
        for level in 0..5usize {
            let remaining = (4 - level) * 40;
            frame.extend(ipv6_header(41, remaining));
        }
        let packet = decode(LinkType::Ethernet, &frame);
        assert_eq!(packet.headers.len(), 4);
        assert_eq!(packet.outcome, Outcome::RecursionLimit);
    }

    #[test]
    fn test_chain_overflow_keeps_first_four() {
        // Four IPv4 headers then TCP: the fifth header is refused
        let recorder = Recorder::default();
        let mut frame = eth_header(0x0800);
        for level in 0..4u8 {
            let remaining = (3 - level as usize) * 20 + 20;
            let protocol = if level == 3 { 6 } else { 4 };
            frame.extend(ipv4_header(protocol, remaining, level + 2));
        }
        frame.extend(tcp_syn());

        let packet = Packet::from_bytes(LinkType::Ethernet, &frame, &recorder);

        assert_eq!(packet.headers.len(), 4);
        assert!(packet
            .headers
            .iter()
            .all(|h| matches!(h, Header::Ipv4(_))));
        assert_eq!(packet.outcome, Outcome::ChainOverflow);
        assert_eq!(
            recorder.events(),
            vec![CaptureEvent::ChainOverflow {
                sequence: 0,
                limit: 4
            }]
        );
    }

    #[test]
    fn test_arp_decoded() {
        let mut frame = eth_header(0x0806);
        frame.extend(arp_request());
        frame.extend_from_slice(&[0u8; 18]);

        let packet = decode(LinkType::Ethernet, &frame);

        assert_eq!(packet.outcome, Outcome::Complete);
        assert_eq!(packet.headers.len(), 1);
        match packet.headers.get(0) {
            Some(Header::Arp(arp)) => {
                assert_eq!(arp.target_ip(), Some(Ipv4Addr::new(192, 168, 1, 2)))
            }
            other => panic!("expected ARP, got {:?}", other),
        }
        assert_eq!(packet.payload().len(), 18);
    }

    #[test]
    fn test_malformed_arp_reports_and_appends_nothing() {
        let recorder = Recorder::default();
        let mut frame = eth_header(0x0806);
        let mut body = arp_request();
        body[4] = 0;
        frame.extend(body);

        let packet = Packet::from_bytes(LinkType::Ethernet, &frame, &recorder);

        assert!(packet.headers.is_empty());
        assert_eq!(packet.outcome, Outcome::Malformed { layer: Layer::Arp });
        assert_eq!(
            recorder.events(),
            vec![CaptureEvent::MalformedArp {
                sequence: 0,
                length: 28,
                hw_size: 0,
                proto_size: 4
            }]
        );
    }

    #[test]
    fn test_tcp_header_len_clamped_to_window() {
        let mut frame = eth_header(0x0800);
        let mut tcp = tcp_syn();
        tcp[12] = 0xf0; // claims 60 bytes
        frame.extend(ipv4_header(6, 24, 2));
        frame.extend(tcp);
        frame.extend_from_slice(&[1, 2, 3, 4]);

        let packet = decode(LinkType::Ethernet, &frame);

        assert_eq!(packet.headers.len(), 2);
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn test_decode_clears_previous_state() {
        let mut frame = eth_header(0x0800);
        frame.extend(ipv4_header(17, 8, 2));
        frame.extend(udp_dns());
        let mut packet = decode(LinkType::Ethernet, &frame);
        assert_eq!(packet.headers.len(), 2);

        packet.data.clear();
        packet.data.extend_from_slice(&eth_header(0x9999));
        packet.decode(&NullObserver);

        assert!(packet.headers.is_empty());
        assert_eq!(packet.outcome, Outcome::Unsupported);
    }
}
