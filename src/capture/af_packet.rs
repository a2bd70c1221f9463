//! Live capture source: AF_PACKET socket on one interface

use super::{BatchFill, CaptureSource, Dispatch, SourceStats, MAX_SNAPLEN};
use crate::packet::{frame_length, LinkType, MAX_PKT_CAPLEN};
use crate::{Error, Result};
use chrono::Utc;
use std::cell::Cell;
use std::ffi::CString;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;
use tracing::{debug, info};

/// `getsockopt` option returning (and resetting) the kernel's counters
const PACKET_STATISTICS: libc::c_int = 6;

/// Kernel layout for `PACKET_STATISTICS`
#[repr(C)]
#[derive(Debug, Default)]
struct TpacketStats {
    tp_packets: libc::c_uint,
    tp_drops: libc::c_uint,
}

/// Raw socket bound to an interface in promiscuous mode
///
/// Each dispatch waits up to the read timeout for the socket to become
/// readable, then drains whatever is queued without blocking again.
pub struct AfPacketSource {
    fd: RawFd,
    ifindex: i32,
    interface: String,
    timeout_ms: libc::c_int,
    scratch: Vec<u8>,
    /// Kernel counters accumulated across reads
    kernel: Cell<SourceStats>,
    last_error: String,
}

impl AfPacketSource {
    /// Open a capture on `interface`
    ///
    /// Frames longer than `snaplen` are cut at `snaplen` but keep their
    /// wire length. `snaplen` is clamped to `MAX_PKT_CAPLEN..=MAX_SNAPLEN`.
    pub fn open(interface: &str, snaplen: usize, read_timeout: Duration) -> Result<Self> {
        let name = Self::interface_name(interface)?;
        let snaplen = snaplen.clamp(MAX_PKT_CAPLEN, MAX_SNAPLEN);

        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                (libc::ETH_P_ALL as u16).to_be() as i32,
            )
        };
        if fd < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        let ifindex = match Self::get_ifindex(fd, &name) {
            Ok(index) => index,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: (libc::ETH_P_ALL as u16).to_be(),
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };
        let ret = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::Io(err));
        }

        if let Err(e) = Self::set_promisc(fd, ifindex, true) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        let timeout_ms = read_timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        info!(
            interface,
            ifindex,
            snaplen,
            timeout_ms,
            "Opened live capture"
        );

        Ok(Self {
            fd,
            ifindex,
            interface: interface.to_string(),
            timeout_ms,
            scratch: vec![0u8; snaplen],
            kernel: Cell::new(SourceStats::default()),
            last_error: String::new(),
        })
    }

    /// Reject names the kernel could never resolve
    fn interface_name(interface: &str) -> Result<CString> {
        if interface.is_empty() || interface.len() >= libc::IFNAMSIZ {
            return Err(Error::InterfaceNotFound {
                name: interface.to_string(),
            });
        }
        CString::new(interface).map_err(|_| Error::InterfaceNotFound {
            name: interface.to_string(),
        })
    }

    fn get_ifindex(fd: RawFd, name: &CString) -> Result<i32> {
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name.as_bytes_with_nul()) {
            *dst = *src as libc::c_char;
        }

        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
        if ret < 0 {
            return Err(Error::InterfaceNotFound {
                name: name.to_string_lossy().into_owned(),
            });
        }

        Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
    }

    fn set_promisc(fd: RawFd, ifindex: i32, enable: bool) -> Result<()> {
        let mreq = libc::packet_mreq {
            mr_ifindex: ifindex,
            mr_type: libc::PACKET_MR_PROMISC as u16,
            mr_alen: 0,
            mr_address: [0; 8],
        };
        let optname = if enable {
            libc::PACKET_ADD_MEMBERSHIP
        } else {
            libc::PACKET_DROP_MEMBERSHIP
        };

        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                optname,
                &mreq as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Fold the kernel's counters (reset on every read) into ours
    fn refresh_kernel_stats(&self) {
        let mut raw = TpacketStats::default();
        let mut len = std::mem::size_of::<TpacketStats>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                self.fd,
                libc::SOL_PACKET,
                PACKET_STATISTICS,
                &mut raw as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if ret < 0 {
            return;
        }
        let mut stats = self.kernel.get();
        stats.received += raw.tp_packets as u64;
        stats.dropped += raw.tp_drops as u64;
        self.kernel.set(stats);
    }

    fn fail(&mut self, context: &str, err: io::Error) -> Error {
        self.last_error = format!("{} on {}: {}", context, self.interface, err);
        Error::Source(self.last_error.clone())
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl CaptureSource for AfPacketSource {
    fn bulk_dispatch(&mut self, max_frames: usize, fill: &mut BatchFill<'_>) -> Result<Dispatch> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pfd, 1, self.timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Dispatch::Timeout);
            }
            return Err(self.fail("poll", err));
        }
        if ret == 0 {
            return Ok(Dispatch::Timeout);
        }
        if pfd.revents & libc::POLLIN == 0 {
            let err = io::Error::new(io::ErrorKind::BrokenPipe, "socket not readable");
            return Err(self.fail("poll", err));
        }

        let mut delivered = 0;
        while delivered < max_frames {
            // MSG_TRUNC makes recv report the wire length
            let n = unsafe {
                libc::recv(
                    self.fd,
                    self.scratch.as_mut_ptr() as *mut libc::c_void,
                    self.scratch.len(),
                    libc::MSG_DONTWAIT | libc::MSG_TRUNC,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => break,
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(self.fail("recv", err)),
                }
            }

            let wire_len = n as usize;
            let captured = wire_len.min(self.scratch.len());
            let now = Utc::now();
            fill.push(
                now.timestamp(),
                now.timestamp_subsec_micros(),
                frame_length(wire_len),
                &self.scratch[..captured],
            );
            delivered += 1;
        }

        debug!(interface = %self.interface, frames = delivered, "Drained socket");

        if delivered == 0 {
            Ok(Dispatch::Timeout)
        } else {
            Ok(Dispatch::Filled(delivered))
        }
    }

    fn datalink(&self) -> LinkType {
        LinkType::Ethernet
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }

    fn stats(&self) -> Option<SourceStats> {
        self.refresh_kernel_stats();
        Some(self.kernel.get())
    }
}

impl AsRawFd for AfPacketSource {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for AfPacketSource {
    fn drop(&mut self) {
        let _ = Self::set_promisc(self.fd, self.ifindex, false);
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_interface() {
        let result = AfPacketSource::open("", 576, Duration::from_millis(10));
        assert!(matches!(result, Err(Error::InterfaceNotFound { .. })));
    }

    #[test]
    fn test_rejects_overlong_interface() {
        let result = AfPacketSource::open("an-interface-name-too-long", 576, Duration::from_millis(10));
        assert!(matches!(
            result,
            Err(Error::InterfaceNotFound { name }) if name == "an-interface-name-too-long"
        ));
    }

    #[test]
    fn test_rejects_nul_in_interface() {
        let result = AfPacketSource::open("eth\0", 576, Duration::from_millis(10));
        assert!(matches!(result, Err(Error::InterfaceNotFound { .. })));
    }

    #[test]
    fn test_missing_interface_fails() {
        // Without CAP_NET_RAW the socket call fails first; either way no source
        let result = AfPacketSource::open("pktchain0", 576, Duration::from_millis(10));
        assert!(result.is_err());
    }
}
