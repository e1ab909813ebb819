//! Link/network-layer decoding down to TCP segments.
//!
//! Only what session tracking needs survives decoding: addresses, sequence
//! number, connection-management flags, and the payload. Anything that is
//! not TCP, or fails to decode, yields `None` and is counted by the caller.

use std::net::{IpAddr, SocketAddr};

use etherparse::{
    Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, SingleVlanHeaderSlice, TcpHeaderSlice,
};

/// IP protocol number for TCP.
const IP_PROTO_TCP: u8 = 6;

/// Link types as reported by the capture handle.
pub mod link_type {
    /// BSD loopback: 4-byte host-order address family, then IP.
    pub const NULL: i32 = 0;
    /// Ethernet II.
    pub const ETHERNET: i32 = 1;
    /// Raw IP, no link header (DLT_RAW).
    pub const RAW_BSD: i32 = 12;
    pub const RAW: i32 = 101;
    /// OpenBSD loopback, same layout as NULL.
    pub const LOOP: i32 = 108;
}

/// Well-known EtherTypes.
mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
    pub const QINQ: u16 = 0x88A8;
}

/// A decoded TCP segment, borrowing the packet's payload bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct TcpSegment<'a> {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub seq: u32,
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: &'a [u8],
}

/// Decode one captured packet into a TCP segment.
pub fn tcp_segment(link: i32, data: &[u8]) -> Option<TcpSegment<'_>> {
    let ip = match link {
        link_type::ETHERNET => strip_ethernet(data)?,
        link_type::NULL | link_type::LOOP => data.get(4..)?,
        link_type::RAW | link_type::RAW_BSD => data,
        _ => return None,
    };

    let (src_ip, dst_ip, transport) = match ip.first()? >> 4 {
        4 => {
            let ipv4 = Ipv4HeaderSlice::from_slice(ip).ok()?;
            if ipv4.protocol().0 != IP_PROTO_TCP {
                return None;
            }
            let header_len = ipv4.slice().len();
            // total_len bounds the payload; link-layer padding is trimmed.
            let total = (ipv4.total_len() as usize).clamp(header_len, ip.len());
            (
                IpAddr::from(ipv4.source_addr()),
                IpAddr::from(ipv4.destination_addr()),
                &ip[header_len..total],
            )
        }
        6 => {
            let ipv6 = Ipv6HeaderSlice::from_slice(ip).ok()?;
            // Extension headers are not walked; TCP directly after the fixed
            // header covers the traffic this tool targets.
            if ipv6.next_header().0 != IP_PROTO_TCP {
                return None;
            }
            let header_len = ipv6.slice().len();
            let total = header_len + (ipv6.payload_length() as usize).min(ip.len() - header_len);
            (
                IpAddr::from(ipv6.source_addr()),
                IpAddr::from(ipv6.destination_addr()),
                &ip[header_len..total],
            )
        }
        _ => return None,
    };

    let tcp = TcpHeaderSlice::from_slice(transport).ok()?;
    let header_len = tcp.slice().len();

    Some(TcpSegment {
        src: SocketAddr::new(src_ip, tcp.source_port()),
        dst: SocketAddr::new(dst_ip, tcp.destination_port()),
        seq: tcp.sequence_number(),
        syn: tcp.syn(),
        ack: tcp.ack(),
        fin: tcp.fin(),
        rst: tcp.rst(),
        payload: &transport[header_len..],
    })
}

/// Strip the Ethernet II header and at most one VLAN tag, returning the IP
/// payload.
fn strip_ethernet(data: &[u8]) -> Option<&[u8]> {
    let eth = Ethernet2HeaderSlice::from_slice(data).ok()?;
    let rest = &data[eth.slice().len()..];

    match eth.ether_type().0 {
        ethertype::IPV4 | ethertype::IPV6 => Some(rest),
        ethertype::VLAN | ethertype::QINQ => {
            let vlan = SingleVlanHeaderSlice::from_slice(rest).ok()?;
            match vlan.ether_type().0 {
                ethertype::IPV4 | ethertype::IPV6 => Some(&rest[vlan.slice().len()..]),
                _ => None,
            }
        }
        _ => None,
    }
}
