//! Ethernet -> IPv4/IPv6 -> TCP decoding of captured frames
//!
//! Frames are captured with a short snapshot length, so the payload itself
//! is usually not present. Payload length is derived from the IP and TCP
//! header length fields instead of the captured bytes.

use flatnet_common::{Endpoint, FlowEvent, Timestamp};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::Packet;
use std::net::IpAddr;

const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const TCP_MIN_HEADER_LEN: usize = 20;

/// Decode one frame. Returns `None` for anything that is not a TCP segment
/// carrying payload, including malformed frames.
pub fn decode_frame(frame: &[u8], timestamp: Timestamp) -> Option<FlowEvent> {
    let ethernet = EthernetPacket::new(frame)?;

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => decode_ipv4(ethernet.payload(), timestamp),
        EtherTypes::Ipv6 => decode_ipv6(ethernet.payload(), timestamp),
        _ => None,
    }
}

fn decode_ipv4(data: &[u8], timestamp: Timestamp) -> Option<FlowEvent> {
    let ip = Ipv4Packet::new(data)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }

    // Only the first fragment starts with a TCP header. It is counted with
    // the payload it carries; later fragments are skipped.
    if ip.get_fragment_offset() != 0 {
        return None;
    }

    let header_len = ip.get_header_length() as usize * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return None;
    }

    let segment_len = (ip.get_total_length() as usize).checked_sub(header_len)?;
    let tcp = TcpPacket::new(data.get(header_len..)?)?;

    segment_event(
        IpAddr::V4(ip.get_source()),
        IpAddr::V4(ip.get_destination()),
        &tcp,
        segment_len,
        timestamp,
    )
}

// Extension headers are not followed; only segments directly after the
// fixed header are recognized.
fn decode_ipv6(data: &[u8], timestamp: Timestamp) -> Option<FlowEvent> {
    let ip = Ipv6Packet::new(data)?;
    if ip.get_next_header() != IpNextHeaderProtocols::Tcp {
        return None;
    }

    let tcp = TcpPacket::new(data.get(IPV6_HEADER_LEN..)?)?;

    segment_event(
        IpAddr::V6(ip.get_source()),
        IpAddr::V6(ip.get_destination()),
        &tcp,
        ip.get_payload_length() as usize,
        timestamp,
    )
}

fn segment_event(
    source: IpAddr,
    destination: IpAddr,
    tcp: &TcpPacket,
    segment_len: usize,
    timestamp: Timestamp,
) -> Option<FlowEvent> {
    let header_len = tcp.get_data_offset() as usize * 4;
    if header_len < TCP_MIN_HEADER_LEN {
        return None;
    }

    let payload_len = segment_len.checked_sub(header_len)?;
    if payload_len == 0 {
        return None;
    }

    Some(FlowEvent {
        source: Endpoint::new(source, tcp.get_source()),
        destination: Endpoint::new(destination, tcp.get_destination()),
        timestamp,
        length: u32::try_from(payload_len).ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ethernet::MutableEthernetPacket;
    use pnet::packet::ip::IpNextHeaderProtocol;
    use pnet::packet::ipv4::{Ipv4Flags, MutableIpv4Packet};
    use pnet::packet::ipv6::MutableIpv6Packet;
    use pnet::packet::tcp::MutableTcpPacket;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const ETHERNET_LEN: usize = 14;

    fn ipv4_frame(protocol: IpNextHeaderProtocol, payload_len: usize) -> Vec<u8> {
        let ip_len = IPV4_MIN_HEADER_LEN + TCP_MIN_HEADER_LEN + payload_len;
        let mut buf = vec![0u8; ETHERNET_LEN + ip_len];

        MutableEthernetPacket::new(&mut buf)
            .unwrap()
            .set_ethertype(EtherTypes::Ipv4);

        {
            let mut ip = MutableIpv4Packet::new(&mut buf[ETHERNET_LEN..]).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length(ip_len as u16);
            ip.set_next_level_protocol(protocol);
            ip.set_source(Ipv4Addr::new(10, 0, 0, 1));
            ip.set_destination(Ipv4Addr::new(10, 0, 0, 2));
        }

        {
            let offset = ETHERNET_LEN + IPV4_MIN_HEADER_LEN;
            let mut tcp = MutableTcpPacket::new(&mut buf[offset..]).unwrap();
            tcp.set_source(1000);
            tcp.set_destination(80);
            tcp.set_data_offset(5);
        }

        buf
    }

    fn ipv6_frame(payload_len: usize) -> Vec<u8> {
        let tcp_len = TCP_MIN_HEADER_LEN + payload_len;
        let mut buf = vec![0u8; ETHERNET_LEN + IPV6_HEADER_LEN + tcp_len];

        MutableEthernetPacket::new(&mut buf)
            .unwrap()
            .set_ethertype(EtherTypes::Ipv6);

        {
            let mut ip = MutableIpv6Packet::new(&mut buf[ETHERNET_LEN..]).unwrap();
            ip.set_version(6);
            ip.set_payload_length(tcp_len as u16);
            ip.set_next_header(IpNextHeaderProtocols::Tcp);
            ip.set_source(Ipv6Addr::LOCALHOST);
            ip.set_destination(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1));
        }

        {
            let offset = ETHERNET_LEN + IPV6_HEADER_LEN;
            let mut tcp = MutableTcpPacket::new(&mut buf[offset..]).unwrap();
            tcp.set_source(5000);
            tcp.set_destination(443);
            tcp.set_data_offset(5);
        }

        buf
    }

    #[test]
    fn test_tcp_with_payload_produces_event() {
        let frame = ipv4_frame(IpNextHeaderProtocols::Tcp, 100);

        let event = decode_frame(&frame, 7).expect("Should decode TCP segment");

        assert_eq!(event.source, Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 1000));
        assert_eq!(event.destination, Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 80));
        assert_eq!(event.length, 100);
        assert_eq!(event.timestamp, 7);
    }

    #[test]
    fn test_trailing_fragment_is_dropped() {
        let mut frame = ipv4_frame(IpNextHeaderProtocols::Tcp, 152);
        {
            let mut ip = MutableIpv4Packet::new(&mut frame[ETHERNET_LEN..]).unwrap();
            ip.set_fragment_offset(185);
        }
        let offset = ETHERNET_LEN + IPV4_MIN_HEADER_LEN;
        frame[offset..offset + 16].copy_from_slice(b"GET /index.html ");

        assert!(decode_frame(&frame, 0).is_none());
    }

    #[test]
    fn test_first_fragment_counts_its_own_payload() {
        let mut frame = ipv4_frame(IpNextHeaderProtocols::Tcp, 64);
        {
            let mut ip = MutableIpv4Packet::new(&mut frame[ETHERNET_LEN..]).unwrap();
            ip.set_flags(Ipv4Flags::MoreFragments);
        }

        let event = decode_frame(&frame, 0).expect("Should decode first fragment");
        assert_eq!(event.destination.port, 80);
        assert_eq!(event.length, 64);
    }

    #[test]
    fn test_zero_payload_is_dropped() {
        let frame = ipv4_frame(IpNextHeaderProtocols::Tcp, 0);
        assert!(decode_frame(&frame, 0).is_none());
    }

    #[test]
    fn test_non_tcp_is_dropped() {
        let frame = ipv4_frame(IpNextHeaderProtocols::Udp, 100);
        assert!(decode_frame(&frame, 0).is_none());
    }

    #[test]
    fn test_payload_length_survives_snapshot_truncation() {
        let mut frame = ipv4_frame(IpNextHeaderProtocols::Tcp, 1400);
        frame.truncate(128);

        let event = decode_frame(&frame, 0).expect("Should decode truncated frame");
        assert_eq!(event.length, 1400);
    }

    #[test]
    fn test_ipv6_segment() {
        let frame = ipv6_frame(32);

        let event = decode_frame(&frame, 0).expect("Should decode IPv6 segment");
        assert_eq!(event.source, Endpoint::new(Ipv6Addr::LOCALHOST, 5000));
        assert_eq!(event.destination.port, 443);
        assert_eq!(event.length, 32);
    }

    #[test]
    fn test_malformed_frames_are_skipped() {
        assert!(decode_frame(&[], 0).is_none());
        assert!(decode_frame(&[0u8; 10], 0).is_none());

        let mut arp = ipv4_frame(IpNextHeaderProtocols::Tcp, 10);
        MutableEthernetPacket::new(&mut arp)
            .unwrap()
            .set_ethertype(EtherTypes::Arp);
        assert!(decode_frame(&arp, 0).is_none());

        let mut bad_ihl = ipv4_frame(IpNextHeaderProtocols::Tcp, 10);
        MutableIpv4Packet::new(&mut bad_ihl[ETHERNET_LEN..])
            .unwrap()
            .set_header_length(2);
        assert!(decode_frame(&bad_ihl, 0).is_none());

        let mut short_total = ipv4_frame(IpNextHeaderProtocols::Tcp, 10);
        MutableIpv4Packet::new(&mut short_total[ETHERNET_LEN..])
            .unwrap()
            .set_total_length(30);
        assert!(decode_frame(&short_total, 0).is_none());
    }
}
