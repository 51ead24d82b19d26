use std::fmt;

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{self, IcmpCode, IcmpPacket, IcmpType, IcmpTypes};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::Packet;

use crate::error::*;
use crate::utils;

/// Filler carried by every probe. Replies are not checked against it.
pub const ECHO_PAYLOAD: &[u8] = b"hello-from-rping";

lazy_static! {
    static ref ECHO_HEADER_SIZE: usize = MutableEchoRequestPacket::minimum_packet_size();
    static ref ICMP_HEADER_SIZE: usize = IcmpPacket::minimum_packet_size();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub identifier: u16,
    pub sequence: u16,
    pub payload: &'static [u8],
}

/// Build the echo request for a loop sequence number.
///
/// The wire field is 16 bits wide, so sequences above `u16::MAX` wrap.
pub fn build_echo_request(sequence: u64) -> EchoRequest {
    EchoRequest {
        identifier: utils::echo_identifier(),
        sequence: (sequence & 0xffff) as u16,
        payload: ECHO_PAYLOAD,
    }
}

pub fn serialize(request: &EchoRequest) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; *ECHO_HEADER_SIZE + request.payload.len()];

    let checksum = {
        let mut packet = MutableEchoRequestPacket::new(&mut buffer).ok_or(ErrorKind::EncodingError)?;
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(request.identifier);
        packet.set_sequence_number(request.sequence);
        packet.set_payload(request.payload);

        let icmp_packet = IcmpPacket::new(packet.packet()).ok_or(ErrorKind::EncodingError)?;
        icmp::checksum(&icmp_packet)
    };

    MutableEchoRequestPacket::new(&mut buffer)
        .ok_or(ErrorKind::EncodingError)?
        .set_checksum(checksum);
    Ok(buffer)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageKind {
    EchoReply,
    EchoRequest,
    DestinationUnreachable,
    TimeExceeded,
    Other(u8),
}

impl From<IcmpType> for MessageKind {
    fn from(icmp_type: IcmpType) -> Self {
        match icmp_type {
            IcmpTypes::EchoReply => MessageKind::EchoReply,
            IcmpTypes::EchoRequest => MessageKind::EchoRequest,
            IcmpTypes::DestinationUnreachable => MessageKind::DestinationUnreachable,
            IcmpTypes::TimeExceeded => MessageKind::TimeExceeded,
            IcmpType(other) => MessageKind::Other(other),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MessageKind::EchoReply => write!(f, "echo reply"),
            MessageKind::EchoRequest => write!(f, "echo request"),
            MessageKind::DestinationUnreachable => write!(f, "destination unreachable"),
            MessageKind::TimeExceeded => write!(f, "time exceeded"),
            MessageKind::Other(icmp_type) => write!(f, "type {}", icmp_type),
        }
    }
}

/// Identifier and sequence of an echo request or reply.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EchoFields {
    pub identifier: u16,
    pub sequence: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub icmp_type: IcmpType,
    pub code: IcmpCode,
    pub length: usize,
    pub checksum_valid: bool,
    pub echo: Option<EchoFields>,
}

impl ParsedMessage {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from(self.icmp_type)
    }
}

pub fn parse_and_classify(bytes: &[u8], protocol: IpNextHeaderProtocol) -> Result<ParsedMessage> {
    if protocol != IpNextHeaderProtocols::Icmp {
        bail!(ErrorKind::DecodingError(format!("unsupported protocol {}", protocol.0)));
    }

    let packet = IcmpPacket::new(bytes).ok_or_else(|| {
        ErrorKind::DecodingError(format!(
            "message too short: {} bytes, need at least {}",
            bytes.len(),
            *ICMP_HEADER_SIZE
        ))
    })?;
    let icmp_type = packet.get_icmp_type();

    let echo = match icmp_type {
        IcmpTypes::EchoReply | IcmpTypes::EchoRequest => {
            // request and reply share one layout
            let echo = EchoReplyPacket::new(bytes).ok_or_else(|| {
                ErrorKind::DecodingError(format!("echo message too short: {} bytes", bytes.len()))
            })?;
            Some(EchoFields {
                identifier: echo.get_identifier(),
                sequence: echo.get_sequence_number(),
            })
        }
        _ => None,
    };

    Ok(ParsedMessage {
        icmp_type,
        code: packet.get_icmp_code(),
        length: bytes.len(),
        checksum_valid: icmp::checksum(&packet) == packet.get_checksum(),
        echo,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_decoding_error(result: Result<ParsedMessage>) {
        match result {
            Err(Error(ErrorKind::DecodingError(_), _)) => {}
            other => panic!("expected decoding error, got {:?}", other),
        }
    }

    #[test]
    fn test_build_echo_request() {
        let request = build_echo_request(7);

        assert_eq!(request.sequence, 7);
        assert_eq!(request.identifier, utils::echo_identifier());
        assert_eq!(request.payload, ECHO_PAYLOAD);
    }

    #[test]
    fn test_sequence_wraps_on_the_wire() {
        assert_eq!(build_echo_request(65_537).sequence, 1);
    }

    #[test]
    fn test_serialize_layout() {
        let request = EchoRequest {
            identifier: 0x1234,
            sequence: 0x0102,
            payload: b"ab",
        };
        let bytes = serialize(&request).unwrap();

        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..2], &[8, 0]);
        assert_eq!(&bytes[4..8], &[0x12, 0x34, 0x01, 0x02]);
        assert_eq!(&bytes[8..], b"ab");
    }

    #[test]
    fn test_serialize_then_parse() {
        let request = build_echo_request(3);
        let bytes = serialize(&request).unwrap();
        let parsed = parse_and_classify(&bytes, IpNextHeaderProtocols::Icmp).unwrap();

        assert_eq!(parsed.kind(), MessageKind::EchoRequest);
        assert_eq!(parsed.code, IcmpCode::new(0));
        assert_eq!(parsed.length, bytes.len());
        assert!(parsed.checksum_valid);
        assert_eq!(
            parsed.echo,
            Some(EchoFields {
                identifier: request.identifier,
                sequence: 3,
            })
        );
    }

    #[test]
    fn test_corrupted_checksum_is_reported() {
        let mut bytes = serialize(&build_echo_request(1)).unwrap();
        bytes[9] ^= 0xff;
        let parsed = parse_and_classify(&bytes, IpNextHeaderProtocols::Icmp).unwrap();

        assert!(!parsed.checksum_valid);
    }

    #[test]
    fn test_classify_destination_unreachable() {
        // port unreachable, followed by part of the offending datagram
        let bytes = [3, 3, 0xfc, 0xfc, 0, 0, 0, 0, 0x45, 0];
        let parsed = parse_and_classify(&bytes, IpNextHeaderProtocols::Icmp).unwrap();

        assert_eq!(parsed.kind(), MessageKind::DestinationUnreachable);
        assert_eq!(parsed.code, IcmpCode::new(3));
        assert_eq!(parsed.echo, None);
        assert_eq!(parsed.kind().to_string(), "destination unreachable");
    }

    #[test]
    fn test_classify_unknown_type() {
        let parsed = parse_and_classify(&[42, 0, 0, 0], IpNextHeaderProtocols::Icmp).unwrap();

        assert_eq!(parsed.kind(), MessageKind::Other(42));
        assert_eq!(parsed.kind().to_string(), "type 42");
    }

    #[test]
    fn test_parse_too_short() {
        assert_decoding_error(parse_and_classify(&[0, 0, 0], IpNextHeaderProtocols::Icmp));
        assert_decoding_error(parse_and_classify(&[], IpNextHeaderProtocols::Icmp));
    }

    #[test]
    fn test_parse_truncated_echo() {
        assert_decoding_error(parse_and_classify(&[0, 0, 0xff, 0xff, 0, 1], IpNextHeaderProtocols::Icmp));
    }

    #[test]
    fn test_parse_rejects_other_protocols() {
        let bytes = serialize(&build_echo_request(1)).unwrap();
        assert_decoding_error(parse_and_classify(&bytes, IpNextHeaderProtocols::Icmpv6));
    }
}
