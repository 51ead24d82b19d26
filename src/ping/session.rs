use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use pnet::packet::icmp::IcmpPacket;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::Packet;
use pnet::transport::TransportChannelType::Layer4;
use pnet::transport::TransportProtocol::Ipv4;
use pnet::transport::{icmp_packet_iter, transport_channel, TransportReceiver, TransportSender};

/// Lifetime of one session, counted from the moment it is opened.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

// room for the IPv4 header pnet strips before handing out the ICMP payload
const CHANNEL_BUFFER_SIZE: usize = 4096;

/// A socket that lives for exactly one probe.
///
/// Sessions are released by dropping them.
pub trait Session {
    fn send_to(&mut self, packet: &[u8], destination: Ipv4Addr) -> io::Result<usize>;

    /// Wait for the next ICMP message, copying it into `buffer`.
    ///
    /// Fails with `io::ErrorKind::TimedOut` once the session deadline has passed.
    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<(usize, IpAddr)>;
}

pub trait Transport {
    type Session: Session;

    fn open(&mut self, deadline: Instant) -> io::Result<Self::Session>;
}

pub fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "no reply before session deadline")
}

/// Raw ICMPv4 sockets listening on every local address.
#[derive(Debug, Default)]
pub struct RawTransport;

impl Transport for RawTransport {
    type Session = RawSession;

    fn open(&mut self, deadline: Instant) -> io::Result<RawSession> {
        let protocol = Layer4(Ipv4(IpNextHeaderProtocols::Icmp));
        let (tx, rx) = transport_channel(CHANNEL_BUFFER_SIZE, protocol)?;

        Ok(RawSession { tx, rx, deadline })
    }
}

pub struct RawSession {
    tx: TransportSender,
    rx: TransportReceiver,
    deadline: Instant,
}

impl RawSession {
    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Session for RawSession {
    fn send_to(&mut self, packet: &[u8], destination: Ipv4Addr) -> io::Result<usize> {
        let packet = IcmpPacket::new(packet)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "packet shorter than ICMP header"))?;
        self.tx.send_to(packet, IpAddr::V4(destination))
    }

    fn recv_from(&mut self, buffer: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        let remaining = self.remaining();
        if remaining == Duration::from_secs(0) {
            return Err(timed_out());
        }

        let mut iter = icmp_packet_iter(&mut self.rx);
        match iter.next_with_timeout(remaining)? {
            Some((packet, peer)) => {
                let bytes = packet.packet();
                let size = bytes.len().min(buffer.len());
                buffer[..size].copy_from_slice(&bytes[..size]);
                Ok((size, peer))
            }
            None => Err(timed_out()),
        }
    }
}
