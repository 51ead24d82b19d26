use std::io;
use std::thread;
use std::time::{Duration, Instant};

use pnet::packet::ip::IpNextHeaderProtocols;
use tracing::instrument;

use super::echo::{self, EchoFields, MessageKind};
use super::session::{Session, Transport, SESSION_TIMEOUT};
use super::{FailureReason, LoopConfig, MalformedReplyPolicy, ProbeResult};
use crate::error::*;

/// Large enough for a full Ethernet MTU worth of ICMP.
pub const RECV_BUFFER_SIZE: usize = 1500;

/// The pause between two probes.
pub trait Sleep {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    SessionOpen,
    AwaitingReply,
    Reporting,
    Sleeping,
    Terminated,
}

/// Sends one echo request per iteration and yields its outcome.
///
/// Per-probe problems come out as `ProbeResult::Failure`. An `Err` item is
/// fatal: the raw socket could not be opened, or a reply could not be
/// decoded under `MalformedReplyPolicy::Abort`. Callers stop on the first one.
pub struct IcmpPing<T, S = ThreadSleep> {
    config: LoopConfig,
    transport: T,
    sleeper: S,
    completed: u64,
    state: LoopState,
}

impl<T: Transport> IcmpPing<T> {
    pub fn new(config: LoopConfig, transport: T) -> Self {
        IcmpPing::with_sleeper(config, transport, ThreadSleep)
    }
}

impl<T: Transport, S: Sleep> IcmpPing<T, S> {
    pub fn with_sleeper(config: LoopConfig, transport: T, sleeper: S) -> Self {
        tracing::debug!(?config, "probe loop configured");
        IcmpPing {
            config,
            transport,
            sleeper,
            completed: 0,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Number of iterations run so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    fn should_stop(&self) -> bool {
        match self.config.max_count {
            Some(max) => self.completed >= max.get(),
            None => false,
        }
    }

    #[instrument(skip(self), level = "trace")]
    fn probe(&mut self, sequence: u64) -> Result<ProbeResult> {
        let deadline = Instant::now() + SESSION_TIMEOUT;
        let mut session = self
            .transport
            .open(deadline)
            .chain_err(|| ErrorKind::OpenSessionError)?;
        self.state = LoopState::SessionOpen;

        let request = echo::build_echo_request(sequence);
        let packet = echo::serialize(&request)?;

        if let Err(e) = session.send_to(&packet, self.config.target) {
            tracing::debug!(sequence, error = %e, "transmit failed");
            self.state = LoopState::Reporting;
            return Ok(ProbeResult::Failure {
                sequence,
                reason: FailureReason::Transmit(e.to_string()),
            });
        }

        self.state = LoopState::AwaitingReply;
        let sent_at = Instant::now();
        let expected = EchoFields {
            identifier: request.identifier,
            sequence: request.sequence,
        };
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        let result = loop {
            let (size, peer) = match session.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(ref e) if is_timeout(e) => {
                    break ProbeResult::Failure {
                        sequence,
                        reason: FailureReason::Timeout,
                    };
                }
                Err(e) => {
                    break ProbeResult::Failure {
                        sequence,
                        reason: FailureReason::Receive(e.to_string()),
                    };
                }
            };
            let received_at = Instant::now();

            let message = match echo::parse_and_classify(&buffer[..size], IpNextHeaderProtocols::Icmp) {
                Ok(message) => message,
                Err(e) => match self.config.malformed_reply {
                    MalformedReplyPolicy::Abort => return Err(e),
                    MalformedReplyPolicy::Report => {
                        break ProbeResult::Failure {
                            sequence,
                            reason: FailureReason::MalformedReply(e.to_string()),
                        };
                    }
                },
            };
            tracing::trace!(
                sequence,
                kind = %message.kind(),
                code = message.code.0,
                length = message.length,
                checksum_valid = message.checksum_valid,
                "received icmp message"
            );

            match (message.kind(), message.echo) {
                (MessageKind::EchoReply, Some(fields)) if fields == expected => {
                    break ProbeResult::Success {
                        sequence,
                        size,
                        peer,
                        rtt: received_at.duration_since(sent_at),
                    };
                }
                // our own request looped back, or a reply meant for someone else
                (MessageKind::EchoReply, _) | (MessageKind::EchoRequest, _) => {
                    tracing::trace!(sequence, %peer, echo = ?message.echo, "skipping unrelated echo message");
                }
                (kind, _) => {
                    break ProbeResult::Failure {
                        sequence,
                        reason: FailureReason::UnexpectedReply(kind),
                    };
                }
            }
        };

        self.state = LoopState::Reporting;
        Ok(result)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => true,
        _ => false,
    }
}

impl<T: Transport, S: Sleep> Iterator for IcmpPing<T, S> {
    type Item = Result<ProbeResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == LoopState::Terminated {
            return None;
        }
        if self.should_stop() {
            tracing::debug!(completed = self.completed, "probe count reached");
            self.state = LoopState::Terminated;
            return None;
        }

        if self.completed > 0 {
            self.state = LoopState::Sleeping;
            self.sleeper.sleep(self.config.interval);
        }
        self.state = LoopState::Idle;

        let sequence = self.completed + 1;
        let result = self.probe(sequence);
        self.completed = sequence;

        Some(result)
    }
}
