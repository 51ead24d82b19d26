pub mod echo;
pub mod icmp;
pub mod probe;
pub mod session;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU64;
use std::time::Duration;

use clap::{App, ArgMatches};

use self::echo::MessageKind;
use crate::error::*;

pub trait Cmd {
    fn name() -> String;

    fn subcommand<'a, 'b>() -> App<'a, 'b>;

    fn execute<'a>(app: &ArgMatches<'a>) -> Result<()>;
}

/// What to do with a reply that cannot be decoded as ICMP.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MalformedReplyPolicy {
    /// Stop the whole run with a decoding error.
    Abort,
    /// Report the probe as failed and carry on.
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    pub target: Ipv4Addr,
    pub interface: String,
    /// `None` probes until the process is interrupted.
    pub max_count: Option<NonZeroU64>,
    pub interval: Duration,
    pub malformed_reply: MalformedReplyPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Transmit(String),
    Receive(String),
    Timeout,
    UnexpectedReply(MessageKind),
    MalformedReply(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FailureReason::Transmit(ref e) => write!(f, "transmit failed: {}", e),
            FailureReason::Receive(ref e) => write!(f, "receive failed: {}", e),
            FailureReason::Timeout => write!(f, "timed out waiting for reply"),
            FailureReason::UnexpectedReply(kind) => write!(f, "unexpected reply type: {}", kind),
            FailureReason::MalformedReply(ref e) => write!(f, "malformed reply: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Success {
        sequence: u64,
        size: usize,
        peer: IpAddr,
        rtt: Duration,
    },
    Failure {
        sequence: u64,
        reason: FailureReason,
    },
}

impl ProbeResult {
    pub fn sequence(&self) -> u64 {
        match *self {
            ProbeResult::Success { sequence, .. } | ProbeResult::Failure { sequence, .. } => sequence,
        }
    }

    pub fn is_success(&self) -> bool {
        match *self {
            ProbeResult::Success { .. } => true,
            ProbeResult::Failure { .. } => false,
        }
    }
}
