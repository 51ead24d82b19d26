use std::net::Ipv4Addr;
use std::num::NonZeroU64;

use clap::{App, Arg, ArgMatches};
use colored::Colorize;

use super::probe::IcmpPing;
use super::session::RawTransport;
use super::{Cmd, LoopConfig, MalformedReplyPolicy, ProbeResult};
use crate::error::*;
use crate::utils;

pub struct IcmpCmd;

impl Cmd for IcmpCmd {
    fn name() -> String {
        "icmp".to_string()
    }

    fn subcommand<'a, 'b>() -> App<'a, 'b> {
        App::new(Self::name())
            .about("Ping destination by sending ICMP echo requests")
            .arg(Arg::with_name("target").required(true).help("IPv4 address to ping"))
            .arg(
                Arg::with_name("count")
                    .short("c")
                    .long("count")
                    .takes_value(true)
                    .help("Stop after this many requests, 0 for no limit"),
            )
            .arg(
                Arg::with_name("interval")
                    .short("i")
                    .long("interval")
                    .takes_value(true)
                    .default_value("1s")
                    .help("Pause between requests, e.g. 500ms or 2s"),
            )
            .arg(
                Arg::with_name("interface")
                    .short("I")
                    .long("interface")
                    .takes_value(true)
                    .default_value(utils::DEFAULT_INTERFACE)
                    .help("Interface used to scope the destination"),
            )
            .arg(
                Arg::with_name("tolerate-malformed")
                    .long("tolerate-malformed")
                    .help("Report undecodable replies as failed probes instead of exiting"),
            )
    }

    fn execute<'a>(app: &ArgMatches<'a>) -> Result<()> {
        let config = loop_config(app)?;
        if utils::find_interface(&config.interface).is_none() {
            tracing::warn!(interface = %config.interface, "interface not found");
        }

        let mut ping = IcmpPing::new(config, RawTransport);
        for result in ping.by_ref() {
            let result = result?;
            tracing::trace!(sequence = result.sequence(), success = result.is_success(), "probe finished");
            report(&result);
        }
        tracing::debug!(completed = ping.completed(), state = ?ping.state(), "probe loop finished");
        Ok(())
    }
}

fn invalid(name: &str, reason: String) -> Error {
    ErrorKind::InvalidArgument(name.to_string(), reason).into()
}

pub fn loop_config(app: &ArgMatches) -> Result<LoopConfig> {
    let target = app.value_of("target").unwrap_or("");
    let target = target
        .parse::<Ipv4Addr>()
        .map_err(|_| invalid("target", format!("{} is not an IPv4 address", target)))?;

    let max_count = match app.value_of("count") {
        Some(count) => count
            .parse::<u64>()
            .map_err(|e| invalid("count", format!("{}: {}", count, e)))?,
        None => 0,
    };

    let interval = app.value_of("interval").unwrap_or("1s");
    let interval = humantime::parse_duration(interval)
        .map_err(|e| invalid("interval", format!("{}: {}", interval, e)))?;

    let malformed_reply = if app.is_present("tolerate-malformed") {
        MalformedReplyPolicy::Report
    } else {
        MalformedReplyPolicy::Abort
    };

    Ok(LoopConfig {
        target,
        interface: app.value_of("interface").unwrap_or(utils::DEFAULT_INTERFACE).to_string(),
        max_count: NonZeroU64::new(max_count),
        interval,
        malformed_reply,
    })
}

pub fn format_result(result: &ProbeResult) -> String {
    match *result {
        ProbeResult::Success {
            sequence,
            size,
            peer,
            rtt,
        } => format!("#{} {} bytes from {} {:?}", sequence, size, peer, rtt),
        ProbeResult::Failure { sequence, ref reason } => format!("#{} ERROR {}", sequence, reason),
    }
}

fn report(result: &ProbeResult) {
    let line = format_result(result);
    if result.is_success() {
        println!("{}", line);
    } else {
        println!("{}", line.red());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ping::echo::MessageKind;
    use crate::ping::FailureReason;
    use std::net::IpAddr;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Result<LoopConfig> {
        let mut argv = vec!["icmp"];
        argv.extend_from_slice(args);
        let matches = IcmpCmd::subcommand().get_matches_from_safe(argv).unwrap();
        loop_config(&matches)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["127.0.0.1"]).unwrap();

        assert_eq!(config.target, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(config.interface, utils::DEFAULT_INTERFACE);
        assert_eq!(config.max_count, None);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.malformed_reply, MalformedReplyPolicy::Abort);
    }

    #[test]
    fn test_all_options() {
        let config = parse(&["10.0.0.1", "-c", "5", "-i", "250ms", "-I", "lo", "--tolerate-malformed"]).unwrap();

        assert_eq!(config.target, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(config.max_count, NonZeroU64::new(5));
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.interface, "lo");
        assert_eq!(config.malformed_reply, MalformedReplyPolicy::Report);
    }

    #[test]
    fn test_zero_count_is_unbounded() {
        assert_eq!(parse(&["127.0.0.1", "-c", "0"]).unwrap().max_count, None);
    }

    #[test]
    fn test_zero_interval() {
        assert_eq!(parse(&["127.0.0.1", "-i", "0s"]).unwrap().interval, Duration::from_secs(0));
    }

    #[test]
    fn test_invalid_arguments() {
        for args in &[
            &["example.com"][..],
            &["::1"][..],
            &["127.0.0.1", "-c", "many"][..],
            &["127.0.0.1", "-i", "soon"][..],
        ] {
            match parse(args) {
                Err(Error(ErrorKind::InvalidArgument(..), _)) => {}
                other => panic!("expected invalid argument for {:?}, got {:?}", args, other),
            }
        }
    }

    #[test]
    fn test_format_success() {
        let line = format_result(&ProbeResult::Success {
            sequence: 2,
            size: 24,
            peer: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            rtt: Duration::from_micros(1500),
        });
        assert_eq!(line, "#2 24 bytes from 127.0.0.1 1.5ms");
    }

    #[test]
    fn test_format_failure() {
        let line = format_result(&ProbeResult::Failure {
            sequence: 9,
            reason: FailureReason::UnexpectedReply(MessageKind::DestinationUnreachable),
        });
        assert_eq!(line, "#9 ERROR unexpected reply type: destination unreachable");
    }
}
