#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;

pub mod error;
mod ping;
mod utils;

use std::io;
use std::process;

use clap::{App, AppSettings};
use tracing_subscriber::EnvFilter;

use crate::ping::icmp::IcmpCmd;
use crate::ping::Cmd;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let matches = App::new("rping")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Ping hosts with raw ICMP echo requests")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(IcmpCmd::subcommand())
        .get_matches();

    let result = match matches.subcommand() {
        (name, Some(sub)) if name == IcmpCmd::name() => IcmpCmd::execute(sub),
        _ => unreachable!("clap rejects unknown subcommands"),
    };

    if let Err(ref e) = result {
        eprintln!("error: {}", e);
        for cause in e.iter().skip(1) {
            eprintln!("caused by: {}", cause);
        }
        process::exit(1);
    }
}
