//! Argument parsing for running from the command line

use std::path::PathBuf;

use clap::Parser;

use crate::{process, resolver, transport::Kind};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Root of the node's shared data directory, captures go to <root>/rec/iq
    #[clap(long, default_value = "dgsn-node-data")]
    pub data_root: PathBuf,
    /// Hub checkout, record configs live in <root>/io-radio
    #[clap(long, default_value = "dgsn-hub-ops")]
    pub hub_root: PathBuf,
    /// Node limits (secondsofrecording_maximum)
    #[clap(short, long, default_value = "node-config.json")]
    pub node_config: PathBuf,
    /// Cached groundstation id
    #[clap(long, default_value = "groundstationid.npy")]
    pub id_file: PathBuf,
    /// Where to fetch the shared record config from
    #[clap(long, default_value = resolver::DEFAULT_URL)]
    pub config_url: String,
    /// Seconds to wait for the remote config
    #[clap(long, default_value_t = 30)]
    pub fetch_timeout: u64,
    /// Seconds between checks while waiting for the recording window
    #[clap(long, default_value_t = 10)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub poll: u64,
    /// Seconds between checks for finished capture tasks
    #[clap(long, default_value_t = 2)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub replace_poll: u64,
    /// Overlapping capture tasks for the direct device transport
    #[clap(short, long, default_value_t = 2)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..=16))]
    pub depth: u64,
    /// How to talk to the dongle
    #[clap(short, long, value_enum, default_value_t = Kind::Auto)]
    pub transport: Kind,
    /// External capture command for the process transport
    #[clap(long, default_value = process::DEFAULT_EXE)]
    pub rtl_sdr: PathBuf,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
