use std::{process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use radio_recorder::{
    args::{convert_filter, Args},
    capture::Store,
    config::{CaptureConfig, NodeConfig, RecordConfig},
    identity::{self, GroundstationId},
    layout::{self, Layout},
    resolver::{HttpSource, Resolver},
    schedule::{Outcome, Scheduler, SystemClock},
    transport, Result,
};
use tracing::{error, info};

fn run(args: Args) -> Result<()> {
    info!(
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "Starting recorder"
    );
    let layout = Layout::bootstrap(&args.data_root, &args.hub_root)?;

    // One shared config for every node, with a local fallback
    let resolver = Resolver::new(
        HttpSource {
            url: args.config_url.clone(),
            timeout: Duration::from_secs(args.fetch_timeout),
        },
        &layout.config,
    );
    let record = RecordConfig::from_value(resolver.resolve()?)?;
    // Small nodes may not hold a full buffer in RAM
    let node = NodeConfig::load(&args.node_config)?;
    let config = CaptureConfig::new(&record, &node)?;

    let id = GroundstationId::load_or_create(&args.id_file, identity::hardware_node)?;
    let store = Store::new(layout.category(layout::IQ), id);

    let mut transport = transport::select(
        args.transport,
        &transport::Options {
            exe: args.rtl_sdr.clone(),
            depth: args.depth as usize,
            replace_poll: Duration::from_secs(args.replace_poll),
        },
    )?;

    let scheduler = Scheduler::new(Arc::new(SystemClock), Duration::from_secs(args.poll));
    match scheduler.run(&config, transport.as_mut(), &store)? {
        Outcome::Missed => info!("Nothing recorded"),
        Outcome::Recorded { gain, stats } => info!(
            %gain,
            buffers = stats.buffers,
            failed = stats.failed,
            dir = ?store.dir(),
            "Recording finished"
        ),
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
