//! tapswitch binary entry point.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tapswitch_cli::args::{Cli, LogLevel};
use tapswitch_core::{Error, Result, Uplink};
use tapswitch_hub::Hub;
use tapswitch_server::WsTapServer;
use tapswitch_tap::TapDevice;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_max_level(level.tracing_level())
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(cli.build_config()?);

    let tap = Arc::new(TapDevice::create(&config.tap_name)?);
    tapswitch_tap::setup::configure_ipv4(tap.name(), &config.tap_ipv4);

    let uplink: Arc<dyn Uplink> = tap.clone();
    let hub = Arc::new(Hub::new(Arc::clone(&config), uplink));

    let server = WsTapServer::new(Arc::clone(&config), Arc::clone(&hub));
    let mut serve = tokio::spawn(server.run());
    let mut pump = tokio::spawn(tapswitch_tap::reader::run(tap, Arc::clone(&hub)));

    // Whichever side fails first takes the process down.
    let result = tokio::select! {
        joined = &mut serve => flatten(joined),
        joined = &mut pump => flatten(joined),
    };

    hub.clear();
    result
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(Error::transport(format!("task failed: {}", e))),
    }
}
