//! Entry point: startup banner, configuration, relay connection, and
//! handoff to the transfer controller. See spec §1 and §4.5.1.

use clap::Parser;
use parcel_core::NetworkCommunication;

use parcel_client::cli::Cli;
use parcel_client::config::Config;
use parcel_client::transfer::{dispatch, session, TransferController};

fn print_banner() {
    tracing::info!("parcel [{}]", env!("CARGO_PKG_VERSION"));
    tracing::info!("protocol standard: {}", session::PROTOCOL_VERSION);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    print_banner();

    let cli = Cli::parse();
    let config = Config::parse(&cli.config);

    let host = config.get_string("host", "localhost");
    let port = config.get_u16("port", 12000);

    tracing::debug!("connecting to relay at {host}:{port}");

    let relay = match NetworkCommunication::new() {
        Ok(relay) => relay,
        Err(err) => {
            tracing::error!("could not create relay endpoint: {err}");
            std::process::exit(-1);
        }
    };

    match relay.start(&host, port, false, false) {
        Ok(true) => {}
        Ok(false) => {
            tracing::error!("could not connect to relay at {host}:{port}");
            std::process::exit(-1);
        }
        Err(err) => {
            tracing::error!("could not connect to relay at {host}:{port}: {err}");
            std::process::exit(-1);
        }
    }

    let controller = TransferController::new(config, relay.clone());
    let relay_thread = dispatch::spawn_packet_thread(controller.clone(), relay, dispatch::NO_PEER_ID, false);

    if let Err(err) = session::start(&controller, &cli) {
        tracing::error!("session error: {err}");
        std::process::exit(-1);
    }

    let _ = relay_thread.join();
}
