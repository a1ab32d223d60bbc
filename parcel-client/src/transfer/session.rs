//! Startup handshake and top-level mode dispatch. See spec §4.5.1–§4.5.3.

use std::sync::Arc;

use super::{packets, send, TransferController};
use crate::cli::Cli;
use crate::error::{Error, Result};

/// Negotiated protocol version string, sent in every `INITIALIZE` request.
pub const PROTOCOL_VERSION: &str = "a7";

/// Performs the `INITIALIZE` handshake, then dispatches to monitoring,
/// listing, or sending based on the parsed command line.
pub fn start(controller: &Arc<TransferController>, cli: &Cli) -> Result<()> {
    // Leftovers from a previous auto-update run; best-effort cleanup.
    let _ = std::fs::remove_file("client.zip");
    let _ = std::fs::remove_file("update.sh");

    controller.relay.send(packets::initialize(PROTOCOL_VERSION), false);
    let mut answer = controller.wait_for_answer();
    let reply = packets::parse_initialize_reply(&mut answer)?;

    if !reply.accepted {
        let code = reply.code.unwrap_or(-1);
        tracing::error!("server rejected our protocol version, code {code}");

        if code == packets::OLD_PROTOCOL_CODE {
            tracing::info!("server requests an update, fetching replacement binary");
            if let (Some(url_binary), Some(url_script), Some(_url_windows)) =
                (&reply.url_binary, &reply.url_script, &reply.url_windows)
            {
                tracing::debug!("update binary at {url_binary}, install script at {url_script}");
                tracing::warn!("automatic download/install is not performed by this build");
            }
        }

        std::process::exit(-1);
    }

    tracing::info!("server accepted our protocol version");

    if cli.list {
        controller.relay.send(packets::available(), false);
        tracing::debug!("requested list of available hosts");
        return Ok(());
    }

    if cli.has_send() {
        let to = cli.to.clone().ok_or(Error::Parameter("specify a receiver with \"-t\""))?;

        send::send_files(controller, &cli.send, &to, cli.recursive);
        std::process::exit(0);
    }

    let name = controller.config.get_string("name", "");
    controller.relay.send(packets::join(&name), false);
    tracing::info!("registering at server as {name:?}");

    Ok(())
}
