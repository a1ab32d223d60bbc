//! Receiver-side packet handlers: `JOIN`, `AVAILABLE`, `INFORM_RESULT`,
//! `SEND`, and `CLIENT_DISCONNECT`. See spec §4.5.5.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parcel_core::{NetworkCommunication, Packet};

use super::{dispatch, packets, PeerEndpoint, TransferController};
use crate::error::{Error, Result};
use crate::{fs_util, net_info};

pub fn handle_join(packet: &mut Packet) -> Result<()> {
    let accepted = packets::parse_join_reply(packet)?;

    if accepted {
        tracing::info!("accepted at server");
    } else {
        tracing::warn!("server did not accept our connection");
        std::process::exit(-1);
    }

    Ok(())
}

pub fn handle_available(packet: &mut Packet) -> Result<()> {
    let hosts = packets::parse_available_reply(packet)?;

    tracing::debug!("hosts:");
    for (id, name) in hosts {
        tracing::debug!("host {id} : {name}");
    }

    std::process::exit(0);
}

/// Decides direct-vs-relay for an incoming transfer and, if direct, binds a
/// listening port and spawns its packet thread. See spec §4.5.5.
pub fn handle_inform_result(controller: &Arc<TransferController>, packet: &mut Packet) -> Result<()> {
    let request = packets::parse_inform_request(packet)?;
    let relative_path = format!("{}{}", request.dir, request.file);

    if controller.is_file_being_written_directly(&relative_path) {
        tracing::error!("the file {relative_path} is already being written");
        controller.relay.send(packets::inform_result(false, request.id, 0, &[]), false);
        return Ok(());
    }

    let mut addresses = net_info::local_ip_addresses();
    let want_direct = controller.config.get_bool("direct", true) && request.allow_direct;

    let listener = if want_direct {
        let mut port: u16 = 30500;
        loop {
            let network = NetworkCommunication::new().map_err(Error::Io)?;
            match network.start("", port, false, true) {
                Ok(true) => break Some((network, port)),
                Ok(false) => {
                    tracing::error!("hosting failed at port {port}");
                    port = port.wrapping_add(1);
                }
                Err(err) => {
                    tracing::error!("hosting failed at port {port}: {err}");
                    port = port.wrapping_add(1);
                }
            }
        }
    } else {
        addresses.clear();
        None
    };

    let port = listener.as_ref().map(|(_, port)| *port).unwrap_or(0);
    controller.relay.send(packets::inform_result(true, request.id, port, &addresses), false);

    if let Some((network, bound_port)) = listener {
        tracing::debug!("hosting successful at port {bound_port}");
        let thread = dispatch::spawn_packet_thread(Arc::clone(controller), Arc::clone(&network), request.id, true);
        controller.add_peer_network(PeerEndpoint { id: request.id, file: relative_path, network, thread });
    }

    Ok(())
}

/// The workhorse: writes one chunk, or — on an empty chunk — finalizes the
/// transfer. See spec §4.5.5.
pub fn handle_send(
    controller: &Arc<TransferController>,
    network: &Arc<NetworkCommunication>,
    packet: &mut Packet,
) -> Result<()> {
    let received = packets::parse_send(packet)?;
    let relative_path = format!("{}{}", received.dir, received.file);

    let output_path = if controller.config.has("output_folder") {
        format!("{}/{}", controller.config.get_string("output_folder", ""), relative_path)
    } else {
        relative_path.clone()
    };

    if received.bytes.is_empty() {
        tracing::debug!("message EOF from sender, finalizing {output_path}");

        // Reply before flush+close so the sender can proceed immediately;
        // see DESIGN.md for why this ordering is intentional, not a bug.
        network.send(packets::send_result(received.id, true), false);

        controller.close_file_stream(&output_path, received.id);
        controller.retire_peer_network_by_file(&relative_path);

        tracing::debug!("done");
        return Ok(());
    }

    if received.first {
        tracing::debug!("removing existing files and preparing stream");

        if let Some(parent) = Path::new(&output_path).parent() {
            fs_util::create_directory_all(&parent.to_string_lossy());
        }

        if controller.has_file_stream(&output_path) {
            tracing::warn!("file {output_path} already exists, disabling write");
            network.send(packets::send_result(received.id, false), false);
            return Ok(());
        }

        let _ = std::fs::remove_file(&output_path);
        let file = std::fs::File::create(&output_path).map_err(Error::Io)?;
        controller.insert_file_stream(output_path.clone(), file, received.id);
    }

    tracing::debug!("writing file {output_path} with {} bytes", received.bytes.len());

    let write_result = controller.with_file_stream(&output_path, |file| file.write_all(&received.bytes));
    match write_result {
        Some(Ok(())) => {
            network.send(packets::send_result(received.id, true), false);
        }
        Some(Err(err)) => {
            network.send(packets::send_result(received.id, false), false);
            return Err(Error::ChunkWrite(err));
        }
        None => {
            tracing::warn!("could not find file stream for {output_path}");
        }
    }

    Ok(())
}

pub fn handle_client_disconnect(controller: &Arc<TransferController>, packet: &mut Packet) -> Result<()> {
    let id = packets::parse_client_disconnect(packet)?;

    controller.retire_peer_network_by_id(id);
    controller.close_all_streams_for_id(id);

    Ok(())
}
