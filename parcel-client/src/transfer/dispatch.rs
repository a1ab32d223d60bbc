//! The packet thread: one per endpoint (relay or direct peer), draining
//! `retired_networks` on each iteration before dispatching by header. See
//! spec §4.5 and §4.5.7.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parcel_core::{Header, NetworkCommunication, Packet};

use super::{receive, TransferController};
use crate::error::{Error, Result};

/// Id tag for the relay connection's own packet thread and for a sender's
/// direct packet thread, per spec §4.5.4 step 6 ("spawn a packet thread for
/// it (with `id = -1, do_accept = false`)").
pub const NO_PEER_ID: i32 = -1;

pub fn spawn_packet_thread(
    controller: Arc<TransferController>,
    network: Arc<NetworkCommunication>,
    id: i32,
    do_accept: bool,
) -> JoinHandle<()> {
    thread::spawn(move || packet_thread(controller, network, id, do_accept))
}

fn packet_thread(
    controller: Arc<TransferController>,
    network: Arc<NetworkCommunication>,
    id: i32,
    do_accept: bool,
) {
    if do_accept {
        match network.accept_connection() {
            Ok(true) => {}
            Ok(false) => return, // cancelled before a peer connected
            Err(err) => {
                tracing::warn!("accept_connection failed: {err}");
                return;
            }
        }
    }

    while let Some(packet) = network.wait_for_packet() {
        controller.drain_retired_networks(id);

        if let Err(err) = dispatch(&controller, &network, packet) {
            tracing::warn!("error dispatching packet: {err}");
        }

        network.complete_packet();
    }

    tracing::debug!("packet thread exiting");
}

fn dispatch(controller: &Arc<TransferController>, network: &Arc<NetworkCommunication>, mut packet: Packet) -> Result<()> {
    // Held for the whole call: a direct-peer packet thread and the relay
    // packet thread both dispatch against this same controller, and must
    // not interleave their handler logic. See spec §4.5/§5.
    let _dispatch_guard = controller.lock_dispatch();

    let header = packet.header().map_err(Error::Core)?;
    packet.get_byte().map_err(Error::Core)?; // consume the header byte `header()` only peeked

    match header {
        Header::Join => receive::handle_join(&mut packet),
        Header::Available => receive::handle_available(&mut packet),
        Header::Inform | Header::SendResult | Header::Initialize => {
            controller.notify_answer(packet);
            Ok(())
        }
        Header::Send => receive::handle_send(controller, network, &mut packet),
        Header::InformResult => receive::handle_inform_result(controller, &mut packet),
        Header::ClientDisconnect => receive::handle_client_disconnect(controller, &mut packet),
    }
}
