//! Sender role: recursive directory walk, direct-vs-relay negotiation,
//! chunked transfer with per-chunk acknowledgement. See spec §4.5.4.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parcel_core::NetworkCommunication;

use super::{dispatch, packets, TransferController};
use crate::error::{Error, Result};
use crate::{fs_util, net_info};

pub fn send_files(controller: &Arc<TransferController>, paths: &[PathBuf], to: &str, recursive: bool) {
    for path in paths {
        let mut stripped = path.to_string_lossy().to_string();
        if stripped.ends_with('/') || stripped.ends_with('\\') {
            stripped.pop();
        }

        let (base, file) = split_base_file(&stripped);
        if let Err(err) = send_file(controller, to, &file, "", &base, recursive) {
            tracing::error!("could not send {file}: {err}");
        }
    }
}

/// Splits `input` into everything up to and including its final `/`/`\`
/// component (`base`) and the trailing leaf name (`file`), matching the
/// original's `splitBaseFile`.
fn split_base_file(input: &str) -> (String, String) {
    let mut base = String::new();
    let mut remaining = input.to_string();

    while let Some(pos) = remaining.find(['/', '\\']) {
        base.push_str(&remaining[..=pos]);
        remaining.drain(..=pos);
    }

    (base, remaining)
}

fn reopen_at(path: &str, offset: u64) -> std::io::Result<std::fs::File> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(file)
}

fn send_file(
    controller: &Arc<TransferController>,
    to: &str,
    file: &str,
    directory: &str,
    base: &str,
    recursive: bool,
) -> Result<()> {
    let full_path = if directory.is_empty() { format!("{base}{file}") } else { format!("{base}{directory}{file}") };

    if fs_util::is_directory(Path::new(&full_path)) {
        if !recursive {
            tracing::warn!("recursive sending is disabled");
            return Ok(());
        }

        tracing::debug!("{file} is a folder, doing recursion");
        for entry in fs_util::list_directory(Path::new(&full_path)) {
            if let Err(err) = send_file(controller, to, &entry, &format!("{directory}{file}/"), base, recursive) {
                tracing::error!("could not send {entry}: {err}");
            }
        }
        return Ok(());
    }

    controller.relay.send(packets::inform(to, file, directory, controller.config.get_bool("direct", true)), false);

    let mut answer = controller.wait_for_answer();
    let reply = packets::parse_inform_reply(&mut answer)?;

    if !reply.accepted {
        tracing::error!("receiving side did not accept the file transfer or is not connected");
        return Err(Error::PeerRefused);
    }

    controller.set_client_id(reply.own_id);
    tracing::debug!("direct connection is {}", if reply.try_direct { "enabled" } else { "disabled" });

    let direct_connection = if reply.try_direct {
        tracing::debug!("receiving client is waiting at port {}", reply.port);

        let mut candidates = reply.addresses.clone();
        let locals = net_info::local_ip_addresses();
        net_info::sort_by_lan_affinity(&mut candidates, &locals);

        find_direct_connection(controller, &candidates, reply.port)
    } else {
        None
    };

    let use_relay = direct_connection.is_none();
    let direct_packet_thread: Option<JoinHandle<()>> = direct_connection.as_ref().map(|network| {
        dispatch::spawn_packet_thread(Arc::clone(controller), Arc::clone(network), dispatch::NO_PEER_ID, false)
    });

    let size = fs_util::file_size(Path::new(&full_path)).map_err(Error::Io)?;

    tracing::debug!("sending the file {base} + {directory} + {file}");
    tracing::debug!("file size {size} bytes");

    let buffer_size = controller.config.get_usize("buffer_size", 4 * 1024 * 1024);
    let mut handle = std::fs::File::open(&full_path).map_err(Error::Io)?;

    let timer = Instant::now();
    let mut sent_total: u64 = 0;
    let mut first = true;
    let mut retried = false;

    while sent_total < size {
        let to_read = buffer_size.min((size - sent_total) as usize);
        let mut buf = vec![0u8; to_read];

        let actually_read = match handle.read(&mut buf) {
            Ok(n) => n,
            Err(err) => {
                if retried {
                    tracing::error!("second read failure on {full_path}, aborting: {err}");
                    return Err(Error::Io(err));
                }

                tracing::warn!("read failed on {full_path}, retrying: {err}");
                retried = true;
                handle = reopen_at(&full_path, sent_total).map_err(Error::Io)?;
                continue;
            }
        };
        retried = false;
        buf.truncate(actually_read);

        let packet = if use_relay {
            packets::send_relay(to, file, directory, &buf, first)
        } else {
            packets::send_direct(reply.own_id, file, directory, &buf, first)
        };

        send_via(&controller.relay, direct_connection.as_ref(), use_relay, packet);
        sent_total += actually_read as u64;
        first = false;

        let mut result = controller.wait_for_answer();
        let send_result = packets::parse_send_result(&mut result)?;
        tracing::trace!("chunk ack from {}", send_result.id);

        if !send_result.ok {
            tracing::warn!("something went wrong during file transfer");
            return Err(Error::Protocol("receiver rejected a chunk"));
        }

        if (buffer_size as u64) < size {
            let elapsed = timer.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                tracing::debug!("current speed: {:.2} MB/s", (sent_total as f64 / 1024.0 / 1024.0) / elapsed);
            }
        }
    }

    tracing::debug!("message EOF to receiver");

    let finalizer = if use_relay {
        packets::send_relay(to, file, directory, &[], false)
    } else {
        packets::send_direct(reply.own_id, file, directory, &[], false)
    };
    send_via(&controller.relay, direct_connection.as_ref(), use_relay, finalizer);

    let mut result = controller.wait_for_answer();
    let send_result = packets::parse_send_result(&mut result);
    let elapsed = timer.elapsed().as_secs_f64();

    match send_result {
        Ok(r) if r.ok => tracing::debug!("file successfully sent"),
        _ => tracing::error!("file could not be sent"),
    }

    tracing::debug!("elapsed time: {elapsed:.2} seconds");
    if elapsed > 0.0 {
        tracing::debug!("speed: {:.2} MB/s", (size as f64 / 1024.0 / 1024.0) / elapsed);
    }

    if let Some(network) = direct_connection {
        tracing::debug!("killing direct connection network");
        network.kill(false);
        if let Some(thread) = direct_packet_thread {
            let _ = thread.join();
        }
        tracing::debug!("killed network");
    }

    Ok(())
}

fn send_via(
    relay: &Arc<NetworkCommunication>,
    direct: Option<&Arc<NetworkCommunication>>,
    use_relay: bool,
    packet: parcel_core::Packet,
) {
    if use_relay {
        relay.send(packet, false);
    } else {
        direct.expect("direct endpoint present when use_relay is false").send(packet, false);
    }
}

/// Tries each candidate address in order, skipping ones already known to
/// have failed this session; first success wins. See spec §4.5.4 step 5.
fn find_direct_connection(
    controller: &Arc<TransferController>,
    candidates: &[String],
    port: u16,
) -> Option<Arc<NetworkCommunication>> {
    for ip in candidates {
        if controller.is_direct_ip_failed(ip) {
            continue;
        }

        tracing::debug!("available remote address: {ip}");
        tracing::debug!("trying {ip}");

        let network = match NetworkCommunication::new() {
            Ok(network) => network,
            Err(err) => {
                tracing::warn!("could not create endpoint for {ip}: {err}");
                continue;
            }
        };

        match network.start(ip, port, true, false) {
            Ok(true) => return Some(network),
            _ => controller.mark_direct_ip_failed(ip.clone()),
        }
    }

    None
}
