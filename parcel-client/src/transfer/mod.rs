//! The transfer controller: shared state plus the sender and receiver
//! roles that drive the file-transfer protocol on top of one or more
//! [`NetworkCommunication`] endpoints. See spec §3 "Transfer controller
//! state" and §4.5.

pub mod dispatch;
pub mod packets;
pub mod receive;
pub mod send;
pub mod session;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use parcel_core::{NetworkCommunication, Packet};

use crate::config::Config;

/// A direct-peer endpoint spawned on behalf of one in-flight transfer,
/// together with the packet thread driving it. Used for both the active
/// (`peer_networks`) and retired lists — the original's `NetworkEntry`.
pub struct PeerEndpoint {
    pub id: i32,
    pub file: String,
    pub network: Arc<NetworkCommunication>,
    pub thread: JoinHandle<()>,
}

/// Single-slot synchronous mailbox used for caller/dispatcher rendezvous.
/// See spec §4.5.1. Correctness depends on at most one outstanding request
/// per controller at a time.
#[derive(Default)]
struct AnswerSlot {
    packet: Mutex<Option<Packet>>,
    cv: Condvar,
}

impl AnswerSlot {
    fn notify(&self, packet: Packet) {
        let mut guard = self.packet.lock().unwrap();
        *guard = Some(packet);
        self.cv.notify_one();
    }

    /// Blocks until an answer is posted, takes a copy, clears the slot.
    fn wait(&self) -> Packet {
        let guard = self.packet.lock().unwrap();
        let mut guard = self.cv.wait_while(guard, |slot| slot.is_none()).unwrap();
        guard.take().unwrap()
    }
}

struct State {
    file_streams: HashMap<String, File>,
    id_to_files: HashMap<i32, Vec<String>>,
    peer_networks: Vec<PeerEndpoint>,
    retired_networks: Vec<PeerEndpoint>,
    failed_direct_ips: HashSet<String>,
}

/// Shared state driving the transfer protocol, threaded explicitly rather
/// than through process-wide singletons (spec §9 "Globals / singletons").
pub struct TransferController {
    pub config: Config,
    pub relay: Arc<NetworkCommunication>,
    pub client_id: Mutex<i32>,
    answer_slot: AnswerSlot,
    state: Mutex<State>,
    /// Serializes packet dispatch across every endpoint (the relay and any
    /// number of direct peers) sharing this controller. Spec §4.5 names this
    /// explicitly ("acquire global controller mutex / dispatch by header /
    /// release mutex"); §5 explains why: a direct-peer endpoint and the
    /// relay endpoint may both have packets in flight for the same
    /// controller state at once.
    dispatch_lock: Mutex<()>,
}

impl TransferController {
    pub fn new(config: Config, relay: Arc<NetworkCommunication>) -> Arc<TransferController> {
        Arc::new(TransferController {
            config,
            relay,
            client_id: Mutex::new(-1),
            answer_slot: AnswerSlot::default(),
            state: Mutex::new(State {
                file_streams: HashMap::new(),
                id_to_files: HashMap::new(),
                peer_networks: Vec::new(),
                retired_networks: Vec::new(),
                failed_direct_ips: HashSet::new(),
            }),
            dispatch_lock: Mutex::new(()),
        })
    }

    /// Acquires the controller-wide dispatch lock. Held by the packet thread
    /// for the duration of one `dispatch()` call so that two threads never
    /// run handlers against this controller's state concurrently.
    pub fn lock_dispatch(&self) -> std::sync::MutexGuard<'_, ()> {
        self.dispatch_lock.lock().unwrap()
    }

    pub fn notify_answer(&self, packet: Packet) {
        self.answer_slot.notify(packet);
    }

    /// Blocks until the next reply arrives on the mailbox.
    pub fn wait_for_answer(&self) -> Packet {
        self.answer_slot.wait()
    }

    pub fn is_file_being_written_directly(&self, file: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.peer_networks.iter().any(|p| p.file == file)
    }

    pub fn add_peer_network(&self, endpoint: PeerEndpoint) {
        let mut state = self.state.lock().unwrap();
        state.peer_networks.push(endpoint);
    }

    /// Kills (safely) and retires every peer endpoint serving `file`, as
    /// done by the finalizer branch of the `SEND` handler.
    pub fn retire_peer_network_by_file(&self, file: &str) {
        let mut state = self.state.lock().unwrap();
        let (matching, rest): (Vec<_>, Vec<_>) =
            state.peer_networks.drain(..).partition(|p| p.file == file);
        state.peer_networks = rest;

        for endpoint in matching {
            tracing::debug!("killing direct connection network {file}");
            endpoint.network.kill(true);
            state.retired_networks.push(endpoint);
        }
    }

    /// Kills (safely) and retires every peer endpoint with the given id, as
    /// done by `CLIENT_DISCONNECT`.
    pub fn retire_peer_network_by_id(&self, id: i32) {
        let mut state = self.state.lock().unwrap();
        let (matching, rest): (Vec<_>, Vec<_>) =
            state.peer_networks.drain(..).partition(|p| p.id == id);
        state.peer_networks = rest;

        for endpoint in matching {
            endpoint.network.kill(true);
            state.retired_networks.push(endpoint);
        }
    }

    /// Drains retired endpoints whose id differs from `current_id`, joining
    /// each one. Never joins the caller's own endpoint. See spec §4.5.7.
    pub fn drain_retired_networks(&self, current_id: i32) {
        let ready: Vec<PeerEndpoint> = {
            let mut state = self.state.lock().unwrap();
            let (ready, keep): (Vec<_>, Vec<_>) =
                std::mem::take(&mut state.retired_networks).into_iter().partition(|e| e.id != current_id);
            state.retired_networks = keep;
            ready
        };

        for endpoint in ready {
            let _ = endpoint.thread.join();
        }
    }

    pub fn insert_file_stream(&self, path: String, file: File, id: i32) {
        let mut state = self.state.lock().unwrap();
        state.file_streams.insert(path.clone(), file);
        state.id_to_files.entry(id).or_default().push(path);
    }

    pub fn has_file_stream(&self, path: &str) -> bool {
        self.state.lock().unwrap().file_streams.contains_key(path)
    }

    pub fn with_file_stream<T>(&self, path: &str, f: impl FnOnce(&mut File) -> T) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        state.file_streams.get_mut(path).map(f)
    }

    /// Flushes, closes, and removes the stream at `path` (dropping it closes
    /// the handle). Also removes it from `id_to_files[id]`.
    pub fn close_file_stream(&self, path: &str, id: i32) {
        let mut state = self.state.lock().unwrap();
        if let Some(mut file) = state.file_streams.remove(path) {
            use std::io::Write;
            if let Err(err) = file.flush() {
                tracing::warn!("failed to flush {path}: {err}");
            }
        }
        if let Some(files) = state.id_to_files.get_mut(&id) {
            files.retain(|p| p != path);
        }
    }

    /// Closes every stream opened on behalf of `id` and drops the mapping,
    /// as done by `CLIENT_DISCONNECT`.
    pub fn close_all_streams_for_id(&self, id: i32) {
        let mut state = self.state.lock().unwrap();
        if let Some(paths) = state.id_to_files.remove(&id) {
            for path in paths {
                if let Some(mut file) = state.file_streams.remove(&path) {
                    use std::io::Write;
                    if let Err(err) = file.flush() {
                        tracing::warn!("failed to flush {path}: {err}");
                    }
                }
            }
        }
    }

    /// Records this client's id as learned from the server, e.g. the
    /// `own_id` field of an `INFORM` reply — the only place the wire
    /// protocol actually conveys it (see DESIGN.md).
    pub fn set_client_id(&self, id: i32) {
        *self.client_id.lock().unwrap() = id;
    }

    pub fn is_direct_ip_failed(&self, ip: &str) -> bool {
        self.state.lock().unwrap().failed_direct_ips.contains(ip)
    }

    pub fn mark_direct_ip_failed(&self, ip: String) {
        self.state.lock().unwrap().failed_direct_ips.insert(ip);
    }
}
