use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rustix::event::{poll, PollFd, PollFlags};
use rustix::net::sockopt;

use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::partial::Reassembler;
use crate::pipe::EventPipe;

/// Bytes read/written per `recv`/`send` syscall. Spec §4.4 "Constants".
pub const BUFFER_SIZE: usize = 1024 * 1024;
/// Soft cap on the outgoing queue before a `send(wait = true)` caller blocks.
pub const OUTGOING_SOFT_CAP: usize = 10;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const CONNECT_WARN_INTERVAL: Duration = Duration::from_millis(1500);

struct Sockets {
    socket: Option<TcpStream>,
    listener: Option<TcpListener>,
}

/// Owns one TCP socket (client or accepted), a receive thread, a send
/// thread, two packet queues, and lifecycle/shutdown semantics. See spec
/// §4.4.
///
/// Always held behind an `Arc`: receive/send threads keep their own clone
/// alive for their lifetime, and callers that need peer-endpoint sharing
/// (controller's `peer_networks`/`retired_networks`) hold further clones.
pub struct NetworkCommunication {
    sockets: Mutex<Sockets>,

    receive_thread: Mutex<Option<JoinHandle<()>>>,
    send_thread: Mutex<Option<JoinHandle<()>>>,

    incoming: Mutex<VecDeque<Packet>>,
    incoming_cv: Condvar,

    outgoing: Mutex<VecDeque<Packet>>,
    outgoing_cv: Condvar,
    backpressure_cv: Condvar,

    shutdown: AtomicBool,
    pipe: EventPipe,
}

impl NetworkCommunication {
    pub fn new() -> std::io::Result<Arc<Self>> {
        Ok(Arc::new(NetworkCommunication {
            sockets: Mutex::new(Sockets { socket: None, listener: None }),
            receive_thread: Mutex::new(None),
            send_thread: Mutex::new(None),
            incoming: Mutex::new(VecDeque::new()),
            incoming_cv: Condvar::new(),
            outgoing: Mutex::new(VecDeque::new()),
            outgoing_cv: Condvar::new(),
            backpressure_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            pipe: EventPipe::new()?,
        }))
    }

    /// See spec §4.4 "Lifecycle operations — start". `listen = true` binds
    /// and listens without spawning threads; the caller must follow up with
    /// [`Self::accept_connection`].
    pub fn start(self: &Arc<Self>, host: &str, port: u16, fast_fail: bool, listen: bool) -> Result<bool> {
        if listen {
            return self.start_listening(port);
        }

        let stream = match Self::connect_with_retry(host, port, fast_fail) {
            Some(stream) => stream,
            None => return Ok(false),
        };

        if let Err(err) = stream.set_nodelay(true) {
            tracing::warn!("could not set TCP_NODELAY: {err}");
        }

        self.sockets.lock().unwrap().socket = Some(stream);
        self.spawn_threads();
        Ok(true)
    }

    fn start_listening(self: &Arc<Self>, port: u16) -> Result<bool> {
        let fd = rustix::net::socket(
            rustix::net::AddressFamily::INET,
            rustix::net::SocketType::STREAM,
            None,
        )
        .map_err(std::io::Error::from)?;
        sockopt::set_socket_reuseaddr(&fd, true).map_err(std::io::Error::from)?;

        let addr = std::net::SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, port));
        rustix::net::bind(&fd, &addr).map_err(std::io::Error::from)?;
        rustix::net::listen(&fd, 1).map_err(std::io::Error::from)?;

        let listener: TcpListener = fd.into();
        self.sockets.lock().unwrap().listener = Some(listener);
        Ok(true)
    }

    fn connect_with_retry(host: &str, port: u16, fast_fail: bool) -> Option<TcpStream> {
        let addr = match (host, port).to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(err) => {
                tracing::error!("could not resolve host {host}: {err}");
                None
            }
        }?;

        let mut attempt = 0u32;
        let mut last_warn = Instant::now();

        loop {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    tracing::debug!("connected to {host}:{port}");
                    return Some(stream);
                }
                Err(err) => {
                    if fast_fail {
                        return None;
                    }

                    if last_warn.elapsed() >= CONNECT_WARN_INTERVAL {
                        attempt += 1;
                        tracing::warn!("could not connect to {host}:{port}, attempt #{attempt}: {err}");
                        last_warn = Instant::now();
                    }
                    thread::sleep(CONNECT_RETRY_INTERVAL);
                }
            }
        }
    }

    /// Blocks in `poll([listen_fd, pipe_fd])`. Returns `Ok(true)` once a
    /// connection is accepted and receive/send threads are spawned,
    /// `Ok(false)` if cancelled via [`Self::kill`].
    pub fn accept_connection(self: &Arc<Self>) -> Result<bool> {
        let listener = {
            let sockets = self.sockets.lock().unwrap();
            match &sockets.listener {
                Some(listener) => listener.try_clone().map_err(Error::Socket)?,
                None => return Err(Error::Socket(std::io::Error::other("no listen socket"))),
            }
        };

        let pipe_fd = self.pipe.read_fd();
        loop {
            let mut fds = [
                PollFd::new(&listener, PollFlags::IN),
                PollFd::new(&pipe_fd, PollFlags::IN),
            ];

            if poll(&mut fds, -1).map_err(std::io::Error::from)? == 0 {
                continue;
            }

            if !fds[1].revents().is_empty() {
                self.pipe.drain();
                return Ok(false);
            }

            if !fds[0].revents().is_empty() {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        tracing::debug!("accepted connection from {peer}");
                        self.sockets.lock().unwrap().socket = Some(stream);
                        self.spawn_threads();
                        return Ok(true);
                    }
                    Err(err) => {
                        tracing::warn!("accept() failed: {err}");
                        return Err(Error::Socket(err));
                    }
                }
            }
        }
    }

    fn spawn_threads(self: &Arc<Self>) {
        let receive_net = Arc::clone(self);
        let send_net = Arc::clone(self);

        *self.receive_thread.lock().unwrap() = Some(thread::spawn(move || receive_loop(receive_net)));
        *self.send_thread.lock().unwrap() = Some(thread::spawn(move || send_loop(send_net)));
    }

    /// See spec §4.4 "kill". Idempotent; `safe = true` drains the outgoing
    /// queue before flipping the shutdown flag.
    pub fn kill(&self, safe: bool) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        if safe {
            let guard = self.outgoing.lock().unwrap();
            let _guard = self
                .backpressure_cv
                .wait_while(guard, |queue| !queue.is_empty())
                .unwrap();
        }

        // Matches the C++ original's lock order: incoming before outgoing.
        let _incoming_guard = self.incoming.lock().unwrap();
        let _outgoing_guard = self.outgoing.lock().unwrap();

        self.shutdown.store(true, Ordering::SeqCst);
        self.pipe.signal();

        self.incoming_cv.notify_all();
        self.outgoing_cv.notify_all();
        self.backpressure_cv.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Joins the receive/send threads if they are still attached. Safe to
    /// call multiple times (a no-op once joined).
    pub fn join_threads(&self) {
        if let Some(handle) = self.receive_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.send_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Pushes `packet` onto the outgoing queue. If `wait`, blocks first
    /// until the queue has fewer than [`OUTGOING_SOFT_CAP`] entries.
    pub fn send(&self, packet: Packet, wait: bool) {
        let mut guard = self.outgoing.lock().unwrap();
        if wait {
            guard = self
                .backpressure_cv
                .wait_while(guard, |queue| queue.len() >= OUTGOING_SOFT_CAP)
                .unwrap();
        }
        guard.push_back(packet);
        self.outgoing_cv.notify_one();
    }

    /// Blocks until a packet is available or the endpoint is shut down.
    /// Does not pop; call [`Self::complete_packet`] to pop.
    pub fn wait_for_packet(&self) -> Option<Packet> {
        let guard = self.incoming.lock().unwrap();
        let guard = self
            .incoming_cv
            .wait_while(guard, |queue| queue.is_empty() && !self.shutdown.load(Ordering::SeqCst))
            .unwrap();

        if self.shutdown.load(Ordering::SeqCst) && guard.is_empty() {
            return None;
        }
        guard.front().cloned()
    }

    pub fn complete_packet(&self) {
        self.incoming.lock().unwrap().pop_front();
    }
}

impl Drop for NetworkCommunication {
    fn drop(&mut self) {
        self.kill(false);
        self.join_threads();
    }
}

fn receive_loop(network: Arc<NetworkCommunication>) {
    let mut read_handle = {
        let sockets = network.sockets.lock().unwrap();
        match &sockets.socket {
            Some(socket) => socket.try_clone().unwrap(),
            None => return,
        }
    };

    let mut reassembler = Reassembler::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let pipe_fd = network.pipe.read_fd();

    loop {
        let mut fds = [
            PollFd::new(&read_handle, PollFlags::IN),
            PollFd::new(&pipe_fd, PollFlags::IN),
        ];

        match poll(&mut fds, -1) {
            Ok(0) => continue,
            Err(err) => {
                tracing::warn!("receive thread poll() failed: {err}");
                break;
            }
            _ => {}
        }

        if !fds[1].revents().is_empty() {
            network.pipe.drain();
            break;
        }

        if fds[0].revents().is_empty() {
            continue;
        }

        let received = match read_handle.read(&mut buffer) {
            Ok(0) => {
                tracing::debug!("peer closed connection");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                tracing::debug!("receive thread got error: {err}");
                break;
            }
        };

        match reassembler.feed(&buffer[..received]) {
            Ok(_) => {
                if reassembler.has_completed() {
                    let mut incoming = network.incoming.lock().unwrap();
                    incoming.extend(reassembler.take_completed());
                    network.incoming_cv.notify_one();
                }
            }
            Err(err) => {
                tracing::warn!("malformed frame, dropping connection: {err}");
                break;
            }
        }
    }

    tracing::debug!("receive thread exiting");
    network.kill(false);
}

fn send_loop(network: Arc<NetworkCommunication>) {
    let mut write_handle = {
        let sockets = network.sockets.lock().unwrap();
        match &sockets.socket {
            Some(socket) => socket.try_clone().unwrap(),
            None => return,
        }
    };

    loop {
        let mut guard = network.outgoing.lock().unwrap();
        guard = network
            .outgoing_cv
            .wait_while(guard, |queue| {
                queue.is_empty() && !network.shutdown.load(Ordering::SeqCst)
            })
            .unwrap();

        if network.shutdown.load(Ordering::SeqCst) && guard.is_empty() {
            break;
        }

        let wire = guard.front().unwrap().wire_bytes().to_vec();
        let sent_so_far = guard.front().unwrap().sent();
        drop(guard);

        let to_send = (wire.len() - sent_so_far).min(BUFFER_SIZE);
        match write_handle.write(&wire[sent_so_far..sent_so_far + to_send]) {
            Ok(0) => break,
            Ok(n) => {
                let mut guard = network.outgoing.lock().unwrap();
                if let Some(front) = guard.front_mut() {
                    front.add_sent(n);
                    if front.fully_sent() {
                        guard.pop_front();
                        network.backpressure_cv.notify_all();
                    }
                }
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(err) => {
                tracing::debug!("send thread got error: {err}");
                break;
            }
        }
    }

    tracing::debug!("send thread exiting");
    network.kill(false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Header;
    use std::net::TcpListener as StdTcpListener;

    fn free_port() -> u16 {
        StdTcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    #[test]
    fn client_server_round_trip() {
        let port = free_port();

        let server = NetworkCommunication::new().unwrap();
        assert!(server.start("", port, false, true).unwrap());

        let server_for_accept = Arc::clone(&server);
        let accept_handle = thread::spawn(move || server_for_accept.accept_connection().unwrap());

        thread::sleep(Duration::from_millis(50));
        let client = NetworkCommunication::new().unwrap();
        assert!(client.start("127.0.0.1", port, false, false).unwrap());

        assert!(accept_handle.join().unwrap());

        let mut packet = Packet::new();
        packet.add_header(Header::Join);
        packet.add_string("alice");
        packet.finalize();
        client.send(packet, false);

        let received = server.wait_for_packet().expect("expected a packet");
        assert_eq!(received.header().unwrap(), Header::Join);
        server.complete_packet();

        client.kill(false);
        server.kill(false);
    }

    #[test]
    fn shutdown_wakes_blocked_waiter() {
        let network = NetworkCommunication::new().unwrap();
        let waiter = Arc::clone(&network);
        let handle = thread::spawn(move || waiter.wait_for_packet());

        thread::sleep(Duration::from_millis(20));
        network.kill(false);

        let result = handle.join().unwrap();
        assert!(result.is_none());
    }

    /// Exercises the `send(wait = true)` / `backpressure_cv` synchronization
    /// directly, without routing packets through a real socket: the send
    /// thread would normally drain `outgoing` as fast as the kernel accepts
    /// writes, which for small test payloads happens faster than any
    /// observable window, so it cannot stand in for "the peer is slow to
    /// drain". Here we push past the cap with the queue otherwise
    /// unattended, confirm a waiting sender blocks, then pop one entry and
    /// notify exactly as `send_loop` does after a successful write.
    #[test]
    fn backpressure_blocks_until_drained() {
        let network = NetworkCommunication::new().unwrap();

        for _ in 0..OUTGOING_SOFT_CAP {
            let mut p = Packet::new();
            p.add_header(Header::Available);
            p.finalize();
            network.send(p, false);
        }
        assert_eq!(network.outgoing.lock().unwrap().len(), OUTGOING_SOFT_CAP);

        let blocked = Arc::clone(&network);
        let waiter = thread::spawn(move || {
            let mut p = Packet::new();
            p.add_header(Header::Available);
            p.finalize();
            blocked.send(p, true);
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!waiter.is_finished());

        {
            let mut guard = network.outgoing.lock().unwrap();
            guard.pop_front();
            network.backpressure_cv.notify_all();
        }

        waiter.join().unwrap();
        assert_eq!(network.outgoing.lock().unwrap().len(), OUTGOING_SOFT_CAP);
    }
}
