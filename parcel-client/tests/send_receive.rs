//! End-to-end tests against a loopback stub relay: two real
//! `TransferController`s, each backed by a real `NetworkCommunication`
//! connected to a hand-rolled relay that performs the `to`-string → `id`-int
//! rewrites a real server would (see DESIGN.md). `Packet::wire_bytes`/
//! `from_wire` are crate-private, so the stub speaks the wire format
//! directly over `TcpStream` rather than reusing `parcel_core::Packet`.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parcel_core::{Header, NetworkCommunication};
use parcel_client::config::Config;
use parcel_client::transfer::{dispatch, send, TransferController};
use sha2::{Digest, Sha256};

fn write_frame(stream: &mut TcpStream, header: u8, payload: &[u8]) -> io::Result<()> {
    let len = (1 + payload.len()) as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(&[header])?;
    stream.write_all(payload)
}

fn read_frame(stream: &mut TcpStream) -> io::Result<(u8, Vec<u8>)> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok((body[0], body[1..].to_vec()))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn bool(&mut self) -> bool {
        let b = self.buf[self.pos];
        self.pos += 1;
        b != 0
    }

    fn int(&mut self) -> i32 {
        let v = i32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn string(&mut self) -> String {
        let len = self.int() as usize;
        let s = String::from_utf8(self.buf[self.pos..self.pos + len].to_vec()).unwrap();
        self.pos += len;
        s
    }

    fn bytes(&mut self) -> Vec<u8> {
        let len = self.int() as usize;
        let v = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        v
    }
}

fn w_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(v as u8);
}

fn w_int(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn w_string(buf: &mut Vec<u8>, v: &str) {
    w_int(buf, v.len() as i32);
    buf.extend_from_slice(v.as_bytes());
}

fn w_bytes(buf: &mut Vec<u8>, v: &[u8]) {
    w_int(buf, v.len() as i32);
    buf.extend_from_slice(v);
}

/// Sender → receiver direction: rewrites `INFORM` (`to:string`) into
/// `INFORM_RESULT` (`id:int`), and relay-style `SEND` (`to:string`) into the
/// as-received `SEND` (`id:int`). Everything else passes through unchanged.
fn forward_sender_to_receiver(mut read: TcpStream, mut write: TcpStream, sender_id: i32) {
    while let Ok((header, payload)) = read_frame(&mut read) {
        let forwarded = if header == Header::Inform as u8 {
            let mut r = Reader::new(&payload);
            let _to = r.string();
            let file = r.string();
            let dir = r.string();
            let allow_direct = r.bool();

            let mut out = Vec::new();
            w_int(&mut out, sender_id);
            w_string(&mut out, &file);
            w_string(&mut out, &dir);
            w_bool(&mut out, allow_direct);
            write_frame(&mut write, Header::InformResult as u8, &out)
        } else if header == Header::Send as u8 {
            let mut r = Reader::new(&payload);
            let _to = r.string();
            let file = r.string();
            let dir = r.string();
            let chunk = r.bytes();
            let first = r.bool();

            let mut out = Vec::new();
            w_int(&mut out, sender_id);
            w_string(&mut out, &file);
            w_string(&mut out, &dir);
            w_bytes(&mut out, &chunk);
            w_bool(&mut out, first);
            write_frame(&mut write, Header::Send as u8, &out)
        } else {
            write_frame(&mut write, header, &payload)
        };

        if forwarded.is_err() {
            break;
        }
    }
}

/// Receiver → sender direction: rewrites the receiver's `INFORM_RESULT`
/// reply back into the `INFORM`-shaped reply the sender is waiting on,
/// deriving `try_direct` from whether any address was offered and
/// substituting the stub's `receiver_id` for `own_id`. Everything else
/// (notably `SEND_RESULT`) passes through unchanged.
fn forward_receiver_to_sender(mut read: TcpStream, mut write: TcpStream, receiver_id: i32) {
    while let Ok((header, payload)) = read_frame(&mut read) {
        let forwarded = if header == Header::InformResult as u8 {
            let mut r = Reader::new(&payload);
            let accepted = r.bool();
            let _id = r.int();
            let n_addr = r.int();
            let port = r.int();
            let mut addresses = Vec::new();
            for _ in 0..n_addr {
                addresses.push(r.string());
            }

            let mut out = Vec::new();
            w_bool(&mut out, accepted);
            w_bool(&mut out, !addresses.is_empty());
            w_int(&mut out, addresses.len() as i32);
            w_int(&mut out, port);
            w_int(&mut out, receiver_id);
            for addr in &addresses {
                w_string(&mut out, addr);
            }
            write_frame(&mut write, Header::Inform as u8, &out)
        } else {
            write_frame(&mut write, header, &payload)
        };

        if forwarded.is_err() {
            break;
        }
    }
}

/// Accepts exactly two connections, in order (receiver, then sender), and
/// relays between them for the lifetime of the test.
fn run_stub_relay(listener: TcpListener, sender_id: i32, receiver_id: i32) {
    let (receiver_stream, _) = listener.accept().unwrap();
    let (sender_stream, _) = listener.accept().unwrap();

    let sender_read = sender_stream.try_clone().unwrap();
    let receiver_write = receiver_stream.try_clone().unwrap();
    let t1 = thread::spawn(move || forward_sender_to_receiver(sender_read, receiver_write, sender_id));
    let t2 = thread::spawn(move || forward_receiver_to_sender(receiver_stream, sender_stream, receiver_id));

    let _ = t1.join();
    let _ = t2.join();
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if cond() {
            return true;
        }
        if start.elapsed() >= timeout {
            return cond();
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Wires up a stub relay plus a connected sender/receiver controller pair.
/// Both controllers run their relay packet thread for the test's duration.
fn start_pair(
    sender_config: Config,
    receiver_config: Config,
    sender_id: i32,
    receiver_id: i32,
) -> (Arc<TransferController>, Arc<TransferController>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || run_stub_relay(listener, sender_id, receiver_id));

    let receiver_net = NetworkCommunication::new().unwrap();
    assert!(receiver_net.start("127.0.0.1", port, false, false).unwrap());
    let sender_net = NetworkCommunication::new().unwrap();
    assert!(sender_net.start("127.0.0.1", port, false, false).unwrap());

    let receiver_controller = TransferController::new(receiver_config, Arc::clone(&receiver_net));
    let sender_controller = TransferController::new(sender_config, Arc::clone(&sender_net));

    dispatch::spawn_packet_thread(Arc::clone(&receiver_controller), receiver_net, dispatch::NO_PEER_ID, false);
    dispatch::spawn_packet_thread(Arc::clone(&sender_controller), sender_net, dispatch::NO_PEER_ID, false);

    (sender_controller, receiver_controller)
}

#[test]
fn relay_mediated_transfer_delivers_multi_chunk_file_with_matching_checksum() {
    let work = tempfile::tempdir().unwrap();
    let src_dir = work.path().join("src");
    std::fs::create_dir_all(&src_dir).unwrap();
    let out_dir = work.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let source_path = src_dir.join("payload.bin");
    let contents: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&source_path, &contents).unwrap();

    let sender_config_path = work.path().join("sender.cfg");
    std::fs::write(&sender_config_path, "direct: false\nbuffer_size: 4096\n").unwrap();
    let receiver_config_path = work.path().join("receiver.cfg");
    std::fs::write(
        &receiver_config_path,
        format!("direct: false\noutput_folder: {}\n", out_dir.display()),
    )
    .unwrap();

    let (sender_controller, _receiver_controller) = start_pair(
        Config::parse(&sender_config_path),
        Config::parse(&receiver_config_path),
        42,
        7,
    );

    send::send_files(&sender_controller, std::slice::from_ref(&source_path), "receiver", false);

    let output_path = out_dir.join("payload.bin");
    assert!(wait_until(
        || output_path.exists()
            && std::fs::metadata(&output_path).map(|m| m.len()).unwrap_or(0) == contents.len() as u64,
        Duration::from_secs(5),
    ));

    let written = std::fs::read(&output_path).unwrap();
    assert_eq!(written.len(), contents.len());
    assert_eq!(Sha256::digest(&written), Sha256::digest(&contents));
}

#[test]
fn recursive_send_skips_hidden_files() {
    let work = tempfile::tempdir().unwrap();
    let payload_dir = work.path().join("src").join("payload");
    let sub_dir = payload_dir.join("sub");
    std::fs::create_dir_all(&sub_dir).unwrap();
    std::fs::write(payload_dir.join("file1.txt"), b"top level contents").unwrap();
    std::fs::write(payload_dir.join(".hidden"), b"should never be sent").unwrap();
    std::fs::write(sub_dir.join("file2.txt"), b"nested contents").unwrap();

    let out_dir = work.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let sender_config_path = work.path().join("sender.cfg");
    std::fs::write(&sender_config_path, "direct: false\n").unwrap();
    let receiver_config_path = work.path().join("receiver.cfg");
    std::fs::write(
        &receiver_config_path,
        format!("direct: false\noutput_folder: {}\n", out_dir.display()),
    )
    .unwrap();

    let (sender_controller, _receiver_controller) = start_pair(
        Config::parse(&sender_config_path),
        Config::parse(&receiver_config_path),
        43,
        8,
    );

    send::send_files(&sender_controller, std::slice::from_ref(&payload_dir), "receiver", true);

    let top_level = out_dir.join("payload/file1.txt");
    let nested = out_dir.join("payload/sub/file2.txt");
    let hidden = out_dir.join("payload/.hidden");

    assert!(wait_until(|| top_level.exists(), Duration::from_secs(5)));
    assert!(wait_until(|| nested.exists(), Duration::from_secs(5)));

    assert_eq!(std::fs::read(&top_level).unwrap(), b"top level contents");
    assert_eq!(std::fs::read(&nested).unwrap(), b"nested contents");
    assert!(!hidden.exists());
}
