use parcel_core::{Header, Packet};

use crate::error::{Error, Result};

/// Protocol-rejection error code used by the server when this client's
/// `INITIALIZE` version string is too old to be served. The value is not
/// recoverable from the retrieved original sources (it lives in a header
/// this pack does not carry); any value works as long as client and server
/// agree, which is a server-side concern outside this crate.
pub const OLD_PROTOCOL_CODE: i32 = 1;

pub fn initialize(version: &str) -> Packet {
    let mut p = Packet::new();
    p.add_header(Header::Initialize);
    p.add_string(version);
    p.finalize();
    p
}

pub fn join(name: &str) -> Packet {
    let mut p = Packet::new();
    p.add_header(Header::Join);
    p.add_string(name);
    p.finalize();
    p
}

pub fn available() -> Packet {
    let mut p = Packet::new();
    p.add_header(Header::Available);
    p.finalize();
    p
}

pub fn inform(to: &str, file: &str, dir: &str, allow_direct: bool) -> Packet {
    let mut p = Packet::new();
    p.add_header(Header::Inform);
    p.add_string(to);
    p.add_string(file);
    p.add_string(dir);
    p.add_bool(allow_direct);
    p.finalize();
    p
}

pub fn inform_result(accept: bool, id: i32, port: u16, addresses: &[String]) -> Packet {
    let mut p = Packet::new();
    p.add_header(Header::InformResult);
    p.add_bool(accept);
    p.add_int(id);
    p.add_int(addresses.len() as i32);
    p.add_int(port as i32);
    for addr in addresses {
        p.add_string(addr);
    }
    p.finalize();
    p
}

/// `SEND` over the relay: the addressee is the target's registered name.
pub fn send_relay(to: &str, file: &str, dir: &str, chunk: &[u8], first: bool) -> Packet {
    let mut p = Packet::new();
    p.add_header(Header::Send);
    p.add_string(to);
    p.add_string(file);
    p.add_string(dir);
    p.add_bytes(chunk);
    p.add_bool(first);
    p.finalize();
    p
}

/// `SEND` over a direct peer connection: the addressee is an int, since
/// there is no relay to route by name. See DESIGN.md for why this carries
/// the receiver's `own_id` rather than the original's hardcoded `0`.
pub fn send_direct(to_id: i32, file: &str, dir: &str, chunk: &[u8], first: bool) -> Packet {
    let mut p = Packet::new();
    p.add_header(Header::Send);
    p.add_int(to_id);
    p.add_string(file);
    p.add_string(dir);
    p.add_bytes(chunk);
    p.add_bool(first);
    p.finalize();
    p
}

pub fn send_result(id: i32, ok: bool) -> Packet {
    let mut p = Packet::new();
    p.add_header(Header::SendResult);
    p.add_int(id);
    p.add_bool(ok);
    p.finalize();
    p
}

/// Parsed reply to an `INITIALIZE` request.
pub struct InitializeReply {
    pub accepted: bool,
    pub code: Option<i32>,
    pub url_binary: Option<String>,
    pub url_script: Option<String>,
    pub url_windows: Option<String>,
}

pub fn parse_initialize_reply(p: &mut Packet) -> Result<InitializeReply> {
    let accepted = p.get_bool().map_err(Error::Core)?;
    if accepted {
        return Ok(InitializeReply {
            accepted: true,
            code: None,
            url_binary: None,
            url_script: None,
            url_windows: None,
        });
    }

    let code = p.get_int().map_err(Error::Core)?;
    let (url_binary, url_script, url_windows) = if code == OLD_PROTOCOL_CODE {
        (
            Some(p.get_string().map_err(Error::Core)?),
            Some(p.get_string().map_err(Error::Core)?),
            Some(p.get_string().map_err(Error::Core)?),
        )
    } else {
        (None, None, None)
    };

    Ok(InitializeReply { accepted: false, code: Some(code), url_binary, url_script, url_windows })
}

/// Parsed reply to an `INFORM` request, read by the sender.
pub struct InformReply {
    pub accepted: bool,
    pub try_direct: bool,
    pub port: u16,
    pub own_id: i32,
    pub addresses: Vec<String>,
}

pub fn parse_inform_reply(p: &mut Packet) -> Result<InformReply> {
    let accepted = p.get_bool().map_err(Error::Core)?;
    if !accepted {
        return Ok(InformReply {
            accepted: false,
            try_direct: false,
            port: 0,
            own_id: -1,
            addresses: Vec::new(),
        });
    }

    let try_direct = p.get_bool().map_err(Error::Core)?;
    let n_addr = p.get_int().map_err(Error::Core)?;
    let port = p.get_int().map_err(Error::Core)?;
    let port: u16 = port
        .try_into()
        .map_err(|_| Error::Protocol("inform reply port out of u16 range"))?;
    let own_id = p.get_int().map_err(Error::Core)?;
    let mut addresses = Vec::with_capacity(n_addr.max(0) as usize);
    for _ in 0..n_addr {
        addresses.push(p.get_string().map_err(Error::Core)?);
    }

    Ok(InformReply { accepted: true, try_direct, port, own_id, addresses })
}

/// Parsed forwarded `INFORM` request, read by the receiver (header
/// `INFORM_RESULT` on the wire — see DESIGN.md for the `to`-string → `id`-int
/// rewrite this assumes the server performs).
pub struct InformRequest {
    pub id: i32,
    pub file: String,
    pub dir: String,
    pub allow_direct: bool,
}

pub fn parse_inform_request(p: &mut Packet) -> Result<InformRequest> {
    Ok(InformRequest {
        id: p.get_int().map_err(Error::Core)?,
        file: p.get_string().map_err(Error::Core)?,
        dir: p.get_string().map_err(Error::Core)?,
        allow_direct: p.get_bool().map_err(Error::Core)?,
    })
}

/// Parsed `SEND` as received by either side — always the int-id shape (see
/// spec §6 "SEND (as received)").
pub struct SendReceived {
    pub id: i32,
    pub file: String,
    pub dir: String,
    pub bytes: Vec<u8>,
    pub first: bool,
}

pub fn parse_send(p: &mut Packet) -> Result<SendReceived> {
    let id = p.get_int().map_err(Error::Core)?;
    let file = p.get_string().map_err(Error::Core)?;
    let dir = p.get_string().map_err(Error::Core)?;
    let bytes = p.get_bytes_owned().map_err(Error::Core)?;
    let first = p.get_bool().map_err(Error::Core)?;
    Ok(SendReceived { id, file, dir, bytes, first })
}

pub struct SendResultReply {
    pub id: i32,
    pub ok: bool,
}

pub fn parse_send_result(p: &mut Packet) -> Result<SendResultReply> {
    Ok(SendResultReply { id: p.get_int().map_err(Error::Core)?, ok: p.get_bool().map_err(Error::Core)? })
}

pub fn parse_available_reply(p: &mut Packet) -> Result<Vec<(i32, String)>> {
    let n = p.get_int().map_err(Error::Core)?;
    let mut hosts = Vec::with_capacity(n.max(0) as usize);
    for _ in 0..n {
        let id = p.get_int().map_err(Error::Core)?;
        let name = p.get_string().map_err(Error::Core)?;
        hosts.push((id, name));
    }
    Ok(hosts)
}

pub fn parse_client_disconnect(p: &mut Packet) -> Result<i32> {
    p.get_int().map_err(Error::Core)
}

pub fn parse_join_reply(p: &mut Packet) -> Result<bool> {
    p.get_bool().map_err(Error::Core)
}
