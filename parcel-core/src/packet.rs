use crate::error::{Error, Result};

/// Closed set of packet headers exchanged between client and server, and
/// between directly-connected peer clients. See spec §3 "Header codes" and
/// §6 "Packet shapes".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Header {
    Join = 0,
    Available = 1,
    Inform = 2,
    Send = 3,
    SendResult = 4,
    Initialize = 5,
    InformResult = 6,
    ClientDisconnect = 7,
}

impl Header {
    fn from_byte(byte: u8) -> Result<Header> {
        Ok(match byte {
            0 => Header::Join,
            1 => Header::Available,
            2 => Header::Inform,
            3 => Header::Send,
            4 => Header::SendResult,
            5 => Header::Initialize,
            6 => Header::InformResult,
            7 => Header::ClientDisconnect,
            _ => return Err(Error::MalformedPacket("unknown header byte")),
        })
    }
}

const LENGTH_PREFIX_SIZE: usize = 4;

/// A tagged, self-describing byte buffer with a 4-byte big-endian length
/// prefix. See spec §3 "Packet" and §4.1.
///
/// Buffer layout once finalized: `length:u32 BE | header:u8 | payload...`,
/// where `length` counts every byte after itself.
#[derive(Debug, Clone)]
pub struct Packet {
    buf: Vec<u8>,
    cursor: usize,
    sent: usize,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    pub fn new() -> Self {
        Packet { buf: Vec::new(), cursor: LENGTH_PREFIX_SIZE, sent: 0 }
    }

    /// Wraps a complete wire buffer (length prefix included) produced by the
    /// reassembler. The read cursor starts right after the length prefix, so
    /// the first `get_byte()` call yields the header.
    pub(crate) fn from_wire(buf: Vec<u8>) -> Self {
        Packet { buf, cursor: LENGTH_PREFIX_SIZE, sent: 0 }
    }

    pub fn add_header(&mut self, header: Header) -> &mut Self {
        if self.buf.is_empty() {
            self.buf.extend_from_slice(&[0u8; LENGTH_PREFIX_SIZE]);
        }
        self.buf.push(header as u8);
        self
    }

    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.buf.push(value as u8);
        self
    }

    pub fn add_byte(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn add_int(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn add_string(&mut self, value: &str) -> &mut Self {
        self.add_int(value.len() as i32);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn add_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.add_int(value.len() as i32);
        self.buf.extend_from_slice(value);
        self
    }

    /// Patches the length prefix with `size - 4`. Idempotent: callable again
    /// after further appends, it simply recomputes the prefix.
    pub fn finalize(&mut self) -> &mut Self {
        let len = (self.buf.len() - LENGTH_PREFIX_SIZE) as u32;
        self.buf[0..LENGTH_PREFIX_SIZE].copy_from_slice(&len.to_be_bytes());
        self
    }

    pub fn header(&self) -> Result<Header> {
        let byte = *self
            .buf
            .get(LENGTH_PREFIX_SIZE)
            .ok_or(Error::MalformedPacket("packet has no header byte"))?;
        Header::from_byte(byte)
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_byte()? != 0)
    }

    pub fn get_byte(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.cursor)
            .ok_or(Error::MalformedPacket("truncated reading byte"))?;
        self.cursor += 1;
        Ok(byte)
    }

    pub fn get_int(&mut self) -> Result<i32> {
        let end = self.cursor + 4;
        let slice = self
            .buf
            .get(self.cursor..end)
            .ok_or(Error::MalformedPacket("truncated reading int"))?;
        let value = i32::from_be_bytes(slice.try_into().unwrap());
        self.cursor = end;
        Ok(value)
    }

    pub fn get_string(&mut self) -> Result<String> {
        let bytes = self.get_bytes()?.to_vec();
        String::from_utf8(bytes).map_err(|_| Error::MalformedPacket("string is not valid UTF-8"))
    }

    /// Borrowing variant: returns a slice into the packet's own buffer
    /// without copying. See spec §4.1 "a `Vec`-returning variant is allowed
    /// when the consumer must own the data" — `get_bytes_owned` below is
    /// that variant.
    pub fn get_bytes(&mut self) -> Result<&[u8]> {
        let len = self.get_int()? as usize;
        let start = self.cursor;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= self.buf.len())
            .ok_or(Error::MalformedPacket("truncated reading bytes"))?;
        self.cursor = end;
        Ok(&self.buf[start..end])
    }

    pub fn get_bytes_owned(&mut self) -> Result<Vec<u8>> {
        Ok(self.get_bytes()?.to_vec())
    }

    /// The full wire representation, length prefix included.
    pub(crate) fn wire_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn sent(&self) -> usize {
        self.sent
    }

    pub(crate) fn add_sent(&mut self, n: usize) {
        self.sent += n;
    }

    pub(crate) fn fully_sent(&self) -> bool {
        self.sent >= self.buf.len()
    }
}
