use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::packet::Packet;

/// Frames larger than this are treated as malformed and drop the
/// connection. Spec §4.2: "full_size impossibly large (e.g. > 128 MiB
/// configurable cap)".
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 128 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Accumulator state for one in-progress packet. See spec §3 "PartialPacket".
#[derive(Debug)]
struct PartialPacket {
    data: Vec<u8>,
    full_size: Option<u32>,
}

impl PartialPacket {
    fn new() -> Self {
        PartialPacket { data: Vec::new(), full_size: None }
    }

    fn is_finished(&self) -> bool {
        match self.full_size {
            Some(full) => self.data.len() == full as usize + HEADER_LEN,
            None => false,
        }
    }

    /// Consumes a prefix of `chunk`, returning how many bytes were used.
    fn ingest(&mut self, chunk: &[u8], max_frame_size: u32) -> Result<usize> {
        let Some(full) = self.full_size else {
            let need = HEADER_LEN - self.data.len();
            let take = need.min(chunk.len());
            self.data.extend_from_slice(&chunk[..take]);

            if self.data.len() == HEADER_LEN {
                let full_size = u32::from_be_bytes(self.data[0..4].try_into().unwrap());
                if full_size > max_frame_size {
                    return Err(Error::MalformedFrame("declared frame size exceeds cap"));
                }
                self.full_size = Some(full_size);
            }
            return Ok(take);
        };

        let full = full as usize;
        let target_total = full + HEADER_LEN;
        if self.data.len() > target_total {
            return Err(Error::MalformedFrame("accumulated more than declared length"));
        }
        let need = target_total - self.data.len();
        let take = need.min(chunk.len());
        self.data.extend_from_slice(&chunk[..take]);
        Ok(take)
    }

    fn into_packet(self) -> Packet {
        Packet::from_wire(self.data)
    }
}

/// Turns an arbitrary byte stream into a sequence of complete [`Packet`]s.
/// See spec §4.2.
#[derive(Debug)]
pub struct Reassembler {
    current: PartialPacket,
    completed: VecDeque<Packet>,
    max_frame_size: u32,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Reassembler {
            current: PartialPacket::new(),
            completed: VecDeque::new(),
            max_frame_size,
        }
    }

    /// Feeds a freshly-received chunk of bytes in, returning how many bytes
    /// of `chunk` were consumed (always `chunk.len()` unless a malformed
    /// frame is detected, in which case the connection should be dropped).
    pub fn feed(&mut self, chunk: &[u8]) -> Result<usize> {
        let mut offset = 0;
        while offset < chunk.len() {
            let consumed = self.current.ingest(&chunk[offset..], self.max_frame_size)?;
            offset += consumed;

            if self.current.is_finished() {
                let finished = std::mem::replace(&mut self.current, PartialPacket::new());
                self.completed.push_back(finished.into_packet());
            } else if consumed == 0 {
                // No progress possible (shouldn't happen for a well-formed
                // reassembler state, but guards against spinning).
                break;
            }
        }
        Ok(offset)
    }

    /// Drains and returns all packets completed so far, in arrival order.
    pub fn take_completed(&mut self) -> Vec<Packet> {
        self.completed.drain(..).collect()
    }

    pub fn has_completed(&self) -> bool {
        !self.completed.is_empty()
    }
}
