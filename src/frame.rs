//! Client frame codec
//!
//! The browser client multiplexes keystrokes and resize events over one
//! WebSocket using a single ASCII tag byte in front of every message:
//! - `'0'`: terminal input, remaining bytes passed through verbatim
//! - `'1'`: resize, remaining bytes are UTF-8 JSON `{"cols":u16,"rows":u16}`
//!
//! There is no length prefix or escaping; one WebSocket message is one frame.
//! Outbound, the gateway only sends shell output as text frames, text notices,
//! pings and a final close frame.

use axum::extract::ws::Message;
use bytes::Bytes;

use crate::terminal::TerminalSize;
use crate::{Error, Result};

/// Frame tags
pub mod tag {
    /// Terminal input bytes
    pub const DATA: u8 = b'0';
    /// Terminal resize command
    pub const RESIZE: u8 = b'1';
}

/// Parsed inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw terminal input
    Data(Bytes),
    /// Terminal resize
    Resize(TerminalSize),
}

impl Frame {
    /// Decode one inbound WebSocket payload
    pub fn decode(raw: &[u8]) -> Result<Frame> {
        let Some((&tag, payload)) = raw.split_first() else {
            return Err(Error::malformed_frame("empty message"));
        };

        match tag {
            tag::DATA => Ok(Frame::Data(Bytes::copy_from_slice(payload))),
            tag::RESIZE => serde_json::from_slice::<TerminalSize>(payload)
                .map(Frame::Resize)
                .map_err(|e| Error::malformed_frame(format!("invalid resize payload: {}", e))),
            other => Err(Error::malformed_frame(format!(
                "unknown frame tag 0x{:02x}",
                other
            ))),
        }
    }
}

/// Build a resize frame as the client sends it
pub fn encode_resize(size: TerminalSize) -> Vec<u8> {
    let mut frame = vec![tag::RESIZE];
    // Serializing two integers cannot fail
    frame.extend(serde_json::to_vec(&size).unwrap_or_default());
    frame
}

/// Build an input frame as the client sends it
pub fn encode_input(data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + data.len());
    frame.push(tag::DATA);
    frame.extend_from_slice(data);
    frame
}

/// Wrap a chunk of shell output into an outbound data frame
///
/// Invalid UTF-8 is replaced; use [`DataEncoder`] when chunks may split
/// multi-byte characters.
pub fn encode_data(data: &[u8]) -> Message {
    Message::Text(String::from_utf8_lossy(data).into_owned().into())
}

/// Outbound data frame encoder that keeps multi-byte characters intact
///
/// Shell output is read in fixed-size chunks, so a UTF-8 sequence can be cut
/// in half at a chunk boundary. The incomplete tail is held back and prefixed
/// to the next chunk.
#[derive(Debug, Default)]
pub struct DataEncoder {
    pending: Vec<u8>,
}

impl DataEncoder {
    /// Encode a chunk, returning `None` if it only contained a partial character
    pub fn encode(&mut self, chunk: &[u8]) -> Option<Message> {
        self.pending.extend_from_slice(chunk);

        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // error_len() == None means the input ended mid-character
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => incomplete_tail_start(&self.pending),
        };

        if complete == 0 {
            return None;
        }

        let tail = self.pending.split_off(complete);
        let frame = encode_data(&self.pending);
        self.pending = tail;
        Some(frame)
    }

    /// Bytes of a partial character held back for the next chunk
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush whatever is still held back (lossily), e.g. at end of stream
    pub fn finish(&mut self) -> Option<Message> {
        if self.pending.is_empty() {
            return None;
        }
        let frame = encode_data(&self.pending);
        self.pending.clear();
        Some(frame)
    }
}

/// Index where a trailing, still incomplete UTF-8 sequence starts
fn incomplete_tail_start(buf: &[u8]) -> usize {
    let start = buf.len().saturating_sub(3);
    for i in (start..buf.len()).rev() {
        let byte = buf[i];
        if byte & 0b1100_0000 != 0b1000_0000 {
            let width = match byte {
                b if b & 0b1110_0000 == 0b1100_0000 => 2,
                b if b & 0b1111_0000 == 0b1110_0000 => 3,
                b if b & 0b1111_1000 == 0b1111_0000 => 4,
                _ => 1,
            };
            return if i + width > buf.len() { i } else { buf.len() };
        }
    }
    buf.len()
}
