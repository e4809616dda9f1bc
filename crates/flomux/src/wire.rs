// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flopoint wire protocol: length-delimited protobuf records and the
//! framing oracle used by the per-port frame decoder.
//!
//! A frame on the serial line is a varint length prefix followed by an
//! encoded [`FloPointMessage`]. The decoder never assumes the stream is
//! well formed: a malformed prefix or body costs one skipped byte and the
//! scan restarts at the next offset.

use bytes::Bytes;
use prost::Message;

/// Upper bound on a single encoded frame, prefix included. Anything that
/// claims to be longer is treated as garbage.
pub const MAX_FRAME_LENGTH: usize = 2048;

/// Longest accepted varint length prefix. Five bytes covers every length
/// below `MAX_FRAME_LENGTH` with room to reject oversized claims.
const MAX_PREFIX: usize = 5;

/// A decoded unit of serial input: one named waveform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveRecord {
    pub name: String,
    pub samples: Vec<i32>,
}

/// Wire shape of a single record.
#[derive(Clone, PartialEq, Message)]
pub struct FloPointMessage {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub waveform: Option<Waveform>,
}

/// Wire shape of the sample vector.
#[derive(Clone, PartialEq, Message)]
pub struct Waveform {
    #[prost(int32, repeated, tag = "1")]
    pub height: Vec<i32>,
}

/// Envelope for replaying several stored records in one response.
#[derive(Clone, PartialEq, Message)]
pub struct FloPointMultiMessage {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<FloPointMessage>,
}

impl From<FloPointMessage> for WaveRecord {
    fn from(msg: FloPointMessage) -> Self {
        Self {
            name: msg.name,
            samples: msg.waveform.map(|w| w.height).unwrap_or_default(),
        }
    }
}

impl From<&WaveRecord> for FloPointMessage {
    fn from(record: &WaveRecord) -> Self {
        Self {
            name: record.name.clone(),
            waveform: Some(Waveform { height: record.samples.clone() }),
        }
    }
}

/// Outcome of one framing attempt against the rolling read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parse {
    /// A complete record occupies the first `consumed` bytes.
    Frame { record: WaveRecord, consumed: usize },
    /// The buffer holds a plausible frame prefix; wait for more bytes.
    NeedMore,
    /// The buffer head is not a frame; drop `skip` bytes and retry.
    Resync { skip: usize },
}

/// Framing oracle. The decoder and the dispatcher only ever see this
/// trait, so tests can substitute scripted codecs.
pub trait WireCodec: Send + Sync {
    fn parse(&self, buf: &[u8]) -> Parse;
}

/// The production flopoint codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct FloCodec;

impl WireCodec for FloCodec {
    fn parse(&self, buf: &[u8]) -> Parse {
        let (len, prefix) = match decode_prefix(buf) {
            Prefix::Complete { value, consumed } => (value as usize, consumed),
            Prefix::Incomplete => return Parse::NeedMore,
            Prefix::Malformed => return Parse::Resync { skip: 1 },
        };
        if len == 0 || prefix + len > MAX_FRAME_LENGTH {
            return Parse::Resync { skip: 1 };
        }
        if buf.len() < prefix + len {
            return Parse::NeedMore;
        }
        match FloPointMessage::decode(&buf[prefix..prefix + len]) {
            Ok(msg) if !msg.name.is_empty() => Parse::Frame {
                record: msg.into(),
                consumed: prefix + len,
            },
            _ => Parse::Resync { skip: 1 },
        }
    }
}

enum Prefix {
    Complete { value: u64, consumed: usize },
    Incomplete,
    Malformed,
}

fn decode_prefix(buf: &[u8]) -> Prefix {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().take(MAX_PREFIX).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Prefix::Complete { value, consumed: i + 1 };
        }
    }
    if buf.len() >= MAX_PREFIX {
        Prefix::Malformed
    } else {
        Prefix::Incomplete
    }
}

/// Encode one record as a length-delimited frame, exactly as a board
/// would put it on the line.
pub fn encode_frame(record: &WaveRecord) -> Bytes {
    let msg = FloPointMessage::from(record);
    Bytes::from(msg.encode_length_delimited_to_vec())
}

/// Strip the length prefix from a stored frame and decode the body.
pub fn decode_frame(frame: &[u8]) -> Option<FloPointMessage> {
    let (len, prefix) = match decode_prefix(frame) {
        Prefix::Complete { value, consumed } => (value as usize, consumed),
        _ => return None,
    };
    if frame.len() < prefix + len {
        return None;
    }
    FloPointMessage::decode(&frame[prefix..prefix + len]).ok()
}

/// Pack stored frames, oldest first, into a serialized
/// [`FloPointMultiMessage`]. Frames that no longer decode are skipped.
pub fn multi_envelope<'a>(frames: impl IntoIterator<Item = &'a Bytes>) -> Bytes {
    let mut multi = FloPointMultiMessage::default();
    for frame in frames {
        if let Some(msg) = decode_frame(frame) {
            multi.messages.push(msg);
        }
    }
    Bytes::from(multi.encode_to_vec())
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
