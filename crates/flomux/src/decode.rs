// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling frame extraction over one serial session's inbound bytes.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

use crate::wire::{Parse, WireCodec, MAX_FRAME_LENGTH};

/// Result of feeding one read completion into the decoder.
#[derive(Debug, Default)]
pub struct Extracted {
    /// Complete encoded frames, in arrival order.
    pub frames: Vec<Bytes>,
    /// Resync events counted while scanning (one per event, regardless
    /// of how many bytes each event skipped).
    pub lost: u64,
}

/// Accumulates bytes and repeatedly asks the codec for one frame.
pub struct FrameDecoder {
    codec: Arc<dyn WireCodec>,
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new(codec: Arc<dyn WireCodec>) -> Self {
        Self { codec, buf: BytesMut::with_capacity(MAX_FRAME_LENGTH * 2) }
    }

    /// Append freshly read bytes and extract until the codec asks for
    /// more input.
    ///
    /// If the scan stalls with the buffer at the cap (a garbled stream
    /// that never frames), the oldest half is discarded and counted as
    /// one lost message so the buffer cannot grow without bound.
    pub fn feed(&mut self, bytes: &[u8]) -> Extracted {
        self.buf.extend_from_slice(bytes);
        let mut out = Extracted::default();
        while !self.buf.is_empty() {
            match self.codec.parse(&self.buf) {
                Parse::Frame { consumed, .. } => {
                    let consumed = consumed.min(self.buf.len()).max(1);
                    out.frames.push(self.buf.split_to(consumed).freeze());
                }
                Parse::NeedMore => break,
                Parse::Resync { skip } => {
                    out.lost += 1;
                    let skip = skip.clamp(1, self.buf.len());
                    self.buf.advance(skip);
                }
            }
        }
        if out.frames.is_empty() && self.buf.len() >= MAX_FRAME_LENGTH {
            let discard = self.buf.len() / 2;
            self.buf.advance(discard);
            out.lost += 1;
        }
        out
    }

    /// Bytes currently buffered without a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
#[path = "decode_tests.rs"]
mod tests;
