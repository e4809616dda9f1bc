// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::test_support::frame;
use crate::wire::{FloCodec, Parse, WaveRecord, WireCodec, MAX_FRAME_LENGTH};

/// Scripted framing rule for decoder-only tests: `F` opens an 8-byte
/// frame, `S` skips three bytes, anything else skips one.
struct ScriptedCodec;

impl WireCodec for ScriptedCodec {
    fn parse(&self, buf: &[u8]) -> Parse {
        match buf.first() {
            None => Parse::NeedMore,
            Some(b'F') => {
                if buf.len() >= 8 {
                    let record = WaveRecord { name: "scripted".to_owned(), samples: vec![] };
                    Parse::Frame { record, consumed: 8 }
                } else {
                    Parse::NeedMore
                }
            }
            Some(b'S') => Parse::Resync { skip: 3 },
            Some(_) => Parse::Resync { skip: 1 },
        }
    }
}

/// Codec that never frames anything; models a stream the oracle cannot
/// make sense of without ever resyncing.
struct StallCodec;

impl WireCodec for StallCodec {
    fn parse(&self, _buf: &[u8]) -> Parse {
        Parse::NeedMore
    }
}

fn scripted_decoder() -> FrameDecoder {
    FrameDecoder::new(Arc::new(ScriptedCodec))
}

#[test]
fn extracts_back_to_back_frames() {
    let mut decoder = scripted_decoder();
    let out = decoder.feed(b"FaaaaaaaFbbbbbbb");
    assert_eq!(out.frames.len(), 2);
    assert_eq!(out.lost, 0);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn frame_split_across_reads() {
    let mut decoder = scripted_decoder();
    let first = decoder.feed(b"Faaa");
    assert!(first.frames.is_empty());
    assert_eq!(decoder.buffered(), 4);

    let second = decoder.feed(b"aaaa");
    assert_eq!(second.frames.len(), 1);
    assert_eq!(second.frames[0].as_ref(), b"Faaaaaaa");
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn one_lost_message_per_resync_event() {
    let mut decoder = scripted_decoder();
    // Two skip-3 events cover six bytes: two losses, not six.
    let out = decoder.feed(b"SabScdFaaaaaaa");
    assert_eq!(out.lost, 2);
    assert_eq!(out.frames.len(), 1);
}

#[test]
fn resync_skip_is_clamped_to_the_buffer() {
    let mut decoder = scripted_decoder();
    // 'S' wants to skip three but only two bytes exist.
    let out = decoder.feed(b"Sx");
    assert_eq!(out.lost, 1);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn stalled_buffer_is_halved_at_the_cap() {
    let mut decoder = FrameDecoder::new(Arc::new(StallCodec));
    let out = decoder.feed(&vec![0u8; MAX_FRAME_LENGTH + 952]);
    assert_eq!(out.lost, 1);
    assert!(out.frames.is_empty());
    assert_eq!(decoder.buffered(), (MAX_FRAME_LENGTH + 952) / 2);
    assert!(decoder.buffered() < MAX_FRAME_LENGTH);
}

#[test]
fn garbled_stream_never_grows_the_buffer() {
    // S6: a full cap of bytes that can never decode.
    let mut decoder = FrameDecoder::new(Arc::new(FloCodec));
    let out = decoder.feed(&vec![0xffu8; MAX_FRAME_LENGTH + 1]);
    assert!(out.lost > 0);
    assert!(out.frames.is_empty());
    assert!(decoder.buffered() <= MAX_FRAME_LENGTH);
}

#[test]
fn frames_survive_surrounding_garbage() {
    let mut decoder = FrameDecoder::new(Arc::new(FloCodec));
    let good = frame("2of09", &[1, 2, 3]);
    // Zero bytes are unambiguous garbage to the codec: a zero-length
    // claim resyncs exactly one byte at a time.
    let mut stream = vec![0u8; 7];
    stream.extend_from_slice(&good);
    stream.extend_from_slice(&[0u8; 5]);
    stream.extend_from_slice(&good);

    let out = decoder.feed(&stream);
    assert_eq!(out.frames.len(), 2);
    assert!(out.frames.iter().all(|f| f.as_ref() == good.as_ref()));
    assert_eq!(out.lost, 12);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn chunk_boundaries_never_change_extraction() {
    // Deterministic sweep over random chunkings of the same stream.
    let frames: Vec<bytes::Bytes> = (0..6).map(|i| frame(&format!("{i}of09"), &[i, -i, i * 7])).collect();
    let mut stream = Vec::new();
    for f in &frames {
        stream.extend_from_slice(f);
    }

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let mut decoder = FrameDecoder::new(Arc::new(FloCodec));
        let mut extracted = Vec::new();
        let mut lost = 0;
        let mut rest: &[u8] = &stream;
        while !rest.is_empty() {
            let take = rng.random_range(1..=rest.len());
            let (chunk, tail) = rest.split_at(take);
            let out = decoder.feed(chunk);
            extracted.extend(out.frames);
            lost += out.lost;
            rest = tail;
        }
        assert_eq!(extracted, frames);
        assert_eq!(lost, 0);
        assert_eq!(decoder.buffered(), 0);
    }
}
