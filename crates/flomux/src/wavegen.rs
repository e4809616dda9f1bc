// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mock waveform source for the test-write serial roles.
//!
//! Produces encoded frames indistinguishable from board traffic: names
//! cycle through the configured source set, samples are random within a
//! range wide enough to exercise all four bytes of each sample.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::wire::{encode_frame, WaveRecord};

const AMPLITUDE: i32 = 1 << 23;

/// Source names a default deployment fans out on.
pub fn default_source_names() -> Vec<String> {
    (0..10).map(|i| format!("{i}of09")).collect()
}

/// Deterministic generator of synthetic waveform frames.
pub struct WaveGen {
    names: Vec<String>,
    samples: usize,
    rng: StdRng,
    cursor: usize,
}

impl WaveGen {
    /// `names` cycles round-robin; an empty list falls back to the
    /// default source set. The seed makes runs reproducible.
    pub fn new(names: Vec<String>, samples: usize, seed: u64) -> Self {
        let names = if names.is_empty() { default_source_names() } else { names };
        Self {
            names,
            samples: samples.max(1),
            rng: StdRng::seed_from_u64(seed),
            cursor: 0,
        }
    }

    pub fn next_record(&mut self) -> WaveRecord {
        let name = self.names[self.cursor % self.names.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        let samples =
            (0..self.samples).map(|_| self.rng.random_range(-AMPLITUDE..=AMPLITUDE)).collect();
        WaveRecord { name, samples }
    }

    /// The next record, already framed for the wire.
    pub fn next_frame(&mut self) -> Bytes {
        encode_frame(&self.next_record())
    }
}

#[cfg(test)]
#[path = "wavegen_tests.rs"]
mod tests;
