// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn tokenize_splits_on_whitespace() {
    assert_eq!(tokenize("subscribe to ascii_waveforms"), vec!["subscribe", "to", "ascii_waveforms"]);
}

#[test]
fn tokenize_strips_trailing_carriage_return() {
    assert_eq!(tokenize("help\r"), vec!["help"]);
}

#[test]
fn tokenize_collapses_repeated_whitespace() {
    assert_eq!(tokenize("  get \t rx   /dev/ttyS5 "), vec!["get", "rx", "/dev/ttyS5"]);
}

#[test]
fn tokenize_empty_line_is_an_empty_sentence() {
    assert!(tokenize("").is_empty());
    assert!(tokenize("\r").is_empty());
    assert!(tokenize("   ").is_empty());
}
