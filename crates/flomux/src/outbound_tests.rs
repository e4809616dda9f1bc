// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bytes::Bytes;

use super::*;

#[test]
fn fifo_order() {
    let queue = OutboundQueue::new(1024);
    queue.push(Bytes::from_static(b"one"));
    queue.push(Bytes::from_static(b"two"));
    assert_eq!(queue.try_next(), Some(Bytes::from_static(b"one")));
    assert_eq!(queue.try_next(), Some(Bytes::from_static(b"two")));
    assert_eq!(queue.try_next(), None);
}

#[test]
fn empty_chunks_are_ignored() {
    let queue = OutboundQueue::new(1024);
    queue.push(Bytes::new());
    assert_eq!(queue.try_next(), None);
    assert_eq!(queue.queued_bytes(), 0);
}

#[test]
fn drops_oldest_beyond_limit() {
    let queue = OutboundQueue::new(8);
    queue.push(Bytes::from_static(b"aaaa"));
    queue.push(Bytes::from_static(b"bbbb"));
    // Third push exceeds the 8-byte ceiling; "aaaa" goes first.
    queue.push(Bytes::from_static(b"cccc"));
    assert_eq!(queue.dropped(), 1);
    assert_eq!(queue.try_next(), Some(Bytes::from_static(b"bbbb")));
    assert_eq!(queue.try_next(), Some(Bytes::from_static(b"cccc")));
}

#[test]
fn oversized_single_chunk_is_kept_alone() {
    let queue = OutboundQueue::new(4);
    queue.push(Bytes::from_static(b"aa"));
    queue.push(Bytes::from_static(b"toolarge"));
    // The oversized chunk evicts everything before it but stays queued
    // itself; eviction stops at the last element.
    assert_eq!(queue.try_next(), Some(Bytes::from_static(b"toolarge")));
    assert_eq!(queue.try_next(), None);
}

#[test]
fn push_after_close_is_discarded() {
    let queue = OutboundQueue::new(1024);
    queue.push(Bytes::from_static(b"kept"));
    queue.close();
    queue.push(Bytes::from_static(b"lost"));
    assert_eq!(queue.try_next(), Some(Bytes::from_static(b"kept")));
    assert_eq!(queue.try_next(), None);
    assert!(queue.is_closed());
}

#[test]
fn close_is_idempotent() {
    let queue = OutboundQueue::new(1024);
    queue.close();
    queue.close();
    assert!(queue.is_closed());
}

#[tokio::test]
async fn next_returns_pending_then_none_after_close() {
    let queue = OutboundQueue::new(1024);
    queue.push(Bytes::from_static(b"pending"));
    queue.close();
    assert_eq!(queue.next().await, Some(Bytes::from_static(b"pending")));
    assert_eq!(queue.next().await, None);
}

#[tokio::test]
async fn next_wakes_on_push() {
    let queue = OutboundQueue::new(1024);
    let waiter = queue.clone();
    let task = tokio::spawn(async move { waiter.next().await });
    tokio::task::yield_now().await;
    queue.push(Bytes::from_static(b"late"));
    let got = tokio::time::timeout(std::time::Duration::from_secs(2), task).await;
    assert_eq!(got.ok().and_then(Result::ok).flatten(), Some(Bytes::from_static(b"late")));
}

#[test]
fn queued_bytes_tracks_contents() {
    let queue = OutboundQueue::new(1024);
    queue.push(Bytes::from_static(b"abcd"));
    queue.push(Bytes::from_static(b"ef"));
    assert_eq!(queue.queued_bytes(), 6);
    let _ = queue.try_next();
    assert_eq!(queue.queued_bytes(), 2);
}
