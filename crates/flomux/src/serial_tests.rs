// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bytes::Bytes;

use super::*;
use crate::outbound::OutboundQueue;

#[test]
fn role_capabilities_match_the_role_table() {
    for (role, reads, writes, polls, test_writes) in [
        (SerialRole::PollRead, true, false, true, false),
        (SerialRole::ReadWrite, true, true, false, false),
        (SerialRole::ReadWriteTest, true, true, false, true),
        (SerialRole::WriteTest, false, true, false, true),
        (SerialRole::Write, false, true, false, false),
    ] {
        assert_eq!(role.reads(), reads, "{role:?}");
        assert_eq!(role.writes(), writes, "{role:?}");
        assert_eq!(role.polls(), polls, "{role:?}");
        assert_eq!(role.test_writes(), test_writes, "{role:?}");
    }
}

#[test]
fn stats_counters_accumulate() {
    let stats = SerialStats::default();
    stats.add_rx(10);
    stats.add_rx(5);
    stats.add_tx(3);
    stats.add_received(2);
    stats.add_lost(1);
    assert_eq!(stats.rx_bytes(), 15);
    assert_eq!(stats.tx_bytes(), 3);
    assert_eq!(stats.messages_received_tot(), 2);
    assert_eq!(stats.messages_lost_tot(), 1);
    assert!(!stats.is_dead());
    stats.mark_dead();
    assert!(stats.is_dead());
}

#[test]
fn detached_write_roles_have_a_queue() {
    for role in [SerialRole::ReadWrite, SerialRole::ReadWriteTest, SerialRole::WriteTest, SerialRole::Write] {
        assert!(SerialHandle::detached("/dev/ttyS0", role).queue.is_some(), "{role:?}");
    }
    assert!(SerialHandle::detached("/dev/ttyS0", SerialRole::PollRead).queue.is_none());
}

#[test]
fn enqueue_write_is_fifo_and_noop_without_a_queue() {
    let handle = SerialHandle::detached("/dev/ttyS0", SerialRole::Write);
    handle.enqueue_write(Bytes::from_static(b"one"));
    handle.enqueue_write(Bytes::from_static(b"two"));
    let queue = handle.queue.as_ref().map(Clone::clone);
    assert_eq!(queue.as_ref().and_then(OutboundQueue::try_next), Some(Bytes::from_static(b"one")));
    assert_eq!(queue.as_ref().and_then(OutboundQueue::try_next), Some(Bytes::from_static(b"two")));

    // Read-only handles just drop the write.
    SerialHandle::detached("/dev/ttyS5", SerialRole::PollRead).enqueue_write(Bytes::from_static(b"x"));
}

#[test]
fn transient_errors_are_distinguished_from_fatal_ones() {
    use std::io::{Error, ErrorKind};
    assert!(is_transient(&Error::from(ErrorKind::Interrupted)));
    assert!(is_transient(&Error::from(ErrorKind::WouldBlock)));
    assert!(is_transient(&Error::from(ErrorKind::TimedOut)));
    assert!(!is_transient(&Error::from(ErrorKind::NotFound)));
    assert!(!is_transient(&Error::from(ErrorKind::BrokenPipe)));
}
