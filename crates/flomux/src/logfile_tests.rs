// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::wire::WaveRecord;

#[test]
fn append_accumulates() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = AppendLog::new(Some(tmp.path().join("session.log")));
    log.append(b"first ");
    log.append(b"second");
    let contents = std::fs::read_to_string(tmp.path().join("session.log"))?;
    assert_eq!(contents, "first second");
    Ok(())
}

#[test]
fn unconfigured_log_is_a_noop() {
    let log = AppendLog::default();
    assert!(!log.is_enabled());
    log.append(b"dropped");
}

#[test]
fn device_log_uses_the_basename() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = AppendLog::for_device(Some(tmp.path()), "/dev/ttyS5");
    log.append(b"raw bytes");
    assert!(tmp.path().join("ttyS5").exists());
    Ok(())
}

#[test]
fn dispatch_log_writes_message_and_failure_files() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = DispatchLog::new(Some(tmp.path()));

    let record = WaveRecord { name: "2of09".to_owned(), samples: vec![1, -2, 3] };
    log.message(&record);
    log.failure("could not parse frame (7 bytes)");

    let message = std::fs::read_to_string(tmp.path().join("dispatch.message.log"))?;
    assert!(message.contains("name=2of09"));
    assert!(message.contains("waveform=1 -2 3"));
    assert!(message.ends_with('\n'));

    let failure = std::fs::read_to_string(tmp.path().join("dispatch.failure.log"))?;
    assert!(failure.contains("could not parse frame (7 bytes)"));
    Ok(())
}

#[test]
fn disabled_dispatch_log_writes_nothing() {
    let log = DispatchLog::new(None);
    log.message(&WaveRecord { name: "0of09".to_owned(), samples: vec![] });
    log.failure("nope");
}
