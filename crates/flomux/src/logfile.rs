// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only file sinks under the configured log directory.
//!
//! All appends are best-effort: a missing directory or a full disk must
//! never take a session down, so failures are swallowed after a debug
//! log line. With no log directory configured every sink is a no-op.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::wire::WaveRecord;

/// One append-only file, or a no-op when unconfigured.
#[derive(Debug, Clone, Default)]
pub struct AppendLog {
    path: Option<PathBuf>,
}

impl AppendLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Sink for one session's raw inbound bytes, named after the device
    /// basename (`/dev/ttyS5` logs to `<dir>/ttyS5`).
    pub fn for_device(dir: Option<&Path>, device: &str) -> Self {
        let path = dir.map(|dir| {
            let base = device.rsplit(['/', '\\']).next().unwrap_or(device);
            dir.join(base)
        });
        Self { path }
    }

    pub fn append(&self, bytes: &[u8]) {
        let Some(ref path) = self.path else {
            return;
        };
        let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) else {
            tracing::debug!(path = %path.display(), "log sink not writable");
            return;
        };
        let _ = file.write_all(bytes);
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }
}

/// The dispatcher's own sinks: delivered records and parse failures.
#[derive(Debug, Clone, Default)]
pub struct DispatchLog {
    message: AppendLog,
    failure: AppendLog,
}

impl DispatchLog {
    /// Create the sinks under `dir`, creating the directory best-effort.
    /// `None` disables both.
    pub fn new(dir: Option<&Path>) -> Self {
        let (message, failure) = match dir {
            Some(dir) => {
                let _ = std::fs::create_dir_all(dir);
                (
                    AppendLog::new(Some(dir.join("dispatch.message.log"))),
                    AppendLog::new(Some(dir.join("dispatch.failure.log"))),
                )
            }
            None => (AppendLog::default(), AppendLog::default()),
        };
        Self { message, failure }
    }

    /// Human-readable trace of one delivered record.
    pub fn message(&self, record: &WaveRecord) {
        if !self.message.is_enabled() {
            return;
        }
        let mut line = format!("{}: message received: name={} waveform=", epoch_ms(), record.name);
        for (i, sample) in record.samples.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&sample.to_string());
        }
        line.push('\n');
        self.message.append(line.as_bytes());
    }

    /// Trace of one frame the codec refused.
    pub fn failure(&self, detail: &str) {
        if !self.failure.is_enabled() {
            return;
        }
        let line = format!("{}: {detail}\n", epoch_ms());
        self.failure.append(line.as_bytes());
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "logfile_tests.rs"]
mod tests;
