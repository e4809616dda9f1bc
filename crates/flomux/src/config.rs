// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::serial::SerialRole;
use crate::wavegen;

/// Waveform multiplexing daemon for flopoint measurement boards.
#[derive(Debug, Parser)]
#[command(name = "flomux", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "FLOMUX_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// TCP port for the command interface.
    #[arg(long, env = "FLOMUX_PORT", default_value = "2023")]
    pub port: u16,

    /// Serial devices to poll-read (read side bounded by the poll timer).
    #[arg(long = "poll-read", env = "FLOMUX_POLL_READ", value_delimiter = ',')]
    pub poll_read: Vec<String>,

    /// Serial devices to read from and write to.
    #[arg(long = "read-write", env = "FLOMUX_READ_WRITE", value_delimiter = ',')]
    pub read_write: Vec<String>,

    /// Read-write devices that also emit mock waveforms (loopback rigs).
    #[arg(long = "read-write-test", env = "FLOMUX_READ_WRITE_TEST", value_delimiter = ',')]
    pub read_write_test: Vec<String>,

    /// Write-only devices fed by the mock waveform generator.
    #[arg(long = "write-test", env = "FLOMUX_WRITE_TEST", value_delimiter = ',')]
    pub write_test: Vec<String>,

    /// Write-only devices (board command forwarding).
    #[arg(long = "write", env = "FLOMUX_WRITE", value_delimiter = ',')]
    pub write: Vec<String>,

    /// Serial baud rate.
    #[arg(long, env = "FLOMUX_BAUD", default_value = "115200")]
    pub baud: u32,

    /// Poll interval for poll-read devices, in milliseconds.
    #[arg(long, env = "FLOMUX_POLL_INTERVAL", default_value = "100")]
    pub poll_interval: u64,

    /// How many recent records the replay ring retains.
    #[arg(long, env = "FLOMUX_RING_CAPACITY", default_value = "10000")]
    pub ring_capacity: usize,

    /// Byte ceiling per subscriber outbound queue before drop-oldest.
    #[arg(long, env = "FLOMUX_QUEUE_LIMIT", default_value = "67108864")]
    pub queue_limit: usize,

    /// Named message sources to create fan-out channels for.
    /// Defaults to the standard ten-board set.
    #[arg(long = "source", env = "FLOMUX_SOURCES", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Pacing of the mock waveform generator, in milliseconds.
    #[arg(long, env = "FLOMUX_TEST_INTERVAL", default_value = "100")]
    pub test_interval: u64,

    /// Samples per mock waveform.
    #[arg(long, env = "FLOMUX_TEST_SAMPLES", default_value = "10")]
    pub test_samples: usize,

    /// Directory for append-only session and dispatch logs.
    /// Unset disables file sinks.
    #[arg(long, env = "FLOMUX_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "FLOMUX_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FLOMUX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval == 0 {
            anyhow::bail!("--poll-interval must be positive");
        }
        if self.test_interval == 0 {
            anyhow::bail!("--test-interval must be positive");
        }
        if self.ring_capacity == 0 {
            anyhow::bail!("--ring-capacity must be positive");
        }
        if self.queue_limit == 0 {
            anyhow::bail!("--queue-limit must be positive");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        let mut seen = HashSet::new();
        for (device, _) in self.port_plan() {
            if !seen.insert(device.clone()) {
                anyhow::bail!("serial device listed under more than one role: {device}");
            }
        }
        Ok(())
    }

    /// Devices with their roles, in registration order. The order is
    /// stable because it shows through the Zabbix discovery document.
    pub fn port_plan(&self) -> Vec<(String, SerialRole)> {
        let mut plan = Vec::new();
        for device in &self.poll_read {
            plan.push((device.clone(), SerialRole::PollRead));
        }
        for device in &self.read_write {
            plan.push((device.clone(), SerialRole::ReadWrite));
        }
        for device in &self.read_write_test {
            plan.push((device.clone(), SerialRole::ReadWriteTest));
        }
        for device in &self.write_test {
            plan.push((device.clone(), SerialRole::WriteTest));
        }
        for device in &self.write {
            plan.push((device.clone(), SerialRole::Write));
        }
        plan
    }

    /// Named sources, falling back to the default board set.
    pub fn source_names(&self) -> Vec<String> {
        if self.sources.is_empty() {
            wavegen::default_source_names()
        } else {
            self.sources.clone()
        }
    }

    /// The full channel table: the three format channels followed by one
    /// channel per named source.
    pub fn channel_names(&self) -> Vec<String> {
        let mut channels = vec![
            "raw_waveforms".to_owned(),
            "ascii_waveforms".to_owned(),
            "protobuf_all".to_owned(),
        ];
        channels.extend(self.source_names());
        channels
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn test_interval(&self) -> Duration {
        Duration::from_millis(self.test_interval)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
