//! Trigger firing: trigger log append plus handler start

use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use tracing::{info, warn};

use crate::error::{RatewatchError, Result};
use crate::executor::{CommandExecutor, HandlerInvocation};
use crate::rate::RateSnapshot;
use crate::status::{Severity, Thresholds};

/// Environment variables handed to every handler
pub mod env {
    pub const PPS: &str = "PPS";
    pub const MBPS: &str = "MBPS";
    pub const THRESHOLD_PPS: &str = "THRESHOLD_PPS";
    pub const THRESHOLD_MBPS: &str = "THRESHOLD_MBPS";
    pub const SEVERITY: &str = "SEVERITY";
    pub const INTERFACE: &str = "INTERFACE";
}

/// Formats one trigger log line (without newline)
pub fn format_log_line(at: DateTime<Utc>, severity: Severity, rates: &RateSnapshot) -> String {
    format!(
        "{} | {} | {} PPS | {:.2} Mbps",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        severity,
        rates.pps.round() as u64,
        rates.mbps
    )
}

enum LogCommand {
    Append(String),
    Flush(mpsc::SyncSender<()>),
}

/// Append-only trigger history file.
///
/// Lines are handed to a dedicated writer thread so that a slow disk never
/// stalls the event loop. Lines are written in the order they were appended.
#[derive(Debug)]
pub struct TriggerLog {
    path: PathBuf,
    sender: mpsc::Sender<LogCommand>,
}

impl TriggerLog {
    /// Starts the writer thread for `path`
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (sender, receiver) = mpsc::channel();
        let writer_path = path.clone();
        thread::Builder::new()
            .name("trigger-log".to_string())
            .spawn(move || run_writer(&writer_path, receiver))?;
        Ok(Self { path, sender })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues one line; the file is created on first write
    pub fn append(&self, line: &str) -> Result<()> {
        self.sender
            .send(LogCommand::Append(line.to_string()))
            .map_err(|_| {
                RatewatchError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "trigger log writer stopped",
                ))
            })
    }

    /// Blocks until every queued line has been written or has failed
    pub fn flush(&self) {
        let (ack, done) = mpsc::sync_channel(1);
        if self.sender.send(LogCommand::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }
}

fn run_writer(path: &Path, receiver: mpsc::Receiver<LogCommand>) {
    for command in receiver {
        match command {
            LogCommand::Append(line) => {
                if let Err(e) = append_line(path, &line) {
                    warn!(path = %path.display(), error = %e, "Failed to write trigger log");
                }
            }
            LogCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

/// Performs the side effects of a fired trigger
pub struct Notifier {
    executor: Box<dyn CommandExecutor>,
    log: Option<TriggerLog>,
    interface: String,
    thresholds: Thresholds,
}

impl Notifier {
    pub fn new(
        executor: Box<dyn CommandExecutor>,
        log: Option<TriggerLog>,
        interface: impl Into<String>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            executor,
            log,
            interface: interface.into(),
            thresholds,
        }
    }

    /// Waits for pending trigger log lines to reach the file
    pub fn flush(&self) {
        if let Some(log) = &self.log {
            log.flush();
        }
    }

    /// Builds the handler invocation for a fired severity
    pub fn invocation(
        &self,
        handler: &Path,
        severity: Severity,
        rates: &RateSnapshot,
    ) -> HandlerInvocation {
        HandlerInvocation::new(handler)
            .env(env::PPS, format!("{:.0}", rates.pps))
            .env(env::MBPS, format!("{:.2}", rates.mbps))
            .env(env::THRESHOLD_PPS, self.thresholds.pps.to_string())
            .env(env::THRESHOLD_MBPS, self.thresholds.mbps.to_string())
            .env(env::SEVERITY, severity.as_str())
            .env(env::INTERFACE, self.interface.clone())
    }

    /// Logs and starts the handler. Failures are reported, never returned.
    pub fn fire(&self, severity: Severity, handler: &Path, rates: &RateSnapshot, at: DateTime<Utc>) {
        info!(
            severity = %severity,
            handler = %handler.display(),
            pps = rates.pps,
            mbps = rates.mbps,
            "Firing trigger"
        );

        if let Some(log) = &self.log {
            if let Err(e) = log.append(&format_log_line(at, severity, rates)) {
                warn!(path = %log.path().display(), error = %e, "Failed to write trigger log");
            }
        }

        let invocation = self.invocation(handler, severity, rates);
        if let Err(e) = self.executor.spawn(&invocation) {
            if e.is_handler_not_found() {
                warn!(handler = %handler.display(), "Trigger handler not found");
            } else {
                warn!(handler = %handler.display(), error = %e, "Trigger handler failed to start");
            }
        }
    }
}
