//! Severity-transition trigger state machine
//!
//! Non-OK levels fire their handler immediately when they differ from the
//! last fired level. A return to OK is debounced: it arms a recovery
//! deadline, and only if the level is still OK when the deadline passes does
//! the OK handler fire. Any non-OK evaluation in the meantime cancels it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::status::Severity;

/// Resolved `severity -> handler` lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerTable {
    handlers: [Option<PathBuf>; 4],
}

impl HandlerTable {
    /// One script shared by every severity in `levels`
    pub fn single(script: impl Into<PathBuf>, levels: &[Severity]) -> Self {
        let script = script.into();
        let mut table = Self::default();
        for level in levels {
            table.handlers[level.index()] = Some(script.clone());
        }
        table
    }

    /// A dedicated script per severity
    pub fn per_severity<P: Into<PathBuf>>(map: impl IntoIterator<Item = (Severity, P)>) -> Self {
        let mut table = Self::default();
        for (level, script) in map {
            table.handlers[level.index()] = Some(script.into());
        }
        table
    }

    pub fn handler(&self, severity: Severity) -> Option<&Path> {
        self.handlers[severity.index()].as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.iter().all(Option::is_none)
    }
}

/// Decides when handlers fire; the caller performs the firing
#[derive(Debug)]
pub struct TriggerDispatcher {
    handlers: HandlerTable,
    ok_delay: Duration,
    current: Severity,
    last_fired: Option<Severity>,
    pending_recovery: Option<Instant>,
}

impl TriggerDispatcher {
    pub fn new(handlers: HandlerTable, ok_delay: Duration) -> Self {
        Self {
            handlers,
            ok_delay,
            current: Severity::Ok,
            last_fired: None,
            pending_recovery: None,
        }
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn current(&self) -> Severity {
        self.current
    }

    pub fn last_fired(&self) -> Option<Severity> {
        self.last_fired
    }

    /// When the pending OK handler is due, if one is armed
    pub fn recovery_deadline(&self) -> Option<Instant> {
        self.pending_recovery
    }

    /// Processes a freshly classified severity.
    ///
    /// Returns the severity whose handler must fire now.
    pub fn evaluate(&mut self, severity: Severity, now: Instant) -> Option<Severity> {
        self.current = severity;

        if severity == Severity::Ok && self.handlers.handler(Severity::Ok).is_some() {
            // once OK has fired, staying OK must not re-arm the timer
            if self.pending_recovery.is_none() && self.last_fired != Some(Severity::Ok) {
                match now.checked_add(self.ok_delay) {
                    Some(deadline) => {
                        debug!(delay = ?self.ok_delay, "Recovery to OK pending");
                        self.pending_recovery = Some(deadline);
                    }
                    None => {
                        warn!(
                            delay = ?self.ok_delay,
                            "Recovery delay out of range, OK handler not scheduled"
                        );
                    }
                }
            }
            return None;
        }

        if self.pending_recovery.take().is_some() {
            info!(severity = %severity, "Recovery to OK cancelled");
        }

        if self.handlers.handler(severity).is_some() && self.last_fired != Some(severity) {
            self.last_fired = Some(severity);
            return Some(severity);
        }
        None
    }

    /// Fires the OK handler once its recovery deadline has passed.
    pub fn poll_recovery(&mut self, now: Instant) -> Option<Severity> {
        match self.pending_recovery {
            Some(deadline) if now >= deadline => {
                self.pending_recovery = None;
                self.last_fired = Some(Severity::Ok);
                Some(Severity::Ok)
            }
            _ => None,
        }
    }
}
