//! Monitor - the daemon's single context object
//!
//! Owns every piece of per-process state and advances it one [`Event`] at a
//! time. The event loop in `main` only translates socket reads and timer
//! ticks into events; everything else happens here.
//!
//! Pipeline for a datagram:
//! 1. decode into samples and records
//! 2. counter records pass the interface tracker into the counter-delta path
//! 3. flow records pass the tracker gate into the flow accumulator
//! 4. every emitted snapshot is published: history, classifier, dispatcher

use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config_file::RatewatchConfig;
use crate::decoder::{self, DatagramHeader, Record};
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::history::HistoryWindow;
use crate::notifier::{Notifier, TriggerLog};
use crate::rate::{RateEngine, RateSnapshot};
use crate::render;
use crate::status::{self, Severity, Thresholds};
use crate::tracker::{InterfaceTracker, TrackingMode};
use crate::trigger::TriggerDispatcher;

/// Inputs the monitor reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One UDP payload from the collector socket
    DatagramReceived(Vec<u8>),
    /// 1 s tick driving the flow-sample fallback
    RateTick,
    /// 1 s tick refreshing the console status line
    DisplayTick,
    /// Periodic check for a silent sFlow feed
    StalenessCheck,
    /// The pending OK recovery deadline has been reached
    RecoveryDue,
}

/// Running totals for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub datagrams: u64,
    pub dropped_datagrams: u64,
    pub samples: u64,
    pub counter_records: u64,
    pub flow_records: u64,
    pub snapshots: u64,
    pub triggers_fired: u64,
}

/// Read-only picture of the monitor for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct RateView {
    pub interface: String,
    pub interface_id: Option<u32>,
    pub mode: TrackingMode,
    pub snapshot: Option<RateSnapshot>,
    pub severity: Severity,
    pub thresholds: Thresholds,
    pub pps_history: Vec<f64>,
    pub mbps_history: Vec<f64>,
    pub stale: bool,
}

pub struct Monitor {
    interface: String,
    thresholds: Thresholds,
    tracker: InterfaceTracker,
    engine: RateEngine,
    history: HistoryWindow,
    dispatcher: TriggerDispatcher,
    notifier: Notifier,

    /// Latest published snapshot
    snapshot: Option<RateSnapshot>,
    severity: Severity,

    started: Instant,
    last_datagram: Option<Instant>,
    stale_after: Duration,
    stale: bool,

    /// Print the status line on display ticks
    console: bool,
    stats: MonitorStats,
}

impl Monitor {
    /// Builds a monitor from validated configuration
    pub fn from_config(
        config: &RatewatchConfig,
        executor: Box<dyn CommandExecutor>,
    ) -> Result<Self> {
        let handlers = config.handlers()?;
        if handlers.is_empty() {
            info!("No trigger handlers configured");
        }

        let tracker = match config.interface_index {
            Some(id) => {
                info!(interface_id = id, "Tracking configured interface index");
                InterfaceTracker::pinned(id)
            }
            None => InterfaceTracker::new(),
        };

        let trigger_log = config
            .trigger_log
            .as_ref()
            .map(TriggerLog::new)
            .transpose()?;
        let notifier = Notifier::new(
            executor,
            trigger_log,
            config.interface.clone(),
            config.thresholds,
        );

        Ok(Self {
            interface: config.interface.clone(),
            thresholds: config.thresholds,
            tracker,
            engine: RateEngine::new(config.rate_settings()),
            history: HistoryWindow::new(config.window),
            dispatcher: TriggerDispatcher::new(handlers, config.ok_delay()),
            notifier,
            snapshot: None,
            severity: Severity::Ok,
            started: Instant::now(),
            last_datagram: None,
            stale_after: config.stale_after(),
            stale: false,
            console: false,
            stats: MonitorStats::default(),
        })
    }

    /// Enables printing the status line to stdout on display ticks
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn snapshot(&self) -> Option<&RateSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Waits until fired triggers are on disk in the trigger log
    pub fn flush(&self) {
        self.notifier.flush();
    }

    /// Deadline the event loop must wake at to deliver [`Event::RecoveryDue`]
    pub fn recovery_deadline(&self) -> Option<Instant> {
        self.dispatcher.recovery_deadline()
    }

    /// Processes one event. Returns the severities whose handlers fired.
    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Severity> {
        match event {
            Event::DatagramReceived(datagram) => self.on_datagram(&datagram, now),
            Event::RateTick => self.on_rate_tick(now),
            Event::DisplayTick => {
                self.on_display_tick();
                Vec::new()
            }
            Event::StalenessCheck => {
                self.check_staleness(now);
                Vec::new()
            }
            Event::RecoveryDue => self.on_recovery_due(now),
        }
    }

    /// Read-only view for the renderer
    pub fn view(&self) -> RateView {
        RateView {
            interface: self.interface.clone(),
            interface_id: self.tracker.interface_id(),
            mode: self.tracker.mode(),
            snapshot: self.snapshot,
            severity: self.severity,
            thresholds: self.thresholds,
            pps_history: self.history.pps(),
            mbps_history: self.history.mbps(),
            stale: self.stale,
        }
    }

    fn on_datagram(&mut self, datagram: &[u8], now: Instant) -> Vec<Severity> {
        self.stats.datagrams += 1;

        let Some(header) = DatagramHeader::parse(datagram) else {
            self.stats.dropped_datagrams += 1;
            debug!(len = datagram.len(), "Dropping malformed sFlow datagram");
            return Vec::new();
        };
        debug!(
            agent = %header.agent_address,
            sequence = header.sequence_number,
            samples = header.sample_count,
            "sFlow datagram"
        );

        self.last_datagram = Some(now);
        if self.stale {
            info!("sFlow feed resumed");
            self.stale = false;
        }

        let mut fired = Vec::new();
        for sample in decoder::decode(datagram) {
            self.stats.samples += 1;
            for record in &sample.records {
                match record {
                    Record::Counter(counter) => {
                        self.stats.counter_records += 1;
                        if !self.tracker.accept_counter(counter) {
                            continue;
                        }
                        if let Some(snapshot) = self.engine.on_counter(counter, now) {
                            fired.extend(self.publish(snapshot, now));
                        }
                    }
                    Record::Flow(flow) => {
                        self.stats.flow_records += 1;
                        if self.tracker.accept_flow() {
                            self.engine.add_flow(flow);
                        }
                    }
                }
            }
        }
        fired
    }

    fn on_rate_tick(&mut self, now: Instant) -> Vec<Severity> {
        if self.tracker.counter_mode() {
            return Vec::new();
        }
        match self.engine.on_flow_tick(now) {
            Some(snapshot) => self.publish(snapshot, now).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn on_display_tick(&self) {
        let line = render::status_line(&self.view());
        if self.console {
            println!("{}", line);
        } else {
            debug!(status = %line, "Status");
        }
    }

    fn check_staleness(&mut self, now: Instant) {
        let since = self.last_datagram.unwrap_or(self.started);
        let silent = now.saturating_duration_since(since);
        if silent >= self.stale_after && !self.stale {
            warn!(
                silent_secs = silent.as_secs(),
                "No sFlow datagrams received, rates are stale"
            );
            self.stale = true;
        }
    }

    fn on_recovery_due(&mut self, now: Instant) -> Vec<Severity> {
        let Some(severity) = self.dispatcher.poll_recovery(now) else {
            return Vec::new();
        };
        let rates = self.snapshot.unwrap_or_else(|| RateSnapshot::new(0.0, 0.0));
        info!("Load stayed OK through the recovery delay");
        self.fire(severity, &rates);
        vec![severity]
    }

    /// Stores a new snapshot and runs it through classification and dispatch
    fn publish(&mut self, snapshot: RateSnapshot, now: Instant) -> Option<Severity> {
        self.stats.snapshots += 1;
        self.snapshot = Some(snapshot);
        self.history.push(&snapshot);

        let severity = status::classify(&snapshot, &self.thresholds);
        if severity != self.severity {
            info!(from = %self.severity, to = %severity, pps = snapshot.pps, mbps = snapshot.mbps, "Load level changed");
        }
        self.severity = severity;

        let fire = self.dispatcher.evaluate(severity, now)?;
        self.fire(fire, &snapshot);
        Some(fire)
    }

    fn fire(&mut self, severity: Severity, rates: &RateSnapshot) {
        let Some(handler) = self.dispatcher.handlers().handler(severity) else {
            return;
        };
        self.stats.triggers_fired += 1;
        let at = if severity == Severity::Ok {
            Utc::now()
        } else {
            rates.timestamp
        };
        self.notifier.fire(severity, handler, rates, at);
    }
}
