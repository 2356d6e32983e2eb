//! Rate engine: counter deltas with a flow-sample fallback
//!
//! Two strategies produce [`RateSnapshot`]s, and only one is ever active
//! (see [`crate::tracker`]):
//!
//! - counter delta: each accepted counter record is compared against the
//!   previous accepted one, once at least [`COUNTER_MIN_INTERVAL`] has passed
//! - flow accumulation: sampled frames are scaled by their sampling rate into
//!   running totals, and a 1 s tick turns the growth of those totals into rates
//!
//! Both apply the bias multiplier and the spike guard. A rejected spike leaves
//! the baseline untouched so the next computation spans the rejected interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::decoder::{CounterRecord, FlowRecord};

/// Minimum spacing between counter records used for a rate
pub const COUNTER_MIN_INTERVAL: Duration = Duration::from_millis(900);

/// Minimum spacing between flow ticks used for a rate
pub const FLOW_MIN_INTERVAL: Duration = Duration::from_secs(1);

const BITS_PER_BYTE: f64 = 8.0;
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Smoothed rate at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSnapshot {
    pub pps: f64,
    pub mbps: f64,
    pub timestamp: DateTime<Utc>,
}

impl RateSnapshot {
    /// Snapshot stamped with the current wall clock
    pub fn new(pps: f64, mbps: f64) -> Self {
        Self {
            pps,
            mbps,
            timestamp: Utc::now(),
        }
    }
}

/// Which counter direction feeds the counter-delta path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    #[default]
    Both,
}

impl Direction {
    fn totals(self, record: &CounterRecord) -> (u64, u64) {
        match self {
            Direction::In => (record.in_packets, record.in_octets),
            Direction::Out => (record.out_packets, record.out_octets),
            Direction::Both => (
                record.in_packets.saturating_add(record.out_packets),
                record.in_octets.saturating_add(record.out_octets),
            ),
        }
    }
}

/// Tuning knobs shared by both strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSettings {
    /// Multiplier applied to both pps and mbps
    pub bias: f64,
    /// Reject a rate above `previous * spike_factor`; 0 disables
    pub spike_factor: f64,
    pub direction: Direction,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            bias: 1.0,
            spike_factor: 0.0,
            direction: Direction::Both,
        }
    }
}

/// Cumulative packet/byte totals at the instant they were observed
#[derive(Debug, Clone, Copy)]
struct Baseline {
    packets: u64,
    bytes: u64,
    at: Instant,
}

/// Stateful rate computation for the tracked interface
#[derive(Debug)]
pub struct RateEngine {
    settings: RateSettings,
    counter_baseline: Option<Baseline>,
    flow_baseline: Option<Baseline>,
    flow_packets: u64,
    flow_bytes: u64,
    /// Last accepted (pps, mbps), used by the spike guard
    previous: Option<(f64, f64)>,
    rejected_spikes: u64,
}

impl RateEngine {
    pub fn new(settings: RateSettings) -> Self {
        Self {
            settings,
            counter_baseline: None,
            flow_baseline: None,
            flow_packets: 0,
            flow_bytes: 0,
            previous: None,
            rejected_spikes: 0,
        }
    }

    pub fn settings(&self) -> &RateSettings {
        &self.settings
    }

    /// Number of computations discarded by the spike guard
    pub fn rejected_spikes(&self) -> u64 {
        self.rejected_spikes
    }

    /// Running flow totals as (packets, bytes)
    pub fn flow_totals(&self) -> (u64, u64) {
        (self.flow_packets, self.flow_bytes)
    }

    /// Feeds an accepted counter record.
    ///
    /// The first record only sets the baseline. Records closer than
    /// [`COUNTER_MIN_INTERVAL`] to the baseline are ignored outright.
    pub fn on_counter(&mut self, record: &CounterRecord, now: Instant) -> Option<RateSnapshot> {
        let (packets, bytes) = self.settings.direction.totals(record);
        let current = Baseline {
            packets,
            bytes,
            at: now,
        };

        let Some(baseline) = self.counter_baseline else {
            debug!(interface_id = record.interface_id, "Counter baseline established");
            self.counter_baseline = Some(current);
            return None;
        };

        if now.saturating_duration_since(baseline.at) < COUNTER_MIN_INTERVAL {
            return None;
        }

        let snapshot = self.compute(&baseline, &current)?;
        self.counter_baseline = Some(current);
        Some(snapshot)
    }

    /// Adds one sampled frame to the flow totals.
    ///
    /// Callers must only pass records the tracker accepted.
    pub fn add_flow(&mut self, record: &FlowRecord) {
        self.flow_packets = self.flow_packets.saturating_add(record.packets());
        self.flow_bytes = self.flow_bytes.saturating_add(record.bytes());
    }

    /// Turns accumulated flow totals into a rate; driven by the 1 s tick.
    pub fn on_flow_tick(&mut self, now: Instant) -> Option<RateSnapshot> {
        let current = Baseline {
            packets: self.flow_packets,
            bytes: self.flow_bytes,
            at: now,
        };

        let Some(baseline) = self.flow_baseline else {
            self.flow_baseline = Some(current);
            return None;
        };

        if now.saturating_duration_since(baseline.at) < FLOW_MIN_INTERVAL {
            return None;
        }

        let snapshot = self.compute(&baseline, &current)?;
        self.flow_baseline = Some(current);
        Some(snapshot)
    }

    /// Rate between two baselines, or `None` if the spike guard rejects it
    fn compute(&mut self, from: &Baseline, to: &Baseline) -> Option<RateSnapshot> {
        let elapsed = to.at.saturating_duration_since(from.at).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }

        // counters are assumed not to wrap inside the observation window
        let packet_delta = to.packets.saturating_sub(from.packets) as f64;
        let byte_delta = to.bytes.saturating_sub(from.bytes) as f64;

        let bias = self.settings.bias;
        let pps = packet_delta / elapsed * bias;
        let mbps = byte_delta * BITS_PER_BYTE / (elapsed * BITS_PER_MEGABIT) * bias;

        if self.is_spike(pps, mbps) {
            self.rejected_spikes += 1;
            warn!(
                pps,
                mbps,
                spike_factor = self.settings.spike_factor,
                "Rate spike rejected"
            );
            return None;
        }

        self.previous = Some((pps, mbps));
        Some(RateSnapshot::new(pps, mbps))
    }

    fn is_spike(&self, pps: f64, mbps: f64) -> bool {
        let factor = self.settings.spike_factor;
        if factor <= 0.0 {
            return false;
        }
        match self.previous {
            Some((prev_pps, prev_mbps)) if prev_mbps > 0.0 => {
                mbps > prev_mbps * factor || pps > prev_pps * factor
            }
            _ => false,
        }
    }
}
