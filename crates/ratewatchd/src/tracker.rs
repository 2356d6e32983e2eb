//! Tracked interface selection and rate-source mode latch

use std::fmt;
use tracing::{debug, info};

use crate::decoder::CounterRecord;

/// Which rate source is active for the tracked interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Nothing usable seen yet
    Unset,
    /// Counter samples seen; permanent for the process lifetime
    Counter,
    /// Flow samples in use until the first counter record arrives
    FlowFallback,
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackingMode::Unset => "waiting",
            TrackingMode::Counter => "counters",
            TrackingMode::FlowFallback => "flow samples",
        };
        f.write_str(name)
    }
}

/// Pins the first observed interface and gates the two rate paths.
#[derive(Debug)]
pub struct InterfaceTracker {
    interface_id: Option<u32>,
    mode: TrackingMode,
}

impl InterfaceTracker {
    /// Tracker that pins whatever interface reports first
    pub fn new() -> Self {
        Self {
            interface_id: None,
            mode: TrackingMode::Unset,
        }
    }

    /// Tracker with the interface id known up front
    pub fn pinned(interface_id: u32) -> Self {
        Self {
            interface_id: Some(interface_id),
            mode: TrackingMode::Unset,
        }
    }

    pub fn interface_id(&self) -> Option<u32> {
        self.interface_id
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// True once counter mode is latched
    pub fn counter_mode(&self) -> bool {
        self.mode == TrackingMode::Counter
    }

    /// Decides whether a counter record feeds the rate engine.
    ///
    /// The first accepted record pins the interface (unless pinned already)
    /// and latches counter mode for good.
    pub fn accept_counter(&mut self, record: &CounterRecord) -> bool {
        match self.interface_id {
            None => {
                info!(
                    interface_id = record.interface_id,
                    "Tracking interface from first counter sample"
                );
                self.interface_id = Some(record.interface_id);
            }
            Some(id) if id != record.interface_id => {
                debug!(
                    tracked = id,
                    received = record.interface_id,
                    "Ignoring counters for untracked interface"
                );
                return false;
            }
            Some(_) => {}
        }

        if self.mode != TrackingMode::Counter {
            if self.mode == TrackingMode::FlowFallback {
                info!("Counter samples available, leaving flow fallback");
            }
            self.mode = TrackingMode::Counter;
        }
        true
    }

    /// Decides whether a flow record may be accumulated.
    ///
    /// Always false after counter mode has been latched, even if counters stop.
    pub fn accept_flow(&mut self) -> bool {
        match self.mode {
            TrackingMode::Counter => false,
            TrackingMode::FlowFallback => true,
            TrackingMode::Unset => {
                info!("No counter samples yet, estimating rates from flow samples");
                self.mode = TrackingMode::FlowFallback;
                true
            }
        }
    }
}

impl Default for InterfaceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(interface_id: u32) -> CounterRecord {
        CounterRecord {
            interface_id,
            in_octets: 0,
            out_octets: 0,
            in_packets: 0,
            out_packets: 0,
        }
    }

    #[test]
    fn test_first_counter_pins_interface() {
        let mut tracker = InterfaceTracker::new();
        assert_eq!(tracker.mode(), TrackingMode::Unset);

        assert!(tracker.accept_counter(&counters(7)));
        assert_eq!(tracker.interface_id(), Some(7));
        assert!(tracker.counter_mode());

        assert!(tracker.accept_counter(&counters(7)));
        assert!(!tracker.accept_counter(&counters(8)));
        assert_eq!(tracker.interface_id(), Some(7));
    }

    #[test]
    fn test_pinned_rejects_other_interfaces() {
        let mut tracker = InterfaceTracker::pinned(3);
        assert!(!tracker.accept_counter(&counters(1)));
        assert_eq!(tracker.mode(), TrackingMode::Unset);

        assert!(tracker.accept_counter(&counters(3)));
        assert!(tracker.counter_mode());
    }

    #[test]
    fn test_flow_fallback_until_counters() {
        let mut tracker = InterfaceTracker::new();
        assert!(tracker.accept_flow());
        assert_eq!(tracker.mode(), TrackingMode::FlowFallback);
        assert!(tracker.accept_flow());

        assert!(tracker.accept_counter(&counters(2)));
        assert_eq!(tracker.mode(), TrackingMode::Counter);
        assert!(!tracker.accept_flow());
    }

    #[test]
    fn test_counter_mode_is_permanent() {
        let mut tracker = InterfaceTracker::new();
        tracker.accept_counter(&counters(2));
        // rejected counters for another interface do not reopen the flow gate
        assert!(!tracker.accept_counter(&counters(9)));
        for _ in 0..10 {
            assert!(!tracker.accept_flow());
        }
        assert_eq!(tracker.mode(), TrackingMode::Counter);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(TrackingMode::Unset.to_string(), "waiting");
        assert_eq!(TrackingMode::Counter.to_string(), "counters");
        assert_eq!(TrackingMode::FlowFallback.to_string(), "flow samples");
    }
}
