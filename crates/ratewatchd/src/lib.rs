//! # ratewatchd - sFlow Interface Rate Monitor
//!
//! Collects sFlow v5 datagrams over UDP, derives packet and bit rates for one
//! interface and runs external handlers when the load level changes.
//!
//! ## Rate sources
//! - Generic interface counter samples (preferred): deltas between polls
//! - Flow samples (fallback): sampled frames scaled by their sampling rate
//!
//! Once counter samples are seen for the tracked interface, flow samples are
//! ignored for the rest of the process lifetime.
//!
//! ## Load levels
//! Rates are compared against configured pps/Mbps thresholds and mapped onto
//! OK, WARNING, ABNORMAL and CRITICAL. Escalations fire their handler at once;
//! a return to OK fires only after it held for the configured delay.
//!
//! ## Layout
//! - [`decoder`]: sFlow datagram parsing
//! - [`tracker`], [`rate`], [`history`], [`status`]: rate pipeline
//! - [`trigger`], [`notifier`], [`executor`]: handler dispatch
//! - [`monitor`]: the context object tying it together
//! - [`config_file`], [`error`]: ambient plumbing

pub mod config_file;
pub mod decoder;
pub mod error;
pub mod executor;
pub mod history;
pub mod monitor;
pub mod notifier;
pub mod rate;
pub mod render;
pub mod status;
pub mod tracker;
pub mod trigger;

pub use config_file::{RatewatchConfig, TriggerConfig};
pub use error::{RatewatchError, Result};
pub use executor::{CommandExecutor, ProcessExecutor, RecordingExecutor};
pub use monitor::{Event, Monitor, RateView};
pub use rate::RateSnapshot;
pub use status::{Severity, Thresholds};
