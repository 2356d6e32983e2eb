//! Console status rendering

use crate::monitor::RateView;
use crate::status;

const SPARK_BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Scales values onto block characters relative to the window maximum.
///
/// Non-finite and negative values render as the lowest block.
pub fn sparkline(values: &[f64]) -> String {
    let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
    let max = values.iter().copied().map(clean).fold(0.0, f64::max);
    let top = (SPARK_BLOCKS.len() - 1) as f64;

    values
        .iter()
        .map(|&v| {
            if max <= 0.0 {
                return SPARK_BLOCKS[0];
            }
            let level = (clean(v) / max * top).round() as usize;
            SPARK_BLOCKS[level.min(SPARK_BLOCKS.len() - 1)]
        })
        .collect()
}

/// One-line summary of the current rates.
///
/// `eth0 [ifIndex 3, counters] 1200 PPS | 9.60 Mbps | 120% | CRITICAL ▁▃█`
pub fn status_line(view: &RateView) -> String {
    let source = match view.interface_id {
        Some(id) => format!("ifIndex {}, {}", id, view.mode),
        None => view.mode.to_string(),
    };

    let mut line = match &view.snapshot {
        Some(snapshot) => format!(
            "{} [{}] {} PPS | {:.2} Mbps | {:.0}% | {} {}",
            view.interface,
            source,
            snapshot.pps.round() as u64,
            snapshot.mbps,
            status::usage(snapshot, &view.thresholds) * 100.0,
            view.severity,
            sparkline(&view.pps_history)
        ),
        None => format!("{} [{}] no rate yet", view.interface, source),
    };

    if view.stale {
        line.push_str(" (stale)");
    }
    line
}
