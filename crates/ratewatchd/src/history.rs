//! Fixed-capacity rate history for the renderer

use std::collections::VecDeque;

use crate::rate::RateSnapshot;

/// Sliding windows of past pps and mbps values, oldest first
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    capacity: usize,
    pps: VecDeque<f64>,
    mbps: VecDeque<f64>,
}

impl HistoryWindow {
    /// Creates an empty window; a capacity of 0 is treated as 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            pps: VecDeque::with_capacity(capacity),
            mbps: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a snapshot, evicting the oldest entry when full
    pub fn push(&mut self, snapshot: &RateSnapshot) {
        if self.pps.len() == self.capacity {
            self.pps.pop_front();
            self.mbps.pop_front();
        }
        self.pps.push_back(snapshot.pps);
        self.mbps.push_back(snapshot.mbps);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.pps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pps.is_empty()
    }

    pub fn pps(&self) -> Vec<f64> {
        self.pps.iter().copied().collect()
    }

    pub fn mbps(&self) -> Vec<f64> {
        self.mbps.iter().copied().collect()
    }

    /// Highest pps in the window
    pub fn peak_pps(&self) -> f64 {
        self.pps.iter().copied().fold(0.0, f64::max)
    }

    /// Highest mbps in the window
    pub fn peak_mbps(&self) -> f64 {
        self.mbps.iter().copied().fold(0.0, f64::max)
    }
}
