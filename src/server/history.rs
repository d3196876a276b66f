use crate::model::Measurement;
use std::collections::VecDeque;

/// Bounded per-sensor measurement history; the oldest entry is evicted first.
#[derive(Debug)]
pub struct MeasurementHistory {
    capacity: usize,
    entries: VecDeque<Measurement>,
}

impl MeasurementHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, measurement: Measurement) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(measurement);
    }

    /// Up to `depth` measurements, most recent `made_at` first.
    pub fn latest(&self, depth: usize) -> Vec<Measurement> {
        let mut measurements: Vec<Measurement> = self.entries.iter().cloned().collect();
        measurements.sort_by(|a, b| b.made_at.cmp(&a.made_at));
        measurements.truncate(depth);
        measurements
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
