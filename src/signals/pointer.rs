//! Pointer hesitation and jitter extraction
//!
//! Tracks idle periods (hesitations) and bursts of rapid, large movements
//! (stress indicators) from a stream of pointer positions.

use crate::config::PointerThresholds;
use crate::signals::types::{
    HesitationEvent, PointerSample, PointerSummary, StressIndicator, StressKind,
};
use crate::signals::SignalExtractor;
use tracing::debug;

/// Hesitation/jitter extractor
#[derive(Debug, Clone)]
pub struct PointerExtractor {
    thresholds: PointerThresholds,
    /// Last accepted sample
    last: Option<PointerSample>,
    /// Start of the current idle window
    idle_since_ms: i64,
    /// Consecutive rapid moves, decays by one per calm sample
    rapid_streak: u32,
    movement_count: u32,
    hesitation_events: Vec<HesitationEvent>,
    stress_indicators: Vec<StressIndicator>,
}

impl Default for PointerExtractor {
    fn default() -> Self {
        Self::new(PointerThresholds::default())
    }
}

impl PointerExtractor {
    pub fn new(thresholds: PointerThresholds) -> Self {
        Self {
            thresholds,
            last: None,
            idle_since_ms: 0,
            rapid_streak: 0,
            movement_count: 0,
            hesitation_events: Vec::new(),
            stress_indicators: Vec::new(),
        }
    }

    /// Number of hesitation events emitted so far
    pub fn hesitation_count(&self) -> usize {
        self.hesitation_events.len()
    }

    pub fn stress_indicator_count(&self) -> usize {
        self.stress_indicators.len()
    }
}

impl SignalExtractor for PointerExtractor {
    type Sample = PointerSample;
    type Summary = PointerSummary;

    fn ingest(&mut self, sample: &PointerSample) {
        if !sample.x.is_finite() || !sample.y.is_finite() {
            debug!(timestamp_ms = sample.timestamp_ms, "skipping non-finite pointer sample");
            return;
        }

        let Some(last) = self.last else {
            // First sample anchors position and idle window
            self.idle_since_ms = sample.timestamp_ms;
            self.last = Some(*sample);
            return;
        };

        if sample.timestamp_ms < last.timestamp_ms {
            debug!(
                timestamp_ms = sample.timestamp_ms,
                previous_ms = last.timestamp_ms,
                "skipping out-of-order pointer sample"
            );
            return;
        }

        let t = &self.thresholds;
        let distance = ((sample.x - last.x).powi(2) + (sample.y - last.y).powi(2)).sqrt();
        let interval_ms = sample.timestamp_ms - last.timestamp_ms;

        if distance > t.movement_px {
            self.movement_count += 1;
            self.idle_since_ms = sample.timestamp_ms;
        }

        if distance > t.rapid_px && interval_ms < t.rapid_interval_ms {
            self.rapid_streak += 1;
            if self.rapid_streak > t.rapid_streak {
                self.stress_indicators.push(StressIndicator {
                    kind: StressKind::RapidPointer,
                    timestamp_ms: sample.timestamp_ms,
                });
                self.rapid_streak = 0;
            }
        } else {
            self.rapid_streak = self.rapid_streak.saturating_sub(1);
        }

        let idle_ms = sample.timestamp_ms - self.idle_since_ms;
        if idle_ms > t.hesitation_ms && distance < t.idle_px {
            self.hesitation_events.push(HesitationEvent {
                timestamp_ms: sample.timestamp_ms,
                duration_ms: idle_ms,
            });
            // Windows never overlap
            self.idle_since_ms = sample.timestamp_ms;
        }

        self.last = Some(*sample);
    }

    fn summary(&self) -> PointerSummary {
        let total_hesitation_ms: i64 = self.hesitation_events.iter().map(|h| h.duration_ms).sum();
        let avg_hesitation_ms = if self.hesitation_events.is_empty() {
            0.0
        } else {
            total_hesitation_ms as f64 / self.hesitation_events.len() as f64
        };

        PointerSummary {
            movement_count: self.movement_count,
            hesitation_count: self.hesitation_events.len() as u32,
            total_hesitation_ms,
            avg_hesitation_ms,
            stress_indicator_count: self.stress_indicators.len() as u32,
            hesitation_events: self.hesitation_events.clone(),
            stress_indicators: self.stress_indicators.clone(),
        }
    }

    fn reset(&mut self) {
        self.last = None;
        self.idle_since_ms = 0;
        self.rapid_streak = 0;
        self.movement_count = 0;
        self.hesitation_events.clear();
        self.stress_indicators.clear();
    }
}
