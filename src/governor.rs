//! Performance governor
//!
//! Watches per-event processing time. A slow event lowers the history
//! capacity by one step toward its floor; once the floor is reached and events
//! are still slow, detectors run on every 2nd, then every 4th event. A long
//! enough run of fast events restores capacity step by step and puts the
//! detectors back on every event.

use crate::config::RecognizerConfig;
use crate::history::HistoryBuffer;
use std::collections::VecDeque;
use std::time::Duration;

/// Samples kept for the rolling average
const TIMING_WINDOW: usize = 100;

/// Upper bound on how many events may pass between detector runs
pub const MAX_DETECTOR_STRIDE: u32 = 4;

/// What a checkpoint changed, if anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorAction {
    None,
    Shrunk { capacity: usize },
    Throttled { stride: u32 },
    Recovered { capacity: usize },
}

#[derive(Debug, Clone)]
pub struct PerformanceGovernor {
    ceiling_ms: f64,
    capacity_step: usize,
    recovery_events: u64,
    timings: VecDeque<f64>,
    fast_streak: u64,
    stride: u32,
}

impl Default for PerformanceGovernor {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl PerformanceGovernor {
    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self {
            ceiling_ms: config.processing_ceiling_ms,
            capacity_step: config.capacity_step.max(1),
            recovery_events: u64::from(config.recovery_events.max(1)),
            timings: VecDeque::with_capacity(TIMING_WINDOW),
            fast_streak: 0,
            stride: 1,
        }
    }

    /// Record the processing time of one event and adjust `history`
    pub fn observe(&mut self, elapsed: Duration, history: &mut HistoryBuffer) -> GovernorAction {
        if self.timings.len() >= TIMING_WINDOW {
            self.timings.pop_front();
        }
        self.timings.push_back(elapsed.as_secs_f64() * 1000.0);
        self.evaluate(elapsed, history)
    }

    /// Adjust `history` for a timing without adding it to the rolling average.
    /// Used for timings reported from outside that cover an event `observe`
    /// has already recorded.
    pub fn evaluate(&mut self, elapsed: Duration, history: &mut HistoryBuffer) -> GovernorAction {
        let ms = elapsed.as_secs_f64() * 1000.0;
        if ms > self.ceiling_ms {
            self.fast_streak = 0;
            return self.degrade(ms, history);
        }

        if ms < self.ceiling_ms / 2.0 {
            self.fast_streak += 1;
            if self.fast_streak >= self.recovery_events {
                self.fast_streak = 0;
                return self.recover(history);
            }
        } else {
            self.fast_streak = 0;
        }
        GovernorAction::None
    }

    fn degrade(&mut self, ms: f64, history: &mut HistoryBuffer) -> GovernorAction {
        if !history.at_floor() {
            let capacity = history.shrink(self.capacity_step);
            log::info!(
                "event took {ms:.2}ms (ceiling {:.2}ms), history capacity lowered to {capacity}",
                self.ceiling_ms
            );
            return GovernorAction::Shrunk { capacity };
        }

        if self.stride < MAX_DETECTOR_STRIDE {
            self.stride *= 2;
            log::info!(
                "history at floor and events still slow, detectors now run every {} events",
                self.stride
            );
            return GovernorAction::Throttled {
                stride: self.stride,
            };
        }
        GovernorAction::None
    }

    fn recover(&mut self, history: &mut HistoryBuffer) -> GovernorAction {
        let previous = history.capacity();
        let capacity = history.grow(self.capacity_step);
        let restored_stride = self.stride != 1;
        self.stride = 1;

        if capacity == previous && !restored_stride {
            return GovernorAction::None;
        }
        log::info!("processing recovered, history capacity raised to {capacity}");
        GovernorAction::Recovered { capacity }
    }

    /// Whether detectors should run for the `sequence`-th event (1-based)
    pub fn should_detect(&self, sequence: u64) -> bool {
        self.stride <= 1 || sequence % self.stride as u64 == 0
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Rolling mean over the most recent timings
    pub fn average_ms(&self) -> f64 {
        if self.timings.is_empty() {
            return 0.0;
        }
        self.timings.iter().sum::<f64>() / self.timings.len() as f64
    }

    pub fn reset(&mut self) {
        self.timings.clear();
        self.fast_streak = 0;
        self.stride = 1;
    }
}
