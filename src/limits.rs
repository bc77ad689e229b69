//! Range limits with hysteresis.
//!
//! A [`LimitTracker`] watches a normalized value in `[0, 1]` and reports when
//! it reaches or leaves either end. Leaving requires moving twice the entry
//! threshold away from the end, so a value resting on a boundary does not
//! flicker between reached and exited.

use bevy::prelude::*;

/// Inclusive `[min, max]` range along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct AxisLimits {
    pub min: f32,
    pub max: f32,
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self::LOCKED
    }
}

impl AxisLimits {
    /// A range that allows no movement.
    pub const LOCKED: AxisLimits = AxisLimits { min: 0.0, max: 0.0 };

    /// Build a range; bounds are swapped if given in the wrong order.
    pub fn new(min: f32, max: f32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Whether the range allows no movement.
    pub fn is_locked(&self) -> bool {
        (self.max - self.min).abs() <= f32::EPSILON
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Map a value into `[0, 1]`. Locked ranges always report 0.
    pub fn normalize(&self, value: f32) -> f32 {
        if self.is_locked() {
            return 0.0;
        }
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

/// Which end of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum LimitBound {
    Min,
    Max,
}

/// A boundary crossing reported by [`LimitTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitTransition {
    Reached(LimitBound),
    Exited(LimitBound),
}

/// Hysteresis state machine over a normalized value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub struct LimitTracker {
    at: Option<LimitBound>,
}

impl LimitTracker {
    /// The boundary the value currently rests on.
    pub fn at(&self) -> Option<LimitBound> {
        self.at
    }

    /// Feed a new normalized value. At most two transitions are returned
    /// (leaving one end and reaching the other in a single jump).
    pub fn update(&mut self, normalized: f32, threshold: f32) -> Vec<LimitTransition> {
        let mut transitions = Vec::new();
        let exit_band = threshold * 2.0;

        match self.at {
            Some(LimitBound::Min) if normalized > exit_band => {
                self.at = None;
                transitions.push(LimitTransition::Exited(LimitBound::Min));
            }
            Some(LimitBound::Max) if normalized < 1.0 - exit_band => {
                self.at = None;
                transitions.push(LimitTransition::Exited(LimitBound::Max));
            }
            _ => {}
        }

        if self.at.is_none() {
            if normalized <= threshold {
                self.at = Some(LimitBound::Min);
                transitions.push(LimitTransition::Reached(LimitBound::Min));
            } else if normalized >= 1.0 - threshold {
                self.at = Some(LimitBound::Max);
                transitions.push(LimitTransition::Reached(LimitBound::Max));
            }
        }

        transitions
    }
}
