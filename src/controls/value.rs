//! Mapping a control's physical state onto its logical value.

use bevy::prelude::*;

use crate::error::SetupError;

/// Logical value range of a control.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
pub struct ControlValueRange {
    pub min: f32,
    pub max: f32,
}

impl Default for ControlValueRange {
    fn default() -> Self {
        Self { min: 0.0, max: 100.0 }
    }
}

impl ControlValueRange {
    /// A range with `max > min`.
    pub fn new(min: f32, max: f32) -> Result<Self, SetupError> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if self.min.is_finite() && self.max.is_finite() && self.max > self.min {
            Ok(())
        } else {
            Err(SetupError::EmptyRange)
        }
    }

    /// Value for a normalized position, rounded to `step` (when positive)
    /// and always inside `[min, max]`.
    pub fn value_at(&self, normalized: f32, step: f32) -> f32 {
        let raw = self.min + (self.max - self.min) * normalized.clamp(0.0, 1.0);
        let stepped = if step > 0.0 {
            self.min + ((raw - self.min) / step).round() * step
        } else {
            raw
        };
        stepped.clamp(self.min, self.max)
    }
}

/// Current value of a set-up control.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct ControlValue {
    value: Option<f32>,
    normalized: f32,
}

impl ControlValue {
    /// The logical value, once the control has been measured.
    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn normalized(&self) -> f32 {
        self.normalized
    }

    /// Store a new measurement; returns `true` if the logical value changed.
    pub(crate) fn set(&mut self, value: f32, normalized: f32) -> bool {
        self.normalized = normalized;
        if self.value == Some(value) {
            return false;
        }
        self.value = Some(value);
        true
    }
}
