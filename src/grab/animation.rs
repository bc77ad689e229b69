//! Scrubbing an animation by pulling on an object.
//!
//! The object stays put. The hand's pull distance since the grab maps to a
//! normalized animation position, which is reported through
//! [`AnimationScrubbed`](crate::grab::AnimationScrubbed).

use bevy::prelude::*;

use crate::tasks::{TaskSlot, TaskStatus};

/// Settings of the animation scrub grab.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct ControlAnimationSettings {
    /// Pull distance that spans the whole animation.
    pub max_pull_distance: f32,
    /// Rewind to the start when released.
    pub rewind_on_release: bool,
    /// Rewind speed in normalized units per second.
    pub rewind_speed: f32,
    /// Number of frames the normalized value is quantized to when reported.
    pub animation_frames: u32,
}

impl Default for ControlAnimationSettings {
    fn default() -> Self {
        Self {
            max_pull_distance: 0.5,
            rewind_on_release: false,
            rewind_speed: 1.0,
            animation_frames: 60,
        }
    }
}

impl ControlAnimationSettings {
    /// Frame index for a normalized position.
    pub fn frame(&self, normalized: f32) -> u32 {
        let last = self.animation_frames.saturating_sub(1);
        (normalized.clamp(0.0, 1.0) * last as f32).round() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rewind;

/// Persistent scrub position of an object using the animation mechanism.
#[derive(Component, Debug, Clone, Default)]
pub struct AnimationScrub {
    normalized: f32,
    rewind: TaskSlot<Rewind>,
}

/// Runtime state of an animation grab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationGrab {
    pub start_attach: Vec3,
    pub start_normalized: f32,
}

impl AnimationScrub {
    pub fn normalized(&self) -> f32 {
        self.normalized
    }

    pub fn is_rewinding(&self) -> bool {
        self.rewind.is_running()
    }

    /// Begin a grab at the current position. Cancels any rewind.
    pub fn begin_grab(&mut self, attach: Vec3) -> AnimationGrab {
        self.rewind.cancel();
        AnimationGrab {
            start_attach: attach,
            start_normalized: self.normalized,
        }
    }

    /// Update from the hand position. Returns the new value if it changed.
    pub fn pull(&mut self, grab: &AnimationGrab, attach: Vec3, settings: &ControlAnimationSettings) -> Option<f32> {
        let span = settings.max_pull_distance.max(f32::EPSILON);
        let pulled = attach.distance(grab.start_attach) / span;
        self.set((grab.start_normalized + pulled).clamp(0.0, 1.0))
    }

    /// Start rewinding if configured.
    pub fn release(&mut self, settings: &ControlAnimationSettings) {
        if settings.rewind_on_release && self.normalized > 0.0 {
            self.rewind.start(Rewind);
        }
    }

    /// Advance the rewind by one tick. Returns the new value if it changed.
    pub fn step_rewind(&mut self, settings: &ControlAnimationSettings, dt: f32) -> Option<f32> {
        if !self.rewind.is_running() {
            return None;
        }
        let next = (self.normalized - settings.rewind_speed * dt).max(0.0);
        self.rewind.step(|_| {
            if next <= 0.0 {
                TaskStatus::Done
            } else {
                TaskStatus::Pending
            }
        });
        self.set(next)
    }

    fn set(&mut self, normalized: f32) -> Option<f32> {
        if (normalized - self.normalized).abs() <= f32::EPSILON {
            return None;
        }
        self.normalized = normalized;
        Some(normalized)
    }
}
