//! Velocity-driven tracking grabs.
//!
//! Instead of rigidly coupling the object, these mechanisms set the object's
//! velocities each physics tick, so the object follows the hand while still
//! colliding with the world.

use bevy::prelude::*;

use crate::pose::Pose;

/// Settings of the velocity-tracking grab.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct TrackObjectSettings {
    /// Linear velocity clamp (units per second).
    pub max_velocity: f32,
    /// Angular velocity clamp (radians per second).
    pub max_angular_velocity: f32,
    /// Hand-to-object distance beyond which the grab is released.
    pub detach_distance: f32,
}

impl Default for TrackObjectSettings {
    fn default() -> Self {
        Self {
            max_velocity: f32::INFINITY,
            max_angular_velocity: f32::INFINITY,
            detach_distance: 1.0,
        }
    }
}

/// Settings of the rotation-only tracking grab (wheels, doors).
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct RotatorTrackSettings {
    /// Scale from lever force to angular impulse.
    pub strength: f32,
    /// Angular velocity clamp (radians per second).
    pub max_angular_velocity: f32,
    pub detach_distance: f32,
    /// Hinge point in object space. Without it the hinge of a set-up
    /// control is used, then the centre of mass.
    pub pivot: Option<Vec3>,
}

impl Default for RotatorTrackSettings {
    fn default() -> Self {
        Self {
            strength: 10.0,
            max_angular_velocity: f32::INFINITY,
            detach_distance: 1.0,
            pivot: None,
        }
    }
}

impl RotatorTrackSettings {
    pub fn with_pivot(mut self, pivot: Vec3) -> Self {
        self.pivot = Some(pivot);
        self
    }
}

/// Runtime state of a rotator grab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatorGrab {
    /// Point on the object where it was grabbed, in object space.
    pub local_grab_point: Vec3,
}

/// Velocities that carry `current` onto `target` within one tick of `dt`,
/// clamped to the configured limits.
pub fn track_velocities(current: Pose, target: Pose, dt: f32, settings: &TrackObjectSettings) -> (Vec3, Vec3) {
    if dt <= 0.0 {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    let linear = ((target.translation - current.translation) / dt).clamp_length_max(settings.max_velocity);

    let mut delta = target.rotation * current.rotation.inverse();
    if delta.w < 0.0 {
        delta = -delta;
    }
    let (axis, angle) = delta.to_axis_angle();
    let angular = if angle.abs() > f32::EPSILON && axis.is_finite() {
        (axis * angle / dt).clamp_length_max(settings.max_angular_velocity)
    } else {
        Vec3::ZERO
    };

    (linear, angular)
}

/// Angular impulse that turns the object about `pivot` so its grab point
/// follows the hand.
///
/// Only torque is produced; the object's position is left to its joints.
pub fn rotator_impulse(pivot: Vec3, grab_point: Vec3, track_point: Vec3, strength: f32) -> Vec3 {
    let lever = grab_point - pivot;
    let pull = (track_point - grab_point) * strength;
    lever.cross(pull)
}

/// Whether the hand moved too far from the object to keep holding it.
pub fn exceeds_detach_distance(hand: Vec3, grab_point: Vec3, detach_distance: f32) -> bool {
    hand.distance(grab_point) > detach_distance
}
