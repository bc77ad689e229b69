//! Grabs that move or rotate an object's local transform within limits.
//!
//! The object is not simulated while held. Its local transform is driven
//! directly from the hand, clamped per axis, and reported as a normalized
//! value. On release it can keep drifting (decelerating) or ease back to
//! where it started.

use bevy::prelude::*;

use crate::limits::{AxisLimits, LimitTracker, LimitTransition};
use crate::pose::LocalAxis;
use crate::tasks::{TaskSlot, TaskStatus};

/// Behaviour after the hand lets go.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct DriveRelease {
    /// How quickly leftover momentum dies out (per second). Zero stops dead.
    pub deceleration_damper: f32,
    /// Ease back to the origin instead of drifting.
    pub reset_to_origin: bool,
    /// Easing speed towards the origin (units or degrees per second).
    pub reset_speed: f32,
    /// Normalized distance from either end that counts as reaching it.
    pub limit_threshold: f32,
}

impl Default for DriveRelease {
    fn default() -> Self {
        Self {
            deceleration_damper: 0.0,
            reset_to_origin: false,
            reset_speed: 1.0,
            limit_threshold: 0.01,
        }
    }
}

/// Settings of the clamped translation grab.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct MoveTransformSettings {
    /// Allowed offset from the origin along each parent-space axis.
    pub limits: [AxisLimits; 3],
    /// Hand movement to object movement ratio.
    pub tracking_speed: f32,
    pub release: DriveRelease,
}

impl Default for MoveTransformSettings {
    fn default() -> Self {
        Self {
            limits: [AxisLimits::LOCKED; 3],
            tracking_speed: 1.0,
            release: DriveRelease::default(),
        }
    }
}

impl MoveTransformSettings {
    /// Builder: allow movement along one axis.
    pub fn with_axis(mut self, axis: LocalAxis, limits: AxisLimits) -> Self {
        self.limits[axis.slot()] = limits;
        self
    }

    /// Builder: set the release behaviour.
    pub fn with_release(mut self, release: DriveRelease) -> Self {
        self.release = release;
        self
    }
}

/// Settings of the clamped rotation grab.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct RotateTransformSettings {
    /// Axis of rotation in the object's original local frame.
    pub axis: LocalAxis,
    /// Allowed angle in degrees.
    pub limits: AxisLimits,
    pub release: DriveRelease,
}

impl Default for RotateTransformSettings {
    fn default() -> Self {
        Self {
            axis: LocalAxis::Y,
            limits: AxisLimits::new(-180.0, 180.0),
            release: DriveRelease::default(),
        }
    }
}

impl RotateTransformSettings {
    /// Limits expressed per axis slot, locking the two unused axes.
    pub fn axis_limits(&self) -> [AxisLimits; 3] {
        let mut limits = [AxisLimits::LOCKED; 3];
        limits[self.axis.slot()] = self.limits;
        limits
    }
}

/// How a [`TransformDrive`] maps its displacement onto the transform.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum DriveMode {
    Move,
    Rotate(LocalAxis),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ReleaseMotion {
    ResetToOrigin,
    Decelerate,
}

/// Persistent drive state of an object grabbed with a transform mechanism.
///
/// Created on the first grab and kept afterwards so the origin survives
/// repeated grabs.
#[derive(Component, Debug, Clone)]
pub struct TransformDrive {
    origin: Transform,
    mode: DriveMode,
    displacement: Vec3,
    velocity: Vec3,
    normalized: Vec3,
    trackers: [LimitTracker; 3],
    release: TaskSlot<ReleaseMotion>,
}

/// Runtime state of a transform grab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGrab {
    pub start_displacement: Vec3,
    /// Hand position in the object's parent space at grab time.
    pub start_hand: Vec3,
}

impl TransformDrive {
    pub fn new(origin: Transform, mode: DriveMode) -> Self {
        Self {
            origin,
            mode,
            displacement: Vec3::ZERO,
            velocity: Vec3::ZERO,
            normalized: Vec3::ZERO,
            trackers: [LimitTracker::default(); 3],
            release: TaskSlot::default(),
        }
    }

    /// Local transform the drive started from.
    pub fn origin(&self) -> Transform {
        self.origin
    }

    /// Current offset from the origin (units for move, degrees for rotate).
    pub fn displacement(&self) -> Vec3 {
        self.displacement
    }

    /// Current displacement normalized per axis.
    pub fn normalized(&self) -> Vec3 {
        self.normalized
    }

    /// Whether a release motion is still running.
    pub fn is_releasing(&self) -> bool {
        self.release.is_running()
    }

    /// Axis in parent space the drive rotates around.
    pub fn rotation_axis(&self) -> Option<Vec3> {
        match self.mode {
            DriveMode::Rotate(axis) => Some(self.origin.rotation * axis.unit()),
            DriveMode::Move => None,
        }
    }

    /// Move to `target` (clamped). Returns limit crossings per axis.
    pub fn drive_to(
        &mut self,
        target: Vec3,
        limits: &[AxisLimits; 3],
        threshold: f32,
        dt: f32,
    ) -> Vec<(LocalAxis, LimitTransition)> {
        let clamped = Vec3::new(
            limits[0].clamp(target.x),
            limits[1].clamp(target.y),
            limits[2].clamp(target.z),
        );
        if dt > 0.0 {
            self.velocity = (clamped - self.displacement) / dt;
        }
        self.displacement = clamped;

        let mut transitions = Vec::new();
        for axis in LocalAxis::ALL {
            let slot = axis.slot();
            if limits[slot].is_locked() {
                continue;
            }
            let normalized = limits[slot].normalize(axis.component(clamped));
            self.normalized[slot] = normalized;
            for transition in self.trackers[slot].update(normalized, threshold) {
                transitions.push((axis, transition));
            }
        }
        transitions
    }

    /// Local transform for the current displacement.
    pub fn local_transform(&self) -> Transform {
        let mut transform = self.origin;
        match self.mode {
            DriveMode::Move => {
                transform.translation = self.origin.translation + self.displacement;
            }
            DriveMode::Rotate(axis) => {
                let angle = axis.component(self.displacement).to_radians();
                let world_axis = self.origin.rotation * axis.unit();
                transform.rotation = Quat::from_axis_angle(world_axis, angle) * self.origin.rotation;
            }
        }
        transform
    }

    /// Target displacement for a hand at `hand` (parent space).
    pub fn grab_target(&self, grab: &DriveGrab, hand: Vec3, tracking_speed: f32) -> Vec3 {
        match self.mode {
            DriveMode::Move => grab.start_displacement + (hand - grab.start_hand) * tracking_speed,
            DriveMode::Rotate(axis) => {
                let pivot = self.origin.translation;
                let world_axis = self.origin.rotation * axis.unit();
                let delta = signed_angle_about(grab.start_hand - pivot, hand - pivot, world_axis);
                let mut target = grab.start_displacement;
                target[axis.slot()] += delta.to_degrees();
                target
            }
        }
    }

    /// Stop any release motion (a new grab started).
    pub fn cancel_release(&mut self) {
        self.release.cancel();
    }

    /// Start the configured release motion.
    pub fn begin_release(&mut self, release: &DriveRelease) {
        if release.reset_to_origin {
            self.release.start(ReleaseMotion::ResetToOrigin);
        } else if release.deceleration_damper > 0.0 && self.velocity.length_squared() > 0.0 {
            self.release.start(ReleaseMotion::Decelerate);
        } else {
            self.velocity = Vec3::ZERO;
        }
    }

    /// Advance the release motion by one tick.
    ///
    /// Returns `None` when no release motion is running.
    pub fn step_release(
        &mut self,
        limits: &[AxisLimits; 3],
        release: &DriveRelease,
        dt: f32,
    ) -> Option<Vec<(LocalAxis, LimitTransition)>> {
        let motion = *self.release.state()?;
        let (transitions, done) = match motion {
            ReleaseMotion::ResetToOrigin => {
                let home = Vec3::new(limits[0].clamp(0.0), limits[1].clamp(0.0), limits[2].clamp(0.0));
                let target = move_towards(self.displacement, home, release.reset_speed * dt);
                let transitions = self.drive_to(target, limits, release.limit_threshold, dt);
                let done = self.displacement.distance(home) <= f32::EPSILON;
                if done {
                    self.velocity = Vec3::ZERO;
                }
                (transitions, done)
            }
            ReleaseMotion::Decelerate => {
                let target = self.displacement + self.velocity * dt;
                let transitions = self.drive_to(target, limits, release.limit_threshold, dt);
                self.velocity *= (1.0 - release.deceleration_damper * dt).max(0.0);
                let done = self.velocity.length() < 1e-3;
                if done {
                    self.velocity = Vec3::ZERO;
                }
                (transitions, done)
            }
        };
        self.release
            .step(|_| if done { TaskStatus::Done } else { TaskStatus::Pending });
        Some(transitions)
    }
}

fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance <= f32::EPSILON {
        target
    } else {
        current + delta / distance * max_delta
    }
}

/// Signed angle (radians) from `from` to `to` around `axis`, after projecting
/// both onto the plane perpendicular to the axis.
pub fn signed_angle_about(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    let axis = axis.normalize_or_zero();
    let a = from - axis * from.dot(axis);
    let b = to - axis * to.dot(axis);
    if a.length_squared() <= f32::EPSILON || b.length_squared() <= f32::EPSILON {
        return 0.0;
    }
    axis.dot(a.cross(b)).atan2(a.dot(b))
}
