//! Device and controller reference resolution.
//!
//! The device layer registers opaque device indices together with the hand
//! they belong to. Controller entities carry a [`TrackedController`] naming
//! the hand they represent and resolve their device index through the
//! [`DeviceRegistry`], retrying on a bounded schedule while the device is not
//! tracked yet.

use std::collections::{HashMap, VecDeque};

use bevy::prelude::*;

use crate::config::InputConfig;
use crate::tasks::{TaskSlot, TaskStatus};

/// Which hand a controller or snap handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// The other hand.
    pub fn opposite(self) -> Self {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }
}

/// Opaque index the device layer uses to address a physical controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub struct DeviceIndex(pub u32);

/// Mapping from device indices to hands, maintained by the device layer.
#[derive(Resource, Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceIndex, Handedness>,
}

impl DeviceRegistry {
    /// Register (or re-register) a tracked device.
    pub fn register(&mut self, index: DeviceIndex, hand: Handedness) {
        self.devices.insert(index, hand);
    }

    /// Forget a device that lost tracking.
    pub fn unregister(&mut self, index: DeviceIndex) {
        self.devices.remove(&index);
    }

    /// Whether `index` is currently tracked.
    pub fn is_tracked(&self, index: DeviceIndex) -> bool {
        self.devices.contains_key(&index)
    }

    /// Hand of a tracked device.
    pub fn hand_of(&self, index: DeviceIndex) -> Option<Handedness> {
        self.devices.get(&index).copied()
    }

    /// Lowest tracked device index for `hand`.
    pub fn index_for(&self, hand: Handedness) -> Option<DeviceIndex> {
        self.devices
            .iter()
            .filter(|(_, h)| **h == hand)
            .map(|(index, _)| *index)
            .min_by_key(|index| index.0)
    }
}

#[derive(Debug, Clone)]
struct LookupRetry {
    attempts_left: u32,
    timer: Timer,
}

/// A controller entity bound to a physical device through its hand.
#[derive(Component, Debug, Clone)]
pub struct TrackedController {
    /// The hand this controller represents.
    pub hand: Handedness,
    index: Option<DeviceIndex>,
    retry: TaskSlot<LookupRetry>,
    gave_up: bool,
}

impl TrackedController {
    pub fn new(hand: Handedness) -> Self {
        Self {
            hand,
            index: None,
            retry: TaskSlot::default(),
            gave_up: false,
        }
    }

    pub fn left() -> Self {
        Self::new(Handedness::Left)
    }

    pub fn right() -> Self {
        Self::new(Handedness::Right)
    }

    /// Resolved device index, if tracking succeeded.
    pub fn index(&self) -> Option<DeviceIndex> {
        self.index
    }

    /// Whether the controller is bound to a tracked device.
    pub fn is_resolved(&self) -> bool {
        self.index.is_some()
    }

    /// Whether the lookup retries were exhausted.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    /// Restart lookups after giving up (e.g. when the user reconnects).
    pub fn reset(&mut self) {
        self.index = None;
        self.gave_up = false;
        self.retry.cancel();
    }

    /// Advance the lookup state machine by one tick.
    pub fn resolve(&mut self, registry: &DeviceRegistry, config: &InputConfig, delta: std::time::Duration) {
        if let Some(index) = self.index {
            if registry.is_tracked(index) {
                return;
            }
            debug!("device {:?} for {:?} hand lost tracking", index, self.hand);
            self.index = None;
        }
        if self.gave_up {
            return;
        }

        let hand = self.hand;
        if !self.retry.is_running() {
            if let Some(index) = registry.index_for(hand) {
                self.index = Some(index);
                return;
            }
            if config.tracking_retry_attempts == 0 {
                self.give_up();
                return;
            }
            self.retry.start(LookupRetry {
                attempts_left: config.tracking_retry_attempts,
                timer: Timer::from_seconds(config.tracking_retry_delay, TimerMode::Once),
            });
            return;
        }

        let mut found = None;
        let mut exhausted = false;
        self.retry.step(|retry| {
            retry.timer.tick(delta);
            if !retry.timer.finished() {
                return TaskStatus::Pending;
            }
            found = registry.index_for(hand);
            if found.is_some() {
                return TaskStatus::Done;
            }
            retry.attempts_left = retry.attempts_left.saturating_sub(1);
            if retry.attempts_left == 0 {
                exhausted = true;
                return TaskStatus::Done;
            }
            retry.timer.reset();
            TaskStatus::Pending
        });

        if found.is_some() {
            self.index = found;
        } else if exhausted {
            self.give_up();
        }
    }

    fn give_up(&mut self) {
        warn!(
            "no tracked device for {:?} hand after retries, controller stays inert",
            self.hand
        );
        self.gave_up = true;
    }
}

/// Rolling-average velocity estimate built from successive poses.
///
/// Used whenever the device layer does not report velocities itself.
#[derive(Component, Debug, Clone)]
pub struct VelocityEstimator {
    samples: VecDeque<(Vec3, Vec3)>,
    capacity: usize,
    last_pose: Option<(Vec3, Quat)>,
}

impl Default for VelocityEstimator {
    fn default() -> Self {
        Self::new(InputConfig::default().velocity_samples)
    }
}

impl VelocityEstimator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            last_pose: None,
        }
    }

    /// Record a pose observed `dt` seconds after the previous one.
    pub fn push_pose(&mut self, position: Vec3, rotation: Quat, dt: f32) {
        if let Some((last_position, last_rotation)) = self.last_pose {
            if dt > 0.0 {
                let linear = (position - last_position) / dt;
                let mut delta = rotation * last_rotation.inverse();
                if delta.w < 0.0 {
                    delta = -delta;
                }
                let (axis, angle) = delta.to_axis_angle();
                let angular = if angle.is_finite() && axis.is_finite() {
                    axis * angle / dt
                } else {
                    Vec3::ZERO
                };
                if self.samples.len() == self.capacity {
                    self.samples.pop_front();
                }
                self.samples.push_back((linear, angular));
            }
        }
        self.last_pose = Some((position, rotation));
    }

    /// Average linear velocity over the window.
    pub fn velocity(&self) -> Vec3 {
        if self.samples.is_empty() {
            return Vec3::ZERO;
        }
        self.samples.iter().map(|(v, _)| *v).sum::<Vec3>() / self.samples.len() as f32
    }

    /// Average angular velocity over the window.
    pub fn angular_velocity(&self) -> Vec3 {
        if self.samples.is_empty() {
            return Vec3::ZERO;
        }
        self.samples.iter().map(|(_, w)| *w).sum::<Vec3>() / self.samples.len() as f32
    }

    /// Number of samples the average is taken over.
    pub fn window(&self) -> usize {
        self.capacity
    }

    /// Resize the averaging window, dropping the oldest samples if needed.
    pub fn set_window(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Samples currently averaged.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Forget all samples (e.g. after a teleport).
    pub fn clear(&mut self) {
        self.samples.clear();
        self.last_pose = None;
    }
}

/// Advance device lookups for all tracked controllers.
pub fn resolve_tracked_controllers(
    time: Res<Time>,
    config: Res<InputConfig>,
    registry: Res<DeviceRegistry>,
    mut q_controllers: Query<&mut TrackedController>,
) {
    for mut tracked in &mut q_controllers {
        tracked.resolve(&registry, &config, time.delta());
    }
}

/// Feed every estimator with its entity's current world pose.
///
/// Estimator windows follow [`InputConfig::velocity_samples`].
pub fn sample_velocities(
    time: Res<Time>,
    config: Res<InputConfig>,
    mut q: Query<(&GlobalTransform, &mut VelocityEstimator)>,
) {
    let dt = time.delta_secs();
    let window = config.velocity_samples.max(1);
    for (transform, mut estimator) in &mut q {
        if estimator.window() != window {
            estimator.set_window(window);
        }
        let (_, rotation, translation) = transform.to_scale_rotation_translation();
        estimator.push_pose(translation, rotation, dt);
    }
}
