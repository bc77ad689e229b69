//! Release velocity computation.

use bevy::prelude::*;

/// Linear and angular velocity of an actor at release time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocitySample {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl VelocitySample {
    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }
}

/// Offset between the released object's centre of mass and the attach point.
///
/// When supplied, the object inherits the velocity of its centre of mass
/// swung around the attach point, so objects held far from their centre fly
/// faster when flicked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leverage {
    pub center_of_mass: Vec3,
    pub attach_point: Vec3,
}

/// Velocity handed to a released object.
///
/// Both multipliers scale linear and angular velocity alike.
pub fn throw_velocity(
    sample: VelocitySample,
    mechanism_multiplier: f32,
    actor_multiplier: f32,
    leverage: Option<Leverage>,
) -> VelocitySample {
    let scale = mechanism_multiplier * actor_multiplier;
    let swing = leverage
        .map(|l| sample.angular.cross(l.center_of_mass - l.attach_point))
        .unwrap_or(Vec3::ZERO);
    VelocitySample {
        linear: (sample.linear + swing) * scale,
        angular: sample.angular * scale,
    }
}
