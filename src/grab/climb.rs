//! Climbing: the player moves instead of the grabbed object.

use bevy::prelude::*;

use crate::pose::Pose;

/// Marker on a player rig naming the hand that currently moves it.
///
/// With both hands on climbable objects only the most recent grab drives
/// the rig; releasing it hands control back to the other hand.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimbingActor(pub Entity);

/// Runtime state of a climbing grab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimbGrab {
    /// The player rig being moved.
    pub rig: Entity,
    /// Controller position in rig space on the previous tick.
    pub last_controller_local: Vec3,
    /// World position of the climbed object on the previous tick.
    pub last_object_position: Vec3,
}

/// New rig translation after one climbing tick.
///
/// The rig moves opposite the hand's movement relative to the rig, and along
/// with the climbed object if that object moved.
pub fn climb_step(rig: Pose, controller_local: Vec3, last_controller_local: Vec3, object_delta: Vec3) -> Vec3 {
    let hand_delta = rig.rotation * (controller_local - last_controller_local);
    rig.translation - hand_delta + object_delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn pulling_down_lifts_the_rig() {
        let rig = Pose::from_translation(Vec3::ZERO);
        let next = climb_step(rig, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.3, 0.0), Vec3::ZERO);
        assert!((next - Vec3::Y * 0.3).length() < 1e-5);
    }

    #[test]
    fn respects_rig_rotation() {
        let rig = Pose::new(Vec3::ZERO, Quat::from_rotation_y(FRAC_PI_2));
        // Hand moves +X in rig space, which is -Z in world space.
        let next = climb_step(rig, Vec3::X, Vec3::ZERO, Vec3::ZERO);
        assert!((next - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn follows_moving_object() {
        let rig = Pose::from_translation(Vec3::X);
        let next = climb_step(rig, Vec3::ZERO, Vec3::ZERO, Vec3::Y * 0.1);
        assert!((next - Vec3::new(1.0, 0.1, 0.0)).length() < 1e-5);
    }
}
