//! Snap handle selection and snapping.

use bevy::prelude::*;

use crate::device::Handedness;
use crate::pose::Pose;

/// Pick the snap handle for `hand`, falling back to the other hand's handle.
pub fn select_snap_handle(
    hand: Handedness,
    left: Option<Entity>,
    right: Option<Entity>,
) -> Option<Entity> {
    match hand {
        Handedness::Left => left.or(right),
        Handedness::Right => right.or(left),
    }
}

/// Pose an object must take so it sits in the grabbing hand.
///
/// With a handle, the handle's pose is made to coincide with the attach
/// point. Without one, the object's centre of mass is moved onto the attach
/// point and its rotation is kept.
pub fn snapped_object_pose(
    attach: Pose,
    object: Pose,
    handle: Option<Pose>,
    center_of_mass: Vec3,
) -> Pose {
    match handle {
        Some(handle) => {
            let handle_in_object = object.relative(handle);
            attach.mul_pose(handle_in_object.inverse())
        }
        None => Pose::new(
            object.translation + (attach.translation - center_of_mass),
            object.rotation,
        ),
    }
}
