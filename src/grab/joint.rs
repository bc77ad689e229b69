//! Joint-based grab coupling (fixed and spring joints).

use bevy::prelude::*;

use crate::backend::JointSpec;
use crate::pose::Pose;

/// Default force beyond which a grab joint snaps.
pub const DEFAULT_BREAK_FORCE: f32 = 1500.0;

/// Settings of a rigid joint grab.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct FixedJointSettings {
    /// Estimated joint force above which the grab is forcibly released.
    pub break_force: f32,
}

impl Default for FixedJointSettings {
    fn default() -> Self {
        Self {
            break_force: DEFAULT_BREAK_FORCE,
        }
    }
}

/// Settings of a spring joint grab.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct SpringJointSettings {
    pub break_force: f32,
    pub stiffness: f32,
    pub damping: f32,
}

impl Default for SpringJointSettings {
    fn default() -> Self {
        Self {
            break_force: DEFAULT_BREAK_FORCE,
            stiffness: 500.0,
            damping: 50.0,
        }
    }
}

/// Runtime state of a joint grab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointGrab {
    /// The grab point in the object's local space.
    pub local_anchor: Vec3,
    pub break_force: f32,
}

/// Joint description coupling `object` to `attach_point`.
pub fn grab_joint_spec(
    attach_point: Entity,
    attach: Pose,
    object: Pose,
    spring: Option<SpringJointSettings>,
) -> (JointSpec, Vec3) {
    let local_anchor = object.inverse().transform_point(attach.translation);
    let spec = match spring {
        None => JointSpec::Fixed {
            parent: attach_point,
            parent_anchor: Vec3::ZERO,
            local_anchor,
            relative_rotation: attach.relative(object).rotation,
        },
        Some(spring) => JointSpec::Spring {
            parent: attach_point,
            parent_anchor: Vec3::ZERO,
            local_anchor,
            stiffness: spring.stiffness,
            damping: spring.damping,
        },
    };
    (spec, local_anchor)
}

/// Rough force the joint exerts to close a gap of `separation` in one step.
pub fn joint_strain(mass: f32, separation: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    mass * separation / (dt * dt)
}

/// Whether the joint gives way. Undroppable objects never break free.
pub fn joint_breaks(strain: f32, break_force: f32, droppable: bool) -> bool {
    droppable && strain > break_force
}
