//! Rigid poses and scene-graph helpers.

use bevy::prelude::*;

/// Position plus rotation, without scale.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::IDENTITY)
    }

    /// Pose of a global transform (scale dropped).
    pub fn from_global(transform: &GlobalTransform) -> Self {
        let (_, rotation, translation) = transform.to_scale_rotation_translation();
        Self::new(translation, rotation)
    }

    /// The inverse pose.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self::new(rotation * -self.translation, rotation)
    }

    /// Compose: `self` applied after `local` (local is expressed in `self`).
    pub fn mul_pose(&self, local: Pose) -> Pose {
        Pose::new(
            self.translation + self.rotation * local.translation,
            (self.rotation * local.rotation).normalize(),
        )
    }

    /// Transform a point from this pose's local space to the parent space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * point
    }

    /// Express `other` in this pose's local space.
    pub fn relative(&self, other: Pose) -> Pose {
        self.inverse().mul_pose(other)
    }
}

/// One of the three local cardinal axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum LocalAxis {
    X,
    Y,
    Z,
}

impl LocalAxis {
    /// Deterministic iteration order, also used for tie-breaking.
    pub const ALL: [LocalAxis; 3] = [LocalAxis::X, LocalAxis::Y, LocalAxis::Z];

    /// Unit vector of the axis.
    pub fn unit(self) -> Vec3 {
        match self {
            LocalAxis::X => Vec3::X,
            LocalAxis::Y => Vec3::Y,
            LocalAxis::Z => Vec3::Z,
        }
    }

    /// The component of `v` along this axis.
    pub fn component(self, v: Vec3) -> f32 {
        match self {
            LocalAxis::X => v.x,
            LocalAxis::Y => v.y,
            LocalAxis::Z => v.z,
        }
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

/// World pose of an entity, read from its [`GlobalTransform`].
pub fn world_pose(world: &World, entity: Entity) -> Option<Pose> {
    world.get::<GlobalTransform>(entity).map(Pose::from_global)
}

/// Move an entity to a world pose.
///
/// Writes the local [`Transform`] (relative to the parent, if any) and the
/// [`GlobalTransform`] so that reads later in the same tick see the new pose
/// before transform propagation runs.
pub fn set_world_pose(world: &mut World, entity: Entity, pose: Pose) {
    let parent_global = world
        .get::<ChildOf>(entity)
        .and_then(|child_of| world.get::<GlobalTransform>(child_of.parent()))
        .copied();

    let Some(mut transform) = world.get_mut::<Transform>(entity) else {
        return;
    };
    let scale = transform.scale;
    let global = GlobalTransform::from(
        Transform::from_translation(pose.translation)
            .with_rotation(pose.rotation)
            .with_scale(scale),
    );
    *transform = match parent_global {
        Some(parent) => global.reparented_to(&parent),
        None => global.compute_transform(),
    };

    if let Some(mut global_transform) = world.get_mut::<GlobalTransform>(entity) {
        *global_transform = global;
    }
}

/// Whether `entity` is `ancestor` or one of its descendants.
pub fn is_descendant_of(world: &World, entity: Entity, ancestor: Entity) -> bool {
    let mut current = Some(entity);
    while let Some(e) = current {
        if e == ancestor {
            return true;
        }
        current = world.get::<ChildOf>(e).map(|c| c.parent());
    }
    false
}
