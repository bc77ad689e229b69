//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement
//! to work with the interaction systems. All rigid body, joint and collider
//! manipulation goes through it, so the grab mechanisms, controls and
//! presence logic never touch a physics engine directly.
//!
//! Geometry surveying is not part of the trait: backends add their own sensor
//! systems (see [`InteractionSet::Sensors`](crate::InteractionSet::Sensors))
//! that fill [`ControlSurvey`](crate::controls::ControlSurvey) components.

use bevy::prelude::*;

/// Trait for physics backend implementations.
///
/// Implement this trait to integrate a physics engine with the interaction
/// toolkit. For an example implementation, see the `rapier` module's
/// `Rapier3dBackend`.
pub trait InteractionPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Get the current linear velocity of an entity.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Get the current angular velocity of an entity (radians per second).
    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the angular velocity of an entity.
    fn set_angular_velocity(world: &mut World, entity: Entity, angular_velocity: Vec3);

    /// Apply an angular impulse (instantaneous change in angular momentum).
    fn apply_angular_impulse(world: &mut World, entity: Entity, impulse: Vec3);

    /// Switch an entity between kinematic (driven by transform) and dynamic.
    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool);

    /// Whether the entity is currently kinematic.
    fn is_kinematic(world: &World, entity: Entity) -> bool;

    /// Switch an entity's collider between trigger (sensor) and solid.
    fn set_sensor(world: &mut World, entity: Entity, sensor: bool);

    /// Create a joint on `entity` as described by `spec`.
    ///
    /// Returns `false` when the backend cannot express the joint.
    fn create_joint(world: &mut World, entity: Entity, spec: JointSpec) -> bool;

    /// Remove the joint previously created on `entity`.
    fn remove_joint(world: &mut World, entity: Entity);

    /// Get the mass of an entity.
    fn get_mass(_world: &World, _entity: Entity) -> f32 {
        1.0
    }

    /// Get the world-space centre of mass of an entity.
    fn get_center_of_mass(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<GlobalTransform>(entity)
            .map(|t| t.translation())
            .unwrap_or(Vec3::ZERO)
    }

    /// Get the fixed timestep delta time.
    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

/// Description of a joint the backend should create.
///
/// Anchors are expressed in the local space of the respective body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointSpec {
    /// Rigid coupling to `parent`, holding the child at `relative_rotation`
    /// (child rotation expressed in the parent's frame).
    Fixed {
        parent: Entity,
        parent_anchor: Vec3,
        local_anchor: Vec3,
        relative_rotation: Quat,
    },
    /// Spring coupling to `parent`.
    Spring {
        parent: Entity,
        parent_anchor: Vec3,
        local_anchor: Vec3,
        stiffness: f32,
        damping: f32,
    },
    /// Rotation around `axis` (child space), limited to `limits` radians
    /// measured from the rest pose given by `relative_rotation`.
    Hinge {
        parent: Entity,
        parent_anchor: Vec3,
        local_anchor: Vec3,
        axis: Vec3,
        relative_rotation: Quat,
        limits: Option<[f32; 2]>,
    },
    /// Translation along `axis` (child space), limited to `limits` units.
    /// The child keeps `relative_rotation` to the parent.
    Slide {
        parent: Entity,
        parent_anchor: Vec3,
        local_anchor: Vec3,
        axis: Vec3,
        relative_rotation: Quat,
        limits: [f32; 2],
    },
}

impl JointSpec {
    /// The body this joint attaches to.
    pub fn parent(&self) -> Entity {
        match *self {
            JointSpec::Fixed { parent, .. }
            | JointSpec::Spring { parent, .. }
            | JointSpec::Hinge { parent, .. }
            | JointSpec::Slide { parent, .. } => parent,
        }
    }
}
