//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.

use std::collections::{HashMap, HashSet};

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::{InteractionPhysicsBackend, JointSpec};
use crate::config::ControlConfig;
use crate::controls::{AxisDirection, Control3d, ControlSetupState, ControlSurvey, LocalBounds};
use crate::pose::{LocalAxis, Pose};
use crate::presence::{HeadsetCollisionDetected, HeadsetCollisionEnded, PlayerPresence};

/// Rapier3D physics backend for the interaction toolkit.
///
/// Body, joint and collider manipulation goes through the trait methods.
/// Probing for 3D controls and headset collision reporting are handled by
/// dedicated Rapier systems that receive `RapierContext` and collision
/// events as system parameters.
pub struct Rapier3dBackend;

impl InteractionPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        } else if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
            entity_mut.insert(Velocity::linear(velocity));
        }
    }

    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.angvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_angular_velocity(world: &mut World, entity: Entity, angular_velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.angvel = angular_velocity;
        } else if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
            entity_mut.insert(Velocity::angular(angular_velocity));
        }
    }

    fn apply_angular_impulse(world: &mut World, entity: Entity, impulse: Vec3) {
        if let Some(mut ext_impulse) = world.get_mut::<ExternalImpulse>(entity) {
            ext_impulse.torque_impulse += impulse;
        } else if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            // Fallback: apply as velocity change if no ExternalImpulse component
            vel.angvel += impulse;
        }
    }

    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool) {
        let body = if kinematic {
            RigidBody::KinematicPositionBased
        } else {
            RigidBody::Dynamic
        };
        if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
            entity_mut.insert(body);
        }
    }

    fn is_kinematic(world: &World, entity: Entity) -> bool {
        matches!(
            world.get::<RigidBody>(entity),
            Some(RigidBody::KinematicPositionBased | RigidBody::KinematicVelocityBased)
        )
    }

    fn set_sensor(world: &mut World, entity: Entity, sensor: bool) {
        let Ok(mut entity_mut) = world.get_entity_mut(entity) else {
            return;
        };
        if sensor {
            entity_mut.insert(Sensor);
        } else {
            entity_mut.remove::<Sensor>();
        }
    }

    fn create_joint(world: &mut World, entity: Entity, spec: JointSpec) -> bool {
        let parent = spec.parent();
        // Rapier joints need a body on both sides; bare parents (hands,
        // static scenery) become kinematic bodies following their transform.
        if world.get::<RigidBody>(parent).is_none() {
            let Ok(mut parent_mut) = world.get_entity_mut(parent) else {
                return false;
            };
            parent_mut.insert(RigidBody::KinematicPositionBased);
        }
        // The jointed side has to move, so a bare child becomes dynamic.
        if world.get::<RigidBody>(entity).is_none() {
            let Ok(mut entity_mut) = world.get_entity_mut(entity) else {
                return false;
            };
            let has_collider = entity_mut.contains::<Collider>();
            entity_mut.insert(Rapier3dInteractableBundle::new());
            if !has_collider {
                entity_mut.insert(AdditionalMassProperties::MassProperties(MassProperties {
                    mass: 1.0,
                    principal_inertia: Vec3::splat(0.1),
                    ..default()
                }));
            }
        }

        let joint = match spec {
            JointSpec::Fixed {
                parent,
                parent_anchor,
                local_anchor,
                relative_rotation,
            } => ImpulseJoint::new(
                parent,
                FixedJointBuilder::new()
                    .local_anchor1(parent_anchor)
                    .local_anchor2(local_anchor)
                    .local_basis1(relative_rotation),
            ),
            JointSpec::Spring {
                parent,
                parent_anchor,
                local_anchor,
                stiffness,
                damping,
            } => ImpulseJoint::new(
                parent,
                SpringJointBuilder::new(0.0, stiffness, damping)
                    .local_anchor1(parent_anchor)
                    .local_anchor2(local_anchor),
            ),
            JointSpec::Hinge {
                parent,
                parent_anchor,
                local_anchor,
                axis,
                relative_rotation,
                limits,
            } => {
                let mut builder = RevoluteJointBuilder::new(axis)
                    .local_anchor1(parent_anchor)
                    .local_anchor2(local_anchor);
                if let Some(limits) = limits {
                    builder = builder.limits(limits);
                }
                let mut joint = builder.build();
                let (basis1, basis2) = joint_bases(axis, relative_rotation);
                joint.data.set_local_basis1(basis1).set_local_basis2(basis2);
                ImpulseJoint::new(parent, joint)
            }
            JointSpec::Slide {
                parent,
                parent_anchor,
                local_anchor,
                axis,
                relative_rotation,
                limits,
            } => {
                let mut joint = PrismaticJointBuilder::new(axis)
                    .local_anchor1(parent_anchor)
                    .local_anchor2(local_anchor)
                    .limits(limits)
                    .build();
                let (basis1, basis2) = joint_bases(axis, relative_rotation);
                joint.data.set_local_basis1(basis1).set_local_basis2(basis2);
                ImpulseJoint::new(parent, joint)
            }
        };

        match world.get_entity_mut(entity) {
            Ok(mut entity_mut) => {
                entity_mut.insert(joint);
                true
            }
            Err(_) => false,
        }
    }

    fn remove_joint(world: &mut World, entity: Entity) {
        if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
            entity_mut.remove::<ImpulseJoint>();
        }
    }

    fn get_mass(world: &World, entity: Entity) -> f32 {
        world
            .get::<ReadMassProperties>(entity)
            .map(|props| props.mass)
            .filter(|&mass| mass > 0.0 && mass.is_finite())
            .unwrap_or(1.0)
    }

    fn get_center_of_mass(world: &World, entity: Entity) -> Vec3 {
        let Some(transform) = world.get::<GlobalTransform>(entity) else {
            return Vec3::ZERO;
        };
        world
            .get::<ReadMassProperties>(entity)
            .map(|props| transform.transform_point(props.local_center_of_mass))
            .unwrap_or_else(|| transform.translation())
    }
}

/// Joint frames for a free `axis` given in the child's space.
///
/// Rapier frees the local X axis of the joint frames. The child frame maps X
/// onto `axis`, and the parent frame is the same frame seen from the parent,
/// so the setup pose is the joint's zero.
fn joint_bases(axis: Vec3, relative_rotation: Quat) -> (Quat, Quat) {
    let basis2 = Quat::from_rotation_arc(Vec3::X, axis.normalize_or(Vec3::X));
    ((relative_rotation * basis2).normalize(), basis2)
}

/// Plugin that sets up Rapier3D-specific systems for the interaction toolkit.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        use crate::InteractionSet;

        // Bounds must be known before the surveys are placed on them.
        app.add_systems(
            FixedUpdate,
            (rapier_fill_local_bounds, rapier_control_surveys)
                .chain()
                .in_set(InteractionSet::Sensors),
        );

        app.add_systems(
            Update,
            (prepare_headset_colliders, rapier_headset_collisions)
                .chain()
                .before(InteractionSet::Presence),
        );
    }
}

/// Axis-aligned bounds of a collider in its entity's local frame.
pub fn collider_local_bounds(collider: &Collider) -> LocalBounds {
    let aabb = collider.raw.compute_local_aabb();
    let min = Vec3::new(aabb.mins.x, aabb.mins.y, aabb.mins.z);
    let max = Vec3::new(aabb.maxs.x, aabb.maxs.y, aabb.maxs.z);
    LocalBounds::new((min + max) * 0.5, (max - min) * 0.5)
}

/// Give controls and their parts [`LocalBounds`] from their colliders.
///
/// Bounds that are already present (set by hand or on an earlier tick) are
/// kept.
pub fn rapier_fill_local_bounds(
    mut commands: Commands,
    q_controls: Query<(Entity, &Control3d, &ControlSetupState)>,
    q_colliders: Query<&Collider, Without<LocalBounds>>,
) {
    for (entity, control, state) in &q_controls {
        if *state != ControlSetupState::AutoDetecting {
            continue;
        }
        for part in [Some(entity), control.body, control.handle].into_iter().flatten() {
            if let Ok(collider) = q_colliders.get(part) {
                commands.entity(part).insert(collider_local_bounds(collider));
            }
        }
    }
}

/// Distance along a ray to the nearest solid collider that is not one of the
/// control's own parts.
fn rapier_raycast(
    context: &RapierContext,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
    ignored: &[Entity],
) -> Option<f32> {
    let predicate = |hit: Entity| !ignored.contains(&hit);
    let filter = QueryFilter::default().exclude_sensors().predicate(&predicate);

    context
        .cast_ray(origin, direction, max_distance, true, filter)
        .map(|(_, time_of_impact)| time_of_impact)
}

/// Fill the surveys of controls waiting on auto-detection.
///
/// Six rays are cast from the faces of the control's bounds along its local
/// axes. The control, its body and its handle never count as obstructions.
pub fn rapier_control_surveys(
    rapier_context: ReadRapierContext,
    mut q_controls: Query<(
        Entity,
        &Control3d,
        &ControlSetupState,
        &GlobalTransform,
        &mut ControlSurvey,
        Option<&LocalBounds>,
        Option<&ControlConfig>,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, control, state, transform, mut survey, bounds, config) in &mut q_controls {
        if *state != ControlSetupState::AutoDetecting || survey.is_ready() {
            continue;
        }
        let ray_length = config.copied().unwrap_or_default().ray_length;
        let bounds = bounds.copied().unwrap_or_default();
        let frame = Pose::from_global(transform);
        let ignored: Vec<Entity> = [Some(entity), control.body, control.handle]
            .into_iter()
            .flatten()
            .collect();

        for axis in LocalAxis::ALL {
            for positive in [true, false] {
                let direction = AxisDirection::new(axis, positive);
                let face = bounds.center + direction.unit() * axis.component(bounds.half_extents);
                let origin = frame.transform_point(face);
                let world_direction = frame.rotation * direction.unit();
                let hit = rapier_raycast(&context, origin, world_direction, ray_length, &ignored);
                survey.record(direction, hit);
            }
        }
        survey.finish();
        trace!("surveyed surroundings of control {entity}");
    }
}

/// Headset colliders need collision events, including against static and
/// kinematic level geometry.
pub fn prepare_headset_colliders(mut commands: Commands, q_rigs: Query<&PlayerPresence, Added<PlayerPresence>>) {
    for presence in &q_rigs {
        if let Ok(mut headset) = commands.get_entity(presence.headset) {
            headset.insert((ActiveEvents::COLLISION_EVENTS, ActiveCollisionTypes::all()));
        }
    }
}

/// Translate Rapier collision events on headsets into
/// [`HeadsetCollisionDetected`] and [`HeadsetCollisionEnded`].
///
/// A headset counts as colliding while it overlaps at least one collider
/// outside its own rig.
pub fn rapier_headset_collisions(
    mut collision_events: EventReader<CollisionEvent>,
    q_rigs: Query<(Entity, &PlayerPresence)>,
    q_parents: Query<&ChildOf>,
    mut contacts: Local<HashMap<Entity, HashSet<Entity>>>,
    mut detected: EventWriter<HeadsetCollisionDetected>,
    mut ended: EventWriter<HeadsetCollisionEnded>,
) {
    let headsets: HashMap<Entity, Entity> = q_rigs
        .iter()
        .map(|(rig, presence)| (presence.headset, rig))
        .collect();

    let in_rig = |entity: Entity, rig: Entity| {
        entity == rig || q_parents.iter_ancestors(entity).any(|ancestor| ancestor == rig)
    };

    for event in collision_events.read() {
        let (a, b, started) = match *event {
            CollisionEvent::Started(a, b, _) => (a, b, true),
            CollisionEvent::Stopped(a, b, _) => (a, b, false),
        };
        for (headset, other) in [(a, b), (b, a)] {
            let Some(&rig) = headsets.get(&headset) else {
                continue;
            };
            if in_rig(other, rig) {
                continue;
            }
            let overlapping = contacts.entry(rig).or_default();
            if started {
                if overlapping.is_empty() {
                    detected.write(HeadsetCollisionDetected {
                        rig,
                        collider: Some(other),
                    });
                }
                overlapping.insert(other);
            } else if overlapping.remove(&other) && overlapping.is_empty() {
                ended.write(HeadsetCollisionEnded { rig });
            }
        }
    }

    contacts.retain(|rig, _| q_rigs.contains(*rig));
}

/// Bundle for grabbable dynamic objects using Rapier3D.
#[derive(Bundle)]
pub struct Rapier3dInteractableBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    pub external_impulse: ExternalImpulse,
    pub mass_properties: ReadMassProperties,
}

impl Default for Rapier3dInteractableBundle {
    fn default() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            external_impulse: ExternalImpulse::default(),
            mass_properties: ReadMassProperties::default(),
        }
    }
}

impl Rapier3dInteractableBundle {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Bundle for the play-area root of a player rig using Rapier3D.
///
/// The rig starts as a kinematic trigger body; it only becomes dynamic while
/// falling.
#[derive(Bundle)]
pub struct Rapier3dPresenceBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    pub locked_axes: LockedAxes,
    pub sensor: Sensor,
}

impl Default for Rapier3dPresenceBundle {
    fn default() -> Self {
        Self {
            rigid_body: RigidBody::KinematicPositionBased,
            velocity: Velocity::default(),
            locked_axes: LockedAxes::ROTATION_LOCKED,
            sensor: Sensor,
        }
    }
}

impl Rapier3dPresenceBundle {
    pub fn new() -> Self {
        Self::default()
    }
}
