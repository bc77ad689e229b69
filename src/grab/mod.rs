//! Grab-attach mechanisms.
//!
//! A [`GrabActor`] (usually a controller) couples itself to an
//! [`Interactable`] object with one of the [`GrabMechanism`] strategies.
//! The coupling lives in a [`GrabAttachment`] component on the object; an
//! object carries at most one, which is what makes a second grab of the same
//! object fail (or swap hands, when the object allows it).
//!
//! Grab state changes run in [`InteractionSet::Grab`](crate::InteractionSet::Grab).
//! Per-tick mechanism work runs afterwards, in
//! [`InteractionSet::Mechanisms`](crate::InteractionSet::Mechanisms) for
//! transform-driven mechanisms and in
//! [`InteractionSet::MechanismPhysics`](crate::InteractionSet::MechanismPhysics)
//! for physics-driven ones.

use bevy::prelude::*;

use crate::backend::InteractionPhysicsBackend;
use crate::controls::{ControlMotion, MotionKind};
use crate::device::{Handedness, VelocityEstimator};
use crate::error::GrabError;
use crate::input::{AliasEvent, ButtonAlias, ControllerState};
use crate::limits::{AxisLimits, LimitBound, LimitTransition};
use crate::pose::{set_world_pose, world_pose, LocalAxis, Pose};
use crate::presence;
use crate::state::IsGrabbed;

pub mod animation;
pub mod climb;
pub mod joint;
pub mod snap;
pub mod throw;
pub mod track;
pub mod transform;

use animation::{AnimationGrab, AnimationScrub, ControlAnimationSettings};
use climb::{climb_step, ClimbGrab, ClimbingActor};
use joint::{grab_joint_spec, joint_breaks, joint_strain, FixedJointSettings, JointGrab, SpringJointSettings};
use snap::{select_snap_handle, snapped_object_pose};
use throw::{throw_velocity, Leverage, VelocitySample};
use track::{
    exceeds_detach_distance, rotator_impulse, track_velocities, RotatorGrab, RotatorTrackSettings,
    TrackObjectSettings,
};
use transform::{DriveGrab, DriveMode, DriveRelease, MoveTransformSettings, RotateTransformSettings, TransformDrive};

// ==================== Configuration ====================

/// How a grabbed object is coupled to the hand.
#[derive(Debug, Clone, PartialEq, Reflect)]
pub enum GrabMechanism {
    /// Rigid physics joint to the attach point.
    FixedJoint(FixedJointSettings),
    /// Springy physics joint to the attach point.
    SpringJoint(SpringJointSettings),
    /// Velocities steer the object onto the hand every physics tick.
    TrackObject(TrackObjectSettings),
    /// Torque only, for hinged objects such as doors and wheels.
    RotatorTrack(RotatorTrackSettings),
    /// Kinematic child of the attach point.
    ChildOfController,
    /// The object stays put and the player moves instead.
    Climbable,
    /// Clamped translation of the local transform.
    MoveTransform(MoveTransformSettings),
    /// Clamped rotation of the local transform about one axis.
    RotateTransform(RotateTransformSettings),
    /// Pull distance scrubs an animation.
    ControlAnimation(ControlAnimationSettings),
}

impl Default for GrabMechanism {
    fn default() -> Self {
        GrabMechanism::FixedJoint(FixedJointSettings::default())
    }
}

impl GrabMechanism {
    /// Coupled through a backend joint.
    pub fn is_joint_based(&self) -> bool {
        matches!(self, GrabMechanism::FixedJoint(_) | GrabMechanism::SpringJoint(_))
    }

    /// Steered by velocities each physics tick.
    pub fn is_tracked(&self) -> bool {
        matches!(self, GrabMechanism::TrackObject(_) | GrabMechanism::RotatorTrack(_))
    }

    pub fn is_climbable(&self) -> bool {
        matches!(self, GrabMechanism::Climbable)
    }

    /// The object's body is made kinematic while held.
    pub fn is_kinematic(&self) -> bool {
        matches!(
            self,
            GrabMechanism::ChildOfController
                | GrabMechanism::MoveTransform(_)
                | GrabMechanism::RotateTransform(_)
                | GrabMechanism::ControlAnimation(_)
        )
    }

    /// The object is moved into the hand on grab (unless precision grab).
    pub fn snaps_to_hand(&self) -> bool {
        matches!(
            self,
            GrabMechanism::FixedJoint(_)
                | GrabMechanism::SpringJoint(_)
                | GrabMechanism::TrackObject(_)
                | GrabMechanism::ChildOfController
        )
    }

    /// The object inherits the hand's velocity when released.
    pub fn throws(&self) -> bool {
        self.snaps_to_hand()
    }

    /// Whether `attach_point` may grab an object currently held through
    /// `holder` (if anything holds it).
    ///
    /// A joint can only connect to one attach point, so joint mechanisms
    /// refuse a different one. The others leave the decision to
    /// [`Interactable::swap_on_second_grab`].
    pub fn valid_grab(&self, holder: Option<Entity>, attach_point: Entity) -> bool {
        match holder {
            None => true,
            Some(holder) => !self.is_joint_based() || holder == attach_point,
        }
    }

    fn drive_limits(&self) -> Option<([AxisLimits; 3], DriveRelease)> {
        match self {
            GrabMechanism::MoveTransform(settings) => Some((settings.limits, settings.release)),
            GrabMechanism::RotateTransform(settings) => Some((settings.axis_limits(), settings.release)),
            _ => None,
        }
    }
}

/// An object that can be grabbed.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct Interactable {
    pub mechanism: GrabMechanism,
    /// Grabbing can be switched off at runtime (e.g. control content behind
    /// a closed lid).
    pub grab_enabled: bool,
    /// Keep the object where it was touched instead of snapping it.
    pub precision_grab: bool,
    pub throw_multiplier: f32,
    pub left_snap_handle: Option<Entity>,
    pub right_snap_handle: Option<Entity>,
    /// Whether the object may be let go (and break free of its joint).
    pub droppable: bool,
    /// A second hand takes the object over instead of being refused.
    pub swap_on_second_grab: bool,
    /// Add the swing of the centre of mass around the hand to the throw.
    pub throw_with_attach_distance: bool,
}

impl Default for Interactable {
    fn default() -> Self {
        Self {
            mechanism: GrabMechanism::default(),
            grab_enabled: true,
            precision_grab: false,
            throw_multiplier: 1.0,
            left_snap_handle: None,
            right_snap_handle: None,
            droppable: true,
            swap_on_second_grab: false,
            throw_with_attach_distance: false,
        }
    }
}

impl Interactable {
    pub fn new(mechanism: GrabMechanism) -> Self {
        Self {
            mechanism,
            ..default()
        }
    }

    /// Builder: keep the object at the touched point.
    pub fn with_precision_grab(mut self) -> Self {
        self.precision_grab = true;
        self
    }

    /// Builder: hand-specific snap handles.
    pub fn with_snap_handles(mut self, left: Option<Entity>, right: Option<Entity>) -> Self {
        self.left_snap_handle = left;
        self.right_snap_handle = right;
        self
    }

    pub fn with_throw_multiplier(mut self, multiplier: f32) -> Self {
        self.throw_multiplier = multiplier;
        self
    }

    /// Builder: the object cannot be dropped once grabbed.
    pub fn undroppable(mut self) -> Self {
        self.droppable = false;
        self
    }

    pub fn with_hand_swap(mut self) -> Self {
        self.swap_on_second_grab = true;
        self
    }

    pub fn with_attach_distance_throw(mut self) -> Self {
        self.throw_with_attach_distance = true;
        self
    }
}

/// Something that grabs, usually a controller.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct GrabActor {
    pub hand: Handedness,
    /// Entity objects are attached to. `None` uses the actor itself.
    pub attach_point: Option<Entity>,
    pub throw_multiplier: f32,
    /// Release when the grab alias is released. Otherwise a second press
    /// releases.
    pub hold_to_grab: bool,
    grabbed: Option<Entity>,
}

impl GrabActor {
    pub fn new(hand: Handedness) -> Self {
        Self {
            hand,
            attach_point: None,
            throw_multiplier: 1.0,
            hold_to_grab: true,
            grabbed: None,
        }
    }

    pub fn with_attach_point(mut self, attach_point: Entity) -> Self {
        self.attach_point = Some(attach_point);
        self
    }

    pub fn with_throw_multiplier(mut self, multiplier: f32) -> Self {
        self.throw_multiplier = multiplier;
        self
    }

    /// Builder: press once to grab, press again to release.
    pub fn toggle_grab(mut self) -> Self {
        self.hold_to_grab = false;
        self
    }

    /// The object currently held.
    pub fn grabbed(&self) -> Option<Entity> {
        self.grabbed
    }
}

/// The object an actor currently touches, written by the touch layer.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct Touching(pub Option<Entity>);

// ==================== Runtime state ====================

/// Per-mechanism runtime state of an active grab.
#[derive(Debug, Clone, PartialEq)]
pub enum MechanismState {
    Joint(JointGrab),
    Track { local_grab_point: Vec3 },
    Rotator(RotatorGrab),
    Child { previous_parent: Option<Entity> },
    Climb(ClimbGrab),
    Drive(DriveGrab),
    Animation(AnimationGrab),
}

/// The coupling between a held object and its actor.
#[derive(Component, Debug, Clone)]
pub struct GrabAttachment {
    pub actor: Entity,
    pub attach_point: Entity,
    pub snap_handle: Option<Entity>,
    pub precision: bool,
    /// Object pose in attach point space at grab time.
    pub grab_offset: Pose,
    restore_kinematic: Option<bool>,
    state: MechanismState,
}

impl GrabAttachment {
    pub fn state(&self) -> &MechanismState {
        &self.state
    }
}

// ==================== Events ====================

/// Ask `actor` to grab `target`.
#[derive(Event, Debug, Clone, Copy)]
pub struct GrabRequest {
    pub actor: Entity,
    pub target: Option<Entity>,
}

/// Ask `actor` to let go of whatever it holds.
#[derive(Event, Debug, Clone, Copy)]
pub struct UngrabRequest {
    pub actor: Entity,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct Grabbed {
    pub actor: Entity,
    pub object: Entity,
}

/// A grab ended. `forced` is set when the coupling broke or detached
/// rather than being released.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct Ungrabbed {
    pub actor: Entity,
    pub object: Entity,
    pub forced: bool,
}

/// Normalized position of a transform-driven object changed.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct TransformDriveChanged {
    pub object: Entity,
    pub normalized: Vec3,
}

/// A transform-driven object reached or left one end of an axis.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct TransformLimitEvent {
    pub object: Entity,
    pub axis: LocalAxis,
    pub bound: LimitBound,
    pub reached: bool,
}

/// An animation-scrub object moved to a new position.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct AnimationScrubbed {
    pub object: Entity,
    pub normalized: f32,
    pub frame: u32,
}

// ==================== Operations ====================

fn parent_pose(world: &World, entity: Entity) -> Pose {
    world
        .get::<ChildOf>(entity)
        .and_then(|child_of| world_pose(world, child_of.parent()))
        .unwrap_or_default()
}

/// Velocity sample of an actor, from the controller state or a pose-based
/// estimate.
fn actor_velocity(world: &World, actor: Entity) -> VelocitySample {
    if let Some(state) = world.get::<ControllerState>(actor) {
        return VelocitySample::new(state.velocity, state.angular_velocity);
    }
    world
        .get::<VelocityEstimator>(actor)
        .map(|estimator| VelocitySample::new(estimator.velocity(), estimator.angular_velocity()))
        .unwrap_or_default()
}

/// Couple `target` to `actor`.
///
/// Fails without changing anything when there is no target, the target is
/// not grabbable, the actor already holds something, or the object is held
/// by someone else and cannot change hands.
pub fn start_grab<B: InteractionPhysicsBackend>(
    world: &mut World,
    actor: Entity,
    target: Option<Entity>,
) -> Result<(), GrabError> {
    let object = target.ok_or(GrabError::NoTarget)?;
    let grab_actor = world
        .get::<GrabActor>(actor)
        .cloned()
        .ok_or(GrabError::NotAnActor(actor))?;
    if let Some(held) = grab_actor.grabbed {
        return Err(GrabError::ActorBusy { actor, held });
    }
    let interactable = world
        .get::<Interactable>(object)
        .cloned()
        .ok_or(GrabError::NotInteractable(object))?;
    if !interactable.grab_enabled {
        return Err(GrabError::Disabled(object));
    }
    let mechanism = &interactable.mechanism;
    let attach_point = grab_actor.attach_point.unwrap_or(actor);

    let climb_rig = if mechanism.is_climbable() {
        Some(presence::find_rig(world, actor).ok_or(GrabError::NoRig(actor))?)
    } else {
        None
    };

    let previous_holder = match world.get::<GrabAttachment>(object) {
        Some(existing) => {
            let holder = existing.actor;
            if !mechanism.valid_grab(Some(existing.attach_point), attach_point)
                || !interactable.swap_on_second_grab
            {
                return Err(GrabError::AlreadyGrabbed { object, holder });
            }
            Some(holder)
        }
        None => None,
    };
    // Only joint creation can fail past this point. Joint grabs hand over
    // once the new joint exists; the others let go first.
    if let Some(holder) = previous_holder.filter(|_| !mechanism.is_joint_based()) {
        debug!("{object} changes hands from {holder} to {actor}");
        release::<B>(world, holder, object, ReleaseKind::Handover);
    }

    let attach = world_pose(world, attach_point).unwrap_or_default();
    let object_pose = world_pose(world, object).unwrap_or_default();
    let snap_handle = select_snap_handle(
        grab_actor.hand,
        interactable.left_snap_handle,
        interactable.right_snap_handle,
    );

    let mut grabbed_pose = object_pose;
    if mechanism.snaps_to_hand() && !interactable.precision_grab {
        let handle = snap_handle.and_then(|handle| world_pose(world, handle));
        let center_of_mass = B::get_center_of_mass(world, object);
        grabbed_pose = snapped_object_pose(attach, object_pose, handle, center_of_mass);
        set_world_pose(world, object, grabbed_pose);
    }

    let restore_kinematic = mechanism.is_kinematic().then(|| {
        let was_kinematic = B::is_kinematic(world, object);
        B::set_kinematic(world, object, true);
        was_kinematic
    });

    let local_grab_point = grabbed_pose.inverse().transform_point(attach.translation);
    let state = match mechanism {
        GrabMechanism::FixedJoint(settings) => {
            let (spec, local_anchor) = grab_joint_spec(attach_point, attach, grabbed_pose, None);
            if !B::create_joint(world, object, spec) {
                set_world_pose(world, object, object_pose);
                return Err(GrabError::JointUnavailable(object));
            }
            MechanismState::Joint(JointGrab {
                local_anchor,
                break_force: settings.break_force,
            })
        }
        GrabMechanism::SpringJoint(settings) => {
            let (spec, local_anchor) = grab_joint_spec(attach_point, attach, grabbed_pose, Some(*settings));
            if !B::create_joint(world, object, spec) {
                set_world_pose(world, object, object_pose);
                return Err(GrabError::JointUnavailable(object));
            }
            MechanismState::Joint(JointGrab {
                local_anchor,
                break_force: settings.break_force,
            })
        }
        GrabMechanism::TrackObject(_) => MechanismState::Track { local_grab_point },
        GrabMechanism::RotatorTrack(_) => MechanismState::Rotator(RotatorGrab { local_grab_point }),
        GrabMechanism::ChildOfController => {
            let previous_parent = world.get::<ChildOf>(object).map(|child_of| child_of.parent());
            world.entity_mut(object).insert(ChildOf(attach_point));
            set_world_pose(world, object, grabbed_pose);
            MechanismState::Child { previous_parent }
        }
        GrabMechanism::Climbable => {
            let rig = climb_rig.ok_or(GrabError::NoRig(actor))?;
            presence::stop_physics_fall::<B>(world, rig);
            let rig_pose = world_pose(world, rig).unwrap_or_default();
            world.entity_mut(rig).insert(ClimbingActor(actor));
            MechanismState::Climb(ClimbGrab {
                rig,
                last_controller_local: rig_pose.inverse().transform_point(attach.translation),
                last_object_position: object_pose.translation,
            })
        }
        GrabMechanism::MoveTransform(_) | GrabMechanism::RotateTransform(_) => {
            let mode = match mechanism {
                GrabMechanism::RotateTransform(settings) => DriveMode::Rotate(settings.axis),
                _ => DriveMode::Move,
            };
            if world.get::<TransformDrive>(object).is_none() {
                let origin = world.get::<Transform>(object).copied().unwrap_or_default();
                world.entity_mut(object).insert(TransformDrive::new(origin, mode));
            }
            let parent = parent_pose(world, object);
            let Some(mut drive) = world.get_mut::<TransformDrive>(object) else {
                return Err(GrabError::NotInteractable(object));
            };
            drive.cancel_release();
            MechanismState::Drive(DriveGrab {
                start_displacement: drive.displacement(),
                start_hand: parent.inverse().transform_point(attach.translation),
            })
        }
        GrabMechanism::ControlAnimation(_) => {
            if world.get::<AnimationScrub>(object).is_none() {
                world.entity_mut(object).insert(AnimationScrub::default());
            }
            let Some(mut scrub) = world.get_mut::<AnimationScrub>(object) else {
                return Err(GrabError::NotInteractable(object));
            };
            MechanismState::Animation(scrub.begin_grab(attach.translation))
        }
    };

    if let Some(holder) = previous_holder.filter(|_| mechanism.is_joint_based()) {
        debug!("{object} changes hands from {holder} to {actor}");
        release::<B>(world, holder, object, ReleaseKind::Handover);
    }

    world.entity_mut(object).insert((
        GrabAttachment {
            actor,
            attach_point,
            snap_handle,
            precision: interactable.precision_grab,
            grab_offset: attach.relative(grabbed_pose),
            restore_kinematic,
            state,
        },
        IsGrabbed { by: actor },
    ));
    if let Some(mut grab_actor) = world.get_mut::<GrabActor>(actor) {
        grab_actor.grabbed = Some(object);
    }
    world.send_event(Grabbed { actor, object });
    debug!("{actor} grabbed {object}");
    Ok(())
}

/// Let go of whatever `actor` holds and return it.
///
/// With `apply_velocity` the object is thrown with the actor's velocity.
/// `forced` marks releases the holder did not ask for (joint break, detach);
/// those also release objects that are not droppable, and never throw.
pub fn stop_grab<B: InteractionPhysicsBackend>(
    world: &mut World,
    actor: Entity,
    apply_velocity: bool,
    forced: bool,
) -> Result<Entity, GrabError> {
    let object = world
        .get::<GrabActor>(actor)
        .ok_or(GrabError::NotAnActor(actor))?
        .grabbed
        .ok_or(GrabError::NothingHeld(actor))?;
    if !forced
        && world
            .get::<Interactable>(object)
            .is_some_and(|interactable| !interactable.droppable)
    {
        return Err(GrabError::Undroppable(object));
    }
    let kind = match (apply_velocity, forced) {
        (_, true) => ReleaseKind::Forced,
        (true, false) => ReleaseKind::Throw,
        (false, false) => ReleaseKind::Drop,
    };
    release::<B>(world, actor, object, kind);
    Ok(object)
}

/// How a grab ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReleaseKind {
    /// Let go with the hand's velocity.
    Throw,
    /// Let go in place.
    Drop,
    /// The coupling broke or detached.
    Forced,
    /// Another hand took over; a joint already points at the new hand.
    Handover,
}

fn release<B: InteractionPhysicsBackend>(world: &mut World, actor: Entity, object: Entity, kind: ReleaseKind) {
    let apply_velocity = kind == ReleaseKind::Throw;
    let forced = kind == ReleaseKind::Forced;
    if let Some(mut grab_actor) = world.get_mut::<GrabActor>(actor) {
        grab_actor.grabbed = None;
    }
    let attachment = world
        .get_entity_mut(object)
        .ok()
        .and_then(|mut entity| {
            entity.remove::<IsGrabbed>();
            entity.take::<GrabAttachment>()
        });
    let Some(attachment) = attachment else {
        // Despawned while held.
        world.send_event(Ungrabbed { actor, object, forced });
        return;
    };
    let interactable = world.get::<Interactable>(object).cloned().unwrap_or_default();
    let multiplier = world
        .get::<GrabActor>(actor)
        .map_or(1.0, |grab_actor| grab_actor.throw_multiplier);
    let sample = if apply_velocity {
        actor_velocity(world, actor)
    } else {
        VelocitySample::default()
    };

    match attachment.state {
        MechanismState::Joint(_) if kind == ReleaseKind::Handover => {}
        MechanismState::Joint(_) => B::remove_joint(world, object),
        MechanismState::Track { .. } | MechanismState::Rotator(_) => {}
        MechanismState::Child { previous_parent } => {
            let pose = world_pose(world, object).unwrap_or_default();
            match previous_parent.filter(|&parent| world.get_entity(parent).is_ok()) {
                Some(parent) => {
                    world.entity_mut(object).insert(ChildOf(parent));
                }
                None => {
                    world.entity_mut(object).remove::<ChildOf>();
                }
            }
            set_world_pose(world, object, pose);
        }
        MechanismState::Climb(climb) => release_climb::<B>(world, actor, climb.rig, sample, interactable.throw_multiplier * multiplier),
        MechanismState::Drive(_) => {
            let release = interactable.mechanism.drive_limits().map(|(_, release)| release);
            if let (Some(release), Some(mut drive)) = (release, world.get_mut::<TransformDrive>(object)) {
                drive.begin_release(&release);
            }
        }
        MechanismState::Animation(_) => {
            if let (GrabMechanism::ControlAnimation(settings), Some(mut scrub)) =
                (&interactable.mechanism, world.get_mut::<AnimationScrub>(object))
            {
                scrub.release(settings);
            }
        }
    }

    if let Some(was_kinematic) = attachment.restore_kinematic {
        B::set_kinematic(world, object, was_kinematic);
    }

    if apply_velocity && interactable.mechanism.throws() {
        let leverage = interactable.throw_with_attach_distance.then(|| Leverage {
            center_of_mass: B::get_center_of_mass(world, object),
            attach_point: world_pose(world, attachment.attach_point)
                .unwrap_or_default()
                .translation,
        });
        let thrown = throw_velocity(sample, interactable.throw_multiplier, multiplier, leverage);
        B::set_velocity(world, object, thrown.linear);
        B::set_angular_velocity(world, object, thrown.angular);
    }

    world.send_event(Ungrabbed { actor, object, forced });
    debug!("{actor} released {object} (forced: {forced})");
}

/// Hand the rig to another climbing hand, or let it fall.
fn release_climb<B: InteractionPhysicsBackend>(
    world: &mut World,
    actor: Entity,
    rig: Entity,
    sample: VelocitySample,
    multiplier: f32,
) {
    if world.get::<ClimbingActor>(rig).is_some_and(|climbing| climbing.0 != actor) {
        return;
    }
    let rig_pose = world_pose(world, rig).unwrap_or_default();
    let mut other_hand = None;
    let mut q = world.query::<(Entity, &GrabAttachment)>();
    for (object, attachment) in q.iter(world) {
        if let MechanismState::Climb(climb) = &attachment.state {
            if climb.rig == rig && attachment.actor != actor {
                other_hand = Some((object, attachment.actor, attachment.attach_point));
            }
        }
    }

    match other_hand {
        Some((object, other_actor, attach_point)) => {
            let hand = world_pose(world, attach_point).unwrap_or_default().translation;
            if let Some(mut attachment) = world.get_mut::<GrabAttachment>(object) {
                if let MechanismState::Climb(climb) = &mut attachment.state {
                    climb.last_controller_local = rig_pose.inverse().transform_point(hand);
                }
            }
            world.entity_mut(rig).insert(ClimbingActor(other_actor));
        }
        None => {
            world.entity_mut(rig).remove::<ClimbingActor>();
            presence::start_physics_fall::<B>(world, rig, -sample.linear * multiplier);
        }
    }
}

// ==================== Systems ====================

/// Turn grab alias edges into grab and ungrab requests.
pub fn grab_requests_from_aliases(
    mut aliases: EventReader<AliasEvent>,
    q_actors: Query<(&GrabActor, Option<&Touching>)>,
    mut grab_requests: EventWriter<GrabRequest>,
    mut ungrab_requests: EventWriter<UngrabRequest>,
) {
    for event in aliases.read() {
        if event.alias != ButtonAlias::Grab {
            continue;
        }
        let Ok((actor, touching)) = q_actors.get(event.controller) else {
            continue;
        };
        let holding = actor.grabbed().is_some();
        match (event.active, holding) {
            (true, false) => {
                grab_requests.write(GrabRequest {
                    actor: event.controller,
                    target: touching.and_then(|t| t.0),
                });
            }
            (true, true) if !actor.hold_to_grab => {
                ungrab_requests.write(UngrabRequest {
                    actor: event.controller,
                });
            }
            (false, true) if actor.hold_to_grab => {
                ungrab_requests.write(UngrabRequest {
                    actor: event.controller,
                });
            }
            _ => {}
        }
    }
}

/// Apply queued ungrab then grab requests.
pub fn process_grab_requests<B: InteractionPhysicsBackend>(world: &mut World) {
    let ungrabs: Vec<UngrabRequest> = world
        .get_resource_mut::<Events<UngrabRequest>>()
        .map(|mut events| events.drain().collect())
        .unwrap_or_default();
    for request in ungrabs {
        if let Err(err) = stop_grab::<B>(world, request.actor, true, false) {
            debug!("ungrab ignored: {err}");
        }
    }

    let grabs: Vec<GrabRequest> = world
        .get_resource_mut::<Events<GrabRequest>>()
        .map(|mut events| events.drain().collect())
        .unwrap_or_default();
    for request in grabs {
        match start_grab::<B>(world, request.actor, request.target) {
            Ok(()) => {}
            Err(GrabError::NoTarget) => {}
            Err(err) => warn!("grab refused: {err}"),
        }
    }
}

/// Per-frame work of the transform-driven mechanisms.
pub fn process_grab_update<B: InteractionPhysicsBackend>(world: &mut World) {
    let dt = world.get_resource::<Time>().map_or(0.0, |time| time.delta_secs());
    let grabs: Vec<(Entity, GrabAttachment, GrabMechanism)> = world
        .query::<(Entity, &GrabAttachment, &Interactable)>()
        .iter(world)
        .map(|(e, attachment, interactable)| (e, attachment.clone(), interactable.mechanism.clone()))
        .collect();

    for (object, attachment, mechanism) in grabs {
        let attach = world_pose(world, attachment.attach_point).unwrap_or_default();
        match (&attachment.state, &mechanism) {
            (MechanismState::Climb(climb), _) => {
                if world
                    .get::<ClimbingActor>(climb.rig)
                    .is_some_and(|climbing| climbing.0 != attachment.actor)
                {
                    continue;
                }
                let rig = world_pose(world, climb.rig).unwrap_or_default();
                let controller_local = rig.inverse().transform_point(attach.translation);
                let object_position = world_pose(world, object).unwrap_or_default().translation;
                let next = climb_step(
                    rig,
                    controller_local,
                    climb.last_controller_local,
                    object_position - climb.last_object_position,
                );
                set_world_pose(world, climb.rig, Pose::new(next, rig.rotation));
                if let Some(mut attachment) = world.get_mut::<GrabAttachment>(object) {
                    attachment.state = MechanismState::Climb(ClimbGrab {
                        last_controller_local: controller_local,
                        last_object_position: object_position,
                        ..*climb
                    });
                }
            }
            (MechanismState::Drive(grab), _) => {
                let Some((limits, release)) = mechanism.drive_limits() else {
                    continue;
                };
                let tracking_speed = match &mechanism {
                    GrabMechanism::MoveTransform(settings) => settings.tracking_speed,
                    _ => 1.0,
                };
                let hand = parent_pose(world, object).inverse().transform_point(attach.translation);
                let Some(mut drive) = world.get_mut::<TransformDrive>(object) else {
                    continue;
                };
                let before = drive.normalized();
                let target = drive.grab_target(grab, hand, tracking_speed);
                let transitions = drive.drive_to(target, &limits, release.limit_threshold, dt);
                let local = drive.local_transform();
                let normalized = drive.normalized();
                if let Some(mut transform) = world.get_mut::<Transform>(object) {
                    *transform = local;
                }
                if normalized != before {
                    world.send_event(TransformDriveChanged { object, normalized });
                }
                send_limit_events(world, object, transitions);
            }
            (MechanismState::Animation(grab), GrabMechanism::ControlAnimation(settings)) => {
                let Some(mut scrub) = world.get_mut::<AnimationScrub>(object) else {
                    continue;
                };
                if let Some(normalized) = scrub.pull(grab, attach.translation, settings) {
                    world.send_event(AnimationScrubbed {
                        object,
                        normalized,
                        frame: settings.frame(normalized),
                    });
                }
            }
            _ => {}
        }
    }
}

fn send_limit_events(world: &mut World, object: Entity, transitions: Vec<(LocalAxis, LimitTransition)>) {
    for (axis, transition) in transitions {
        let (bound, reached) = match transition {
            LimitTransition::Reached(bound) => (bound, true),
            LimitTransition::Exited(bound) => (bound, false),
        };
        world.send_event(TransformLimitEvent {
            object,
            axis,
            bound,
            reached,
        });
    }
}

/// World point a rotator-tracked object turns about.
fn rotator_pivot<B: InteractionPhysicsBackend>(
    world: &World,
    object: Entity,
    object_pose: Pose,
    settings: &RotatorTrackSettings,
) -> Vec3 {
    let hinge_anchor = world.get::<ControlMotion>(object).and_then(|motion| match motion.motion {
        MotionKind::Hinge { anchor, .. } => Some(anchor),
        MotionKind::Slide { .. } => None,
    });
    match settings.pivot.or(hinge_anchor) {
        Some(local) => object_pose.transform_point(local),
        None => B::get_center_of_mass(world, object),
    }
}

/// Per-physics-tick work of the joint and tracking mechanisms.
///
/// Joints that are strained past their break force and tracked objects that
/// fell too far behind the hand are released through [`stop_grab`], so
/// listeners see the same [`Ungrabbed`] event as for a voluntary release.
pub fn process_grab_fixed_update<B: InteractionPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);
    let grabs: Vec<(Entity, GrabAttachment, Interactable)> = world
        .query::<(Entity, &GrabAttachment, &Interactable)>()
        .iter(world)
        .map(|(e, attachment, interactable)| (e, attachment.clone(), interactable.clone()))
        .collect();

    let mut forced_releases = Vec::new();
    for (object, attachment, interactable) in grabs {
        let attach = world_pose(world, attachment.attach_point).unwrap_or_default();
        let object_pose = world_pose(world, object).unwrap_or_default();

        match (&attachment.state, &interactable.mechanism) {
            (MechanismState::Joint(joint), _) => {
                let separation = attach
                    .translation
                    .distance(object_pose.transform_point(joint.local_anchor));
                let strain = joint_strain(B::get_mass(world, object), separation, dt);
                if joint_breaks(strain, joint.break_force, interactable.droppable) {
                    debug!("grab joint on {object} broke (strain {strain:.1})");
                    forced_releases.push(attachment.actor);
                }
            }
            (MechanismState::Track { local_grab_point }, GrabMechanism::TrackObject(settings)) => {
                let grab_point = object_pose.transform_point(*local_grab_point);
                if interactable.droppable
                    && exceeds_detach_distance(attach.translation, grab_point, settings.detach_distance)
                {
                    forced_releases.push(attachment.actor);
                    continue;
                }
                let target = attach.mul_pose(attachment.grab_offset);
                let (linear, angular) = track_velocities(object_pose, target, dt, settings);
                B::set_velocity(world, object, linear);
                B::set_angular_velocity(world, object, angular);
            }
            (MechanismState::Rotator(rotator), GrabMechanism::RotatorTrack(settings)) => {
                let grab_point = object_pose.transform_point(rotator.local_grab_point);
                if interactable.droppable
                    && exceeds_detach_distance(attach.translation, grab_point, settings.detach_distance)
                {
                    forced_releases.push(attachment.actor);
                    continue;
                }
                let pivot = rotator_pivot::<B>(world, object, object_pose, settings);
                let impulse = rotator_impulse(pivot, grab_point, attach.translation, settings.strength);
                B::apply_angular_impulse(world, object, impulse);
                let angular = B::get_angular_velocity(world, object);
                if angular.length() > settings.max_angular_velocity {
                    B::set_angular_velocity(world, object, angular.clamp_length_max(settings.max_angular_velocity));
                }
            }
            _ => {}
        }
    }

    for actor in forced_releases {
        if let Err(err) = stop_grab::<B>(world, actor, false, true) {
            warn!("forced release failed: {err}");
        }
    }
}

/// Advance release motions of objects nobody holds: transform drives easing
/// home or drifting, and animation rewinds.
pub fn step_release_tasks(
    time: Res<Time>,
    mut q_drives: Query<(Entity, &Interactable, &mut TransformDrive, &mut Transform), Without<GrabAttachment>>,
    mut q_scrubs: Query<(Entity, &Interactable, &mut AnimationScrub), Without<GrabAttachment>>,
    mut drive_events: EventWriter<TransformDriveChanged>,
    mut limit_events: EventWriter<TransformLimitEvent>,
    mut scrub_events: EventWriter<AnimationScrubbed>,
) {
    let dt = time.delta_secs();

    for (object, interactable, mut drive, mut transform) in &mut q_drives {
        if !drive.is_releasing() {
            continue;
        }
        let Some((limits, release)) = interactable.mechanism.drive_limits() else {
            drive.cancel_release();
            continue;
        };
        let before = drive.normalized();
        let Some(transitions) = drive.step_release(&limits, &release, dt) else {
            continue;
        };
        *transform = drive.local_transform();
        if drive.normalized() != before {
            drive_events.write(TransformDriveChanged {
                object,
                normalized: drive.normalized(),
            });
        }
        for (axis, transition) in transitions {
            let (bound, reached) = match transition {
                LimitTransition::Reached(bound) => (bound, true),
                LimitTransition::Exited(bound) => (bound, false),
            };
            limit_events.write(TransformLimitEvent {
                object,
                axis,
                bound,
                reached,
            });
        }
    }

    for (object, interactable, mut scrub) in &mut q_scrubs {
        let GrabMechanism::ControlAnimation(settings) = &interactable.mechanism else {
            continue;
        };
        if let Some(normalized) = scrub.step_rewind(settings, dt) {
            scrub_events.write(AnimationScrubbed {
                object,
                normalized,
                frame: settings.frame(normalized),
            });
        }
    }
}
