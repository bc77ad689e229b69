//! Player presence: safe-position rewind and physics fall.
//!
//! The play-area root carries a [`PlayerPresence`]. Every frame the headset
//! height is compared against a high watermark to decide whether the player
//! is standing normally; if so the base position is remembered as safe. When
//! the headset pushes into level geometry the player is faded out and put
//! back at the last safe position.
//!
//! The same entity switches between a kinematic trigger body (standing,
//! climbing) and a dynamic solid body (falling) through
//! [`start_physics_fall`] and [`stop_physics_fall`].

use bevy::prelude::*;

use crate::backend::InteractionPhysicsBackend;
use crate::config::PresenceConfig;
use crate::grab::climb::ClimbingActor;
use crate::tasks::{TaskSlot, TaskStatus};

/// Whether the player body is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum PhysicsFallState {
    /// Kinematic body with a trigger collider.
    #[default]
    Grounded,
    /// Dynamic body with a solid collider.
    Falling,
}

/// Remembers the last position where the player stood upright.
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub struct SafePositionTracker {
    floor_y: Option<f32>,
    highest_headset_y: f32,
    safe_position: Option<Vec3>,
}

impl SafePositionTracker {
    /// Feed one frame of base position and headset height (relative to the
    /// base). Returns `true` when the position was recorded as safe.
    ///
    /// Nothing is recorded while the headset is colliding.
    pub fn observe(&mut self, base: Vec3, headset_y: f32, colliding: bool, config: &PresenceConfig) -> bool {
        if colliding {
            return false;
        }

        let floor_changed = self
            .floor_y
            .is_none_or(|floor| (base.y - floor).abs() > config.floor_tolerance);
        if floor_changed {
            self.floor_y = Some(base.y);
            self.highest_headset_y = headset_y;
        } else {
            self.highest_headset_y = self.highest_headset_y.max(headset_y);
        }

        if headset_y >= self.highest_headset_y - config.crouch_threshold {
            self.safe_position = Some(base);
            true
        } else {
            false
        }
    }

    pub fn safe_position(&self) -> Option<Vec3> {
        self.safe_position
    }

    /// Highest headset height seen since the floor last changed.
    pub fn watermark(&self) -> f32 {
        self.highest_headset_y
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RewindCountdown {
    remaining: f32,
}

/// Presence state of a play-area root.
#[derive(Component, Debug, Clone)]
pub struct PlayerPresence {
    /// The tracked headset, a descendant of this entity.
    pub headset: Entity,
    tracker: SafePositionTracker,
    colliding: bool,
    fall: PhysicsFallState,
    falling_ticks: u32,
    rewind: TaskSlot<RewindCountdown>,
}

impl PlayerPresence {
    pub fn new(headset: Entity) -> Self {
        Self {
            headset,
            tracker: SafePositionTracker::default(),
            colliding: false,
            fall: PhysicsFallState::Grounded,
            falling_ticks: 0,
            rewind: TaskSlot::default(),
        }
    }

    pub fn tracker(&self) -> &SafePositionTracker {
        &self.tracker
    }

    pub fn is_colliding(&self) -> bool {
        self.colliding
    }

    pub fn fall_state(&self) -> PhysicsFallState {
        self.fall
    }

    pub fn is_falling(&self) -> bool {
        self.fall == PhysicsFallState::Falling
    }

    pub(crate) fn set_fall_state(&mut self, state: PhysicsFallState) {
        self.fall = state;
        self.falling_ticks = 0;
    }
}

// ==================== Events ====================

/// The headset started overlapping level geometry.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct HeadsetCollisionDetected {
    pub rig: Entity,
    pub collider: Option<Entity>,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct HeadsetCollisionEnded {
    pub rig: Entity,
}

/// Fade the view to black and back over `duration` seconds.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ScreenFade {
    pub rig: Entity,
    pub duration: f32,
}

/// The rig was put back at its last safe position.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct PositionRewound {
    pub rig: Entity,
    pub from: Vec3,
    pub to: Vec3,
}

/// Ask a rig to start falling with `velocity`.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct PhysicsFallRequest {
    pub rig: Entity,
    pub velocity: Vec3,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct PresenceFallStarted {
    pub rig: Entity,
    pub velocity: Vec3,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct PresenceFallEnded {
    pub rig: Entity,
}

// ==================== Operations ====================

/// The nearest entity at or above `entity` that carries a [`PlayerPresence`].
pub fn find_rig(world: &World, entity: Entity) -> Option<Entity> {
    let mut current = Some(entity);
    while let Some(e) = current {
        if world.get::<PlayerPresence>(e).is_some() {
            return Some(e);
        }
        current = world.get::<ChildOf>(e).map(|child_of| child_of.parent());
    }
    None
}

/// Make the rig a dynamic solid body moving with `velocity` (plus a small
/// downward bias). Returns `false` when the rig was already falling.
pub fn start_physics_fall<B: InteractionPhysicsBackend>(world: &mut World, rig: Entity, velocity: Vec3) -> bool {
    let config = world.get::<PresenceConfig>(rig).copied().unwrap_or_default();
    let Some(mut presence) = world.get_mut::<PlayerPresence>(rig) else {
        warn!("cannot start a physics fall on {rig}: no player presence");
        return false;
    };
    if presence.is_falling() {
        return false;
    }
    presence.set_fall_state(PhysicsFallState::Falling);

    B::set_kinematic(world, rig, false);
    B::set_sensor(world, rig, false);
    B::set_velocity(world, rig, velocity + Vec3::NEG_Y * config.fall_start_bias);
    world.send_event(PresenceFallStarted { rig, velocity });
    debug!("{rig} started falling with {velocity}");
    true
}

/// Make the rig a kinematic trigger body again. Returns `false` when the rig
/// was not falling.
pub fn stop_physics_fall<B: InteractionPhysicsBackend>(world: &mut World, rig: Entity) -> bool {
    let Some(mut presence) = world.get_mut::<PlayerPresence>(rig) else {
        return false;
    };
    if !presence.is_falling() {
        return false;
    }
    presence.set_fall_state(PhysicsFallState::Grounded);

    B::set_velocity(world, rig, Vec3::ZERO);
    B::set_kinematic(world, rig, true);
    B::set_sensor(world, rig, true);
    world.send_event(PresenceFallEnded { rig });
    debug!("{rig} stopped falling");
    true
}

// ==================== Systems ====================

/// New rigs start grounded: kinematic body, trigger collider.
pub fn prepare_presence_bodies<B: InteractionPhysicsBackend>(world: &mut World) {
    let added: Vec<Entity> = world
        .query_filtered::<Entity, Added<PlayerPresence>>()
        .iter(world)
        .collect();
    for rig in added {
        B::set_kinematic(world, rig, true);
        B::set_sensor(world, rig, true);
    }
}

/// Record safe positions from the headset height.
///
/// Falling and climbing rigs are skipped: neither is a place to return to.
pub fn track_safe_positions(
    mut q_rigs: Query<
        (&GlobalTransform, &mut PlayerPresence, Option<&PresenceConfig>),
        Without<ClimbingActor>,
    >,
    q_headsets: Query<&GlobalTransform, Without<PlayerPresence>>,
) {
    for (transform, mut presence, config) in &mut q_rigs {
        if presence.is_falling() {
            continue;
        }
        let Ok(headset) = q_headsets.get(presence.headset) else {
            continue;
        };
        let config = config.copied().unwrap_or_default();
        let base = transform.translation();
        let headset_y = headset.translation().y - base.y;
        let colliding = presence.colliding;
        presence.tracker.observe(base, headset_y, colliding, &config);
    }
}

/// React to headset collisions: freeze tracking, then rewind to the last
/// safe position after the configured delay.
///
/// The rig is expected to be a root entity; its translation is written
/// directly.
pub fn handle_headset_collisions(
    time: Res<Time>,
    mut detected: EventReader<HeadsetCollisionDetected>,
    mut ended: EventReader<HeadsetCollisionEnded>,
    mut q_rigs: Query<(Entity, &mut PlayerPresence, &mut Transform, Option<&PresenceConfig>)>,
    mut fades: EventWriter<ScreenFade>,
    mut rewinds: EventWriter<PositionRewound>,
) {
    for event in detected.read() {
        let Ok((_, mut presence, _, config)) = q_rigs.get_mut(event.rig) else {
            continue;
        };
        let delay = config.copied().unwrap_or_default().rewind_delay;
        presence.colliding = true;
        if !presence.rewind.is_running() {
            presence.rewind.start(RewindCountdown { remaining: delay });
        }
    }
    for event in ended.read() {
        if let Ok((_, mut presence, _, _)) = q_rigs.get_mut(event.rig) {
            presence.colliding = false;
            presence.rewind.cancel();
        }
    }

    let dt = time.delta_secs();
    for (rig, mut presence, mut transform, config) in &mut q_rigs {
        let status = presence.rewind.step(|countdown| {
            if countdown.remaining <= 0.0 {
                TaskStatus::Done
            } else {
                countdown.remaining -= dt;
                TaskStatus::Pending
            }
        });
        if status != Some(TaskStatus::Done) {
            continue;
        }
        let Some(safe) = presence.tracker.safe_position() else {
            debug!("{rig} collided before any safe position was recorded");
            continue;
        };
        let config = config.copied().unwrap_or_default();
        let from = transform.translation;
        fades.write(ScreenFade {
            rig,
            duration: config.blink_duration,
        });
        transform.translation = safe;
        rewinds.write(PositionRewound { rig, from, to: safe });
        info!("rewound {rig} from {from} to {safe}");
    }
}

/// Start falls requested through [`PhysicsFallRequest`].
pub fn process_fall_requests<B: InteractionPhysicsBackend>(world: &mut World) {
    let requests: Vec<PhysicsFallRequest> = world
        .get_resource_mut::<Events<PhysicsFallRequest>>()
        .map(|mut events| events.drain().collect())
        .unwrap_or_default();
    for request in requests {
        start_physics_fall::<B>(world, request.rig, request.velocity);
    }
}

/// End falls once the body has come to rest.
///
/// The velocity is only checked from the second falling tick on, so the
/// tick that started the fall is never mistaken for a landing.
pub fn detect_fall_end<B: InteractionPhysicsBackend>(world: &mut World) {
    let falling: Vec<(Entity, u32, f32)> = world
        .query::<(Entity, &PlayerPresence, Option<&PresenceConfig>)>()
        .iter(world)
        .filter(|(_, presence, _)| presence.is_falling())
        .map(|(e, presence, config)| {
            (
                e,
                presence.falling_ticks,
                config.copied().unwrap_or_default().fall_stop_epsilon,
            )
        })
        .collect();

    for (rig, ticks, epsilon) in falling {
        if ticks > 0 && B::get_velocity(world, rig).length() < epsilon {
            stop_physics_fall::<B>(world, rig);
        } else if let Some(mut presence) = world.get_mut::<PlayerPresence>(rig) {
            presence.falling_ticks = presence.falling_ticks.saturating_add(1);
        }
    }
}
