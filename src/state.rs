//! State marker components.
//!
//! These components mirror internal state so other systems can filter on it
//! in queries. They are added and removed by the interaction systems; do not
//! insert them by hand.

use bevy::prelude::*;

/// Marker on an object while some actor holds it.
///
/// At most one actor can hold an object at a time, so the marker carries the
/// holder for convenience.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_vr_interaction::prelude::*;
///
/// fn held_objects(q: Query<(Entity, &IsGrabbed)>) {
///     for (object, grabbed) in &q {
///         info!("{object} is held by {}", grabbed.by);
///     }
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq, Eq)]
#[reflect(Component)]
pub struct IsGrabbed {
    pub by: Entity,
}

/// Marker on a player rig standing on the ground (kinematic body).
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker on a player rig in physics fall (dynamic body).
///
/// Mutually exclusive with [`Grounded`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Falling;

/// Marker on a player rig while its headset overlaps level geometry.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct HeadsetColliding;

/// Keep [`Grounded`]/[`Falling`] and [`HeadsetColliding`] in step with the
/// player presence.
pub fn sync_presence_markers(
    mut commands: Commands,
    q: Query<(
        Entity,
        &crate::presence::PlayerPresence,
        Has<Grounded>,
        Has<Falling>,
        Has<HeadsetColliding>,
    )>,
) {
    for (entity, presence, grounded, falling, colliding) in &q {
        let is_falling = presence.is_falling();
        if is_falling && !falling {
            commands.entity(entity).remove::<Grounded>().insert(Falling);
        } else if !is_falling && !grounded {
            commands.entity(entity).remove::<Falling>().insert(Grounded);
        }

        match (presence.is_colliding(), colliding) {
            (true, false) => {
                commands.entity(entity).insert(HeadsetColliding);
            }
            (false, true) => {
                commands.entity(entity).remove::<HeadsetColliding>();
            }
            _ => {}
        }
    }
}
