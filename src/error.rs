//! Error types.
//!
//! None of these are fatal. Systems log them and leave the affected feature
//! inert for the rest of the frame (or until it is reconfigured).

use bevy::prelude::*;
use thiserror::Error;

/// Reasons a grab or ungrab request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GrabError {
    /// The request carried no object to grab.
    #[error("no object to grab")]
    NoTarget,
    /// The actor entity has no [`GrabActor`](crate::grab::GrabActor) component.
    #[error("entity {0} is not a grab actor")]
    NotAnActor(Entity),
    /// The target has no [`Interactable`](crate::grab::Interactable) component.
    #[error("entity {0} is not interactable")]
    NotInteractable(Entity),
    /// The actor is already holding something.
    #[error("actor {actor} is already holding {held}")]
    ActorBusy { actor: Entity, held: Entity },
    /// The object is held by another attach point and cannot be taken over.
    #[error("object {object} is already grabbed by {holder}")]
    AlreadyGrabbed { object: Entity, holder: Entity },
    /// Ungrab requested by an actor that holds nothing.
    #[error("actor {0} is not holding anything")]
    NothingHeld(Entity),
    /// The physics backend refused to create the coupling joint.
    #[error("backend could not create a grab joint for {0}")]
    JointUnavailable(Entity),
    /// Grabbing is currently disabled on the object.
    #[error("grabbing is disabled on {0}")]
    Disabled(Entity),
    /// The object cannot be let go voluntarily.
    #[error("{0} cannot be dropped")]
    Undroppable(Entity),
    /// Climbing needs a player rig above the actor in the hierarchy.
    #[error("actor {0} has no player rig to climb with")]
    NoRig(Entity),
}

/// Reasons a 3D control failed its setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Reflect)]
pub enum SetupError {
    /// No survey ray produced a usable motion axis.
    #[error("no valid motion axis detected")]
    NoAxis,
    /// The computed activation distance is too small to be reached.
    #[error("activation distance too small, control already colliding")]
    AlreadyColliding,
    /// The handle is placed inside the body hierarchy.
    #[error("handle must not be a descendant of the body")]
    HandleInsideBody,
    /// A required sub-object (body, handle, lid) is missing.
    #[error("required part `{0}` is missing")]
    MissingPart(&'static str),
    /// The configured value range is empty or inverted.
    #[error("value range is empty")]
    EmptyRange,
    /// The backend refused to create the control joint.
    #[error("control joint could not be created")]
    JointUnavailable,
}
