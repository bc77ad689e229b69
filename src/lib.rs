//! # `msg_vr_interaction`
//!
//! A VR interaction toolkit for Bevy with physics backend abstraction.
//!
//! This crate provides the interaction layer between tracked VR controllers
//! and a physics scene:
//! - Edge-detects controller buttons and axes, with remappable button aliases
//! - Grabs objects through pluggable attach mechanisms (joints, velocity
//!   tracking, parenting, climbing, transform and animation drives)
//! - Throws released objects with the hand's velocity and leverage
//! - Auto-detects the motion of physical 3D controls (buttons, doors,
//!   drawers, knobs, levers, sliders, wheels, chests) from scene geometry
//! - Keeps the player out of level geometry with safe-position rewind and
//!   switches the player rig into physics fall when needed
//! - Abstracts the physics backend for easy swapping (Rapier3D included)
//!
//! ## Architecture
//!
//! Per-frame logic is split across two schedules:
//! 1. `Update` handles input, grab requests, kinematic mechanisms (climbing,
//!    transform drives, animation scrubbing) and the presence safety net
//! 2. `FixedUpdate` handles everything that reads or writes physics state:
//!    surveying, control setup and measurement, joint and tracking mechanisms,
//!    and fall detection
//!
//! See [`InteractionSet`] for the ordering inside each schedule.
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use msg_vr_interaction::prelude::*;
//!
//! // A hand that grabs while the grip is held
//! let actor = GrabActor::new(Handedness::Right);
//!
//! // A mug that snaps into the hand and can be thrown
//! let mug = Interactable::new(GrabMechanism::default()).with_throw_multiplier(1.5);
//!
//! // A drawer whose travel is detected from its cabinet
//! let drawer = Control3dBundle::new(Control3d::drawer());
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod config;
pub mod controls;
pub mod device;
pub mod error;
pub mod grab;
pub mod input;
pub mod limits;
pub mod pose;
pub mod presence;
pub mod state;
pub mod tasks;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::{InteractionPhysicsBackend, JointSpec};
    pub use crate::config::{ControlConfig, InputConfig, PresenceConfig};
    pub use crate::controls::{
        ButtonPushed, ButtonReleased, Control3d, Control3dBundle, ControlKind, ControlLimitEvent,
        ControlSetupState, ControlValue, ControlValueChanged, ControlValueRange, HingeSettings, SlideSettings,
    };
    pub use crate::device::{DeviceRegistry, Handedness, TrackedController, VelocityEstimator};
    pub use crate::error::{GrabError, SetupError};
    pub use crate::grab::{
        start_grab, stop_grab, GrabActor, GrabMechanism, GrabRequest, Grabbed, Interactable, Touching,
        UngrabRequest, Ungrabbed,
    };
    pub use crate::input::{
        AliasEvent, AxisChanged, ButtonAlias, ButtonAliasProfile, ButtonEvent, ControllerAxis, ControllerButton,
        ControllerState, HapticPulseRequest, RawControllerInput,
    };
    pub use crate::limits::{AxisLimits, LimitBound};
    pub use crate::pose::{LocalAxis, Pose};
    pub use crate::presence::{
        start_physics_fall, stop_physics_fall, PhysicsFallRequest, PlayerPresence, PositionRewound, ScreenFade,
    };
    pub use crate::state::{Falling, Grounded, HeadsetColliding, IsGrabbed};
    pub use crate::{InteractionSet, VrInteractionPlugin};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::Rapier3dBackend;
}

/// System sets used by the interaction systems.
///
/// In `Update` the sets run `Input → Grab → Mechanisms → Presence`; in
/// `FixedUpdate` they run `Sensors → Controls → MechanismPhysics → Fall`.
/// Backends put their surveying systems in [`InteractionSet::Sensors`].
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionSet {
    /// Device resolution, velocity sampling, input edge detection.
    Input,
    /// Grab and ungrab requests.
    Grab,
    /// Per-frame grab mechanisms and release easing.
    Mechanisms,
    /// Safe positions, headset collisions, fall requests.
    Presence,
    /// Backend geometry surveying.
    Sensors,
    /// Control setup and measurement.
    Controls,
    /// Joint strain and velocity tracking of held objects.
    MechanismPhysics,
    /// Landing detection.
    Fall,
}

/// Main plugin for the interaction toolkit.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (velocities, joints, body types, etc.).
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_vr_interaction::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
///     .add_plugins(VrInteractionPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct VrInteractionPlugin<B: backend::InteractionPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::InteractionPhysicsBackend> Default for VrInteractionPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::InteractionPhysicsBackend> Plugin for VrInteractionPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::InputConfig>();
        app.register_type::<config::ControlConfig>();
        app.register_type::<config::PresenceConfig>();
        app.register_type::<input::RawControllerInput>();
        app.register_type::<input::ControllerState>();
        app.register_type::<input::ButtonAliasProfile>();
        app.register_type::<grab::Interactable>();
        app.register_type::<grab::GrabActor>();
        app.register_type::<grab::Touching>();
        app.register_type::<controls::Control3d>();
        app.register_type::<controls::ControlSetupState>();
        app.register_type::<controls::ControlSurvey>();
        app.register_type::<controls::LocalBounds>();
        app.register_type::<controls::ControlValueRange>();
        app.register_type::<controls::ControlValue>();
        app.register_type::<state::IsGrabbed>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Falling>();
        app.register_type::<state::HeadsetColliding>();

        app.init_resource::<config::InputConfig>();
        app.init_resource::<device::DeviceRegistry>();

        // Input
        app.add_event::<input::ButtonEvent>();
        app.add_event::<input::AxisChanged>();
        app.add_event::<input::AliasEvent>();
        app.add_event::<input::HapticPulseRequest>();
        app.add_event::<input::HapticPulse>();
        // Grabbing
        app.add_event::<grab::GrabRequest>();
        app.add_event::<grab::UngrabRequest>();
        app.add_event::<grab::Grabbed>();
        app.add_event::<grab::Ungrabbed>();
        app.add_event::<grab::TransformDriveChanged>();
        app.add_event::<grab::TransformLimitEvent>();
        app.add_event::<grab::AnimationScrubbed>();
        // Controls
        app.add_event::<controls::ControlSetupFinished>();
        app.add_event::<controls::ControlValueChanged>();
        app.add_event::<controls::ControlLimitEvent>();
        app.add_event::<controls::ButtonPushed>();
        app.add_event::<controls::ButtonReleased>();
        // Presence
        app.add_event::<presence::HeadsetCollisionDetected>();
        app.add_event::<presence::HeadsetCollisionEnded>();
        app.add_event::<presence::ScreenFade>();
        app.add_event::<presence::PositionRewound>();
        app.add_event::<presence::PhysicsFallRequest>();
        app.add_event::<presence::PresenceFallStarted>();
        app.add_event::<presence::PresenceFallEnded>();

        app.configure_sets(
            Update,
            (
                InteractionSet::Input,
                InteractionSet::Grab,
                InteractionSet::Mechanisms,
                InteractionSet::Presence,
            )
                .chain(),
        );
        app.configure_sets(
            FixedUpdate,
            (
                InteractionSet::Sensors,
                InteractionSet::Controls,
                InteractionSet::MechanismPhysics,
                InteractionSet::Fall,
            )
                .chain(),
        );

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.add_systems(
            Update,
            (
                device::resolve_tracked_controllers,
                device::sample_velocities,
                input::update_controller_states,
                input::forward_haptic_requests,
            )
                .chain()
                .in_set(InteractionSet::Input),
        );
        app.add_systems(
            Update,
            (grab::grab_requests_from_aliases, grab::process_grab_requests::<B>)
                .chain()
                .in_set(InteractionSet::Grab),
        );
        app.add_systems(
            Update,
            (grab::process_grab_update::<B>, grab::step_release_tasks)
                .chain()
                .in_set(InteractionSet::Mechanisms),
        );
        // Collisions are handled before safe positions are recorded so a
        // colliding frame never becomes a safe one.
        app.add_systems(
            Update,
            (
                presence::prepare_presence_bodies::<B>,
                presence::handle_headset_collisions,
                presence::track_safe_positions,
                presence::process_fall_requests::<B>,
                state::sync_presence_markers,
            )
                .chain()
                .in_set(InteractionSet::Presence),
        );

        app.add_systems(
            FixedUpdate,
            (
                controls::run_control_setup::<B>,
                controls::update_control_values,
                controls::propagate_control_content,
            )
                .chain()
                .in_set(InteractionSet::Controls),
        );
        app.add_systems(
            FixedUpdate,
            grab::process_grab_fixed_update::<B>.in_set(InteractionSet::MechanismPhysics),
        );
        app.add_systems(
            FixedUpdate,
            presence::detect_fall_end::<B>.in_set(InteractionSet::Fall),
        );
    }
}
