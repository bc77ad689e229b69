//! Integration tests for the interaction toolkit.
//!
//! These tests drive the full plugin in a headless app. Physics is replaced by
//! a mock backend that records what the interaction systems ask of it, so
//! every test can check the exact velocities, body types and joints.

use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy::time::Virtual;
use msg_vr_interaction::backend::{InteractionPhysicsBackend, JointSpec, NoOpBackendPlugin};
use msg_vr_interaction::controls::{AxisDirection, ControlMotion, ControlSurvey, LocalBounds};
use msg_vr_interaction::device::DeviceIndex;
use msg_vr_interaction::grab::climb::ClimbingActor;
use msg_vr_interaction::grab::track::{RotatorTrackSettings, TrackObjectSettings};
use msg_vr_interaction::grab::transform::{MoveTransformSettings, RotateTransformSettings};
use msg_vr_interaction::grab::{process_grab_fixed_update, TransformLimitEvent};
use msg_vr_interaction::input::ButtonInput;
use msg_vr_interaction::pose::LocalAxis;
use msg_vr_interaction::presence::{HeadsetCollisionDetected, PresenceFallEnded, PresenceFallStarted};
use msg_vr_interaction::prelude::*;

// ==================== Mock backend ====================

/// Physics state the mock backend keeps per entity.
#[derive(Component, Debug, Clone, Default)]
struct MockBody {
    velocity: Vec3,
    angular_velocity: Vec3,
    kinematic: bool,
    sensor: bool,
    joint: Option<JointSpec>,
    /// Joint creation fails, as for a body the engine cannot couple.
    refuse_joints: bool,
}

/// Survey results the mock sensor system reports for a control, ordered
/// +X, -X, +Y, -Y, +Z, -Z.
#[derive(Component, Debug, Clone, Copy)]
struct MockSurroundings([Option<f32>; 6]);

struct MockBackend;

fn body_mut(world: &mut World, entity: Entity) -> Option<Mut<'_, MockBody>> {
    if world.get::<MockBody>(entity).is_none() {
        world.get_entity_mut(entity).ok()?.insert(MockBody::default());
    }
    world.get_mut::<MockBody>(entity)
}

impl InteractionPhysicsBackend for MockBackend {
    fn plugin() -> impl Plugin {
        MockBackendPlugin
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world.get::<MockBody>(entity).map_or(Vec3::ZERO, |b| b.velocity)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut body) = body_mut(world, entity) {
            body.velocity = velocity;
        }
    }

    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3 {
        world.get::<MockBody>(entity).map_or(Vec3::ZERO, |b| b.angular_velocity)
    }

    fn set_angular_velocity(world: &mut World, entity: Entity, angular_velocity: Vec3) {
        if let Some(mut body) = body_mut(world, entity) {
            body.angular_velocity = angular_velocity;
        }
    }

    fn apply_angular_impulse(world: &mut World, entity: Entity, impulse: Vec3) {
        if let Some(mut body) = body_mut(world, entity) {
            body.angular_velocity += impulse;
        }
    }

    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool) {
        if let Some(mut body) = body_mut(world, entity) {
            body.kinematic = kinematic;
        }
    }

    fn is_kinematic(world: &World, entity: Entity) -> bool {
        world.get::<MockBody>(entity).is_some_and(|b| b.kinematic)
    }

    fn set_sensor(world: &mut World, entity: Entity, sensor: bool) {
        if let Some(mut body) = body_mut(world, entity) {
            body.sensor = sensor;
        }
    }

    fn create_joint(world: &mut World, entity: Entity, spec: JointSpec) -> bool {
        match body_mut(world, entity) {
            Some(body) if body.refuse_joints => false,
            Some(mut body) => {
                body.joint = Some(spec);
                true
            }
            None => false,
        }
    }

    fn remove_joint(world: &mut World, entity: Entity) {
        if let Some(mut body) = body_mut(world, entity) {
            body.joint = None;
        }
    }
}

struct MockBackendPlugin;

impl Plugin for MockBackendPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(NoOpBackendPlugin);
        app.add_systems(
            FixedUpdate,
            mock_survey_surroundings.in_set(InteractionSet::Sensors),
        );
    }
}

fn mock_survey_surroundings(
    mut q_controls: Query<(&ControlSetupState, &MockSurroundings, &mut ControlSurvey)>,
) {
    for (state, surroundings, mut survey) in &mut q_controls {
        if *state != ControlSetupState::AutoDetecting || survey.is_ready() {
            continue;
        }
        let mut i = 0;
        for axis in LocalAxis::ALL {
            for positive in [true, false] {
                survey.record(AxisDirection::new(axis, positive), surroundings.0[i]);
                i += 1;
            }
        }
        survey.finish();
    }
}

// ==================== Test harness ====================

/// Every event of type `E` seen so far.
#[derive(Resource)]
struct EventLog<E: Event + Clone>(Vec<E>);

impl<E: Event + Clone> Default for EventLog<E> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

fn record_events<E: Event + Clone>(mut reader: EventReader<E>, mut log: ResMut<EventLog<E>>) {
    log.0.extend(reader.read().cloned());
}

fn record<E: Event + Clone>(app: &mut App) {
    app.init_resource::<EventLog<E>>();
    app.add_systems(Last, record_events::<E>);
}

fn events<E: Event + Clone>(app: &App) -> &[E] {
    &app.world().resource::<EventLog<E>>().0
}

/// Create a minimal test app with the interaction plugin on the mock backend.
fn create_test_app() -> App {
    let mut app = App::new();

    app.add_plugins(MinimalPlugins);
    app.add_plugins(TransformPlugin);
    app.add_plugins(VrInteractionPlugin::<MockBackend>::default());
    app.insert_resource(Time::<Fixed>::from_hz(60.0));

    record::<ButtonEvent>(&mut app);
    record::<AliasEvent>(&mut app);
    record::<Ungrabbed>(&mut app);
    record::<TransformLimitEvent>(&mut app);
    record::<ButtonPushed>(&mut app);
    record::<ButtonReleased>(&mut app);
    record::<ControlValueChanged>(&mut app);
    record::<PositionRewound>(&mut app);
    record::<ScreenFade>(&mut app);
    record::<PresenceFallStarted>(&mut app);
    record::<PresenceFallEnded>(&mut app);

    app.finish();
    app.cleanup();
    app
}

/// Advance time by one frame and run both the frame and the physics step.
fn tick(app: &mut App) {
    let timestep = std::time::Duration::from_secs_f64(1.0 / 60.0);
    app.world_mut()
        .resource_mut::<Time<Virtual>>()
        .advance_by(timestep);
    app.update();
    app.world_mut().run_schedule(bevy::prelude::FixedUpdate);
    app.update();
}

/// Run the app for N physics frames.
fn run_frames(app: &mut App, frames: usize) {
    for _ in 0..frames {
        tick(app);
    }
}

fn spawn_controller(app: &mut App, profile: ButtonAliasProfile) -> Entity {
    app.world_mut()
        .spawn((
            Transform::default(),
            RawControllerInput::default(),
            ControllerState::default(),
            profile,
        ))
        .id()
}

fn set_pressed(app: &mut App, controller: Entity, button: ControllerButton, pressed: bool) {
    if let Some(mut raw) = app.world_mut().get_mut::<RawControllerInput>(controller) {
        raw.set_pressed(button, pressed);
    }
}

fn set_translation(app: &mut App, entity: Entity, translation: Vec3) {
    if let Some(mut transform) = app.world_mut().get_mut::<Transform>(entity) {
        transform.translation = translation;
    }
}

fn mock_body(app: &App, entity: Entity) -> MockBody {
    app.world().get::<MockBody>(entity).cloned().unwrap_or_default()
}

// ==================== Input Tests ====================

mod input_edges {
    use super::*;

    #[test]
    fn held_button_reports_one_edge_each_way() {
        let mut app = create_test_app();
        let controller = spawn_controller(&mut app, ButtonAliasProfile::default());
        tick(&mut app);

        set_pressed(&mut app, controller, ControllerButton::Grip, true);
        run_frames(&mut app, 5);
        set_pressed(&mut app, controller, ControllerButton::Grip, false);
        run_frames(&mut app, 5);

        let grip: Vec<bool> = events::<ButtonEvent>(&app)
            .iter()
            .filter(|e| e.controller == controller && e.input == ButtonInput::press(ControllerButton::Grip))
            .map(|e| e.active)
            .collect();
        assert_eq!(grip, vec![true, false]);

        let grab: Vec<bool> = events::<AliasEvent>(&app)
            .iter()
            .filter(|e| e.alias == ButtonAlias::Grab)
            .map(|e| e.active)
            .collect();
        assert_eq!(grab, vec![true, false]);
    }

    #[test]
    fn one_input_fans_out_to_every_bound_alias() {
        let mut app = create_test_app();
        let controller = spawn_controller(&mut app, ButtonAliasProfile::default());
        tick(&mut app);

        set_pressed(&mut app, controller, ControllerButton::Trigger, true);
        run_frames(&mut app, 2);

        let activated: Vec<ButtonAlias> = events::<AliasEvent>(&app)
            .iter()
            .filter(|e| e.active)
            .map(|e| e.alias)
            .collect();
        assert_eq!(activated.len(), 2);
        assert!(activated.contains(&ButtonAlias::Use));
        assert!(activated.contains(&ButtonAlias::UiClick));
    }

    #[test]
    fn alias_stays_on_while_any_bound_input_is_held() {
        let mut app = create_test_app();
        let profile = ButtonAliasProfile::empty()
            .with_binding(ButtonAlias::Grab, ButtonInput::press(ControllerButton::Grip))
            .with_binding(ButtonAlias::Grab, ButtonInput::press(ControllerButton::Trigger));
        let controller = spawn_controller(&mut app, profile);
        tick(&mut app);

        set_pressed(&mut app, controller, ControllerButton::Grip, true);
        set_pressed(&mut app, controller, ControllerButton::Trigger, true);
        run_frames(&mut app, 2);
        set_pressed(&mut app, controller, ControllerButton::Grip, false);
        run_frames(&mut app, 2);

        let grab: Vec<bool> = events::<AliasEvent>(&app).iter().map(|e| e.active).collect();
        assert_eq!(grab, vec![true]);

        set_pressed(&mut app, controller, ControllerButton::Trigger, false);
        run_frames(&mut app, 2);
        let grab: Vec<bool> = events::<AliasEvent>(&app).iter().map(|e| e.active).collect();
        assert_eq!(grab, vec![true, false]);
    }

    #[test]
    fn untracked_controller_stays_silent_until_resolved() {
        let mut app = create_test_app();
        app.insert_resource(InputConfig::default().with_tracking_retry(100, 0.0));
        let controller = spawn_controller(&mut app, ButtonAliasProfile::default());
        app.world_mut()
            .entity_mut(controller)
            .insert(TrackedController::left());
        tick(&mut app);

        set_pressed(&mut app, controller, ControllerButton::Grip, true);
        run_frames(&mut app, 3);
        assert!(events::<ButtonEvent>(&app).is_empty());
        assert!(events::<AliasEvent>(&app).is_empty());

        app.world_mut()
            .resource_mut::<DeviceRegistry>()
            .register(DeviceIndex(1), Handedness::Left);
        run_frames(&mut app, 3);

        assert!(app
            .world()
            .get::<TrackedController>(controller)
            .is_some_and(|t| t.is_resolved()));
        let grip: Vec<bool> = events::<ButtonEvent>(&app)
            .iter()
            .filter(|e| e.input == ButtonInput::press(ControllerButton::Grip))
            .map(|e| e.active)
            .collect();
        assert_eq!(grip, vec![true]);
    }

    #[test]
    fn velocity_window_follows_input_config() {
        let mut app = create_test_app();
        app.insert_resource(InputConfig::default().with_velocity_samples(2));
        let hand = app
            .world_mut()
            .spawn((Transform::default(), VelocityEstimator::new(10)))
            .id();

        for step in 1..=6 {
            set_translation(&mut app, hand, Vec3::X * step as f32 * 0.1);
            tick(&mut app);
        }

        let estimator = app.world().get::<VelocityEstimator>(hand).cloned().unwrap();
        assert_eq!(estimator.window(), 2);
        assert!(estimator.sample_count() <= 2);
        assert!(estimator.velocity().x > 0.0);
    }
}

// ==================== Grab Tests ====================

mod grabbing {
    use super::*;

    fn spawn_actor(app: &mut App, hand: Handedness, position: Vec3) -> Entity {
        app.world_mut()
            .spawn((Transform::from_translation(position), GrabActor::new(hand)))
            .id()
    }

    fn spawn_object(app: &mut App, interactable: Interactable, position: Vec3) -> Entity {
        app.world_mut()
            .spawn((Transform::from_translation(position), interactable))
            .id()
    }

    #[test]
    fn held_object_refuses_a_second_hand() {
        let mut app = create_test_app();
        let left = spawn_actor(&mut app, Handedness::Left, Vec3::ZERO);
        let right = spawn_actor(&mut app, Handedness::Right, Vec3::X);
        let mug = spawn_object(&mut app, Interactable::default(), Vec3::ZERO);
        tick(&mut app);

        assert!(start_grab::<MockBackend>(app.world_mut(), left, Some(mug)).is_ok());
        let second = start_grab::<MockBackend>(app.world_mut(), right, Some(mug));

        assert_eq!(
            second,
            Err(GrabError::AlreadyGrabbed {
                object: mug,
                holder: left
            })
        );
        assert_eq!(app.world().get::<IsGrabbed>(mug).map(|g| g.by), Some(left));
        assert_eq!(mock_body(&app, mug).joint.map(|j| j.parent()), Some(left));
        assert_eq!(
            app.world().get::<GrabActor>(right).and_then(|a| a.grabbed()),
            None
        );
    }

    #[test]
    fn tracked_object_can_change_hands() {
        let mut app = create_test_app();
        let left = spawn_actor(&mut app, Handedness::Left, Vec3::ZERO);
        let right = spawn_actor(&mut app, Handedness::Right, Vec3::ZERO);
        let ball = spawn_object(
            &mut app,
            Interactable::new(GrabMechanism::TrackObject(TrackObjectSettings::default())).with_hand_swap(),
            Vec3::ZERO,
        );
        tick(&mut app);

        assert!(start_grab::<MockBackend>(app.world_mut(), left, Some(ball)).is_ok());
        assert!(start_grab::<MockBackend>(app.world_mut(), right, Some(ball)).is_ok());
        tick(&mut app);

        assert_eq!(app.world().get::<IsGrabbed>(ball).map(|g| g.by), Some(right));
        assert_eq!(app.world().get::<GrabActor>(left).and_then(|a| a.grabbed()), None);
        assert_eq!(app.world().get::<GrabActor>(right).and_then(|a| a.grabbed()), Some(ball));
        let released: Vec<Entity> = events::<Ungrabbed>(&app).iter().map(|e| e.actor).collect();
        assert_eq!(released, vec![left]);
    }

    #[test]
    fn throw_velocity_scales_with_both_multipliers() {
        let mut app = create_test_app();
        let mut state = ControllerState::default();
        state.velocity = Vec3::new(1.0, 2.0, 0.0);
        let hand = app
            .world_mut()
            .spawn((
                Transform::default(),
                GrabActor::new(Handedness::Right).with_throw_multiplier(2.0),
                state,
            ))
            .id();
        let rock = spawn_object(
            &mut app,
            Interactable::default().with_throw_multiplier(1.5),
            Vec3::ZERO,
        );
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(rock)).unwrap();
        let released = stop_grab::<MockBackend>(app.world_mut(), hand, true, false).unwrap();

        assert_eq!(released, rock);
        let body = mock_body(&app, rock);
        assert!((body.velocity - Vec3::new(3.0, 6.0, 0.0)).length() < 1e-5);
        assert!(body.joint.is_none());
        assert!(app.world().get::<IsGrabbed>(rock).is_none());
    }

    #[test]
    fn undroppable_object_only_leaves_when_forced() {
        let mut app = create_test_app();
        let hand = spawn_actor(&mut app, Handedness::Left, Vec3::ZERO);
        let sword = spawn_object(&mut app, Interactable::default().undroppable(), Vec3::ZERO);
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(sword)).unwrap();

        assert_eq!(
            stop_grab::<MockBackend>(app.world_mut(), hand, true, false),
            Err(GrabError::Undroppable(sword))
        );
        assert_eq!(stop_grab::<MockBackend>(app.world_mut(), hand, false, true), Ok(sword));
    }

    #[test]
    fn grip_alias_grabs_and_releases_touched_object() {
        let mut app = create_test_app();
        let mug = spawn_object(&mut app, Interactable::default(), Vec3::ZERO);
        let controller = spawn_controller(&mut app, ButtonAliasProfile::default());
        app.world_mut()
            .entity_mut(controller)
            .insert((GrabActor::new(Handedness::Right), Touching(Some(mug))));
        tick(&mut app);

        set_pressed(&mut app, controller, ControllerButton::Grip, true);
        run_frames(&mut app, 3);
        assert_eq!(app.world().get::<IsGrabbed>(mug).map(|g| g.by), Some(controller));

        set_pressed(&mut app, controller, ControllerButton::Grip, false);
        run_frames(&mut app, 3);
        assert!(app.world().get::<IsGrabbed>(mug).is_none());
        assert_eq!(events::<Ungrabbed>(&app).len(), 1);
    }

    #[test]
    fn letting_go_of_the_last_hold_starts_a_fall() {
        let mut app = create_test_app();
        let rig = app.world_mut().spawn(Transform::default()).id();
        let headset = app
            .world_mut()
            .spawn((Transform::from_xyz(0.0, 1.7, 0.0), ChildOf(rig)))
            .id();
        app.world_mut().entity_mut(rig).insert(PlayerPresence::new(headset));

        let mut state = ControllerState::default();
        state.velocity = Vec3::Y;
        let hand = app
            .world_mut()
            .spawn((
                Transform::from_xyz(0.3, 1.2, 0.0),
                ChildOf(rig),
                GrabActor::new(Handedness::Right),
                state,
            ))
            .id();
        let rung = spawn_object(&mut app, Interactable::new(GrabMechanism::Climbable), Vec3::new(0.3, 1.2, 0.2));
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(rung)).unwrap();
        assert_eq!(app.world().get::<ClimbingActor>(rig), Some(&ClimbingActor(hand)));

        stop_grab::<MockBackend>(app.world_mut(), hand, true, false).unwrap();

        assert!(app.world().get::<ClimbingActor>(rig).is_none());
        assert!(app.world().get::<PlayerPresence>(rig).is_some_and(|p| p.is_falling()));
        let body = mock_body(&app, rig);
        assert!(!body.kinematic);
        // The rig leaves opposite the hand's motion: a hand moving up drops
        // the player.
        assert!((body.velocity - Vec3::new(0.0, -1.001, 0.0)).length() < 1e-5);
    }

    #[test]
    fn failed_joint_handover_keeps_the_first_hold() {
        let mut app = create_test_app();
        let shared = app.world_mut().spawn(Transform::default()).id();
        let left = app
            .world_mut()
            .spawn((Transform::default(), GrabActor::new(Handedness::Left).with_attach_point(shared)))
            .id();
        let right = app
            .world_mut()
            .spawn((Transform::default(), GrabActor::new(Handedness::Right).with_attach_point(shared)))
            .id();
        let mug = spawn_object(&mut app, Interactable::default().with_hand_swap(), Vec3::ZERO);
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), left, Some(mug)).unwrap();
        app.world_mut().get_mut::<MockBody>(mug).unwrap().refuse_joints = true;

        assert_eq!(
            start_grab::<MockBackend>(app.world_mut(), right, Some(mug)),
            Err(GrabError::JointUnavailable(mug))
        );
        tick(&mut app);

        assert_eq!(app.world().get::<IsGrabbed>(mug).map(|g| g.by), Some(left));
        assert_eq!(app.world().get::<GrabActor>(left).and_then(|a| a.grabbed()), Some(mug));
        assert_eq!(app.world().get::<GrabActor>(right).and_then(|a| a.grabbed()), None);
        assert_eq!(mock_body(&app, mug).joint.map(|j| j.parent()), Some(shared));
        assert!(events::<Ungrabbed>(&app).is_empty());
    }

    #[test]
    fn joint_handover_moves_the_joint_to_the_new_hand() {
        let mut app = create_test_app();
        let shared = app.world_mut().spawn(Transform::default()).id();
        let left = app
            .world_mut()
            .spawn((Transform::default(), GrabActor::new(Handedness::Left).with_attach_point(shared)))
            .id();
        let right = app
            .world_mut()
            .spawn((Transform::default(), GrabActor::new(Handedness::Right).with_attach_point(shared)))
            .id();
        let mug = spawn_object(&mut app, Interactable::default().with_hand_swap(), Vec3::ZERO);
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), left, Some(mug)).unwrap();
        start_grab::<MockBackend>(app.world_mut(), right, Some(mug)).unwrap();
        tick(&mut app);

        assert_eq!(app.world().get::<IsGrabbed>(mug).map(|g| g.by), Some(right));
        assert_eq!(mock_body(&app, mug).joint.map(|j| j.parent()), Some(shared));
        let released: Vec<(Entity, bool)> = events::<Ungrabbed>(&app).iter().map(|e| (e.actor, e.forced)).collect();
        assert_eq!(released, vec![(left, false)]);
    }

    #[test]
    fn overstrained_joint_breaks_free() {
        let mut app = create_test_app();
        let hand = spawn_actor(&mut app, Handedness::Right, Vec3::ZERO);
        let mug = spawn_object(&mut app, Interactable::default(), Vec3::ZERO);
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(mug)).unwrap();
        tick(&mut app);
        assert!(events::<Ungrabbed>(&app).is_empty());

        // A metre of separation in one step is far past the break force.
        set_translation(&mut app, hand, Vec3::X);
        tick(&mut app);

        let released: Vec<Ungrabbed> = events::<Ungrabbed>(&app).to_vec();
        assert_eq!(
            released,
            vec![Ungrabbed {
                actor: hand,
                object: mug,
                forced: true
            }]
        );
        assert!(app.world().get::<IsGrabbed>(mug).is_none());
        assert!(mock_body(&app, mug).joint.is_none());
        assert_eq!(app.world().get::<GrabActor>(hand).and_then(|a| a.grabbed()), None);
    }

    #[test]
    fn tracked_object_detaches_when_the_hand_runs_away() {
        let mut app = create_test_app();
        let hand = spawn_actor(&mut app, Handedness::Left, Vec3::ZERO);
        let ball = spawn_object(
            &mut app,
            Interactable::new(GrabMechanism::TrackObject(TrackObjectSettings::default())),
            Vec3::ZERO,
        );
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(ball)).unwrap();
        set_translation(&mut app, hand, Vec3::new(0.5, 0.0, 0.0));
        tick(&mut app);
        assert_eq!(app.world().get::<IsGrabbed>(ball).map(|g| g.by), Some(hand));

        set_translation(&mut app, hand, Vec3::new(2.0, 0.0, 0.0));
        tick(&mut app);

        let released: Vec<(Entity, bool)> = events::<Ungrabbed>(&app).iter().map(|e| (e.object, e.forced)).collect();
        assert_eq!(released, vec![(ball, true)]);
        assert!(app.world().get::<IsGrabbed>(ball).is_none());
    }

    #[test]
    fn move_transform_reports_the_far_limit_once() {
        let mut app = create_test_app();
        let hand = spawn_actor(&mut app, Handedness::Right, Vec3::ZERO);
        let settings = MoveTransformSettings::default().with_axis(LocalAxis::X, AxisLimits::new(0.0, 1.0));
        let slider = spawn_object(&mut app, Interactable::new(GrabMechanism::MoveTransform(settings)), Vec3::ZERO);
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(slider)).unwrap();
        tick(&mut app);

        set_translation(&mut app, hand, Vec3::X);
        tick(&mut app);
        set_translation(&mut app, hand, Vec3::X * 2.0);
        run_frames(&mut app, 2);

        let far: Vec<(LocalAxis, bool)> = events::<TransformLimitEvent>(&app)
            .iter()
            .filter(|e| e.object == slider && e.bound == LimitBound::Max)
            .map(|e| (e.axis, e.reached))
            .collect();
        assert_eq!(far, vec![(LocalAxis::X, true)]);
        let position = app.world().get::<Transform>(slider).map(|t| t.translation);
        assert!(position.is_some_and(|p| (p - Vec3::X).length() < 1e-5));
        assert!(mock_body(&app, slider).kinematic);
    }

    #[test]
    fn rotate_transform_reports_the_far_limit() {
        let mut app = create_test_app();
        let hand = spawn_actor(&mut app, Handedness::Right, Vec3::X);
        let settings = RotateTransformSettings {
            axis: LocalAxis::Y,
            limits: AxisLimits::new(-90.0, 90.0),
            ..default()
        };
        let valve = spawn_object(&mut app, Interactable::new(GrabMechanism::RotateTransform(settings)), Vec3::ZERO);
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(valve)).unwrap();
        tick(&mut app);
        assert!(events::<TransformLimitEvent>(&app).is_empty());

        // A quarter turn about +Y carries +X onto -Z.
        set_translation(&mut app, hand, Vec3::NEG_Z);
        run_frames(&mut app, 2);

        let limits: Vec<(LocalAxis, LimitBound, bool)> = events::<TransformLimitEvent>(&app)
            .iter()
            .map(|e| (e.axis, e.bound, e.reached))
            .collect();
        assert_eq!(limits, vec![(LocalAxis::Y, LimitBound::Max, true)]);
        let rotation = app.world().get::<Transform>(valve).map(|t| t.rotation);
        assert!(rotation.is_some_and(|r| r.angle_between(Quat::from_rotation_y(FRAC_PI_2)) < 1e-3));
    }

    #[test]
    fn rotator_turns_about_its_configured_hinge() {
        let mut app = create_test_app();
        let hand = spawn_actor(&mut app, Handedness::Right, Vec3::new(0.5, 0.0, 0.0));
        let settings = RotatorTrackSettings::default().with_pivot(Vec3::new(-0.5, 0.0, 0.0));
        let door = spawn_object(&mut app, Interactable::new(GrabMechanism::RotatorTrack(settings)), Vec3::ZERO);
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(door)).unwrap();
        set_translation(&mut app, hand, Vec3::new(0.5, 0.0, 0.5));
        tick(&mut app);

        MockBackend::set_angular_velocity(app.world_mut(), door, Vec3::ZERO);
        process_grab_fixed_update::<MockBackend>(app.world_mut());

        // Lever of one metre from the hinge, half a metre of pull, strength 10.
        let spin = mock_body(&app, door).angular_velocity;
        assert!((spin - Vec3::new(0.0, -5.0, 0.0)).length() < 1e-4, "unexpected spin {spin}");
    }

    #[test]
    fn release_survives_a_despawned_former_parent() {
        let mut app = create_test_app();
        let hand = spawn_actor(&mut app, Handedness::Left, Vec3::ZERO);
        let shelf = app.world_mut().spawn(Transform::from_xyz(0.0, 1.0, 0.0)).id();
        let book = app
            .world_mut()
            .spawn((
                Transform::default(),
                ChildOf(shelf),
                Interactable::new(GrabMechanism::ChildOfController),
            ))
            .id();
        tick(&mut app);

        start_grab::<MockBackend>(app.world_mut(), hand, Some(book)).unwrap();
        assert_eq!(app.world().get::<ChildOf>(book).map(|c| c.parent()), Some(hand));
        app.world_mut().despawn(shelf);

        assert_eq!(stop_grab::<MockBackend>(app.world_mut(), hand, false, false), Ok(book));
        assert!(app.world().get_entity(book).is_ok());
        assert!(app.world().get::<ChildOf>(book).is_none());
        tick(&mut app);
        assert!(app.world().get_entity(book).is_ok());
    }
}

// ==================== Control Tests ====================

mod controls {
    use super::*;

    fn spawn_button(app: &mut App, surroundings: [Option<f32>; 6]) -> (Entity, Entity) {
        let panel = app.world_mut().spawn(Transform::default()).id();
        let button = app
            .world_mut()
            .spawn((
                Transform::default(),
                ChildOf(panel),
                Control3dBundle::new(Control3d::button()),
                LocalBounds::from_size(Vec3::splat(0.1)),
                MockSurroundings(surroundings),
            ))
            .id();
        (panel, button)
    }

    fn setup_state(app: &App, control: Entity) -> Option<ControlSetupState> {
        app.world().get::<ControlSetupState>(control).copied()
    }

    #[test]
    fn button_detects_push_axis_and_creates_joint() {
        let mut app = create_test_app();
        let (panel, button) = spawn_button(&mut app, [None, None, None, None, Some(0.3), Some(0.05)]);
        run_frames(&mut app, 4);

        assert_eq!(setup_state(&app, button), Some(ControlSetupState::SetupSuccessful));
        let motion = app.world().get::<ControlMotion>(button).cloned().unwrap();
        assert!((motion.limits.max - 0.0475).abs() < 1e-5);

        match mock_body(&app, button).joint {
            Some(JointSpec::Slide { parent, axis, limits, .. }) => {
                assert_eq!(parent, panel);
                assert_eq!(axis, Vec3::NEG_Z);
                assert!((limits[1] - 0.0475).abs() < 1e-5);
            }
            other => panic!("expected a slide joint, got {other:?}"),
        }
    }

    #[test]
    fn button_flush_against_wall_fails_setup() {
        let mut app = create_test_app();
        let (_, button) = spawn_button(&mut app, [None, None, None, None, None, Some(0.0)]);
        run_frames(&mut app, 4);

        assert_eq!(
            setup_state(&app, button),
            Some(ControlSetupState::SetupFailed(SetupError::AlreadyColliding))
        );
        assert!(mock_body(&app, button).joint.is_none());
    }

    #[test]
    fn pushed_button_reports_clamped_value_and_edges() {
        let mut app = create_test_app();
        let (_, button) = spawn_button(&mut app, [None, None, None, None, Some(0.3), Some(0.05)]);
        run_frames(&mut app, 4);

        set_translation(&mut app, button, Vec3::new(0.0, 0.0, -0.0475));
        run_frames(&mut app, 2);
        assert_eq!(events::<ButtonPushed>(&app).len(), 1);
        assert_eq!(app.world().get::<ControlValue>(button).and_then(|v| v.value()), Some(100.0));

        // Driven through the wall, the value stays at the top of the range.
        set_translation(&mut app, button, Vec3::new(0.0, 0.0, -1.0));
        run_frames(&mut app, 2);
        assert_eq!(app.world().get::<ControlValue>(button).and_then(|v| v.value()), Some(100.0));
        assert_eq!(events::<ButtonPushed>(&app).len(), 1);

        set_translation(&mut app, button, Vec3::ZERO);
        run_frames(&mut app, 2);
        assert_eq!(events::<ButtonReleased>(&app).len(), 1);
        assert_eq!(app.world().get::<ControlValue>(button).and_then(|v| v.value()), Some(0.0));
        assert!(events::<ControlValueChanged>(&app)
            .iter()
            .all(|e| (0.0..=100.0).contains(&e.value)));
    }

    fn spawn_drawer(app: &mut App, handle_in_body: bool) -> (Entity, Entity) {
        let body = app
            .world_mut()
            .spawn((Transform::default(), LocalBounds::from_size(Vec3::new(0.4, 0.2, 0.5))))
            .id();
        let handle = app
            .world_mut()
            .spawn((
                Transform::default(),
                LocalBounds::new(Vec3::new(0.0, 0.0, 0.27), Vec3::splat(0.02)),
            ))
            .id();
        if handle_in_body {
            app.world_mut().entity_mut(handle).insert(ChildOf(body));
        }
        let drawer = app
            .world_mut()
            .spawn((
                Transform::default(),
                Control3dBundle::new(Control3d::drawer().with_body(body).with_handle(handle)),
                MockSurroundings([None; 6]),
            ))
            .id();
        let content = app
            .world_mut()
            .spawn((Transform::default(), ChildOf(drawer), Interactable::default()))
            .id();
        if let Some(mut control) = app.world_mut().get_mut::<Control3d>(drawer) {
            control.content = Some(content);
        }
        (drawer, content)
    }

    #[test]
    fn handle_nested_in_body_fails_setup() {
        let mut app = create_test_app();
        let (drawer, _) = spawn_drawer(&mut app, true);
        run_frames(&mut app, 4);

        assert_eq!(
            setup_state(&app, drawer),
            Some(ControlSetupState::SetupFailed(SetupError::HandleInsideBody))
        );
    }

    #[test]
    fn drawer_content_is_grabbable_only_when_open() {
        let mut app = create_test_app();
        let (drawer, content) = spawn_drawer(&mut app, false);
        run_frames(&mut app, 4);

        assert_eq!(setup_state(&app, drawer), Some(ControlSetupState::SetupSuccessful));
        assert_eq!(app.world().get::<Interactable>(content).map(|i| i.grab_enabled), Some(false));

        set_translation(&mut app, drawer, Vec3::new(0.0, 0.0, 0.3));
        run_frames(&mut app, 2);
        assert_eq!(app.world().get::<Interactable>(content).map(|i| i.grab_enabled), Some(true));

        set_translation(&mut app, drawer, Vec3::new(0.0, 0.0, 0.05));
        run_frames(&mut app, 2);
        assert_eq!(app.world().get::<Interactable>(content).map(|i| i.grab_enabled), Some(false));
    }

    #[test]
    fn resetting_setup_runs_detection_again() {
        let mut app = create_test_app();
        let (_, button) = spawn_button(&mut app, [None, None, None, None, Some(0.3), Some(0.05)]);
        run_frames(&mut app, 4);

        app.world_mut()
            .entity_mut(button)
            .insert((ControlSetupState::Uninitialized, MockSurroundings([Some(0.1), Some(0.5), None, None, None, None])));
        run_frames(&mut app, 4);

        assert_eq!(setup_state(&app, button), Some(ControlSetupState::SetupSuccessful));
        match mock_body(&app, button).joint {
            Some(JointSpec::Slide { axis, .. }) => assert_eq!(axis, Vec3::X),
            other => panic!("expected a slide joint, got {other:?}"),
        }
    }

    #[test]
    fn closed_drawer_hides_its_content() {
        let mut app = create_test_app();
        let (drawer, content) = spawn_drawer(&mut app, false);
        app.world_mut()
            .entity_mut(drawer)
            .insert(ControlConfig::default().with_hidden_content(true));
        app.world_mut().entity_mut(content).insert(Visibility::default());
        run_frames(&mut app, 4);

        assert_eq!(setup_state(&app, drawer), Some(ControlSetupState::SetupSuccessful));
        assert_eq!(app.world().get::<Visibility>(content), Some(&Visibility::Hidden));

        set_translation(&mut app, drawer, Vec3::new(0.0, 0.0, 0.3));
        run_frames(&mut app, 2);
        assert_eq!(app.world().get::<Visibility>(content), Some(&Visibility::Inherited));

        set_translation(&mut app, drawer, Vec3::ZERO);
        run_frames(&mut app, 2);
        assert_eq!(app.world().get::<Visibility>(content), Some(&Visibility::Hidden));
    }

    #[test]
    fn resting_control_leaves_its_value_untouched() {
        let mut app = create_test_app();
        let (drawer, _) = spawn_drawer(&mut app, false);
        run_frames(&mut app, 6);
        assert_eq!(setup_state(&app, drawer), Some(ControlSetupState::SetupSuccessful));

        let changed = |app: &App| {
            app.world()
                .entity(drawer)
                .get_change_ticks::<ControlValue>()
                .map(|ticks| ticks.changed)
        };
        let before = changed(&app);
        assert!(before.is_some());
        run_frames(&mut app, 3);
        assert_eq!(changed(&app), before);

        set_translation(&mut app, drawer, Vec3::new(0.0, 0.0, 0.3));
        run_frames(&mut app, 2);
        assert_ne!(changed(&app), before);
    }
}

// ==================== Presence Tests ====================

mod presence {
    use super::*;

    fn spawn_rig(app: &mut App) -> Entity {
        let rig = app.world_mut().spawn(Transform::default()).id();
        let headset = app
            .world_mut()
            .spawn((Transform::from_xyz(0.0, 1.7, 0.0), ChildOf(rig)))
            .id();
        app.world_mut()
            .entity_mut(rig)
            .insert((PlayerPresence::new(headset), PresenceConfig::default()));
        rig
    }

    #[test]
    fn new_rig_is_a_grounded_trigger_body() {
        let mut app = create_test_app();
        let rig = spawn_rig(&mut app);
        run_frames(&mut app, 2);

        let body = mock_body(&app, rig);
        assert!(body.kinematic);
        assert!(body.sensor);
        assert!(app.world().get::<Grounded>(rig).is_some());
    }

    #[test]
    fn headset_collision_rewinds_to_last_safe_position() {
        let mut app = create_test_app();
        let rig = spawn_rig(&mut app);
        run_frames(&mut app, 3);

        set_translation(&mut app, rig, Vec3::new(2.0, 0.0, 0.0));
        run_frames(&mut app, 3);
        let safe = app
            .world()
            .get::<PlayerPresence>(rig)
            .and_then(|p| p.tracker().safe_position());
        assert_eq!(safe, Some(Vec3::new(2.0, 0.0, 0.0)));

        // Walk into a wall: the new spot is never recorded as safe.
        set_translation(&mut app, rig, Vec3::new(5.0, 0.0, 0.0));
        app.world_mut().send_event(HeadsetCollisionDetected { rig, collider: None });
        tick(&mut app);

        assert_eq!(
            app.world().get::<Transform>(rig).map(|t| t.translation),
            Some(Vec3::new(2.0, 0.0, 0.0))
        );
        assert_eq!(events::<ScreenFade>(&app).len(), 1);
        let rewound = events::<PositionRewound>(&app);
        assert_eq!(rewound.len(), 1);
        assert_eq!(rewound[0].to, Vec3::new(2.0, 0.0, 0.0));
        assert!(app.world().get::<HeadsetColliding>(rig).is_some());
    }

    #[test]
    fn fall_starts_on_request_and_ends_at_rest() {
        let mut app = create_test_app();
        let rig = spawn_rig(&mut app);
        run_frames(&mut app, 2);

        app.world_mut().send_event(PhysicsFallRequest {
            rig,
            velocity: Vec3::X,
        });
        tick(&mut app);

        assert!(app.world().get::<Falling>(rig).is_some());
        let body = mock_body(&app, rig);
        assert!(!body.kinematic);
        assert!(!body.sensor);
        assert!((body.velocity - Vec3::new(1.0, -0.001, 0.0)).length() < 1e-6);
        assert_eq!(events::<PresenceFallStarted>(&app).len(), 1);

        // Still moving: the fall continues.
        run_frames(&mut app, 3);
        assert!(app.world().get::<Falling>(rig).is_some());

        MockBackend::set_velocity(app.world_mut(), rig, Vec3::ZERO);
        run_frames(&mut app, 3);

        assert!(app.world().get::<Grounded>(rig).is_some());
        assert!(app.world().get::<Falling>(rig).is_none());
        let body = mock_body(&app, rig);
        assert!(body.kinematic);
        assert!(body.sensor);
        assert_eq!(events::<PresenceFallEnded>(&app).len(), 1);
    }
}
