//! Physically driven 3D controls.
//!
//! A [`Control3d`] is a button, door, drawer, knob, lever, slider, wheel or
//! chest lid whose motion is worked out from the surrounding geometry. Setup
//! runs as a small state machine:
//!
//! ```text
//! Uninitialized -> AutoDetecting -> SetupSuccessful
//!                                -> SetupFailed(reason)
//! ```
//!
//! While auto-detecting, the physics backend surveys the surroundings and
//! fills the [`ControlSurvey`]. Detection then picks the motion axis and
//! travel, optionally creates the joint, and stores the result in a
//! [`ControlMotion`]. From then on the control's transform is measured every
//! physics tick and mapped onto its [`ControlValueRange`].
//!
//! Setting the state back to [`ControlSetupState::Uninitialized`] re-runs
//! the whole setup.

use bevy::prelude::*;

use crate::backend::{InteractionPhysicsBackend, JointSpec};
use crate::config::ControlConfig;
use crate::error::SetupError;
use crate::grab::Interactable;
use crate::limits::{AxisLimits, LimitBound, LimitTracker, LimitTransition};
use crate::pose::{is_descendant_of, world_pose, LocalAxis, Pose};

pub mod detect;
pub mod value;

pub use detect::{AxisDirection, ControlSurvey, LocalBounds};
pub use value::{ControlValue, ControlValueRange};

use detect::{
    activation_distance, detect_axis, hinge_angle, largest_extent_axis, nearer_side, smallest_extent_axis,
    sub_direction,
};

/// Normalized distance from either end at which a control counts as
/// fully closed or fully open.
pub const CONTROL_LIMIT_THRESHOLD: f32 = 0.02;

// ==================== Configuration ====================

/// Setup progress of a control.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub enum ControlSetupState {
    #[default]
    Uninitialized,
    AutoDetecting,
    SetupSuccessful,
    SetupFailed(SetupError),
}

impl ControlSetupState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ControlSetupState::SetupSuccessful)
    }
}

/// Settings of a push button.
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub struct ButtonSettings {
    /// Push direction. `None` detects it from the surface the button sits on.
    pub direction: Option<AxisDirection>,
}

/// Settings of linearly moving controls (drawers, sliders).
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub struct SlideSettings {
    /// Opening direction. `None` detects it from the parts' bounds.
    pub direction: Option<AxisDirection>,
    /// Upper bound on the travel, on top of what detection allows.
    pub max_travel: Option<f32>,
}

/// Settings of rotating controls.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct HingeSettings {
    /// Rotation axis in the control's local space. `None` detects it where
    /// the kind supports that.
    pub axis: Option<LocalAxis>,
    /// Side of the handle, for doors and lids. `None` detects it.
    pub handle_side: Option<AxisDirection>,
    /// Angle limits in degrees.
    pub min_angle: f32,
    pub max_angle: f32,
}

impl Default for HingeSettings {
    fn default() -> Self {
        Self::door()
    }
}

impl HingeSettings {
    /// Vertical hinge opening a quarter turn.
    pub fn door() -> Self {
        Self {
            axis: Some(LocalAxis::Y),
            handle_side: None,
            min_angle: 0.0,
            max_angle: 90.0,
        }
    }

    /// Lid hinge; the axis follows from the handle.
    pub fn chest() -> Self {
        Self {
            axis: None,
            max_angle: 90.0,
            ..Self::door()
        }
    }

    /// Lever swinging either way around its pivot.
    pub fn lever() -> Self {
        Self {
            axis: Some(LocalAxis::Z),
            min_angle: -45.0,
            max_angle: 45.0,
            ..Self::door()
        }
    }

    /// Knob turning about the axis facing its mounting surface.
    pub fn knob() -> Self {
        Self {
            axis: None,
            min_angle: 0.0,
            max_angle: 180.0,
            ..Self::door()
        }
    }

    /// Wheel turning about its thinnest axis.
    pub fn wheel() -> Self {
        Self {
            axis: None,
            min_angle: -180.0,
            max_angle: 180.0,
            ..Self::door()
        }
    }

    pub fn with_angles(mut self, min: f32, max: f32) -> Self {
        let limits = AxisLimits::new(min, max);
        self.min_angle = limits.min;
        self.max_angle = limits.max;
        self
    }

    pub fn with_axis(mut self, axis: LocalAxis) -> Self {
        self.axis = Some(axis);
        self
    }
}

/// What kind of control this is, with its kind-specific settings.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum ControlKind {
    Button(ButtonSettings),
    Door(HingeSettings),
    Drawer(SlideSettings),
    Knob(HingeSettings),
    Lever(HingeSettings),
    Slider(SlideSettings),
    Wheel(HingeSettings),
    Chest(HingeSettings),
}

impl ControlKind {
    /// Whether setup has to wait for survey results.
    pub fn needs_survey(&self) -> bool {
        match self {
            ControlKind::Button(_) | ControlKind::Drawer(_) => true,
            ControlKind::Knob(settings) => settings.axis.is_none(),
            _ => false,
        }
    }

    pub fn is_button(&self) -> bool {
        matches!(self, ControlKind::Button(_))
    }
}

/// A 3D control and its parts.
#[derive(Component, Reflect, Debug, Clone, PartialEq)]
#[reflect(Component)]
pub struct Control3d {
    pub kind: ControlKind,
    /// Static part the control moves against (cabinet, chest, slider track).
    pub body: Option<Entity>,
    /// Part the hand holds. Must not be inside the body's hierarchy.
    pub handle: Option<Entity>,
    /// Root of objects inside the control; they become grabbable once the
    /// control is open far enough.
    pub content: Option<Entity>,
}

impl Control3d {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            body: None,
            handle: None,
            content: None,
        }
    }

    pub fn button() -> Self {
        Self::new(ControlKind::Button(ButtonSettings::default()))
    }

    pub fn door() -> Self {
        Self::new(ControlKind::Door(HingeSettings::door()))
    }

    pub fn drawer() -> Self {
        Self::new(ControlKind::Drawer(SlideSettings::default()))
    }

    pub fn chest() -> Self {
        Self::new(ControlKind::Chest(HingeSettings::chest()))
    }

    pub fn with_body(mut self, body: Entity) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_handle(mut self, handle: Entity) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_content(mut self, content: Entity) -> Self {
        self.content = Some(content);
        self
    }
}

/// Everything a control needs, for convenient spawning.
#[derive(Bundle)]
pub struct Control3dBundle {
    pub control: Control3d,
    pub config: ControlConfig,
    pub range: ControlValueRange,
    pub state: ControlSetupState,
    pub survey: ControlSurvey,
}

impl Control3dBundle {
    pub fn new(control: Control3d) -> Self {
        Self {
            control,
            config: ControlConfig::default(),
            range: ControlValueRange::default(),
            state: ControlSetupState::default(),
            survey: ControlSurvey::default(),
        }
    }

    pub fn with_config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_range(mut self, range: ControlValueRange) -> Self {
        self.range = range;
        self
    }
}

// ==================== Detection result ====================

/// How the control moves once set up.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum MotionKind {
    /// Translation along a local unit direction; limits in units.
    Slide { direction: Vec3 },
    /// Rotation about a local axis through a local anchor; limits in degrees.
    Hinge { axis: Vec3, anchor: Vec3 },
}

/// Detected motion of a control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedMotion {
    pub motion: MotionKind,
    pub limits: AxisLimits,
}

/// Geometry gathered for detection, in the control's local frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionInput {
    pub survey: ControlSurvey,
    pub control_bounds: Option<LocalBounds>,
    pub body_bounds: Option<LocalBounds>,
    pub handle_bounds: Option<LocalBounds>,
    pub handle_inside_body: bool,
}

const HORIZONTAL: [LocalAxis; 2] = [LocalAxis::X, LocalAxis::Z];

fn other_axes(axis: LocalAxis) -> Vec<LocalAxis> {
    LocalAxis::ALL.into_iter().filter(|&a| a != axis).collect()
}

/// Work out how a control moves.
pub fn detect_motion(
    kind: &ControlKind,
    input: &DetectionInput,
    config: &ControlConfig,
) -> Result<DetectedMotion, SetupError> {
    if input.handle_inside_body {
        return Err(SetupError::HandleInsideBody);
    }
    let ray_length = config.ray_length;

    match kind {
        ControlKind::Button(settings) => {
            let direction = match settings.direction {
                Some(direction) => direction,
                None => {
                    let axis = detect_axis(&input.survey, ray_length).ok_or(SetupError::NoAxis)?;
                    nearer_side(&input.survey, axis, ray_length)
                }
            };
            let obstruction = input.survey.distance(direction).unwrap_or(ray_length);
            let travel = activation_distance(obstruction, config.safety_factor)?;
            Ok(DetectedMotion {
                motion: MotionKind::Slide {
                    direction: direction.unit(),
                },
                limits: AxisLimits::new(0.0, travel),
            })
        }
        ControlKind::Drawer(settings) => {
            let body = input.body_bounds.ok_or(SetupError::MissingPart("body"))?;
            let direction = match settings.direction {
                Some(direction) => direction,
                None => {
                    let handle = input.handle_bounds.ok_or(SetupError::MissingPart("handle"))?;
                    sub_direction(&handle, &body, &LocalAxis::ALL).ok_or(SetupError::NoAxis)?
                }
            };
            let mut obstruction = body.extent(direction.axis);
            if let Some(blocked) = input.survey.distance(direction) {
                obstruction = obstruction.min(blocked);
            }
            if let Some(max_travel) = settings.max_travel {
                obstruction = obstruction.min(max_travel);
            }
            let travel = activation_distance(obstruction, config.safety_factor)?;
            Ok(DetectedMotion {
                motion: MotionKind::Slide {
                    direction: direction.unit(),
                },
                limits: AxisLimits::new(0.0, travel),
            })
        }
        ControlKind::Slider(settings) => {
            let track = input.body_bounds.ok_or(SetupError::MissingPart("body"))?;
            let direction = match settings.direction {
                Some(direction) => direction,
                None => {
                    let axis = largest_extent_axis(&track, &LocalAxis::ALL).ok_or(SetupError::NoAxis)?;
                    AxisDirection::new(axis, true)
                }
            };
            let axis = direction.axis;
            let center = axis.component(track.center) * direction.sign();
            let half = axis.component(track.half_extents);
            let mut lower = center - half;
            let mut upper = center + half;
            if let Some(max_travel) = settings.max_travel {
                upper = upper.min(max_travel);
                lower = lower.max(-max_travel);
            }
            if upper - lower < detect::MIN_ACTIVATION {
                return Err(SetupError::AlreadyColliding);
            }
            Ok(DetectedMotion {
                motion: MotionKind::Slide {
                    direction: direction.unit(),
                },
                limits: AxisLimits::new(lower, upper),
            })
        }
        ControlKind::Door(settings) | ControlKind::Chest(settings) => {
            let bounds = input.control_bounds.ok_or(SetupError::MissingPart("bounds"))?;
            let is_chest = matches!(kind, ControlKind::Chest(_));
            let handle_side = match settings.handle_side {
                Some(side) => side,
                None => {
                    let handle = input.handle_bounds.ok_or(SetupError::MissingPart("handle"))?;
                    if is_chest {
                        sub_direction(&handle, &bounds, &HORIZONTAL).ok_or(SetupError::NoAxis)?
                    } else {
                        // A door handle sticks out of the face, so the side
                        // is taken along the door's width instead.
                        let candidates = other_axes(settings.axis.unwrap_or(LocalAxis::Y));
                        let width = largest_extent_axis(&bounds, &candidates).ok_or(SetupError::NoAxis)?;
                        let offset = width.component(handle.center - bounds.center);
                        if offset.abs() <= detect::DETECTION_EPSILON {
                            return Err(SetupError::NoAxis);
                        }
                        AxisDirection::new(width, offset > 0.0)
                    }
                }
            };
            let hinge_axis = match (settings.axis, is_chest) {
                (Some(axis), _) => axis,
                (None, true) => HORIZONTAL
                    .into_iter()
                    .find(|&a| a != handle_side.axis)
                    .ok_or(SetupError::NoAxis)?,
                (None, false) => LocalAxis::Y,
            };
            if hinge_axis == handle_side.axis {
                return Err(SetupError::NoAxis);
            }
            // The hinge sits on the edge opposite the handle.
            let half = handle_side.axis.component(bounds.half_extents);
            let anchor = bounds.center - handle_side.unit() * half;
            Ok(DetectedMotion {
                motion: MotionKind::Hinge {
                    axis: hinge_axis.unit(),
                    anchor,
                },
                limits: AxisLimits::new(settings.min_angle, settings.max_angle),
            })
        }
        ControlKind::Lever(settings) | ControlKind::Knob(settings) | ControlKind::Wheel(settings) => {
            let axis = match (settings.axis, kind) {
                (Some(axis), _) => axis,
                (None, ControlKind::Knob(_)) => detect_axis(&input.survey, ray_length).ok_or(SetupError::NoAxis)?,
                (None, ControlKind::Wheel(_)) => {
                    let bounds = input.control_bounds.ok_or(SetupError::MissingPart("bounds"))?;
                    smallest_extent_axis(&bounds, &LocalAxis::ALL).ok_or(SetupError::NoAxis)?
                }
                (None, _) => LocalAxis::Z,
            };
            let limits = AxisLimits::new(settings.min_angle, settings.max_angle);
            if limits.is_locked() {
                return Err(SetupError::AlreadyColliding);
            }
            Ok(DetectedMotion {
                motion: MotionKind::Hinge {
                    axis: axis.unit(),
                    anchor: Vec3::ZERO,
                },
                limits,
            })
        }
    }
}

/// Joint expressing `detected` between the control and `parent`.
///
/// The control keeps its setup orientation relative to the parent, so its
/// rest pose is the zero of the joint limits.
pub fn control_joint_spec(detected: &DetectedMotion, parent: Entity, control: Pose, parent_pose: Pose) -> JointSpec {
    let relative_rotation = (parent_pose.rotation.inverse() * control.rotation).normalize();
    match detected.motion {
        MotionKind::Slide { direction } => JointSpec::Slide {
            parent,
            parent_anchor: parent_pose.inverse().transform_point(control.translation),
            local_anchor: Vec3::ZERO,
            axis: direction,
            relative_rotation,
            limits: [detected.limits.min, detected.limits.max],
        },
        MotionKind::Hinge { axis, anchor } => JointSpec::Hinge {
            parent,
            parent_anchor: parent_pose.inverse().transform_point(control.transform_point(anchor)),
            local_anchor: anchor,
            axis,
            relative_rotation,
            limits: Some([detected.limits.min.to_radians(), detected.limits.max.to_radians()]),
        },
    }
}

/// Result of a successful setup, measured against every tick.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct ControlMotion {
    /// Local transform at setup time.
    pub rest: Transform,
    pub motion: MotionKind,
    pub limits: AxisLimits,
    /// Whether setup created the joint (and must remove it on re-run).
    pub owns_joint: bool,
    tracker: LimitTracker,
}

impl ControlMotion {
    pub fn new(rest: Transform, detected: DetectedMotion, owns_joint: bool) -> Self {
        Self {
            rest,
            motion: detected.motion,
            limits: detected.limits,
            owns_joint,
            tracker: LimitTracker::default(),
        }
    }

    /// Raw travel (units) or angle (degrees) of `current` from rest.
    pub fn measure(&self, current: &Transform) -> f32 {
        match self.motion {
            MotionKind::Slide { direction } => {
                let world_direction = self.rest.rotation * direction;
                (current.translation - self.rest.translation).dot(world_direction)
            }
            MotionKind::Hinge { axis, .. } => hinge_angle(self.rest.rotation, current.rotation, axis).to_degrees(),
        }
    }

    pub fn normalized(&self, current: &Transform) -> f32 {
        self.limits.normalize(self.measure(current))
    }
}

// ==================== Events ====================

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ControlValueChanged {
    pub control: Entity,
    pub value: f32,
    pub normalized: f32,
}

/// A control reached or left fully closed (`Min`) or fully open (`Max`).
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ControlLimitEvent {
    pub control: Entity,
    pub bound: LimitBound,
    pub reached: bool,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ButtonPushed {
    pub control: Entity,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ButtonReleased {
    pub control: Entity,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ControlSetupFinished {
    pub control: Entity,
    pub state: ControlSetupState,
}

// ==================== Systems ====================

fn part_bounds(world: &World, part: Entity, frame: Pose) -> Option<LocalBounds> {
    let bounds = world.get::<LocalBounds>(part)?;
    let pose = world_pose(world, part)?;
    Some(bounds.in_frame(pose, frame))
}

fn setup_control<B: InteractionPhysicsBackend>(
    world: &mut World,
    entity: Entity,
    control: &Control3d,
    config: &ControlConfig,
    survey: ControlSurvey,
) -> Result<(), SetupError> {
    world
        .get::<ControlValueRange>(entity)
        .copied()
        .unwrap_or_default()
        .validate()?;

    let frame = world_pose(world, entity).unwrap_or_default();
    let input = DetectionInput {
        survey,
        control_bounds: part_bounds(world, entity, frame),
        body_bounds: control.body.and_then(|body| part_bounds(world, body, frame)),
        handle_bounds: control.handle.and_then(|handle| part_bounds(world, handle, frame)),
        handle_inside_body: match (control.handle, control.body) {
            (Some(handle), Some(body)) => is_descendant_of(world, handle, body),
            _ => false,
        },
    };
    let detected = detect_motion(&control.kind, &input, config)?;

    if config.auto_create_joints {
        let parent = world
            .get::<ChildOf>(entity)
            .map(|child_of| child_of.parent())
            .or(control.body)
            .ok_or(SetupError::MissingPart("parent"))?;
        let parent_pose = world_pose(world, parent).unwrap_or_default();
        let spec = control_joint_spec(&detected, parent, frame, parent_pose);
        if !B::create_joint(world, entity, spec) {
            return Err(SetupError::JointUnavailable);
        }
    }

    let rest = world.get::<Transform>(entity).copied().unwrap_or_default();
    world.entity_mut(entity).insert((
        ControlMotion::new(rest, detected, config.auto_create_joints),
        ControlValue::default(),
    ));
    Ok(())
}

/// Drive the setup state machine of every control.
pub fn run_control_setup<B: InteractionPhysicsBackend>(world: &mut World) {
    let controls: Vec<(Entity, Control3d, ControlConfig, ControlSetupState, ControlSurvey)> = world
        .query::<(
            Entity,
            &Control3d,
            Option<&ControlConfig>,
            Option<&ControlSetupState>,
            Option<&ControlSurvey>,
        )>()
        .iter(world)
        .map(|(e, control, config, state, survey)| {
            (
                e,
                control.clone(),
                config.copied().unwrap_or_default(),
                state.copied().unwrap_or_default(),
                survey.copied().unwrap_or_default(),
            )
        })
        .collect();

    for (entity, control, config, state, survey) in controls {
        match state {
            ControlSetupState::Uninitialized => {
                if let Some(motion) = world.get::<ControlMotion>(entity) {
                    if motion.owns_joint {
                        B::remove_joint(world, entity);
                    }
                    world.entity_mut(entity).remove::<ControlMotion>();
                }
                let mut survey = ControlSurvey::default();
                if !control.kind.needs_survey() {
                    survey.finish();
                }
                world
                    .entity_mut(entity)
                    .insert((ControlSetupState::AutoDetecting, survey));
            }
            ControlSetupState::AutoDetecting if survey.is_ready() => {
                let state = match setup_control::<B>(world, entity, &control, &config, survey) {
                    Ok(()) => {
                        debug!("control {entity} set up");
                        ControlSetupState::SetupSuccessful
                    }
                    Err(err) => {
                        warn!("control {entity} setup failed: {err}");
                        ControlSetupState::SetupFailed(err)
                    }
                };
                world.entity_mut(entity).insert(state);
                world.send_event(ControlSetupFinished { control: entity, state });
            }
            _ => {}
        }
    }
}

/// Measure set-up controls and report value and limit changes.
pub fn update_control_values(
    mut q_controls: Query<(
        Entity,
        &Control3d,
        &ControlSetupState,
        Option<&ControlConfig>,
        Option<&ControlValueRange>,
        &mut ControlMotion,
        &mut ControlValue,
        &Transform,
    )>,
    mut value_events: EventWriter<ControlValueChanged>,
    mut limit_events: EventWriter<ControlLimitEvent>,
    mut pushed_events: EventWriter<ButtonPushed>,
    mut released_events: EventWriter<ButtonReleased>,
) {
    for (control, spec, state, config, range, mut motion, mut value, transform) in &mut q_controls {
        if !state.is_ready() {
            continue;
        }
        let step = config.map_or(ControlConfig::default().step_size, |c| c.step_size);
        let range = range.copied().unwrap_or_default();

        let normalized = motion.normalized(transform);
        let logical = range.value_at(normalized, step);
        // Idle controls must not trip `Changed<ControlValue>`.
        if value.value() == Some(logical) && value.normalized() == normalized {
            continue;
        }
        if value.set(logical, normalized) {
            value_events.write(ControlValueChanged {
                control,
                value: logical,
                normalized,
            });
        }

        for transition in motion.tracker.update(normalized, CONTROL_LIMIT_THRESHOLD) {
            let (bound, reached) = match transition {
                LimitTransition::Reached(bound) => (bound, true),
                LimitTransition::Exited(bound) => (bound, false),
            };
            limit_events.write(ControlLimitEvent { control, bound, reached });
            if spec.kind.is_button() && bound == LimitBound::Max {
                if reached {
                    pushed_events.write(ButtonPushed { control });
                } else {
                    released_events.write(ButtonReleased { control });
                }
            }
        }
    }
}

/// Enable content grabbing only while the control is open past the minimum
/// opening, and optionally hide the content while closed.
pub fn propagate_control_content(
    q_controls: Query<(&Control3d, &ControlValue, Option<&ControlConfig>), Changed<ControlValue>>,
    q_children: Query<&Children>,
    mut q_interactables: Query<&mut Interactable>,
    mut q_visibility: Query<&mut Visibility>,
) {
    for (control, value, config) in &q_controls {
        let Some(content) = control.content else {
            continue;
        };
        let config = config.copied().unwrap_or_default();
        let open = value.normalized() >= config.min_opening;

        for entity in std::iter::once(content).chain(q_children.iter_descendants(content)) {
            if let Ok(mut interactable) = q_interactables.get_mut(entity) {
                if interactable.grab_enabled != open {
                    interactable.grab_enabled = open;
                }
            }
        }

        if config.hide_content_when_closed {
            if let Ok(mut visibility) = q_visibility.get_mut(content) {
                let wanted = if open { Visibility::Inherited } else { Visibility::Hidden };
                if *visibility != wanted {
                    *visibility = wanted;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall_survey() -> ControlSurvey {
        // Button on a wall 0.05 behind it along -Z, with a frame 0.3 in front.
        ControlSurvey::from_distances([None, None, Some(4.0), None, Some(0.3), Some(0.05)])
    }

    #[test]
    fn button_pushes_towards_the_wall() {
        let input = DetectionInput {
            survey: wall_survey(),
            ..default()
        };
        let detected = detect_motion(&Control3d::button().kind, &input, &ControlConfig::default()).unwrap();
        assert_eq!(detected.motion, MotionKind::Slide { direction: Vec3::NEG_Z });
        assert!((detected.limits.max - 0.0475).abs() < 1e-5);
    }

    #[test]
    fn button_flush_with_wall_fails() {
        let input = DetectionInput {
            survey: ControlSurvey::from_distances([None, None, None, None, None, Some(0.0)]),
            ..default()
        };
        let result = detect_motion(&Control3d::button().kind, &input, &ControlConfig::default());
        assert_eq!(result, Err(SetupError::AlreadyColliding));
    }

    #[test]
    fn button_in_open_space_fails() {
        let input = DetectionInput {
            survey: ControlSurvey::from_distances([None; 6]),
            ..default()
        };
        let result = detect_motion(&Control3d::button().kind, &input, &ControlConfig::default());
        assert_eq!(result, Err(SetupError::NoAxis));
    }

    #[test]
    fn drawer_opens_towards_handle() {
        let input = DetectionInput {
            survey: ControlSurvey::from_distances([None; 6]),
            body_bounds: Some(LocalBounds::from_size(Vec3::new(0.4, 0.2, 0.5))),
            handle_bounds: Some(LocalBounds::new(Vec3::new(0.0, 0.0, 0.27), Vec3::splat(0.02))),
            ..default()
        };
        let detected = detect_motion(&Control3d::drawer().kind, &input, &ControlConfig::default()).unwrap();
        assert_eq!(detected.motion, MotionKind::Slide { direction: Vec3::Z });
        assert!((detected.limits.max - 0.475).abs() < 1e-5);
    }

    #[test]
    fn handle_inside_body_fails() {
        let input = DetectionInput {
            handle_inside_body: true,
            ..default()
        };
        let result = detect_motion(&Control3d::drawer().kind, &input, &ControlConfig::default());
        assert_eq!(result, Err(SetupError::HandleInsideBody));
    }

    #[test]
    fn door_hinges_opposite_the_handle() {
        let input = DetectionInput {
            control_bounds: Some(LocalBounds::from_size(Vec3::new(1.0, 2.0, 0.05))),
            handle_bounds: Some(LocalBounds::new(Vec3::new(0.4, 0.0, 0.05), Vec3::splat(0.03))),
            ..default()
        };
        let detected = detect_motion(&Control3d::door().kind, &input, &ControlConfig::default()).unwrap();
        match detected.motion {
            MotionKind::Hinge { axis, anchor } => {
                assert_eq!(axis, Vec3::Y);
                assert!((anchor - Vec3::new(-0.5, 0.0, 0.0)).length() < 1e-5);
            }
            other => panic!("unexpected motion {other:?}"),
        }
        assert_eq!(detected.limits, AxisLimits::new(0.0, 90.0));
    }

    #[test]
    fn chest_lid_axis_follows_handle() {
        let input = DetectionInput {
            control_bounds: Some(LocalBounds::from_size(Vec3::new(1.0, 0.1, 0.6))),
            handle_bounds: Some(LocalBounds::new(Vec3::new(0.0, 0.0, 0.32), Vec3::splat(0.03))),
            ..default()
        };
        let detected = detect_motion(&Control3d::chest().kind, &input, &ControlConfig::default()).unwrap();
        match detected.motion {
            MotionKind::Hinge { axis, anchor } => {
                assert_eq!(axis, Vec3::X);
                assert!((anchor - Vec3::new(0.0, 0.0, -0.3)).length() < 1e-5);
            }
            other => panic!("unexpected motion {other:?}"),
        }
    }

    #[test]
    fn wheel_turns_about_thinnest_axis() {
        let kind = ControlKind::Wheel(HingeSettings::wheel());
        let input = DetectionInput {
            control_bounds: Some(LocalBounds::from_size(Vec3::new(0.6, 0.6, 0.05))),
            ..default()
        };
        let detected = detect_motion(&kind, &input, &ControlConfig::default()).unwrap();
        assert_eq!(
            detected.motion,
            MotionKind::Hinge {
                axis: Vec3::Z,
                anchor: Vec3::ZERO
            }
        );
    }

    #[test]
    fn slider_limits_follow_track() {
        let kind = ControlKind::Slider(SlideSettings::default());
        let input = DetectionInput {
            body_bounds: Some(LocalBounds::new(Vec3::new(0.1, 0.0, 0.0), Vec3::new(0.5, 0.02, 0.02))),
            ..default()
        };
        let detected = detect_motion(&kind, &input, &ControlConfig::default()).unwrap();
        assert!((detected.limits.min + 0.4).abs() < 1e-5);
        assert!((detected.limits.max - 0.6).abs() < 1e-5);
    }

    #[test]
    fn measure_slide_and_hinge() {
        let slide = ControlMotion::new(
            Transform::from_xyz(1.0, 0.0, 0.0),
            DetectedMotion {
                motion: MotionKind::Slide { direction: Vec3::Z },
                limits: AxisLimits::new(0.0, 0.5),
            },
            false,
        );
        let moved = Transform::from_xyz(1.0, 0.0, 0.25);
        assert!((slide.measure(&moved) - 0.25).abs() < 1e-5);
        assert!((slide.normalized(&moved) - 0.5).abs() < 1e-5);
        // Driven past the limit, the normalized value saturates.
        assert_eq!(slide.normalized(&Transform::from_xyz(1.0, 0.0, 3.0)), 1.0);

        let hinge = ControlMotion::new(
            Transform::IDENTITY,
            DetectedMotion {
                motion: MotionKind::Hinge {
                    axis: Vec3::Y,
                    anchor: Vec3::ZERO,
                },
                limits: AxisLimits::new(0.0, 90.0),
            },
            false,
        );
        let opened = Transform::from_rotation(Quat::from_rotation_y(45f32.to_radians()));
        assert!((hinge.measure(&opened) - 45.0).abs() < 1e-3);
    }

    #[test]
    fn hinge_joint_spec_uses_radians() {
        let detected = DetectedMotion {
            motion: MotionKind::Hinge {
                axis: Vec3::Y,
                anchor: Vec3::new(-0.5, 0.0, 0.0),
            },
            limits: AxisLimits::new(0.0, 90.0),
        };
        let parent = Entity::from_raw(7);
        let spec = control_joint_spec(&detected, parent, Pose::from_translation(Vec3::X), Pose::IDENTITY);
        match spec {
            JointSpec::Hinge {
                parent_anchor, limits, ..
            } => {
                assert!((parent_anchor - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
                let [min, max] = limits.unwrap();
                assert_eq!(min, 0.0);
                assert!((max - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
            }
            other => panic!("unexpected joint {other:?}"),
        }
    }

    #[test]
    fn slide_joint_keeps_control_orientation() {
        let detected = DetectedMotion {
            motion: MotionKind::Slide { direction: Vec3::NEG_Z },
            limits: AxisLimits::new(0.0, 0.05),
        };
        let turned = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let parent_pose = Pose::new(Vec3::Y, Quat::from_rotation_x(0.3));
        let control = Pose::new(Vec3::new(0.0, 1.0, 2.0), parent_pose.rotation * turned);

        match control_joint_spec(&detected, Entity::from_raw(3), control, parent_pose) {
            JointSpec::Slide {
                relative_rotation, axis, ..
            } => {
                assert!(relative_rotation.angle_between(turned) < 1e-4);
                assert_eq!(axis, Vec3::NEG_Z);
            }
            other => panic!("unexpected joint {other:?}"),
        }
    }
}
