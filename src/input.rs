//! Controller input state machine.
//!
//! The device layer writes raw button and axis signals into
//! [`RawControllerInput`] every tick. [`update_controller_states`] turns them
//! into edge events ([`ButtonEvent`], [`AxisChanged`]) and then into semantic
//! alias events ([`AliasEvent`]) through the controller's
//! [`ButtonAliasProfile`].

use bevy::prelude::*;

use crate::config::InputConfig;
use crate::device::{TrackedController, VelocityEstimator};

/// Physical controller buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum ControllerButton {
    Trigger,
    Grip,
    Touchpad,
    ButtonOne,
    ButtonTwo,
    StartMenu,
}

impl ControllerButton {
    pub const ALL: [ControllerButton; 6] = [
        ControllerButton::Trigger,
        ControllerButton::Grip,
        ControllerButton::Touchpad,
        ControllerButton::ButtonOne,
        ControllerButton::ButtonTwo,
        ControllerButton::StartMenu,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// The two signals a button can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum ButtonAction {
    Touch,
    Press,
}

/// One physical input signal: a button plus the kind of contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub struct ButtonInput {
    pub button: ControllerButton,
    pub action: ButtonAction,
}

impl ButtonInput {
    pub const fn press(button: ControllerButton) -> Self {
        Self {
            button,
            action: ButtonAction::Press,
        }
    }

    pub const fn touch(button: ControllerButton) -> Self {
        Self {
            button,
            action: ButtonAction::Touch,
        }
    }
}

/// Analogue controller axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum ControllerAxis {
    /// Trigger pull in `x` (0..1).
    Trigger,
    /// Grip squeeze in `x` (0..1).
    Grip,
    /// Touchpad / thumbstick position (-1..1 on both axes).
    Touchpad,
}

impl ControllerAxis {
    pub const ALL: [ControllerAxis; 3] = [
        ControllerAxis::Trigger,
        ControllerAxis::Grip,
        ControllerAxis::Touchpad,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Raw per-tick input written by the device layer.
#[derive(Component, Reflect, Debug, Clone, Default, PartialEq)]
#[reflect(Component)]
pub struct RawControllerInput {
    pub pressed: [bool; 6],
    pub touched: [bool; 6],
    pub axes: [Vec2; 3],
    /// Device-reported linear velocity, when the device API provides one.
    pub velocity: Option<Vec3>,
    /// Device-reported angular velocity, when the device API provides one.
    pub angular_velocity: Option<Vec3>,
}

impl RawControllerInput {
    pub fn set_pressed(&mut self, button: ControllerButton, pressed: bool) {
        self.pressed[button.slot()] = pressed;
    }

    pub fn set_touched(&mut self, button: ControllerButton, touched: bool) {
        self.touched[button.slot()] = touched;
    }

    pub fn set_axis(&mut self, axis: ControllerAxis, value: Vec2) {
        self.axes[axis.slot()] = value;
    }

    /// Builder: press a button.
    pub fn with_pressed(mut self, button: ControllerButton) -> Self {
        self.set_pressed(button, true);
        self
    }
}

/// Logical interaction roles bound to physical inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum ButtonAlias {
    Pointer,
    Grab,
    Use,
    Menu,
    UiClick,
}

impl ButtonAlias {
    pub const ALL: [ButtonAlias; 5] = [
        ButtonAlias::Pointer,
        ButtonAlias::Grab,
        ButtonAlias::Use,
        ButtonAlias::Menu,
        ButtonAlias::UiClick,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// One alias binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub struct AliasBinding {
    pub alias: ButtonAlias,
    pub input: ButtonInput,
}

/// Alias table of a controller.
///
/// Bindings are many-to-many: several inputs may drive one alias (the alias
/// is on while any of them is active) and one input may drive several
/// aliases. Inputs with no binding produce no alias events.
#[derive(Component, Reflect, Debug, Clone, PartialEq)]
#[reflect(Component)]
pub struct ButtonAliasProfile {
    pub bindings: Vec<AliasBinding>,
}

impl Default for ButtonAliasProfile {
    fn default() -> Self {
        Self::empty()
            .with_binding(ButtonAlias::Pointer, ButtonInput::press(ControllerButton::Touchpad))
            .with_binding(ButtonAlias::Grab, ButtonInput::press(ControllerButton::Grip))
            .with_binding(ButtonAlias::Use, ButtonInput::press(ControllerButton::Trigger))
            .with_binding(ButtonAlias::UiClick, ButtonInput::press(ControllerButton::Trigger))
            .with_binding(ButtonAlias::Menu, ButtonInput::press(ControllerButton::ButtonTwo))
    }
}

impl ButtonAliasProfile {
    /// A profile without any binding.
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Builder: add a binding.
    pub fn with_binding(mut self, alias: ButtonAlias, input: ButtonInput) -> Self {
        self.bind(alias, input);
        self
    }

    /// Add a binding. Duplicates are ignored.
    pub fn bind(&mut self, alias: ButtonAlias, input: ButtonInput) {
        let binding = AliasBinding { alias, input };
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
        }
    }

    /// Remove every binding of `alias`.
    pub fn unbind(&mut self, alias: ButtonAlias) {
        self.bindings.retain(|b| b.alias != alias);
    }

    /// Aliases driven by `input`.
    pub fn aliases_for(&self, input: ButtonInput) -> impl Iterator<Item = ButtonAlias> + '_ {
        self.bindings
            .iter()
            .filter(move |b| b.input == input)
            .map(|b| b.alias)
    }

    /// Inputs driving `alias`.
    pub fn inputs_for(&self, alias: ButtonAlias) -> impl Iterator<Item = ButtonInput> + '_ {
        self.bindings
            .iter()
            .filter(move |b| b.alias == alias)
            .map(|b| b.input)
    }
}

/// A single change detected by [`ControllerState::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputTransition {
    Button { input: ButtonInput, active: bool },
    Axis { axis: ControllerAxis, value: Vec2 },
}

/// Derived controller snapshot. Only the input systems write it.
#[derive(Component, Reflect, Debug, Clone, Default, PartialEq)]
#[reflect(Component)]
pub struct ControllerState {
    pressed: [bool; 6],
    touched: [bool; 6],
    axes: [Vec2; 3],
    aliases: [bool; 5],
    touchpad_angle: f32,
    /// Linear velocity (device-reported or estimated).
    pub velocity: Vec3,
    /// Angular velocity (device-reported or estimated).
    pub angular_velocity: Vec3,
}

impl ControllerState {
    /// Whether a physical input is currently active.
    pub fn is_active(&self, input: ButtonInput) -> bool {
        let slot = input.button.slot();
        match input.action {
            ButtonAction::Press => self.pressed[slot],
            ButtonAction::Touch => self.touched[slot],
        }
    }

    /// Whether a button is pressed.
    pub fn is_pressed(&self, button: ControllerButton) -> bool {
        self.pressed[button.slot()]
    }

    /// Whether an alias is currently on.
    pub fn is_alias_active(&self, alias: ButtonAlias) -> bool {
        self.aliases[alias.slot()]
    }

    /// Last reported (rounded) axis value.
    pub fn axis(&self, axis: ControllerAxis) -> Vec2 {
        self.axes[axis.slot()]
    }

    /// Touchpad angle in degrees: 0 is up, increasing clockwise, in [0, 360).
    pub fn touchpad_angle(&self) -> f32 {
        self.touchpad_angle
    }

    /// Fold one tick of raw input into the snapshot and report what changed.
    ///
    /// A button transition is reported exactly once; holding a state produces
    /// nothing. Axis values are rounded to `config.axis_fidelity` decimals
    /// and only reported when the rounded value differs.
    pub fn apply(&mut self, raw: &RawControllerInput, config: &InputConfig) -> Vec<InputTransition> {
        let mut transitions = Vec::new();

        for button in ControllerButton::ALL {
            let slot = button.slot();
            if self.touched[slot] != raw.touched[slot] {
                self.touched[slot] = raw.touched[slot];
                transitions.push(InputTransition::Button {
                    input: ButtonInput::touch(button),
                    active: raw.touched[slot],
                });
            }
            if self.pressed[slot] != raw.pressed[slot] {
                self.pressed[slot] = raw.pressed[slot];
                transitions.push(InputTransition::Button {
                    input: ButtonInput::press(button),
                    active: raw.pressed[slot],
                });
            }
        }

        for axis in ControllerAxis::ALL {
            let slot = axis.slot();
            let raw_value = raw.axes[slot];
            let rounded = Vec2::new(config.round_axis(raw_value.x), config.round_axis(raw_value.y));
            if rounded != self.axes[slot] {
                self.axes[slot] = rounded;
                if axis == ControllerAxis::Touchpad {
                    self.touchpad_angle = touchpad_angle(rounded);
                }
                transitions.push(InputTransition::Axis {
                    axis,
                    value: rounded,
                });
            }
        }

        transitions
    }

    /// Recompute alias states from the physical inputs and report changes.
    pub fn update_aliases(&mut self, profile: &ButtonAliasProfile) -> Vec<(ButtonAlias, bool)> {
        let mut changes = Vec::new();
        for alias in ButtonAlias::ALL {
            let active = profile.inputs_for(alias).any(|input| self.is_active(input));
            let slot = alias.slot();
            if self.aliases[slot] != active {
                self.aliases[slot] = active;
                changes.push((alias, active));
            }
        }
        changes
    }
}

/// Angle of a touchpad position in degrees (0 = up, clockwise).
pub fn touchpad_angle(axis: Vec2) -> f32 {
    if axis == Vec2::ZERO {
        return 0.0;
    }
    let angle = axis.x.atan2(axis.y).to_degrees();
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}

/// A physical input started or stopped.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ButtonEvent {
    pub controller: Entity,
    pub input: ButtonInput,
    pub active: bool,
}

/// An axis moved beyond the rounding fidelity.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct AxisChanged {
    pub controller: Entity,
    pub axis: ControllerAxis,
    pub value: Vec2,
    /// Touchpad angle in degrees, for [`ControllerAxis::Touchpad`] only.
    pub angle: Option<f32>,
}

/// An alias turned on or off.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasEvent {
    pub controller: Entity,
    pub alias: ButtonAlias,
    pub active: bool,
}

/// Haptic request from gameplay code, strength in 0..1 of the device maximum.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct HapticPulseRequest {
    pub controller: Entity,
    pub strength: f32,
    pub duration: f32,
}

/// Clamped haptic pulse for the device layer.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct HapticPulse {
    pub controller: Entity,
    pub strength: f32,
    pub duration: f32,
}

impl HapticPulseRequest {
    /// Clamp the request into the device's accepted range.
    pub fn clamped(&self, max_strength: f32) -> HapticPulse {
        HapticPulse {
            controller: self.controller,
            strength: (self.strength.clamp(0.0, 1.0) * max_strength).min(max_strength),
            duration: self.duration.max(0.0),
        }
    }
}

/// Edge-detect raw input, then dispatch aliases.
///
/// Controllers with a [`TrackedController`] that has not resolved its device
/// are skipped: their input is not trustworthy yet.
pub fn update_controller_states(
    config: Res<InputConfig>,
    mut q_controllers: Query<(
        Entity,
        &RawControllerInput,
        &mut ControllerState,
        Option<&ButtonAliasProfile>,
        Option<&TrackedController>,
        Option<&VelocityEstimator>,
    )>,
    mut button_events: EventWriter<ButtonEvent>,
    mut axis_events: EventWriter<AxisChanged>,
    mut alias_events: EventWriter<AliasEvent>,
) {
    for (controller, raw, mut state, profile, tracked, estimator) in &mut q_controllers {
        if tracked.is_some_and(|t| !t.is_resolved()) {
            continue;
        }

        for transition in state.apply(raw, &config) {
            match transition {
                InputTransition::Button { input, active } => {
                    button_events.write(ButtonEvent {
                        controller,
                        input,
                        active,
                    });
                }
                InputTransition::Axis { axis, value } => {
                    axis_events.write(AxisChanged {
                        controller,
                        axis,
                        value,
                        angle: (axis == ControllerAxis::Touchpad).then(|| state.touchpad_angle()),
                    });
                }
            }
        }

        if let Some(profile) = profile {
            for (alias, active) in state.update_aliases(profile) {
                alias_events.write(AliasEvent {
                    controller,
                    alias,
                    active,
                });
            }
        }

        let velocity = raw
            .velocity
            .or_else(|| estimator.map(VelocityEstimator::velocity))
            .unwrap_or(Vec3::ZERO);
        let angular_velocity = raw
            .angular_velocity
            .or_else(|| estimator.map(VelocityEstimator::angular_velocity))
            .unwrap_or(Vec3::ZERO);
        if state.velocity != velocity {
            state.velocity = velocity;
        }
        if state.angular_velocity != angular_velocity {
            state.angular_velocity = angular_velocity;
        }
    }
}

/// Clamp haptic requests and forward them to the device layer.
pub fn forward_haptic_requests(
    config: Res<InputConfig>,
    mut requests: EventReader<HapticPulseRequest>,
    mut pulses: EventWriter<HapticPulse>,
) {
    for request in requests.read() {
        pulses.write(request.clamped(config.max_haptic_strength));
    }
}
