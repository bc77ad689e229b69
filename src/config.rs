//! Configuration components and resources.
//!
//! Every tuning parameter of the input, control and presence systems lives
//! here. Grab tuning is per object and lives on
//! [`Interactable`](crate::grab::Interactable) instead.

use bevy::prelude::*;

/// Global tuning for the controller input state machine.
#[derive(Resource, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Resource)]
pub struct InputConfig {
    /// Decimal places axis values are rounded to before comparing them with
    /// the last reported value. Smaller values mean fewer axis events.
    pub axis_fidelity: u32,

    /// How many times a missing device lookup is retried before giving up.
    pub tracking_retry_attempts: u32,

    /// Delay between two device lookup attempts (seconds).
    pub tracking_retry_delay: f32,

    /// Number of pose samples averaged by the velocity estimator.
    pub velocity_samples: usize,

    /// Largest haptic strength the device accepts. Requests are clamped to it.
    pub max_haptic_strength: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            axis_fidelity: 3,
            tracking_retry_attempts: 5,
            tracking_retry_delay: 0.1,
            velocity_samples: 5,
            max_haptic_strength: 1.0,
        }
    }
}

impl InputConfig {
    /// Builder: set axis fidelity (decimal places).
    pub fn with_axis_fidelity(mut self, places: u32) -> Self {
        self.axis_fidelity = places;
        self
    }

    /// Builder: set the device lookup retry schedule.
    pub fn with_tracking_retry(mut self, attempts: u32, delay: f32) -> Self {
        self.tracking_retry_attempts = attempts;
        self.tracking_retry_delay = delay;
        self
    }

    /// Builder: set the velocity estimator window.
    pub fn with_velocity_samples(mut self, samples: usize) -> Self {
        self.velocity_samples = samples.max(1);
        self
    }

    /// Builder: set the maximum haptic strength.
    pub fn with_max_haptic_strength(mut self, strength: f32) -> Self {
        self.max_haptic_strength = strength.max(0.0);
        self
    }

    /// Round an axis component to the configured fidelity.
    pub fn round_axis(&self, value: f32) -> f32 {
        let scale = 10f32.powi(self.axis_fidelity.min(7) as i32);
        (value * scale).round() / scale
    }
}

/// Tuning for the 3D control auto-detection and value mapping.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
pub struct ControlConfig {
    /// Create the physics joints a control needs during setup.
    pub auto_create_joints: bool,

    /// Reported values are rounded to multiples of this step (0 = no rounding).
    pub step_size: f32,

    /// Factor applied to detected obstruction distances so the activation
    /// threshold is always reachable.
    pub safety_factor: f32,

    /// Maximum length of the survey rays cast from the control's bounds.
    pub ray_length: f32,

    /// Fraction of the full range a container must be open before its content
    /// becomes interactable.
    pub min_opening: f32,

    /// Hide the content hierarchy entirely while the container is closed.
    pub hide_content_when_closed: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            auto_create_joints: true,
            step_size: 1.0,
            safety_factor: 0.95,
            ray_length: 5.0,
            min_opening: 0.2,
            hide_content_when_closed: false,
        }
    }
}

impl ControlConfig {
    /// Config for controls whose joints are set up by hand.
    pub fn manual_joints() -> Self {
        Self {
            auto_create_joints: false,
            ..default()
        }
    }

    /// Builder: set the value step size.
    pub fn with_step_size(mut self, step: f32) -> Self {
        self.step_size = step.max(0.0);
        self
    }

    /// Builder: set the detection safety factor.
    pub fn with_safety_factor(mut self, factor: f32) -> Self {
        self.safety_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Builder: set the survey ray length.
    pub fn with_ray_length(mut self, length: f32) -> Self {
        self.ray_length = length;
        self
    }

    /// Builder: set the minimum opening for content interaction.
    pub fn with_min_opening(mut self, fraction: f32) -> Self {
        self.min_opening = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder: hide content while closed.
    pub fn with_hidden_content(mut self, hide: bool) -> Self {
        self.hide_content_when_closed = hide;
        self
    }
}

/// Tuning for the player presence safety net.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
pub struct PresenceConfig {
    /// How far below the highest recent headset height the headset may drop
    /// (crouching) while the position still counts as safe.
    pub crouch_threshold: f32,

    /// Vertical movement of the play area base beyond this tolerance counts as
    /// a floor change and resets the headset height watermark.
    pub floor_tolerance: f32,

    /// Seconds a headset collision must persist before the rewind. Zero
    /// rewinds on the frame the collision is reported.
    pub rewind_delay: f32,

    /// Duration of the fade back in after a rewind.
    pub blink_duration: f32,

    /// Downward speed added when a physics fall starts, so the fall is
    /// observable even from rest.
    pub fall_start_bias: f32,

    /// Speed below which a fall counts as settled.
    pub fall_stop_epsilon: f32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            crouch_threshold: 0.5,
            floor_tolerance: 0.005,
            rewind_delay: 0.0,
            blink_duration: 0.25,
            fall_start_bias: 0.001,
            fall_stop_epsilon: 0.0005,
        }
    }
}

impl PresenceConfig {
    /// Config that tolerates short headset clipping before rewinding.
    pub fn lenient() -> Self {
        Self {
            rewind_delay: 0.5,
            crouch_threshold: 0.8,
            ..default()
        }
    }

    /// Builder: set the crouch threshold.
    pub fn with_crouch_threshold(mut self, threshold: f32) -> Self {
        self.crouch_threshold = threshold;
        self
    }

    /// Builder: set the rewind delay.
    pub fn with_rewind_delay(mut self, delay: f32) -> Self {
        self.rewind_delay = delay.max(0.0);
        self
    }

    /// Builder: set the fall stop epsilon.
    pub fn with_fall_stop_epsilon(mut self, epsilon: f32) -> Self {
        self.fall_stop_epsilon = epsilon.max(0.0);
        self
    }
}
