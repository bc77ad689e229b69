//! Geometric auto-detection of a control's motion.
//!
//! Everything here is pure: survey distances and part bounds go in, a motion
//! axis, direction and travel come out. All bounds are expressed in the
//! control's own local frame.

use bevy::prelude::*;

use crate::error::SetupError;
use crate::pose::{LocalAxis, Pose};

/// Activation travel below this is treated as "already touching".
pub const MIN_ACTIVATION: f32 = 0.001;

/// Distances closer than this are considered equal when comparing axes.
pub const DETECTION_EPSILON: f32 = 1e-4;

/// One of the six local cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub struct AxisDirection {
    pub axis: LocalAxis,
    pub positive: bool,
}

impl AxisDirection {
    pub fn new(axis: LocalAxis, positive: bool) -> Self {
        Self { axis, positive }
    }

    pub fn sign(&self) -> f32 {
        if self.positive {
            1.0
        } else {
            -1.0
        }
    }

    pub fn unit(&self) -> Vec3 {
        self.axis.unit() * self.sign()
    }

    pub fn opposite(&self) -> Self {
        Self::new(self.axis, !self.positive)
    }
}

/// Obstruction distances along the six local directions, measured outward
/// from the control's bounds.
///
/// Filled by the physics backend's sensor system while the control is
/// auto-detecting. `None` means the survey ray hit nothing.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct ControlSurvey {
    distances: [Option<f32>; 6],
    ready: bool,
}

impl ControlSurvey {
    /// Survey with all six results known, in the order
    /// `+X, -X, +Y, -Y, +Z, -Z`.
    pub fn from_distances(distances: [Option<f32>; 6]) -> Self {
        Self {
            distances,
            ready: true,
        }
    }

    fn slot(direction: AxisDirection) -> usize {
        direction.axis.slot() * 2 + usize::from(!direction.positive)
    }

    pub fn record(&mut self, direction: AxisDirection, distance: Option<f32>) {
        self.distances[Self::slot(direction)] = distance;
    }

    /// Mark all six directions as surveyed.
    pub fn finish(&mut self) {
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Forget previous results so the control is surveyed again.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn distance(&self, direction: AxisDirection) -> Option<f32> {
        self.distances[Self::slot(direction)]
    }

    /// Combined length of the two rays along `axis`; a miss counts as
    /// `ray_length`.
    pub fn pair_length(&self, axis: LocalAxis, ray_length: f32) -> f32 {
        [true, false]
            .into_iter()
            .map(|positive| {
                self.distance(AxisDirection::new(axis, positive))
                    .map_or(ray_length, |d| d.min(ray_length))
            })
            .sum()
    }
}

/// The axis whose ray pair is shortest.
///
/// Ties within [`DETECTION_EPSILON`] go to the earlier axis in X, Y, Z
/// order. Returns `None` when no ray hit anything.
pub fn detect_axis(survey: &ControlSurvey, ray_length: f32) -> Option<LocalAxis> {
    let mut best: Option<(LocalAxis, f32)> = None;
    for axis in LocalAxis::ALL {
        let length = survey.pair_length(axis, ray_length);
        if length >= 2.0 * ray_length - DETECTION_EPSILON {
            continue;
        }
        match best {
            Some((_, best_length)) if length >= best_length - DETECTION_EPSILON => {}
            _ => best = Some((axis, length)),
        }
    }
    best.map(|(axis, _)| axis)
}

/// The side of `axis` with the nearer obstruction (positive on ties).
pub fn nearer_side(survey: &ControlSurvey, axis: LocalAxis, ray_length: f32) -> AxisDirection {
    let positive = survey
        .distance(AxisDirection::new(axis, true))
        .unwrap_or(ray_length);
    let negative = survey
        .distance(AxisDirection::new(axis, false))
        .unwrap_or(ray_length);
    AxisDirection::new(axis, positive <= negative + DETECTION_EPSILON)
}

/// Shrink an obstruction distance by the safety factor.
pub fn activation_distance(obstruction: f32, safety_factor: f32) -> Result<f32, SetupError> {
    let distance = obstruction * safety_factor;
    if distance < MIN_ACTIVATION {
        Err(SetupError::AlreadyColliding)
    } else {
        Ok(distance)
    }
}

/// Axis-aligned box in some local frame.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
pub struct LocalBounds {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Default for LocalBounds {
    fn default() -> Self {
        Self::from_size(Vec3::ONE)
    }
}

impl LocalBounds {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
        }
    }

    /// Box of `size` centred on the origin.
    pub fn from_size(size: Vec3) -> Self {
        Self::new(Vec3::ZERO, size * 0.5)
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    /// Re-express bounds of a part at `part` (world pose) in the frame at
    /// `frame` (world pose). Rotated boxes grow to stay axis-aligned.
    pub fn in_frame(&self, part: Pose, frame: Pose) -> LocalBounds {
        let relative = frame.relative(part);
        let rotation = Mat3::from_quat(relative.rotation);
        let abs = Mat3::from_cols(rotation.x_axis.abs(), rotation.y_axis.abs(), rotation.z_axis.abs());
        LocalBounds::new(relative.transform_point(self.center), abs * self.half_extents)
    }

    pub fn extent(&self, axis: LocalAxis) -> f32 {
        axis.component(self.half_extents) * 2.0
    }
}

/// The candidate axis along which the handle sticks out of the body the
/// most, and which side it is on.
///
/// Returns `None` when the handle is centred on the body along every
/// candidate.
pub fn sub_direction(handle: &LocalBounds, body: &LocalBounds, candidates: &[LocalAxis]) -> Option<AxisDirection> {
    let offset = handle.center - body.center;
    let mut best: Option<(AxisDirection, f32)> = None;
    for &axis in candidates {
        let along = axis.component(offset);
        if along.abs() <= DETECTION_EPSILON {
            continue;
        }
        let protrusion = along.abs() + axis.component(handle.half_extents) - axis.component(body.half_extents);
        match best {
            Some((_, best_protrusion)) if protrusion <= best_protrusion + DETECTION_EPSILON => {}
            _ => best = Some((AxisDirection::new(axis, along > 0.0), protrusion)),
        }
    }
    best.map(|(direction, _)| direction)
}

/// Candidate axis with the largest extent (earlier axis on ties).
pub fn largest_extent_axis(bounds: &LocalBounds, candidates: &[LocalAxis]) -> Option<LocalAxis> {
    candidates.iter().copied().fold(None, |best, axis| match best {
        Some(b) if bounds.extent(axis) <= bounds.extent(b) + DETECTION_EPSILON => Some(b),
        _ => Some(axis),
    })
}

/// Candidate axis with the smallest extent (earlier axis on ties).
pub fn smallest_extent_axis(bounds: &LocalBounds, candidates: &[LocalAxis]) -> Option<LocalAxis> {
    candidates.iter().copied().fold(None, |best, axis| match best {
        Some(b) if bounds.extent(axis) >= bounds.extent(b) - DETECTION_EPSILON => Some(b),
        _ => Some(axis),
    })
}

/// Signed rotation (radians) of `current` relative to `rest` about the
/// local `axis`, in `(-π, π]`.
pub fn hinge_angle(rest: Quat, current: Quat, axis: Vec3) -> f32 {
    let delta = rest.inverse() * current;
    let twist = Vec3::new(delta.x, delta.y, delta.z).dot(axis.normalize_or_zero());
    let mut angle = 2.0 * twist.atan2(delta.w);
    if angle > std::f32::consts::PI {
        angle -= std::f32::consts::TAU;
    } else if angle <= -std::f32::consts::PI {
        angle += std::f32::consts::TAU;
    }
    angle
}
