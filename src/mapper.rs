// src/mapper.rs - Finger count + displacement to joint adjustment
use crate::joints::{Joint, JointStore};
use crate::tracking::Displacement;

/// Which displacement component drives the selected joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    NegatedY,
}

impl Axis {
    pub fn pick(self, displacement: &Displacement) -> f64 {
        match self {
            Axis::X => displacement.cm_x,
            Axis::Y => displacement.cm_y,
            Axis::NegatedY => -displacement.cm_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub joint: Joint,
    /// Displacement (cm) along the driving axis.
    pub movement: f64,
    /// One of `-step`, `0`, `+step`.
    pub delta: f64,
    /// Joint value after the delta was applied.
    pub value: f64,
}

/// Step policy: the integer part of the movement decides. An even integer
/// part moves one step in the movement's direction, an odd one holds still.
/// Zero movement counts as non-positive with an even integer part, so it
/// yields `-step`.
///
/// Output toggles between a step and no step as the fingertip crosses each
/// whole centimetre, even when moving steadily in one direction.
pub fn quantize(movement: f64, step: f64) -> f64 {
    let even = movement.trunc().abs() % 2.0 == 0.0;
    match (movement > 0.0, even) {
        (true, true) => step,
        (false, true) => -step,
        (_, false) => 0.0,
    }
}

#[derive(Debug, Clone)]
pub struct MovementMapper {
    step: f64,
}

impl MovementMapper {
    pub fn new(step: f64) -> Self {
        Self { step }
    }

    /// Joint and driving axis for a finger count. J6 has no gesture.
    pub fn select(count: u8) -> Option<(Joint, Axis)> {
        match count {
            1 => Some((Joint::J1, Axis::X)),
            2 => Some((Joint::J2, Axis::Y)),
            3 => Some((Joint::J3, Axis::NegatedY)),
            4 => Some((Joint::J4, Axis::X)),
            5 => Some((Joint::J5, Axis::Y)),
            _ => None,
        }
    }

    /// Apply one frame's adjustment to the store. Returns `None` when the
    /// finger count selects no joint, in which case the store is untouched.
    pub fn apply(&self, count: u8, displacement: &Displacement, joints: &mut JointStore) -> Option<Adjustment> {
        let (joint, axis) = Self::select(count)?;
        let movement = axis.pick(displacement);
        let delta = quantize(movement, self.step);
        let value = if delta != 0.0 {
            joints.adjust(joint, delta)
        } else {
            joints.get(joint)
        };

        Some(Adjustment { joint, movement, delta, value })
    }
}
