// src/joints.rs - Joint state store for the 6-axis arm
use std::fmt;

use serde::Serialize;

pub const JOINT_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Joint {
    J1,
    J2,
    J3,
    J4,
    J5,
    J6,
}

impl Joint {
    pub const ALL: [Joint; JOINT_COUNT] = [Joint::J1, Joint::J2, Joint::J3, Joint::J4, Joint::J5, Joint::J6];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Joint::J1 => "J1",
            Joint::J2 => "J2",
            Joint::J3 => "J3",
            Joint::J4 => "J4",
            Joint::J5 => "J5",
            Joint::J6 => "J6",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current value of every joint, in controller units (degrees or mm).
/// Always holds exactly six values in J1..J6 order.
#[derive(Debug, Clone, PartialEq)]
pub struct JointStore {
    values: [f64; JOINT_COUNT],
}

impl JointStore {
    pub fn new(initial: [f64; JOINT_COUNT]) -> Self {
        Self { values: initial }
    }

    pub fn get(&self, joint: Joint) -> f64 {
        self.values[joint.index()]
    }

    /// Add `delta` to a joint in place and return the new value.
    pub fn adjust(&mut self, joint: Joint, delta: f64) -> f64 {
        let value = &mut self.values[joint.index()];
        *value += delta;
        *value
    }

    pub fn values(&self) -> [f64; JOINT_COUNT] {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, f64)> + '_ {
        Joint::ALL.iter().map(move |&j| (j, self.values[j.index()]))
    }
}

impl Default for JointStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_INITIAL_POSE)
    }
}
