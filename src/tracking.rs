// src/tracking.rs - Pinch tracking and finger counting from hand landmarks
use nalgebra::Point2;
use tracing::debug;

// MediaPipe hand landmark indices
pub const THUMB_TIP: usize = 4;
pub const INDEX_FINGER_TIP: usize = 8;
pub const HAND_LANDMARK_COUNT: usize = 21;

pub const FINGER_COUNT: usize = 5;

/// The parts of one detected hand the pipeline consumes, in pixel
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandLandmarks {
    index_tip: Point2<f64>,
    thumb_tip: Point2<f64>,
    /// Extended state per finger, thumb first.
    pub fingers_up: [bool; FINGER_COUNT],
}

impl HandLandmarks {
    pub fn new(index_tip: Point2<f64>, thumb_tip: Point2<f64>, fingers_up: [bool; FINGER_COUNT]) -> Self {
        Self { index_tip, thumb_tip, fingers_up }
    }

    /// Pick the tips out of a full landmark list in MediaPipe order.
    /// `None` if the list is too short to contain them.
    pub fn from_landmarks(landmarks: &[Point2<f64>], fingers_up: [bool; FINGER_COUNT]) -> Option<Self> {
        let index_tip = *landmarks.get(INDEX_FINGER_TIP)?;
        let thumb_tip = *landmarks.get(THUMB_TIP)?;
        Some(Self::new(index_tip, thumb_tip, fingers_up))
    }

    pub fn index_tip(&self) -> Point2<f64> {
        self.index_tip
    }

    pub fn thumb_tip(&self) -> Point2<f64> {
        self.thumb_tip
    }

    pub fn pinch_distance(&self) -> f64 {
        nalgebra::distance(&self.thumb_tip(), &self.index_tip())
    }
}

/// Index-fingertip travel since the pinch reference was latched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    pub dx_px: f64,
    pub dy_px: f64,
    pub cm_x: f64,
    pub cm_y: f64,
}

/// Number of fingers the detector reports as extended.
pub fn count_extended_fingers(fingers_up: &[bool; FINGER_COUNT]) -> u8 {
    fingers_up.iter().filter(|&&up| up).count() as u8
}

#[derive(Debug, Clone)]
pub struct GestureSession {
    ref_x: Option<f64>,
    ref_y: Option<f64>,
    engaged: bool,
    pinch_threshold_px: f64,
    pixels_per_cm: f64,
    reset_on_release: bool,
}

impl GestureSession {
    pub fn new(pinch_threshold_px: f64, pixels_per_cm: f64, reset_on_release: bool) -> Self {
        Self {
            ref_x: None,
            ref_y: None,
            engaged: false,
            pinch_threshold_px,
            pixels_per_cm,
            reset_on_release,
        }
    }

    /// Feed one frame's hand. Returns the displacement while pinching,
    /// `None` when the thumb and index tips are too far apart.
    pub fn observe(&mut self, hand: &HandLandmarks) -> Option<Displacement> {
        let distance = hand.pinch_distance();
        if distance >= self.pinch_threshold_px {
            if self.engaged {
                debug!(distance, "pinch released");
            }
            self.engaged = false;
            if self.reset_on_release {
                self.reset();
            }
            return None;
        }

        let tip = hand.index_tip();
        let ref_x = *self.ref_x.get_or_insert(tip.x);
        let ref_y = *self.ref_y.get_or_insert(tip.y);
        if !self.engaged {
            debug!(ref_x, ref_y, "pinch engaged");
        }
        self.engaged = true;

        let dx_px = tip.x - ref_x;
        let dy_px = tip.y - ref_y;
        Some(Displacement {
            dx_px,
            dy_px,
            cm_x: dx_px / self.pixels_per_cm,
            cm_y: dy_px / self.pixels_per_cm,
        })
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn reference(&self) -> Option<Point2<f64>> {
        match (self.ref_x, self.ref_y) {
            (Some(x), Some(y)) => Some(Point2::new(x, y)),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.ref_x = None;
        self.ref_y = None;
    }
}

#[cfg(test)]
pub(crate) fn make_hand(index: (f64, f64), thumb: (f64, f64), fingers_up: [bool; FINGER_COUNT]) -> HandLandmarks {
    HandLandmarks::new(Point2::new(index.0, index.1), Point2::new(thumb.0, thumb.1), fingers_up)
}
