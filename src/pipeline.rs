// src/pipeline.rs - Per-frame gesture to joint command pipeline
use std::io::{Read, Write};

use serde::Serialize;
use tracing::debug;

use crate::config::ControlConfig;
use crate::joints::{Joint, JointStore};
use crate::mapper::{Adjustment, MovementMapper};
use crate::protocol::{ProtocolClient, SendOutcome};
use crate::tracking::{count_extended_fingers, Displacement, GestureSession, HandLandmarks};

/// What happened on one frame. Everything here is informational; the
/// controller only ever sees the commands.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub hand_present: bool,
    pub displacement: Option<Displacement>,
    /// Finger count of this frame, only computed while pinching.
    pub finger_count: Option<u8>,
    pub adjustment: Option<Adjustment>,
    pub delivery: Option<SendOutcome>,
    /// Last finger count seen, kept across frames for display.
    pub shown_finger_count: Option<u8>,
    /// Joint most recently selected, kept across frames for display.
    pub shown_joint: Option<Joint>,
}

impl FrameReport {
    pub fn engaged(&self) -> bool {
        self.displacement.is_some()
    }
}

/// Snapshot suitable for overlays: displacement in cm, finger count, joint name.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DisplayState {
    pub moved_x_cm: Option<f64>,
    pub moved_y_cm: Option<f64>,
    pub finger_count: Option<u8>,
    pub joint: Option<Joint>,
}

impl From<&FrameReport> for DisplayState {
    fn from(report: &FrameReport) -> Self {
        Self {
            moved_x_cm: report.displacement.map(|d| d.cm_x),
            moved_y_cm: report.displacement.map(|d| d.cm_y),
            finger_count: report.shown_finger_count,
            joint: report.shown_joint,
        }
    }
}

pub struct GesturePipeline {
    joints: JointStore,
    session: GestureSession,
    mapper: MovementMapper,
    last_finger_count: Option<u8>,
    last_joint: Option<Joint>,
}

impl GesturePipeline {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            joints: JointStore::new(config.initial_pose),
            session: GestureSession::new(
                config.pinch_threshold_px,
                config.pixels_per_cm,
                config.reset_reference_on_release,
            ),
            mapper: MovementMapper::new(config.adjustment_step),
            last_finger_count: None,
            last_joint: None,
        }
    }

    /// Run one frame through tracking, classification and mapping, and send
    /// a command when a joint actually moved. A failed send leaves the joint
    /// update in place.
    pub fn process_frame<S: Read + Write>(
        &mut self,
        hand: Option<&HandLandmarks>,
        client: &mut ProtocolClient<S>,
    ) -> FrameReport {
        let mut report = FrameReport {
            hand_present: hand.is_some(),
            ..FrameReport::default()
        };

        if let Some(hand) = hand {
            if let Some(displacement) = self.session.observe(hand) {
                report.displacement = Some(displacement);

                let count = count_extended_fingers(&hand.fingers_up);
                report.finger_count = Some(count);
                self.last_finger_count = Some(count);

                if let Some(adjustment) = self.mapper.apply(count, &displacement, &mut self.joints) {
                    self.last_joint = Some(adjustment.joint);
                    debug!(
                        joint = %adjustment.joint,
                        movement = adjustment.movement,
                        delta = adjustment.delta,
                        value = adjustment.value,
                        "joint adjustment"
                    );
                    if adjustment.delta != 0.0 {
                        report.delivery = Some(client.send_command(&self.joints));
                    }
                    report.adjustment = Some(adjustment);
                }
            }
        }

        report.shown_finger_count = self.last_finger_count;
        report.shown_joint = self.last_joint;
        report
    }

    pub fn joints(&self) -> &JointStore {
        &self.joints
    }

    pub fn session(&self) -> &GestureSession {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{format_command, ScriptedStream};
    use crate::tracking::make_hand;
    use std::time::Duration;

    const NO_FINGERS: [bool; 5] = [false; 5];
    const ONE: [bool; 5] = [false, true, false, false, false];

    fn pinching(x: f64, y: f64, fingers: [bool; 5]) -> HandLandmarks {
        make_hand((x, y), (x + 4.0, y + 3.0), fingers)
    }

    fn setup(stream: ScriptedStream) -> (GesturePipeline, ProtocolClient<ScriptedStream>) {
        let pipeline = GesturePipeline::new(&ControlConfig::default());
        let client = ProtocolClient::from_stream(stream, Duration::from_millis(100), 1024);
        (pipeline, client)
    }

    #[test]
    fn test_odd_displacement_sends_nothing() {
        let (mut pipeline, mut client) = setup(ScriptedStream::new());

        pipeline.process_frame(Some(&pinching(100.0, 200.0, NO_FINGERS)), &mut client);
        let report = pipeline.process_frame(Some(&pinching(137.0, 200.0, ONE)), &mut client);

        let d = report.displacement.unwrap();
        assert!((d.cm_x - 1.0).abs() < 1e-12);
        assert_eq!(report.adjustment.unwrap().delta, 0.0);
        assert!(report.delivery.is_none());
        assert_eq!(pipeline.joints(), &JointStore::default());
        assert!(client.get_ref().writes.is_empty());
    }

    #[test]
    fn test_even_displacement_sends_command() {
        let (mut pipeline, mut client) = setup(ScriptedStream::new().reply("True"));

        pipeline.process_frame(Some(&pinching(100.0, 200.0, NO_FINGERS)), &mut client);
        let report = pipeline.process_frame(Some(&pinching(174.0, 200.0, ONE)), &mut client);

        assert_eq!(report.delivery, Some(SendOutcome::Confirmed));
        assert!((pipeline.joints().get(Joint::J1) - 5.4).abs() < 1e-9);
        assert_eq!(
            client.get_ref().writes,
            vec!["1,(5.400,-101.980,162.100,0.560,43.930,1.730)(3,0)".to_string()]
        );
        assert_eq!(report.shown_joint, Some(Joint::J1));
        assert_eq!(report.shown_finger_count, Some(1));
    }

    #[test]
    fn test_rejected_send_keeps_update() {
        let (mut pipeline, mut client) = setup(ScriptedStream::new().reply("False"));

        pipeline.process_frame(Some(&pinching(100.0, 200.0, NO_FINGERS)), &mut client);
        let report = pipeline.process_frame(Some(&pinching(174.0, 200.0, ONE)), &mut client);

        assert_eq!(report.delivery, Some(SendOutcome::Rejected("False".to_string())));
        assert!((pipeline.joints().get(Joint::J1) - 5.4).abs() < 1e-9);
        assert_eq!(client.stats().failed, 1);
    }

    #[test]
    fn test_open_hand_does_nothing() {
        let (mut pipeline, mut client) = setup(ScriptedStream::new());

        // Thumb 25 px from the index tip
        for fingers in [NO_FINGERS, ONE, [true; 5]] {
            let hand = make_hand((100.0, 200.0), (125.0, 200.0), fingers);
            let report = pipeline.process_frame(Some(&hand), &mut client);
            assert!(!report.engaged());
            assert!(report.finger_count.is_none());
            assert!(report.adjustment.is_none());
        }
        assert_eq!(pipeline.joints(), &JointStore::default());
        assert!(pipeline.session().reference().is_none());
        assert!(client.get_ref().writes.is_empty());
    }

    #[test]
    fn test_zero_fingers_never_moves() {
        let (mut pipeline, mut client) = setup(ScriptedStream::new());

        for x in [100.0, 150.0, 174.0, 250.0] {
            let report = pipeline.process_frame(Some(&pinching(x, 200.0, NO_FINGERS)), &mut client);
            assert_eq!(report.finger_count, Some(0));
            assert!(report.adjustment.is_none());
        }
        assert_eq!(pipeline.joints(), &JointStore::default());
        assert!(client.get_ref().writes.is_empty());
    }

    #[test]
    fn test_missing_hand_preserves_state() {
        let (mut pipeline, mut client) = setup(ScriptedStream::new().reply("True"));

        pipeline.process_frame(Some(&pinching(100.0, 200.0, NO_FINGERS)), &mut client);
        let report = pipeline.process_frame(None, &mut client);
        assert!(!report.hand_present);
        assert!(report.displacement.is_none());
        assert_eq!(report.shown_finger_count, Some(0));
        assert!(pipeline.session().is_engaged());

        // Reference from before the gap still applies
        let report = pipeline.process_frame(Some(&pinching(100.0, 126.0, [true, true, false, false, false])), &mut client);
        let adj = report.adjustment.unwrap();
        assert_eq!(adj.joint, Joint::J2);
        assert_eq!(adj.delta, -5.0);
        assert_eq!(client.get_ref().writes[0], format_command(pipeline.joints()));
    }

    #[test]
    fn test_first_pinch_frame_steps_down() {
        // Zero displacement counts as a non-positive even move
        let (mut pipeline, mut client) = setup(ScriptedStream::new().reply("True"));
        let report = pipeline.process_frame(Some(&pinching(100.0, 200.0, ONE)), &mut client);
        assert_eq!(report.adjustment.unwrap().delta, -5.0);
        assert!((pipeline.joints().get(Joint::J1) + 4.6).abs() < 1e-9);
        assert!(report.delivery.unwrap().is_confirmed());
    }

    #[test]
    fn test_display_state() {
        let (mut pipeline, mut client) = setup(ScriptedStream::new());
        pipeline.process_frame(Some(&pinching(100.0, 200.0, NO_FINGERS)), &mut client);
        let report = pipeline.process_frame(Some(&pinching(137.0, 237.0, ONE)), &mut client);
        let display = DisplayState::from(&report);
        assert_eq!(display.finger_count, Some(1));
        assert_eq!(display.joint, Some(Joint::J1));
        assert!((display.moved_x_cm.unwrap() - 1.0).abs() < 1e-12);
        assert!((display.moved_y_cm.unwrap() - 1.0).abs() < 1e-12);
    }
}
