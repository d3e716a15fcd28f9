// src/landmarks.rs - Per-frame hand landmarks from the external detector
//
// The detector writes one JSON object per frame:
//   {"hands":[{"lmList":[[x,y,z],...],"fingers":[0,1,0,0,0]}]}
// Pixel coordinates, MediaPipe landmark order, at most one hand used.
use std::io::BufRead;

use nalgebra::Point2;
use serde::Deserialize;
use thiserror::Error;

use crate::tracking::{HandLandmarks, FINGER_COUNT, HAND_LANDMARK_COUNT};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read landmark feed: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: invalid landmark JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: expected at least 21 landmarks, got {got}")]
    TooFewLandmarks { line: usize, got: usize },
    #[error("line {line}: landmark {index} has fewer than 2 coordinates")]
    BadLandmark { line: usize, index: usize },
    #[error("line {line}: expected 5 finger states, got {got}")]
    BadFingers { line: usize, got: usize },
}

#[derive(Deserialize, Debug)]
struct HandJson {
    #[serde(rename = "lmList")]
    lm_list: Vec<Vec<f64>>,
    fingers: Vec<u8>,
}

#[derive(Deserialize, Debug)]
struct FrameJson {
    #[serde(default)]
    hands: Vec<HandJson>,
}

/// Decode one frame. `Ok(None)` means no hand was detected.
pub fn parse_frame(text: &str, line: usize) -> Result<Option<HandLandmarks>, FeedError> {
    let frame: FrameJson = serde_json::from_str(text).map_err(|source| FeedError::Json { line, source })?;
    let Some(hand) = frame.hands.into_iter().next() else {
        return Ok(None);
    };

    if hand.lm_list.len() < HAND_LANDMARK_COUNT {
        return Err(FeedError::TooFewLandmarks { line, got: hand.lm_list.len() });
    }
    let landmarks = hand
        .lm_list
        .iter()
        .enumerate()
        .map(|(index, lm)| match lm.as_slice() {
            [x, y, ..] => Ok(Point2::new(*x, *y)),
            _ => Err(FeedError::BadLandmark { line, index }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fingers_up: [bool; FINGER_COUNT] = hand
        .fingers
        .iter()
        .map(|&f| f != 0)
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| FeedError::BadFingers { line, got: hand.fingers.len() })?;

    let hand = HandLandmarks::from_landmarks(&landmarks, fingers_up)
        .ok_or(FeedError::TooFewLandmarks { line, got: landmarks.len() })?;
    Ok(Some(hand))
}

/// Iterator over frames read from a line-oriented source. Blank lines are
/// skipped; iteration ends with the input.
pub struct LandmarkFeed<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> LandmarkFeed<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for LandmarkFeed<R> {
    type Item = Result<Option<HandLandmarks>, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let text = self.buf.trim();
                    if text.is_empty() {
                        continue;
                    }
                    return Some(parse_frame(text, self.line));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
