// src/data.rs
use crate::joints::JOINT_COUNT;
use crate::pipeline::FrameReport;
use csv::Writer;
use std::path::{Path, PathBuf};
use std::fs::File;
use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CommandRecord {
    timestamp: f64,
    frame: usize,
    hand_present: bool,
    engaged: bool,

    // Displacement from the pinch reference
    moved_x_cm: Option<f64>,
    moved_y_cm: Option<f64>,

    finger_count: Option<u8>,
    joint: Option<String>,
    movement_cm: Option<f64>,
    delta: Option<f64>,

    // Pose after this frame
    j1: f64,
    j2: f64,
    j3: f64,
    j4: f64,
    j5: f64,
    j6: f64,

    delivery: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: usize,
    pub hand_frames: usize,
    pub engaged_frames: usize,
    pub adjustments: usize,
    pub confirmed: usize,
    pub failed: usize,
}

/// Streams one CSV row per frame to `<output_dir>/<session>/commands.csv`.
/// Rows are flushed as they are written, so an interrupted session keeps
/// everything recorded so far. Only the running totals stay in memory.
pub struct SessionRecorder {
    csv_path: PathBuf,
    session_name: String,
    writer: Writer<File>,
    summary: SessionSummary,
}

impl SessionRecorder {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Result<Self> {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });
        let csv_path = output_dir.as_ref()
            .join(&session_name)
            .join("commands.csv");

        // Create directory if it doesn't exist
        if let Some(parent) = csv_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = File::create(&csv_path)
            .with_context(|| format!("Failed to create {}", csv_path.display()))?;

        Ok(Self {
            csv_path,
            session_name,
            writer: Writer::from_writer(file),
            summary: SessionSummary::default(),
        })
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn add_frame(&mut self, report: &FrameReport, pose: [f64; JOINT_COUNT], timestamp: f64) -> Result<()> {
        let record = Self::create_record(self.summary.frames, timestamp, report, pose);
        self.writer.serialize(record)?;
        self.writer.flush()?;
        self.count(report);
        Ok(())
    }

    /// Flush what is left and return the path of the CSV.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.csv_path)
    }

    fn count(&mut self, report: &FrameReport) {
        let summary = &mut self.summary;
        summary.frames += 1;
        if report.hand_present {
            summary.hand_frames += 1;
        }
        if report.engaged() {
            summary.engaged_frames += 1;
        }
        if report.adjustment.map(|a| a.delta != 0.0).unwrap_or(false) {
            summary.adjustments += 1;
        }
        match &report.delivery {
            Some(d) if d.is_confirmed() => summary.confirmed += 1,
            Some(_) => summary.failed += 1,
            None => {}
        }
    }

    fn create_record(frame: usize, timestamp: f64, report: &FrameReport, pose: [f64; JOINT_COUNT]) -> CommandRecord {
        let [j1, j2, j3, j4, j5, j6] = pose;

        CommandRecord {
            timestamp,
            frame,
            hand_present: report.hand_present,
            engaged: report.engaged(),
            moved_x_cm: report.displacement.map(|d| d.cm_x),
            moved_y_cm: report.displacement.map(|d| d.cm_y),
            finger_count: report.finger_count,
            joint: report.adjustment.map(|a| a.joint.to_string()),
            movement_cm: report.adjustment.map(|a| a.movement),
            delta: report.adjustment.map(|a| a.delta),
            j1,
            j2,
            j3,
            j4,
            j5,
            j6,
            delivery: report.delivery.as_ref().map(|d| d.label().to_string()),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }
}
