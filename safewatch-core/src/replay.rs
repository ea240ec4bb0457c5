//! Replay of recorded detector output.
//!
//! The detection model runs outside SafeWatch. To drive the pipeline from a
//! recording, detector output is stored as JSON Lines, one object per frame:
//!
//! ```text
//! {"frame": 12, "detections": [{"class_id": 7, "confidence": 0.91, "box": [10, 20, 80, 140]}]}
//! ```
//!
//! Blank lines are ignored. Frames missing from the log have no detections.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::DetectorError;
use crate::pipeline::Detector;
use crate::types::{Detection, Frame};

/// One line of a detection log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub frame: u64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// A [`Detector`] that answers from a recorded log.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<Detection>>,
    last_frame: u64,
}

impl ReplayDetector {
    pub fn new(recorded: Vec<RecordedFrame>) -> Self {
        let last_frame = recorded.iter().map(|r| r.frame).max().unwrap_or(0);
        let mut frames: HashMap<u64, Vec<Detection>> = HashMap::new();
        for r in recorded {
            frames.entry(r.frame).or_default().extend(r.detections);
        }
        Self { frames, last_frame }
    }

    /// Parse a JSON Lines detection log.
    pub fn parse(content: &str) -> Result<Self, DetectorError> {
        let mut recorded = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: RecordedFrame =
                serde_json::from_str(line).map_err(|e| DetectorError::MalformedLog {
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            recorded.push(frame);
        }
        Ok(Self::new(recorded))
    }

    pub fn from_file(path: &Path) -> Result<Self, DetectorError> {
        let content = std::fs::read_to_string(path).map_err(|e| DetectorError::Unavailable {
            message: format!("cannot read detection log {}: {e}", path.display()),
        })?;
        Self::parse(&content)
    }

    /// Highest frame index present in the log.
    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }

    /// Empty frames `1..=last_frame`, for feeding the pipeline.
    pub fn frames(&self) -> impl Stream<Item = Frame> + use<> {
        futures::stream::iter((1..=self.last_frame).map(Frame::empty))
    }
}

#[async_trait]
impl Detector for ReplayDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "replay"
    }
}
