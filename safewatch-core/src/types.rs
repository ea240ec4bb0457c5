//! Core type definitions for SafeWatch.
//!
//! Defines the data that flows through the system: frames handed to the
//! detector, the detections it returns, and the alerts that come out the
//! other end.

use bytes::Bytes;
use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Identifier of an object class as reported by the detection model.
pub type ClassId = u32;

/// Status tag attached to alerts raised by the violation tracker.
pub const STATUS_VIOLATION: &str = "violation";

/// Format used for alert times, both in the database and the snapshot.
pub const ALERT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A decoded video frame handed to the detector.
///
/// The payload is opaque to SafeWatch; only the detector interprets it.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// 1-based position of the frame in its stream.
    pub index: u64,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(index: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            index,
            payload: payload.into(),
        }
    }

    /// A frame without pixel data, used when replaying recorded detections.
    pub fn empty(index: u64) -> Self {
        Self {
            index,
            payload: Bytes::new(),
        }
    }
}

/// Axis-aligned box in `(x1, y1, x2, y2)` form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One object instance reported by the detector for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: ClassId,
    /// Detector confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(class_id: ClassId, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bounding_box,
        }
    }
}

/// An accepted safety alert. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(with = "alert_time")]
    pub time: NaiveDateTime,
    /// Human-readable class label that triggered the alert.
    pub message: String,
    /// Open tag; the tracker only ever produces [`STATUS_VIOLATION`].
    pub status: String,
}

impl Alert {
    /// Create an alert stamped with the current local time, truncated to seconds.
    pub fn now(message: impl Into<String>, status: impl Into<String>) -> Self {
        let now = Local::now().naive_local();
        Self {
            time: now.with_nanosecond(0).unwrap_or(now),
            message: message.into(),
            status: status.into(),
        }
    }

    /// The alert time rendered in the persisted `YYYY-MM-DD HH:MM:SS` form.
    pub fn time_string(&self) -> String {
        self.time.format(ALERT_TIME_FORMAT).to_string()
    }

    pub fn is_violation(&self) -> bool {
        self.status == STATUS_VIOLATION
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.time_string(), self.message, self.status)
    }
}

/// Parse an alert time in the persisted format.
pub fn parse_alert_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, ALERT_TIME_FORMAT).ok()
}

mod alert_time {
    use super::ALERT_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(ALERT_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, ALERT_TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}
