//! Per-frame orchestration: detect, classify, track, record.
//!
//! A [`DetectionPipeline`] owns one video source's [`ViolationTracker`] and
//! shares an [`AlertStore`] with every other source and with the HTTP
//! gateway. Frames are processed strictly one after another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::{Color, RiskCategory, RiskClassifier};
use crate::error::DetectorError;
use crate::store::{AlertStore, spawn_append};
use crate::tracker::{TrackerConfig, Verdict, ViolationTracker};
use crate::types::{Alert, Detection, Frame, STATUS_VIOLATION};

/// The external object detector.
///
/// Called exactly once per processed frame.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "detector"
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Process only every Nth frame. 1 processes every frame.
    pub skip_frames: u64,
    /// Detections below this confidence are ignored.
    pub min_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            skip_frames: 2,
            min_confidence: 0.1,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.skip_frames == 0 {
            problems.push("pipeline.skip_frames must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            problems.push(format!(
                "pipeline.min_confidence must be within [0, 1], got {}",
                self.min_confidence
            ));
        }
        problems
    }
}

/// A detection together with everything a renderer needs to draw it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedDetection {
    pub detection: Detection,
    pub category: RiskCategory,
    pub color: Color,
    /// Caption such as `DANGER 0.87`.
    pub caption: String,
}

/// What happened while processing one frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub detections: Vec<ClassifiedDetection>,
    /// Alerts accepted by the store during this frame.
    pub alerts: Vec<Alert>,
    /// Labels that fired but could not be recorded.
    pub unrecorded: Vec<String>,
}

/// Running counters for a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub detections: u64,
    pub low_confidence: u64,
    pub risky_detections: u64,
    pub alerts_raised: u64,
    pub alerts_suppressed: u64,
    pub store_failures: u64,
    pub detector_failures: u64,
}

/// Drives one video source through detection, classification, tracking and
/// alert recording.
pub struct DetectionPipeline<D> {
    detector: D,
    classifier: RiskClassifier,
    tracker: ViolationTracker,
    store: Arc<AlertStore>,
    config: PipelineConfig,
    stats: PipelineStats,
}

impl<D: Detector> DetectionPipeline<D> {
    pub fn new(
        detector: D,
        classifier: RiskClassifier,
        tracker_config: TrackerConfig,
        config: PipelineConfig,
        store: Arc<AlertStore>,
    ) -> Self {
        let tracker = ViolationTracker::new(tracker_config, classifier.clone());
        Self {
            detector,
            classifier,
            tracker,
            store,
            config,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn tracker(&self) -> &ViolationTracker {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.store
    }

    /// Process a frame stamped with the current time.
    ///
    /// Returns `Ok(None)` when the frame is skipped.
    pub async fn process_frame(
        &mut self,
        frame: &Frame,
    ) -> Result<Option<FrameReport>, DetectorError> {
        self.process_frame_at(frame, Utc::now()).await
    }

    /// Process a frame as if observed at `now`.
    pub async fn process_frame_at(
        &mut self,
        frame: &Frame,
        now: DateTime<Utc>,
    ) -> Result<Option<FrameReport>, DetectorError> {
        self.stats.frames_seen += 1;
        let skip = self.config.skip_frames.max(1);
        if self.stats.frames_seen % skip != 0 {
            self.stats.frames_skipped += 1;
            return Ok(None);
        }

        let detections = self.detector.detect(frame).await?;
        self.stats.frames_processed += 1;

        let mut report = FrameReport {
            frame: frame.index,
            ..FrameReport::default()
        };

        for detection in detections {
            self.stats.detections += 1;
            if detection.confidence < self.config.min_confidence {
                self.stats.low_confidence += 1;
                continue;
            }

            let category = self.classifier.classify(detection.class_id);
            report.detections.push(ClassifiedDetection {
                detection,
                category,
                color: category.color(),
                caption: format!("{category} {:.2}", detection.confidence),
            });

            if !category.is_risky() {
                continue;
            }
            self.stats.risky_detections += 1;

            let last = self.store.last_message();
            match self
                .tracker
                .observe(detection.class_id, now, last.as_deref())
            {
                Verdict::Fire { label } => {
                    match spawn_append(&self.store, label.clone(), STATUS_VIOLATION.to_string())
                        .await
                    {
                        Ok(alert) => {
                            self.stats.alerts_raised += 1;
                            report.alerts.push(alert);
                        }
                        Err(e) => {
                            self.stats.store_failures += 1;
                            warn!(
                                frame = frame.index,
                                %label,
                                error = %e,
                                "Alert raised but not recorded"
                            );
                            report.unrecorded.push(label);
                        }
                    }
                }
                Verdict::Suppressed { .. } => self.stats.alerts_suppressed += 1,
                Verdict::Quiet => {}
            }
        }

        debug!(
            frame = frame.index,
            detections = report.detections.len(),
            alerts = report.alerts.len(),
            "Frame processed"
        );
        Ok(Some(report))
    }

    /// Process every frame of a stream until it ends.
    ///
    /// Detector failures are logged and the frame is dropped; the stream
    /// keeps going.
    pub async fn run<S>(&mut self, frames: S) -> PipelineStats
    where
        S: Stream<Item = Frame>,
    {
        let mut frames = std::pin::pin!(frames);
        info!(detector = self.detector.name(), "Detection pipeline started");
        while let Some(frame) = frames.next().await {
            if let Err(e) = self.process_frame(&frame).await {
                self.stats.detector_failures += 1;
                warn!(frame = frame.index, error = %e, "Detector failed, skipping frame");
            }
        }
        info!(
            frames = self.stats.frames_seen,
            alerts = self.stats.alerts_raised,
            "Detection pipeline finished"
        );
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns canned detections per frame index and counts calls.
    struct ScriptedDetector {
        frames: HashMap<u64, Vec<Detection>>,
        calls: Mutex<u64>,
        fail_on: Option<u64>,
    }

    impl ScriptedDetector {
        fn new(frames: Vec<(u64, Vec<Detection>)>) -> Self {
            Self {
                frames: frames.into_iter().collect(),
                calls: Mutex::new(0),
                fail_on: None,
            }
        }
    }

    #[async_trait]
    impl Detector for ScriptedDetector {
        async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail_on == Some(frame.index) {
                return Err(DetectorError::Failed {
                    frame: frame.index,
                    message: "boom".into(),
                });
            }
            Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
        }
    }

    fn det(class_id: u32, confidence: f32) -> Detection {
        Detection::new(class_id, confidence, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn every_frame() -> PipelineConfig {
        PipelineConfig {
            skip_frames: 1,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(
        detector: ScriptedDetector,
        config: PipelineConfig,
    ) -> DetectionPipeline<ScriptedDetector> {
        DetectionPipeline::new(
            detector,
            RiskClassifier::default(),
            TrackerConfig::default(),
            config,
            Arc::new(AlertStore::in_memory().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_danger_detections_raise_one_alert() {
        let detector = ScriptedDetector::new((1..=4).map(|i| (i, vec![det(7, 0.9)])).collect());
        let mut p = pipeline(detector, every_frame());

        for i in 1..=4u64 {
            p.process_frame_at(&Frame::empty(i), t(i as i64)).await.unwrap();
        }

        let alerts = p.store().all_volatile();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "no_helmet");
        assert_eq!(alerts[0].status, "violation");
        assert_eq!(p.stats().alerts_raised, 1);
        assert_eq!(p.stats().alerts_suppressed, 1);
    }

    #[tokio::test]
    async fn test_safe_and_person_never_tracked() {
        let detector = ScriptedDetector::new(
            (1..=5)
                .map(|i| (i, vec![det(3, 0.9), det(9, 0.9), det(50, 0.9)]))
                .collect(),
        );
        let mut p = pipeline(detector, every_frame());
        for i in 1..=5u64 {
            let report = p
                .process_frame_at(&Frame::empty(i), t(i as i64))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(report.detections.len(), 3);
            assert_eq!(report.detections[2].category, RiskCategory::Unknown);
        }
        assert!(p.store().is_empty());
        assert_eq!(p.tracker().tracked_classes(), 0);
    }

    #[tokio::test]
    async fn test_frame_skipping_calls_detector_every_nth() {
        let detector = ScriptedDetector::new(vec![]);
        let mut p = pipeline(
            detector,
            PipelineConfig {
                skip_frames: 3,
                ..PipelineConfig::default()
            },
        );
        let mut processed = Vec::new();
        for i in 1..=9u64 {
            if p.process_frame_at(&Frame::empty(i), t(0)).await.unwrap().is_some() {
                processed.push(i);
            }
        }
        assert_eq!(processed, vec![3, 6, 9]);
        assert_eq!(*p.detector.calls.lock().unwrap(), 3);
        assert_eq!(p.stats().frames_skipped, 6);
    }

    #[tokio::test]
    async fn test_low_confidence_dropped() {
        let detector = ScriptedDetector::new((1..=3).map(|i| (i, vec![det(8, 0.05)])).collect());
        let mut p = pipeline(detector, every_frame());
        for i in 1..=3u64 {
            p.process_frame_at(&Frame::empty(i), t(i as i64)).await.unwrap();
        }
        assert!(p.store().is_empty());
        assert_eq!(p.stats().low_confidence, 3);
    }

    #[tokio::test]
    async fn test_caption_and_color() {
        let detector = ScriptedDetector::new(vec![(1, vec![det(4, 0.876)])]);
        let mut p = pipeline(detector, every_frame());
        let report = p
            .process_frame_at(&Frame::empty(1), t(0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.detections[0].caption, "DANGER 0.88");
        assert_eq!(report.detections[0].color, Color::RED);
    }

    #[tokio::test]
    async fn test_run_survives_detector_failure() {
        let mut detector = ScriptedDetector::new((1..=4).map(|i| (i, vec![det(5, 0.9)])).collect());
        detector.fail_on = Some(2);
        let mut p = pipeline(detector, every_frame());

        let frames = futures::stream::iter((1..=4).map(Frame::empty));
        let stats = p.run(frames).await;

        assert_eq!(stats.frames_seen, 4);
        assert_eq!(stats.detector_failures, 1);
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.alerts_raised, 1);
        assert_eq!(p.store().last_message().as_deref(), Some("no_gloves"));
    }

    #[test]
    fn test_config_validation() {
        assert!(PipelineConfig::default().validate().is_empty());
        let bad = PipelineConfig {
            skip_frames: 0,
            min_confidence: 1.5,
        };
        assert_eq!(bad.validate().len(), 2);
    }
}
