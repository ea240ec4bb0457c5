//! # SafeWatch Core
//!
//! Core library for SafeWatch, the PPE violation monitor.
//! Turns per-frame object detections into a debounced, persisted alert
//! timeline: risk classification, rolling-window violation tracking,
//! alert storage, the per-frame pipeline, and a read-only HTTP gateway.

pub mod classifier;
pub mod config;
pub mod error;
pub mod gateway;
pub mod persistence;
pub mod pipeline;
pub mod replay;
pub mod store;
pub mod tracker;
pub mod types;

// Re-export commonly used types at the crate root.
pub use classifier::{ClassEntry, ClassTable, Color, RiskCategory, RiskClassifier};
pub use config::{SafewatchConfig, config_exists, load_config, load_validated_config};
pub use error::{Result, SafewatchError};
pub use pipeline::{DetectionPipeline, Detector, FrameReport, PipelineConfig, PipelineStats};
pub use replay::ReplayDetector;
pub use store::{AlertStore, StoreConfig};
pub use tracker::{TrackerConfig, Verdict, ViolationTracker, ViolationWindow};
pub use types::{Alert, BoundingBox, ClassId, Detection, Frame, STATUS_VIOLATION};
