//! Violation tracking and alert debouncing.
//!
//! Each risky class id owns a [`ViolationWindow`]: a short, ordered record of
//! when it was last seen. A class escalates to an alert once its window holds
//! `alert_threshold` sightings within `rolling_window_secs`. Escalations whose
//! label matches the most recently accepted alert (system-wide, not per class)
//! are suppressed, so one persisting violation yields a single alert.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::classifier::RiskClassifier;
use crate::types::ClassId;

/// Longest window `chrono::Duration` can represent, in seconds.
pub const MAX_WINDOW_SECS: u64 = (i64::MAX / 1_000) as u64;

/// Tuning for the violation tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Sightings within the window needed to raise an alert.
    pub alert_threshold: usize,
    /// Length of the trailing window in seconds.
    pub rolling_window_secs: u64,
    /// Maximum timestamps kept per class; oldest are dropped first.
    pub window_capacity: usize,
    /// Maximum number of classes with a live window (LRU-evicted).
    pub max_tracked_classes: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 3,
            rolling_window_secs: 60,
            window_capacity: 10,
            max_tracked_classes: 256,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.alert_threshold == 0 {
            problems.push("tracker.alert_threshold must be at least 1".to_string());
        }
        if self.window_capacity < self.alert_threshold {
            problems.push(format!(
                "tracker.window_capacity ({}) is smaller than tracker.alert_threshold ({}); no alert could ever fire",
                self.window_capacity, self.alert_threshold
            ));
        }
        if self.rolling_window_secs == 0 {
            problems.push("tracker.rolling_window_secs must be greater than 0".to_string());
        } else if self.rolling_window_secs > MAX_WINDOW_SECS {
            problems.push(format!(
                "tracker.rolling_window_secs ({}) exceeds the maximum of {MAX_WINDOW_SECS}",
                self.rolling_window_secs
            ));
        }
        if self.max_tracked_classes == 0 {
            problems.push("tracker.max_tracked_classes must be at least 1".to_string());
        }
        problems
    }

    /// The window as a `Duration`, saturating at [`Duration::MAX`].
    pub fn window(&self) -> Duration {
        i64::try_from(self.rolling_window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

/// Ordered, bounded record of recent sightings of one class.
#[derive(Debug, Clone)]
pub struct ViolationWindow {
    stamps: VecDeque<DateTime<Utc>>,
    capacity: usize,
}

impl ViolationWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            stamps: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sighting, then drop everything older than `window` relative
    /// to the newest sighting held.
    pub fn record(&mut self, at: DateTime<Utc>, window: Duration) {
        match self.stamps.back() {
            Some(last) if at < *last => {
                // Clock went backwards: keep the deque sorted.
                let pos = self.stamps.partition_point(|t| *t <= at);
                self.stamps.insert(pos, at);
            }
            _ => self.stamps.push_back(at),
        }

        while self.stamps.len() > self.capacity {
            self.stamps.pop_front();
        }

        if let Some(newest) = self.stamps.back().copied() {
            while let Some(oldest) = self.stamps.front() {
                if newest - *oldest > window {
                    self.stamps.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.stamps.back().copied()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.stamps.front().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.stamps.iter()
    }
}

/// Outcome of a single [`ViolationTracker::observe`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Threshold not reached within the window.
    Quiet,
    /// Threshold reached but the label repeats the last accepted alert.
    Suppressed { label: String },
    /// A new alert should be raised.
    Fire { label: String },
}

impl Verdict {
    pub fn fires(&self) -> bool {
        matches!(self, Verdict::Fire { .. })
    }

    /// The label to alert with, empty unless the verdict fires.
    pub fn label(&self) -> &str {
        match self {
            Verdict::Fire { label } => label,
            _ => "",
        }
    }

    /// The `(fire, label)` pair form of the verdict.
    pub fn into_pair(self) -> (bool, String) {
        match self {
            Verdict::Fire { label } => (true, label),
            _ => (false, String::new()),
        }
    }
}

/// Per-source violation tracker.
///
/// Owned exclusively by the pipeline driving one video source. The last
/// accepted alert message is supplied by the caller on every observation,
/// normally from [`AlertStore::last_message`](crate::store::AlertStore::last_message),
/// so that sources sharing one store share one suppression state.
pub struct ViolationTracker {
    config: TrackerConfig,
    classifier: RiskClassifier,
    windows: LruCache<ClassId, ViolationWindow>,
}

impl std::fmt::Debug for ViolationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViolationTracker")
            .field("config", &self.config)
            .field("tracked_classes", &self.windows.len())
            .finish()
    }
}

impl ViolationTracker {
    pub fn new(config: TrackerConfig, classifier: RiskClassifier) -> Self {
        let cap = NonZeroUsize::new(config.max_tracked_classes).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            classifier,
            windows: LruCache::new(cap),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record a sighting of `class_id` at `at` and decide whether it escalates.
    ///
    /// `last_alert` is the message of the most recently accepted alert
    /// anywhere in the system, or `None` if there has been none.
    pub fn observe(
        &mut self,
        class_id: ClassId,
        at: DateTime<Utc>,
        last_alert: Option<&str>,
    ) -> Verdict {
        let window = self.config.window();
        let capacity = self.config.window_capacity;
        let entry = self
            .windows
            .get_or_insert_mut(class_id, || ViolationWindow::new(capacity));
        entry.record(at, window);
        let count = entry.len();

        if count < self.config.alert_threshold {
            tracing::trace!(class_id, count, "Below alert threshold");
            return Verdict::Quiet;
        }

        let label = self.classifier.label(class_id);
        if last_alert == Some(label.as_str()) {
            tracing::debug!(class_id, %label, count, "Suppressed repeat alert");
            Verdict::Suppressed { label }
        } else {
            tracing::debug!(class_id, %label, count, "Violation threshold crossed");
            Verdict::Fire { label }
        }
    }

    /// The current window for a class, if one is live.
    pub fn window(&self, class_id: ClassId) -> Option<&ViolationWindow> {
        self.windows.peek(&class_id)
    }

    pub fn tracked_classes(&self) -> usize {
        self.windows.len()
    }

    /// Drop all windows.
    pub fn reset(&mut self) {
        self.windows.clear();
    }
}
