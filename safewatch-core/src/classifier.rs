//! Risk classification of detector class ids.
//!
//! A [`ClassTable`] partitions the class-id space into the `RED` (danger),
//! `YELLOW` (safe) and `BLUE` (person) sets. [`RiskClassifier`] is the
//! compiled, read-only form of that table. Classification is pure and total:
//! any id missing from the table is [`RiskCategory::Unknown`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;
use crate::types::ClassId;

/// Coarse safety classification of a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Danger,
    Safe,
    Person,
    Unknown,
}

impl RiskCategory {
    /// Display color used when annotating frames.
    pub fn color(self) -> Color {
        match self {
            RiskCategory::Danger => Color::RED,
            RiskCategory::Safe => Color::YELLOW,
            RiskCategory::Person => Color::BLUE,
            RiskCategory::Unknown => Color::WHITE,
        }
    }

    /// Whether detections of this category feed the violation tracker.
    pub fn is_risky(self) -> bool {
        matches!(self, RiskCategory::Danger)
    }

    pub fn all() -> [RiskCategory; 4] {
        [
            RiskCategory::Danger,
            RiskCategory::Safe,
            RiskCategory::Person,
            RiskCategory::Unknown,
        ]
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskCategory::Danger => write!(f, "DANGER"),
            RiskCategory::Safe => write!(f, "SAFE"),
            RiskCategory::Person => write!(f, "PERSON"),
            RiskCategory::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// An RGB display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channel order expected by OpenCV-style renderers.
    pub fn to_bgr(self) -> (u8, u8, u8) {
        (self.b, self.g, self.r)
    }

    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One row of the class table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub id: ClassId,
    pub label: String,
    pub category: RiskCategory,
}

impl ClassEntry {
    pub fn new(id: ClassId, label: impl Into<String>, category: RiskCategory) -> Self {
        Self {
            id,
            label: label.into(),
            category,
        }
    }
}

/// Static configuration table mapping class ids to labels and categories.
///
/// The default table matches the PPE detection model: five "missing
/// equipment" classes are dangerous, worn equipment is safe, and a bare
/// person is neutral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassTable {
    pub entries: Vec<ClassEntry>,
}

impl Default for ClassTable {
    fn default() -> Self {
        use RiskCategory::*;
        let entries = [
            (0, "boots", Safe),
            (1, "gloves", Safe),
            (2, "goggles", Safe),
            (3, "helmet", Safe),
            (4, "no_boots", Danger),
            (5, "no_gloves", Danger),
            (6, "no_goggles", Danger),
            (7, "no_helmet", Danger),
            (8, "no_vest", Danger),
            (9, "person", Person),
            (10, "vest", Safe),
        ]
        .into_iter()
        .map(|(id, label, category)| ClassEntry::new(id, label, category))
        .collect();
        Self { entries }
    }
}

impl ClassTable {
    /// Ids in a given category, ascending.
    pub fn ids_in(&self, category: RiskCategory) -> Vec<ClassId> {
        let mut ids: Vec<ClassId> = self
            .entries
            .iter()
            .filter(|e| e.category == category)
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Every id listed more than once, i.e. violations of the disjoint partition.
    pub fn duplicate_ids(&self) -> Vec<ClassId> {
        let mut seen = HashMap::new();
        for entry in &self.entries {
            *seen.entry(entry.id).or_insert(0usize) += 1;
        }
        let mut dups: Vec<ClassId> = seen
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, _)| id)
            .collect();
        dups.sort_unstable();
        dups
    }
}

/// Compiled class table. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    classes: HashMap<ClassId, (RiskCategory, String)>,
}

impl RiskClassifier {
    /// Build a classifier, rejecting tables that list an id twice.
    pub fn new(table: &ClassTable) -> Result<Self, ConfigError> {
        let mut classes = HashMap::with_capacity(table.entries.len());
        for entry in &table.entries {
            if classes
                .insert(entry.id, (entry.category, entry.label.clone()))
                .is_some()
            {
                return Err(ConfigError::DuplicateClass { id: entry.id });
            }
        }
        Ok(Self { classes })
    }

    pub fn classify(&self, class_id: ClassId) -> RiskCategory {
        self.classes
            .get(&class_id)
            .map(|(category, _)| *category)
            .unwrap_or(RiskCategory::Unknown)
    }

    pub fn color(&self, class_id: ClassId) -> Color {
        self.classify(class_id).color()
    }

    /// Human-readable name for a class, `"Class {id}"` when unnamed.
    pub fn label(&self, class_id: ClassId) -> String {
        match self.classes.get(&class_id) {
            Some((_, label)) if !label.is_empty() => label.clone(),
            _ => format!("Class {class_id}"),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        let table = ClassTable::default();
        let classes = table
            .entries
            .into_iter()
            .map(|e| (e.id, (e.category, e.label)))
            .collect();
        Self { classes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_partition() {
        let table = ClassTable::default();
        assert_eq!(table.ids_in(RiskCategory::Danger), vec![4, 5, 6, 7, 8]);
        assert_eq!(table.ids_in(RiskCategory::Safe), vec![0, 1, 2, 3, 10]);
        assert_eq!(table.ids_in(RiskCategory::Person), vec![9]);
        assert!(table.ids_in(RiskCategory::Unknown).is_empty());
        assert!(table.duplicate_ids().is_empty());
    }

    #[test]
    fn test_classify_known_and_unknown() {
        let classifier = RiskClassifier::default();
        assert_eq!(classifier.classify(7), RiskCategory::Danger);
        assert_eq!(classifier.classify(3), RiskCategory::Safe);
        assert_eq!(classifier.classify(9), RiskCategory::Person);
        assert_eq!(classifier.classify(11), RiskCategory::Unknown);
        assert_eq!(classifier.classify(u32::MAX), RiskCategory::Unknown);
    }

    #[test]
    fn test_unknown_is_never_risky() {
        assert!(!RiskCategory::Unknown.is_risky());
        assert!(!RiskCategory::Person.is_risky());
        assert!(!RiskCategory::Safe.is_risky());
        assert!(RiskCategory::Danger.is_risky());
    }

    #[test]
    fn test_labels() {
        let classifier = RiskClassifier::default();
        assert_eq!(classifier.label(7), "no_helmet");
        assert_eq!(classifier.label(5), "no_gloves");
        assert_eq!(classifier.label(42), "Class 42");
    }

    #[test]
    fn test_colors() {
        let classifier = RiskClassifier::default();
        assert_eq!(classifier.color(4), Color::RED);
        assert_eq!(classifier.color(4).to_bgr(), (0, 0, 255));
        assert_eq!(classifier.color(0).to_bgr(), (0, 255, 255));
        assert_eq!(classifier.color(9).to_bgr(), (255, 0, 0));
        assert_eq!(classifier.color(99).to_bgr(), (255, 255, 255));
        assert_eq!(Color::YELLOW.hex(), "#ffff00");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table = ClassTable::default();
        table
            .entries
            .push(ClassEntry::new(7, "helmet_again", RiskCategory::Safe));
        assert_eq!(table.duplicate_ids(), vec![7]);
        let err = RiskClassifier::new(&table).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateClass { id: 7 }));
    }

    #[test]
    fn test_adding_class_only_touches_table() {
        let mut table = ClassTable::default();
        table
            .entries
            .push(ClassEntry::new(11, "no_harness", RiskCategory::Danger));
        let classifier = RiskClassifier::new(&table).unwrap();
        assert_eq!(classifier.classify(11), RiskCategory::Danger);
        assert_eq!(classifier.label(11), "no_harness");
        assert_eq!(classifier.len(), 12);
    }

    #[test]
    fn test_category_display_and_serde() {
        assert_eq!(RiskCategory::Danger.to_string(), "DANGER");
        let json = serde_json::to_string(&RiskCategory::Person).unwrap();
        assert_eq!(json, "\"person\"");
        let parsed: RiskCategory = serde_json::from_str("\"safe\"").unwrap();
        assert_eq!(parsed, RiskCategory::Safe);
    }
}
