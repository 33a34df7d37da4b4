//! Muscle recovery analysis from cumulative training volume.
//!
//! Buckets each muscle into overworked / recovered / undertrained using two
//! thresholds. Pure: no state is kept between calls.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Muscle id → cumulative training volume, supplied per turn by the caller.
pub type MuscleVolumeMap = HashMap<String, f64>;

/// Default volume above which a muscle counts as overworked.
pub const DEFAULT_HIGH_VOLUME: f64 = 1000.0;

/// Default volume below which a muscle counts as undertrained.
pub const DEFAULT_LOW_VOLUME: f64 = 200.0;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Volume thresholds, in the same units as the volume map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryThresholds {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_low")]
    pub low: f64,
}

fn default_high() -> f64 {
    DEFAULT_HIGH_VOLUME
}
fn default_low() -> f64 {
    DEFAULT_LOW_VOLUME
}

impl Default for RecoveryThresholds {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_VOLUME,
            low: DEFAULT_LOW_VOLUME,
        }
    }
}

/// Recovery bucket of a single muscle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Overworked,
    Recovered,
    Undertrained,
}

/// Three disjoint, sorted sets of muscle ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryClassification {
    pub overworked: BTreeSet<String>,
    pub recovered: BTreeSet<String>,
    pub undertrained: BTreeSet<String>,
}

impl RecoveryClassification {
    /// Status of a muscle. Muscles never classified count as undertrained.
    pub fn status_of(&self, muscle: &str) -> RecoveryStatus {
        if self.overworked.contains(muscle) {
            RecoveryStatus::Overworked
        } else if self.recovered.contains(muscle) {
            RecoveryStatus::Recovered
        } else {
            RecoveryStatus::Undertrained
        }
    }

    pub fn is_overworked(&self, muscle: &str) -> bool {
        self.overworked.contains(muscle)
    }
}

// ─── Analyzer ───────────────────────────────────────────────────────────────

/// Classifies muscles by volume against configurable thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryAnalyzer {
    thresholds: RecoveryThresholds,
}

impl RecoveryAnalyzer {
    pub fn new(thresholds: RecoveryThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> RecoveryThresholds {
        self.thresholds
    }

    /// Bucket a single volume. Non-finite or negative volumes count as zero.
    pub fn status_for_volume(&self, volume: f64) -> RecoveryStatus {
        let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
        if volume > self.thresholds.high {
            RecoveryStatus::Overworked
        } else if volume < self.thresholds.low {
            RecoveryStatus::Undertrained
        } else {
            RecoveryStatus::Recovered
        }
    }

    /// Classify every muscle present in the volume map.
    ///
    /// Target selection uses this form: unlogged muscles stay out of the
    /// buckets and [`RecoveryClassification::status_of`] reports them as
    /// undertrained on demand. With a full roster they would outrank the
    /// recovered muscles the user did log.
    pub fn analyze(&self, volumes: &MuscleVolumeMap) -> RecoveryClassification {
        let mut classification = RecoveryClassification::default();
        for (muscle, &volume) in volumes {
            let bucket = match self.status_for_volume(volume) {
                RecoveryStatus::Overworked => &mut classification.overworked,
                RecoveryStatus::Recovered => &mut classification.recovered,
                RecoveryStatus::Undertrained => &mut classification.undertrained,
            };
            bucket.insert(muscle.clone());
        }

        tracing::debug!(
            overworked = ?classification.overworked,
            recovered = ?classification.recovered,
            undertrained = ?classification.undertrained,
            "classified muscle recovery"
        );
        classification
    }

    /// Classify the map plus a roster of tracked muscles. Roster muscles
    /// missing from the map have zero volume and land in `undertrained`.
    /// For full recovery reports, not target selection.
    pub fn analyze_with_roster<'a>(
        &self,
        volumes: &MuscleVolumeMap,
        roster: impl IntoIterator<Item = &'a String>,
    ) -> RecoveryClassification {
        let mut classification = self.analyze(volumes);
        for muscle in roster {
            if !volumes.contains_key(muscle) {
                classification.undertrained.insert(muscle.clone());
            }
        }
        classification
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn volumes(pairs: &[(&str, f64)]) -> MuscleVolumeMap {
        pairs.iter().map(|(m, v)| (m.to_string(), *v)).collect()
    }

    #[test]
    fn test_default_thresholds_bucket_each_muscle() {
        let analyzer = RecoveryAnalyzer::default();
        let c = analyzer.analyze(&volumes(&[("chest", 1200.0), ("back", 150.0), ("legs", 500.0)]));
        assert!(c.overworked.contains("chest"));
        assert!(c.undertrained.contains("back"));
        assert!(c.recovered.contains("legs"));
    }

    #[test]
    fn test_threshold_boundaries_are_recovered() {
        let analyzer = RecoveryAnalyzer::default();
        assert_eq!(analyzer.status_for_volume(1000.0), RecoveryStatus::Recovered);
        assert_eq!(analyzer.status_for_volume(200.0), RecoveryStatus::Recovered);
        assert_eq!(analyzer.status_for_volume(1000.1), RecoveryStatus::Overworked);
        assert_eq!(analyzer.status_for_volume(199.9), RecoveryStatus::Undertrained);
    }

    #[test]
    fn test_absent_muscle_is_undertrained() {
        let analyzer = RecoveryAnalyzer::default();
        let c = analyzer.analyze(&volumes(&[("chest", 1200.0)]));
        assert_eq!(c.status_of("calves"), RecoveryStatus::Undertrained);

        let roster: Vec<String> = vec!["chest".into(), "calves".into()];
        let c = analyzer.analyze_with_roster(&volumes(&[("chest", 1200.0)]), &roster);
        assert!(c.undertrained.contains("calves"));
        assert!(!c.undertrained.contains("chest"));
    }

    #[test]
    fn test_selection_form_leaves_unlogged_muscles_out() {
        let analyzer = RecoveryAnalyzer::default();
        let logged = volumes(&[("chest", 1200.0), ("back", 150.0), ("legs", 500.0)]);
        let roster = crate::fitness::ExerciseCatalog::builtin().unwrap().muscle_roster();

        let selection = analyzer.analyze(&logged);
        assert_eq!(selection.undertrained.iter().collect::<Vec<_>>(), vec!["back"]);

        let report = analyzer.analyze_with_roster(&logged, &roster);
        assert!(report.undertrained.len() > 1);
        assert!(report.undertrained.contains("back"));
        assert!(report.recovered.contains("legs"));
        assert!(!report.undertrained.contains("chest"));
    }

    #[test]
    fn test_non_finite_volume_treated_as_zero() {
        let analyzer = RecoveryAnalyzer::default();
        assert_eq!(analyzer.status_for_volume(f64::NAN), RecoveryStatus::Undertrained);
        assert_eq!(analyzer.status_for_volume(-50.0), RecoveryStatus::Undertrained);
    }

    #[test]
    fn test_custom_thresholds() {
        let analyzer = RecoveryAnalyzer::new(RecoveryThresholds { high: 500.0, low: 100.0 });
        let c = analyzer.analyze(&volumes(&[("legs", 600.0), ("core", 50.0)]));
        assert!(c.is_overworked("legs"));
        assert!(c.undertrained.contains("core"));
    }

    #[test]
    fn test_sets_are_disjoint() {
        let analyzer = RecoveryAnalyzer::default();
        let c = analyzer.analyze(&volumes(&[
            ("a", 0.0),
            ("b", 200.0),
            ("c", 999.0),
            ("d", 5000.0),
        ]));
        assert!(c.overworked.is_disjoint(&c.recovered));
        assert!(c.overworked.is_disjoint(&c.undertrained));
        assert!(c.recovered.is_disjoint(&c.undertrained));
        assert_eq!(c.overworked.len() + c.recovered.len() + c.undertrained.len(), 4);
    }
}
