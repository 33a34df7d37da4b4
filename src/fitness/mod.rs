//! Fitness domain: catalog, recovery analysis, composition and extraction.
//!
//! Submodules:
//! - `catalog`: Canonical exercise definitions (built-in or loaded from file)
//! - `resolver`: Free-form exercise name → catalog entry
//! - `recovery`: Overworked / recovered / undertrained classification
//! - `composer`: Target selection, exercise selection, workout building
//! - `extractor`: Tiered recovery of workouts from unreliable LLM text
//! - `templates`: Canonical fixed workouts and keyword matching
//! - `workout`: Workout value types
//! - `errors`: Domain error types

pub mod catalog;
pub mod composer;
pub mod errors;
pub mod extractor;
pub mod recovery;
pub mod resolver;
pub mod templates;
pub mod workout;

pub use catalog::{ExerciseCatalog, ExerciseCatalogEntry};
pub use composer::{ComposerLimits, TargetSelection, WorkoutComposer};
pub use errors::{CatalogError, ComposeError};
pub use extractor::{extract_workout, Extraction, ExtractionTier};
pub use recovery::{
    MuscleVolumeMap, RecoveryAnalyzer, RecoveryClassification, RecoveryStatus, RecoveryThresholds,
};
pub use resolver::{ExerciseResolution, ExerciseResolver};
pub use workout::{Equipment, FitnessLevel, GeneratedWorkout, WorkoutExercise, WorkoutSet};
