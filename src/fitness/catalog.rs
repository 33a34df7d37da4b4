//! Exercise catalog: the canonical, read-only set of exercise definitions.
//!
//! Loaded once at startup, either from the built-in JSON shipped with the
//! crate or from a user-supplied JSON/YAML file, then shared behind an `Arc`.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::CatalogError;
use super::workout::Equipment;

/// Built-in catalog, embedded at compile time.
const BUILTIN_CATALOG_JSON: &str = include_str!("../../data/exercise_catalog.json");

// ─── Entry ──────────────────────────────────────────────────────────────────

/// One canonical exercise definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseCatalogEntry {
    pub id: String,
    pub name: String,
    pub primary_muscles: BTreeSet<String>,
    #[serde(default)]
    pub secondary_muscles: BTreeSet<String>,
    pub equipment: Equipment,
}

impl ExerciseCatalogEntry {
    /// Whether this exercise trains `muscle` as a primary or secondary mover.
    pub fn works(&self, muscle: &str) -> bool {
        self.primary_muscles.contains(muscle) || self.secondary_muscles.contains(muscle)
    }

    pub fn is_bodyweight(&self) -> bool {
        self.equipment == Equipment::Bodyweight
    }
}

// ─── Catalog ────────────────────────────────────────────────────────────────

/// Immutable, ordered collection of catalog entries with id lookup.
#[derive(Debug, Clone)]
pub struct ExerciseCatalog {
    entries: Vec<ExerciseCatalogEntry>,
    by_id: HashMap<String, usize>,
}

impl ExerciseCatalog {
    /// Build a catalog from entries, rejecting duplicate or empty ids.
    pub fn new(entries: Vec<ExerciseCatalogEntry>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            if entry.id.trim().is_empty() || entry.name.trim().is_empty() {
                return Err(CatalogError::Invalid {
                    reason: format!("entry {idx} has an empty id or name"),
                });
            }
            if entry.primary_muscles.is_empty() {
                return Err(CatalogError::Invalid {
                    reason: format!("'{}' has no primary muscles", entry.id),
                });
            }
            if by_id.insert(entry.id.clone(), idx).is_some() {
                return Err(CatalogError::Invalid {
                    reason: format!("duplicate exercise id '{}'", entry.id),
                });
            }
        }
        Ok(Self { entries, by_id })
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG_JSON)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let entries: Vec<ExerciseCatalogEntry> =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse {
                reason: e.to_string(),
            })?;
        Self::new(entries)
    }

    /// Load a catalog file. `.yaml`/`.yml` files are read as YAML, anything
    /// else as JSON.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let catalog = if is_yaml {
            let entries: Vec<ExerciseCatalogEntry> =
                serde_yaml::from_str(&raw).map_err(|e| CatalogError::Parse {
                    reason: e.to_string(),
                })?;
            Self::new(entries)?
        } else {
            Self::from_json_str(&raw)?
        };

        tracing::info!(
            path = %path.display(),
            entries = catalog.len(),
            "loaded exercise catalog"
        );
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&ExerciseCatalogEntry> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[ExerciseCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every muscle mentioned anywhere in the catalog, sorted.
    pub fn muscle_roster(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|e| e.primary_muscles.iter().chain(e.secondary_muscles.iter()))
            .cloned()
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
