//! Domain services behind the declared tools.
//!
//! The agent never touches application data itself: every query or mutation
//! goes through [`DomainServices::invoke`], and only the tool dispatcher
//! calls it. [`InMemoryDomainServices`] backs the demo binary and tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::fitness::{Equipment, FitnessLevel, MuscleVolumeMap};

use super::types::UserProfile;

/// Default page size for history queries.
const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Application operations, addressed by tool name.
#[async_trait]
pub trait DomainServices: Send + Sync {
    async fn invoke(&self, tool: &str, args: &Value) -> anyhow::Result<Value>;
}

// ─── In-memory implementation ───────────────────────────────────────────────

/// A workout already performed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedWorkout {
    pub id: String,
    pub name: String,
    pub date: String,
    pub exercises: Vec<String>,
}

#[derive(Debug, Default)]
struct AppState {
    /// Oldest first.
    workouts: Vec<LoggedWorkout>,
    profile: UserProfile,
    goal: Option<String>,
    settings: BTreeMap<String, String>,
    volumes: MuscleVolumeMap,
}

/// Domain services over in-process state. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct InMemoryDomainServices {
    state: Mutex<AppState>,
    invocations: Mutex<Vec<(String, Value)>>,
}

impl InMemoryDomainServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small data set: three logged workouts, an intermediate dumbbell
    /// profile and a week of volume.
    pub fn with_sample_data() -> Self {
        let services = Self::new();
        {
            let mut state = services.state();
            state.workouts = vec![
                logged("w-1", "Push Day", "2026-10-12", &["Bench Press", "Overhead Press", "Tricep Dips"]),
                logged("w-2", "Pull Day", "2026-10-14", &["Pull-ups", "Barbell Row", "Dumbbell Curl"]),
                logged("w-3", "Leg Day", "2026-10-16", &["Barbell Squat", "Romanian Deadlift", "Calf Raise"]),
            ];
            state.profile = UserProfile {
                level: FitnessLevel::Intermediate,
                equipment: vec![Equipment::Dumbbell],
            };
            state.settings = [("units", "kg"), ("theme", "system"), ("notifications", "on")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            state.volumes = [("chest", 1200.0), ("back", 150.0), ("legs", 500.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
        }
        services
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every `(tool, args)` pair invoked so far, in order.
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn workout_ids(&self) -> Vec<String> {
        self.state().workouts.iter().map(|w| w.id.clone()).collect()
    }

    pub fn profile(&self) -> UserProfile {
        self.state().profile.clone()
    }

    pub fn muscle_volumes(&self) -> MuscleVolumeMap {
        self.state().volumes.clone()
    }

    fn apply(&self, tool: &str, args: &Value) -> anyhow::Result<Value> {
        let mut state = self.state();
        match tool {
            "get_workout_history" => {
                let limit = args
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map_or(DEFAULT_HISTORY_LIMIT, |l| l as usize);
                let recent: Vec<&LoggedWorkout> = state.workouts.iter().rev().take(limit).collect();
                Ok(json!({ "workouts": recent, "total": state.workouts.len() }))
            }
            "get_workout_details" => {
                let id = str_arg(args, "workout_id")?;
                let workout = state
                    .workouts
                    .iter()
                    .find(|w| w.id == id)
                    .ok_or_else(|| anyhow!("workout '{id}' not found"))?;
                Ok(serde_json::to_value(workout)?)
            }
            "get_muscle_volume" => match args.get("muscle").and_then(Value::as_str) {
                Some(muscle) => {
                    let volume = state.volumes.get(muscle).copied().unwrap_or(0.0);
                    Ok(json!({ "muscle": muscle, "volume": volume }))
                }
                None => {
                    let sorted: BTreeMap<&String, &f64> = state.volumes.iter().collect();
                    Ok(json!({ "volumes": sorted }))
                }
            },
            "get_profile" => Ok(json!({
                "level": state.profile.level,
                "equipment": state.profile.equipment,
                "goal": state.goal,
            })),
            "update_settings" => {
                let setting = str_arg(args, "setting")?.to_string();
                let value = str_arg(args, "value")?.to_string();
                state.settings.insert(setting.clone(), value.clone());
                Ok(json!({ "updated": setting, "value": value }))
            }
            "update_profile" => {
                if let Some(level) = args.get("fitness_level").and_then(Value::as_str) {
                    state.profile.level = FitnessLevel::from_text(level)
                        .ok_or_else(|| anyhow!("unknown fitness level '{level}'"))?;
                }
                if let Some(list) = args.get("equipment").and_then(Value::as_str) {
                    state.profile.equipment = list.split(',').filter_map(Equipment::from_text).collect();
                }
                if let Some(goal) = args.get("goal").and_then(Value::as_str) {
                    state.goal = Some(goal.to_string());
                }
                Ok(json!({ "profile": state.profile }))
            }
            "delete_workout" => {
                let id = str_arg(args, "workout_id")?;
                let index = state
                    .workouts
                    .iter()
                    .position(|w| w.id == id)
                    .ok_or_else(|| anyhow!("workout '{id}' not found"))?;
                let removed = state.workouts.remove(index);
                Ok(json!({ "deleted": removed.id, "name": removed.name }))
            }
            "clear_workout_history" => {
                let count = state.workouts.len();
                state.workouts.clear();
                Ok(json!({ "deleted": count }))
            }
            other => bail!("no domain service for '{other}'"),
        }
    }
}

#[async_trait]
impl DomainServices for InMemoryDomainServices {
    async fn invoke(&self, tool: &str, args: &Value) -> anyhow::Result<Value> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((tool.to_string(), args.clone()));
        self.apply(tool, args)
            .with_context(|| format!("{tool} failed"))
    }
}

fn logged(id: &str, name: &str, date: &str, exercises: &[&str]) -> LoggedWorkout {
    LoggedWorkout {
        id: id.to_string(),
        name: name.to_string(),
        date: date.to_string(),
        exercises: exercises.iter().map(|e| e.to_string()).collect(),
    }
}

fn str_arg<'a>(args: &'a Value, name: &str) -> anyhow::Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing string argument '{name}'"))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_newest_first_with_limit() {
        let services = InMemoryDomainServices::with_sample_data();
        let result = services.invoke("get_workout_history", &json!({"limit": 2})).await.unwrap();
        assert_eq!(result["total"], 3);
        assert_eq!(result["workouts"][0]["id"], "w-3");
        assert_eq!(result["workouts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_missing_workout() {
        let services = InMemoryDomainServices::with_sample_data();
        let result = services.invoke("delete_workout", &json!({"workout_id": "w-2"})).await.unwrap();
        assert_eq!(result["deleted"], "w-2");
        assert_eq!(services.workout_ids(), vec!["w-1", "w-3"]);

        let err = services.invoke("delete_workout", &json!({"workout_id": "w-2"})).await.unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let services = InMemoryDomainServices::with_sample_data();
        services
            .invoke(
                "update_profile",
                &json!({"fitness_level": "advanced", "equipment": "barbell, dumbbells"}),
            )
            .await
            .unwrap();
        let profile = services.profile();
        assert_eq!(profile.level, FitnessLevel::Advanced);
        assert_eq!(profile.equipment, vec![Equipment::Barbell, Equipment::Dumbbell]);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_and_is_recorded() {
        let services = InMemoryDomainServices::new();
        assert!(services.invoke("hack_database", &json!({})).await.is_err());
        assert_eq!(services.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_muscle_volume_queries() {
        let services = InMemoryDomainServices::with_sample_data();
        let one = services.invoke("get_muscle_volume", &json!({"muscle": "back"})).await.unwrap();
        assert_eq!(one["volume"], 150.0);
        let all = services.invoke("get_muscle_volume", &json!({})).await.unwrap();
        assert_eq!(all["volumes"]["chest"], 1200.0);
    }
}
