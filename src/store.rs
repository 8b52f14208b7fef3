//! Persisted key-value store and the versioned state schema on top of it.
//!
//! The store itself is opaque string storage with `get`/`set`/`remove`; the
//! production impl is a single JSON file (path from `DATA_PATH`, default under
//! the user data dir), the test impl is in-memory. Every mutation is written
//! through immediately; replaying a write is safe.
//!
//! Schema: the `state` key holds a versioned `PersistedState`. A one-time
//! migration wraps a legacy single-course record (`course` key) into the
//! collection and removes the legacy key. Corrupt data is never partially
//! trusted: on any parse failure all persisted state is discarded and the app
//! restarts at the initial screen.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Course, Module};
use crate::error::{Error, Result};

const STATE_KEY: &str = "state";
const LEGACY_COURSE_KEY: &str = "course";
const PREFERENCES_KEY: &str = "preferences";

const SCHEMA_VERSION: u32 = 1;

/// Opaque key-value storage surviving restarts.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: Store + ?Sized> Store for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<T: Store + ?Sized> Store for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Coarse application state, persisted so a restart lands on the same screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppPhase {
    #[default]
    Home,
    Clarifying,
    Learning,
}

/// Everything the backend persists, under one versioned key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub courses: Vec<Course>,
    #[serde(rename = "activeCourseId")]
    pub active_course_id: Option<String>,
    #[serde(rename = "appState", default)]
    pub app_state: AppPhase,
}

impl PersistedState {
    pub fn empty() -> Self {
        Self { version: SCHEMA_VERSION, ..Default::default() }
    }
}

/// Legacy single-course record: written by old builds before the collection
/// existed. Id and timestamp may be absent.
#[derive(Debug, Deserialize)]
struct LegacyCourse {
    #[serde(default)]
    id: Option<String>,
    topic: String,
    modules: Vec<Module>,
    #[serde(rename = "currentModuleIndex", default)]
    current_module_index: usize,
    #[serde(rename = "currentLessonIndex", default)]
    current_lesson_index: usize,
    #[serde(rename = "createdAt", default)]
    created_at: Option<DateTime<Utc>>,
}

/// Load the persisted state, migrating or discarding as needed. Never fails:
/// the corruption policy is "discard everything and start fresh".
pub fn load_state(store: &dyn Store) -> PersistedState {
    match try_load_state(store) {
        Ok(state) => state,
        Err(e) => {
            error!(target: "store", error = %e, "persisted state unusable; discarding all of it");
            let _ = store.remove(STATE_KEY);
            let _ = store.remove(LEGACY_COURSE_KEY);
            PersistedState::empty()
        }
    }
}

fn try_load_state(store: &dyn Store) -> Result<PersistedState> {
    if let Some(raw) = store.get(STATE_KEY)? {
        let state: PersistedState = serde_json::from_str(&raw)
            .map_err(|e| Error::corrupted(format!("state record: {}", e)))?;
        return Ok(state);
    }

    // One-time migration: a legacy single-course record with no collection.
    if let Some(raw) = store.get(LEGACY_COURSE_KEY)? {
        let legacy: LegacyCourse = serde_json::from_str(&raw)
            .map_err(|e| Error::corrupted(format!("legacy course record: {}", e)))?;
        let course = Course {
            id: legacy.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            topic: legacy.topic,
            modules: legacy.modules,
            current_module_index: legacy.current_module_index,
            current_lesson_index: legacy.current_lesson_index,
            created_at: legacy.created_at.unwrap_or_else(Utc::now),
        };
        info!(target: "store", course_id = %course.id, "migrated legacy single-course record");
        let state = PersistedState {
            version: SCHEMA_VERSION,
            active_course_id: Some(course.id.clone()),
            courses: vec![course],
            app_state: AppPhase::Learning,
        };
        save_state(store, &state)?;
        store.remove(LEGACY_COURSE_KEY)?;
        return Ok(state);
    }

    Ok(PersistedState::empty())
}

/// Write-through save of the whole state record.
pub fn save_state(store: &dyn Store, state: &PersistedState) -> Result<()> {
    store.set(STATE_KEY, &serde_json::to_string(state)?)
}

/// Editor/display preferences: an opaque blob under its own key. A corrupt
/// blob degrades to the empty object instead of poisoning the state record.
pub fn load_preferences(store: &dyn Store) -> serde_json::Value {
    match store.get(PREFERENCES_KEY) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(target: "store", error = %e, "preferences unreadable; resetting");
            serde_json::json!({})
        }),
        _ => serde_json::json!({}),
    }
}

pub fn save_preferences(store: &dyn Store, prefs: &serde_json::Value) -> Result<()> {
    store.set(PREFERENCES_KEY, &serde_json::to_string(prefs)?)
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    cells: Mutex<HashMap<String, String>>,
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cells.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.cells.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.cells.lock().unwrap().remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON object file mapping keys to raw strings.
/// Writes rewrite the whole file; the payloads here are small.
pub struct FileStore {
    path: PathBuf,
    cells: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`. An unreadable file is discarded,
    /// consistent with the never-partially-trust-corrupt-data policy.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cells = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    error!(target: "store", path = %path.display(), error = %e, "store file corrupt; starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, cells: Mutex::new(cells) })
    }

    /// Resolve the store path: `DATA_PATH` env var, else the platform data
    /// dir, else `./mentora.json`.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var("DATA_PATH") {
            return PathBuf::from(p);
        }
        dirs::data_dir()
            .map(|d| d.join("mentora").join("mentora.json"))
            .unwrap_or_else(|| PathBuf::from("./mentora.json"))
    }

    fn flush(&self, cells: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(cells)?)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cells.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cells = self.cells.lock().unwrap();
        cells.insert(key.to_string(), value.to_string());
        self.flush(&cells)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut cells = self.cells.lock().unwrap();
        cells.remove(key);
        self.flush(&cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::draft;

    #[test]
    fn state_round_trips_through_a_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mentora.json");

        let mut course = Course::new("Linear Algebra", draft(&[("Vectors", &["Intro", "Dot"])]));
        course.lesson_at_mut(0, 0).unwrap().content = Some("# Intro\nvectors...".into());
        let state = PersistedState {
            version: 1,
            active_course_id: Some(course.id.clone()),
            courses: vec![course],
            app_state: AppPhase::Learning,
        };

        {
            let store = FileStore::open(&path).unwrap();
            save_state(&store, &state).unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        let loaded = load_state(&store);

        assert_eq!(loaded.courses, state.courses);
        assert_eq!(loaded.active_course_id, state.active_course_id);
        assert_eq!(loaded.app_state, AppPhase::Learning);
    }

    #[test]
    fn legacy_single_course_record_is_wrapped_and_removed() {
        let store = MemoryStore::default();
        store
            .set(
                LEGACY_COURSE_KEY,
                r#"{"topic":"Chess","modules":[{"id":"m1","title":"Openings","description":"","lessons":[]}]}"#,
            )
            .unwrap();

        let state = load_state(&store);
        assert_eq!(state.courses.len(), 1);
        assert_eq!(state.courses[0].topic, "Chess");
        assert!(!state.courses[0].id.is_empty());
        assert_eq!(state.active_course_id.as_deref(), Some(state.courses[0].id.as_str()));
        assert!(store.get(LEGACY_COURSE_KEY).unwrap().is_none());
        // Migration happens once: the new record is already in place.
        assert!(store.get(STATE_KEY).unwrap().is_some());
    }

    #[test]
    fn corrupt_state_is_discarded_entirely() {
        let store = MemoryStore::default();
        store.set(STATE_KEY, "{not json").unwrap();
        store.set(LEGACY_COURSE_KEY, "{also not json").unwrap();

        let state = load_state(&store);
        assert!(state.courses.is_empty());
        assert_eq!(state.app_state, AppPhase::Home);
        assert!(store.get(STATE_KEY).unwrap().is_none());
        assert!(store.get(LEGACY_COURSE_KEY).unwrap().is_none());
    }

    #[test]
    fn preferences_are_isolated_from_the_state_record() {
        let store = MemoryStore::default();
        save_preferences(&store, &serde_json::json!({"theme": "dark"})).unwrap();
        assert_eq!(load_preferences(&store)["theme"], "dark");

        store.set(PREFERENCES_KEY, "???").unwrap();
        assert_eq!(load_preferences(&store), serde_json::json!({}));
    }

    #[test]
    fn rewriting_the_same_value_is_idempotent() {
        let store = MemoryStore::default();
        let state = PersistedState::empty();
        save_state(&store, &state).unwrap();
        let first = store.get(STATE_KEY).unwrap();
        save_state(&store, &state).unwrap();
        assert_eq!(store.get(STATE_KEY).unwrap(), first);
    }
}
