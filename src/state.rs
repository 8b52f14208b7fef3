//! Shared application state: the course repository over the persisted store,
//! the transient clarification session, per-course progression, the in-flight
//! fetch markers, and the optional gateway client.
//!
//! All state is passed explicitly through this struct; there are no ambient
//! globals. If the gateway is absent (no OPENAI_API_KEY) every flow degrades
//! per its failure contract.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument};

use crate::config::load_agent_config_from_env;
use crate::gateway::{EnvMediaKey, Gateway, OpenAi};
use crate::progress::Progression;
use crate::repo::CourseRepository;
use crate::session::ClarificationSession;
use crate::store::{FileStore, Store};

/// Marker for a lesson-content fetch in progress: (course id, module, lesson).
pub type LessonKey = (String, usize, usize);

pub struct AppState {
    pub repo: RwLock<CourseRepository<Arc<dyn Store>>>,
    pub session: RwLock<Option<ClarificationSession>>,
    pub progression: RwLock<HashMap<String, Progression>>,
    pub inflight: Mutex<HashSet<LessonKey>>,
    pub gateway: Option<Arc<dyn Gateway>>,
    pub store: Arc<dyn Store>,
}

impl AppState {
    /// Build state from env: load config, open the file store (migrating or
    /// discarding persisted data as needed), init the gateway client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> crate::error::Result<Self> {
        let prompts = load_agent_config_from_env().map(|c| c.prompts).unwrap_or_default();

        let store: Arc<dyn Store> = Arc::new(FileStore::open(FileStore::default_path())?);

        let gateway = OpenAi::from_env(prompts, Arc::new(EnvMediaKey));
        match &gateway {
            Some(_) => info!(target: "mentora_backend", "gateway enabled"),
            None => info!(target: "mentora_backend", "gateway disabled (no OPENAI_API_KEY); flows degrade to fallbacks"),
        }
        let gateway: Option<Arc<dyn Gateway>> = gateway.map(|g| Arc::new(g) as Arc<dyn Gateway>);

        Ok(Self::assemble(store, gateway))
    }

    /// Build state from explicit parts. Used by tests with a memory store and
    /// a scripted gateway.
    pub fn with_parts(store: Arc<dyn Store>, gateway: Option<Arc<dyn Gateway>>) -> Self {
        Self::assemble(store, gateway)
    }

    fn assemble(store: Arc<dyn Store>, gateway: Option<Arc<dyn Gateway>>) -> Self {
        let repo = CourseRepository::open(store.clone());
        Self {
            repo: RwLock::new(repo),
            session: RwLock::new(None),
            progression: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashSet::new()),
            gateway,
            store,
        }
    }
}
