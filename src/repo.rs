//! Course repository: owns the course collection and the active-course
//! pointer, with write-through persistence after every mutation.
//!
//! Courses are only ever replaced whole, keyed by id. `replace` on an unknown
//! id fails with `NotFound` instead of silently upserting.

use tracing::{info, instrument};

use crate::domain::Course;
use crate::error::{Error, Result};
use crate::store::{load_state, save_state, AppPhase, PersistedState, Store};

/// Outcome of a delete, so the caller knows whether to navigate away from the
/// now-gone active course.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// True when the deleted course was the active one; the caller must
    /// navigate to the course-list view, even if other courses remain.
    pub navigate_to_list: bool,
}

pub struct CourseRepository<S: Store> {
    store: S,
    state: PersistedState,
}

impl<S: Store> CourseRepository<S> {
    /// Open the repository, loading (and if needed migrating or discarding)
    /// whatever the store holds.
    pub fn open(store: S) -> Self {
        let state = load_state(&store);
        info!(target: "course", courses = state.courses.len(), "repository loaded");
        Self { store, state }
    }

    fn persist(&self) -> Result<()> {
        save_state(&self.store, &self.state)
    }

    #[instrument(level = "info", skip(self, course), fields(course_id = %course.id, topic = %course.topic))]
    pub fn create(&mut self, course: Course) -> Result<()> {
        self.state.courses.push(course);
        self.persist()
    }

    /// Whole-object replacement keyed by id. No partial field patches.
    pub fn replace(&mut self, course: Course) -> Result<()> {
        let slot = self
            .state
            .courses
            .iter_mut()
            .find(|c| c.id == course.id)
            .ok_or_else(|| Error::not_found(&course.id))?;
        *slot = course;
        self.persist()
    }

    #[instrument(level = "info", skip(self))]
    pub fn delete(&mut self, id: &str) -> Result<DeleteOutcome> {
        let before = self.state.courses.len();
        self.state.courses.retain(|c| c.id != id);
        if self.state.courses.len() == before {
            return Err(Error::not_found(id));
        }
        let was_active = self.state.active_course_id.as_deref() == Some(id);
        if was_active {
            self.state.active_course_id = None;
        }
        self.persist()?;
        Ok(DeleteOutcome { navigate_to_list: was_active })
    }

    pub fn set_active(&mut self, id: &str) -> Result<()> {
        if !self.state.courses.iter().any(|c| c.id == id) {
            return Err(Error::not_found(id));
        }
        self.state.active_course_id = Some(id.to_string());
        self.persist()
    }

    pub fn get(&self, id: &str) -> Option<&Course> {
        self.state.courses.iter().find(|c| c.id == id)
    }

    pub fn all(&self) -> &[Course] {
        &self.state.courses
    }

    pub fn active_id(&self) -> Option<&str> {
        self.state.active_course_id.as_deref()
    }

    pub fn active(&self) -> Option<&Course> {
        self.active_id().and_then(|id| self.get(id))
    }

    pub fn app_phase(&self) -> AppPhase {
        self.state.app_state
    }

    pub fn set_app_phase(&mut self, phase: AppPhase) -> Result<()> {
        self.state.app_state = phase;
        self.persist()
    }
}
