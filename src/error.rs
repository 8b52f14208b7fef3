//! Error taxonomy for the backend.
//!
//! Gateway failures are always recoverable: flows catch them at the boundary
//! and degrade (fallback questions, placeholder content, empty quiz) or roll
//! the session back. `InvalidState` and `LockedLesson` are defensive rejections
//! of operations the UI should not have offered. `StorageCorrupted` triggers a
//! full persisted-state reset on load.

/// Specialized `Result` used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the course model, repository, store, and gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network or parse failure from the Generation Gateway.
    #[error("gateway error: {message}")]
    Gateway {
        /// What failed (HTTP status, parse error, missing envelope...).
        message: String,
    },

    /// Operation invoked in the wrong progression or session state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Which precondition was violated.
        message: String,
    },

    /// Attempt to navigate to a lesson that is still locked.
    /// Callers treat this as a silent no-op toward the end user.
    #[error("lesson {module_index}/{lesson_index} is locked")]
    LockedLesson {
        /// Module index of the locked target.
        module_index: usize,
        /// Lesson index of the locked target.
        lesson_index: usize,
    },

    /// Repository operation on an unknown course id.
    #[error("course not found: {id}")]
    NotFound {
        /// The unknown course id.
        id: String,
    },

    /// Persisted data failed to parse on load. Recovery discards all
    /// persisted state rather than partially trusting it.
    #[error("persisted state corrupted: {message}")]
    StorageCorrupted {
        /// Description of the corruption.
        message: String,
    },

    /// I/O error while touching the persisted store.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a gateway failure.
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway { message: message.into() }
    }

    /// Shorthand for an invalid-state rejection.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Shorthand for an unknown-course error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Shorthand for a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::StorageCorrupted { message: message.into() }
    }

    /// True for errors the UI surfaces as a transient notice and retries.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Gateway { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = Error::LockedLesson { module_index: 2, lesson_index: 0 };
        assert_eq!(err.to_string(), "lesson 2/0 is locked");

        let err = Error::not_found("c-42");
        assert!(err.to_string().contains("c-42"));
    }

    #[test]
    fn only_gateway_errors_are_transient() {
        assert!(Error::gateway("timeout").is_transient());
        assert!(!Error::invalid_state("no quiz").is_transient());
        assert!(!Error::corrupted("bad json").is_transient());
    }
}
