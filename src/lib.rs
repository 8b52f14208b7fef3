//! Mentora · AI Learning Course Backend
//!
//! Generates a personalized, module/lesson structured course for any topic,
//! walks the learner through a reading -> coding-challenge -> quiz loop per
//! lesson, and persists everything so a restart resumes exactly where the
//! learner left off.
//!
//! - Axum HTTP + WebSocket API
//! - Optional OpenAI integration (via environment variables)
//! - Single-file JSON persistence with legacy migration and
//!   discard-on-corruption recovery
//! - Static SPA fallback (./static/index.html)

pub mod config;
pub mod domain;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod progress;
pub mod protocol;
pub mod repo;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
