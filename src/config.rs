//! Prompt configuration, loadable from TOML via `AGENT_CONFIG_PATH`.
//!
//! Defaults are tuned for course generation; override them in TOML to tune
//! tone or structure. Templates use `{name}` placeholders filled by
//! `util::fill_template`.

use serde::Deserialize;
use tracing::{error, info};

/// Fixed fallback when clarifying-question generation fails: the flow must
/// continue rather than block on the gateway.
pub const DEFAULT_CLARIFYING_QUESTIONS: [&str; 3] = [
    "What do you already know about this topic?",
    "What would you like to be able to do once you finish the course?",
    "How much time per week can you spend on it?",
];

/// Placeholder shown when lesson content generation fails; navigation is
/// never blocked on the gateway.
pub const LESSON_CONTENT_PLACEHOLDER: &str =
    "Content could not be generated right now. Move on and revisit this lesson later.";

/// Generic feedback when code validation itself fails.
pub const CODE_VALIDATION_UNAVAILABLE: &str =
    "Your code could not be checked right now. Please try again.";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub prompts: Prompts,
}

/// Prompts used by the gateway client.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
    pub clarify_system: String,
    pub clarify_user_template: String,
    pub roadmap_system: String,
    pub roadmap_user_template: String,
    pub expand_system: String,
    pub expand_user_template: String,
    pub lesson_system: String,
    pub lesson_user_template: String,
    pub quiz_system: String,
    pub quiz_user_template: String,
    pub challenge_system: String,
    pub challenge_user_template: String,
    pub validate_system: String,
    pub validate_user_template: String,
    pub simulate_system: String,
    pub simulate_user_template: String,
    pub illustration_template: String,
    pub video_template: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            clarify_system: "You help tailor a learning course. Respond ONLY with strict JSON.".into(),
            clarify_user_template: "The user wants to learn about '{topic}'. Return JSON {\"questions\": [string, string, string]}: exactly 3 short clarifying questions about prior knowledge, goals, and time budget.".into(),
            roadmap_system: "You are a curriculum designer. Respond ONLY with strict JSON.".into(),
            roadmap_user_template: "Design a course on '{topic}'. Learner context:\n{context}\n\nReturn JSON {\"modules\": [...]}: 6 modules, each {\"title\", \"description\", \"lessons\": [6-8 of {\"title\", \"description\"}]}. Order from fundamentals to advanced.".into(),
            expand_system: "You are a curriculum designer extending an existing course. Respond ONLY with strict JSON.".into(),
            expand_user_template: "Course topic: '{topic}'. Existing modules: {topics}. Focus request: {focus}.\nReturn JSON {\"modules\": [...]}: exactly 2 NEW modules (same shape as before) that do not repeat existing material.".into(),
            lesson_system: "You write clear, example-rich lesson content in markdown. Output ONLY markdown.".into(),
            lesson_user_template: "Write the lesson '{lesson_title}' from module '{module_title}' of a course on '{topic}'. 400-700 words, headings, one worked example.".into(),
            quiz_system: "You write multiple-choice quizzes. Respond ONLY with strict JSON.".into(),
            quiz_user_template: "Based on this lesson:\n{lesson_content}\n\nReturn JSON {\"questions\": [3-5 of {\"question\", \"options\": [4 strings], \"correctAnswerIndex\": int}]}.".into(),
            challenge_system: "You write small coding exercises. Respond ONLY with strict JSON.".into(),
            challenge_user_template: "Based on this lesson:\n{lesson_content}\n\nReturn JSON {\"challenges\": [1-2 of {\"title\", \"description\", \"starterCode\", \"solutionReference\", \"hint\"}]}. solutionReference is for grading only.".into(),
            validate_system: "You grade code submissions against a reference solution. Respond ONLY with strict JSON {\"passed\": boolean, \"feedback\": string}. Accept different but correct approaches.".into(),
            validate_user_template: "Task: {task}\nReference solution:\n{reference_solution}\nUser code:\n{user_code}".into(),
            simulate_system: "You are a code interpreter. Output ONLY what the program would print. No commentary.".into(),
            simulate_user_template: "Language: {language}\nCode:\n{code}".into(),
            illustration_template: "A clean, minimal illustration for a lesson titled '{lesson_title}'. No text in the image.".into(),
            video_template: "A short narrated summary video of this lesson: {lesson_title}".into(),
        }
    }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO
/// error, returns None and the defaults apply.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
    let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
    match std::fs::read_to_string(&path) {
        Ok(s) => match toml::from_str::<AgentConfig>(&s) {
            Ok(cfg) => {
                info!(target: "mentora_backend", %path, "Loaded agent config (TOML)");
                Some(cfg)
            }
            Err(e) => {
                error!(target: "mentora_backend", %path, error = %e, "Failed to parse TOML config");
                None
            }
        },
        Err(e) => {
            error!(target: "mentora_backend", %path, error = %e, "Failed to read TOML config file");
            None
        }
    }
}
