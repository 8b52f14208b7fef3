//! Generation gateway: the boundary to the remote text and media models.
//!
//! We only call chat.completions (plain text or strict JSON object) plus the
//! media generation endpoints. Calls are instrumented and log model names,
//! latencies, and response sizes, never payload contents or the API key.
//!
//! Model JSON arrives loosely structured (the roadmap is sometimes wrapped in
//! different envelope keys), so decoding tries a small fixed set of known
//! shapes in priority order and fails with a gateway error if none match.
//! Unknown shapes are never silently coerced.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::{CodingChallenge, ModuleDraft, QuizQuestion};
use crate::error::{Error, Result};
use crate::util::fill_template;

/// Verdict of a code validation attempt. Feedback is ephemeral: it is shown
/// once and overwritten by the next attempt, never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodeReview {
    pub passed: bool,
    pub feedback: String,
}

/// Everything the flows need from the generative backend. Implemented by the
/// OpenAI-style client in production and by scripted fakes in tests.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Expected length 3; callers fall back to fixed defaults on failure.
    async fn clarifying_questions(&self, topic: &str) -> Result<Vec<String>>;
    /// Expected 6 modules of 6-8 lessons. Failure aborts course creation.
    async fn roadmap(&self, topic: &str, context: &str) -> Result<Vec<ModuleDraft>>;
    /// Expected 2 new modules. Same failure contract as `roadmap`.
    async fn expansion(
        &self,
        existing_topics: &[String],
        course_topic: &str,
        focus: Option<&str>,
    ) -> Result<Vec<ModuleDraft>>;
    /// Markdown lesson body. Callers substitute a placeholder on failure.
    async fn lesson_content(&self, topic: &str, lesson_title: &str, module_title: &str) -> Result<String>;
    /// Callers degrade to an empty quiz on failure.
    async fn quiz(&self, lesson_content: &str) -> Result<Vec<QuizQuestion>>;
    /// Callers degrade to no challenges on failure.
    async fn coding_challenges(&self, lesson_content: &str) -> Result<Vec<CodingChallenge>>;
    async fn validate_code(&self, task: &str, user_code: &str, reference: &str) -> Result<CodeReview>;
    /// Best-effort mocked execution output.
    async fn simulate_code(&self, code: &str, language: &str) -> Result<String>;
    /// Opaque media references; failures never block lesson navigation.
    async fn illustration(&self, lesson_title: &str) -> Result<String>;
    async fn video_summary(&self, lesson_title: &str) -> Result<String>;
    async fn edit_image(&self, image_ref: &str, instruction: &str) -> Result<String>;
    async fn animate_image(&self, image_ref: &str, prompt: &str) -> Result<String>;
}

/// Where the media endpoints get their API key. Injected explicitly so the
/// client never probes an ambient global; the default reads the environment
/// and `NoMediaKey` disables media generation outright.
pub trait MediaKeySource: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Reads MEDIA_API_KEY, falling back to the main OPENAI_API_KEY.
pub struct EnvMediaKey;

impl MediaKeySource for EnvMediaKey {
    fn api_key(&self) -> Option<String> {
        std::env::var("MEDIA_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
    }
}

/// No-op capability: media operations fail fast and flows degrade to
/// "no illustration/video available".
pub struct NoMediaKey;

impl MediaKeySource for NoMediaKey {
    fn api_key(&self) -> Option<String> {
        None
    }
}

#[derive(Clone)]
pub struct OpenAi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    media_base_url: String,
    fast_model: String,
    strong_model: String,
    prompts: Prompts,
    media_keys: Arc<dyn MediaKeySource>,
}

impl OpenAi {
    /// Construct the client if we find OPENAI_API_KEY; otherwise return None
    /// and every gateway operation degrades per its failure contract.
    pub fn from_env(prompts: Prompts, media_keys: Arc<dyn MediaKeySource>) -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let media_base_url = std::env::var("MEDIA_BASE_URL").unwrap_or_else(|_| base_url.clone());
        let fast_model =
            std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        let strong_model =
            std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .ok()?;

        Some(Self {
            client,
            api_key,
            base_url,
            media_base_url,
            fast_model,
            strong_model,
            prompts,
            media_keys,
        })
    }

    async fn chat(&self, model: &str, system: &str, user: &str, temperature: f32, json: bool) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessageReq { role: "system".into(), content: system.into() },
                ChatMessageReq { role: "user".into(), content: user.into() },
            ],
            temperature,
            response_format: json.then(|| ResponseFormat { r#type: "json_object".into() }),
        };

        let started = std::time::Instant::now();
        let res = self
            .client
            .post(&url)
            .header(USER_AGENT, "mentora-backend/0.1")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::gateway(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let msg = extract_provider_error(&body).unwrap_or(body);
            return Err(Error::gateway(format!("HTTP {}: {}", status, msg)));
        }

        let body: ChatCompletionResponse = res.json().await.map_err(|e| Error::gateway(e.to_string()))?;
        if let Some(usage) = &body.usage {
            info!(
                target: "gateway",
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                elapsed = ?started.elapsed(),
                "model usage"
            );
        }
        let text = body
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(text)
    }

    /// Plain-text chat completion.
    #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
    async fn chat_plain(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String> {
        self.chat(model, system, user, temperature, false).await
    }

    /// Strict-JSON chat completion, returning the raw JSON text so callers
    /// can run the tolerant envelope decoders on it.
    #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
    async fn chat_json_raw(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String> {
        self.chat(model, system, user, temperature, true).await
    }

    /// Strict-JSON chat completion parsed into a fixed target type.
    async fn chat_json<T: for<'a> Deserialize<'a>>(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<T> {
        let text = self.chat(model, system, user, temperature, true).await?;
        serde_json::from_str::<T>(&text).map_err(|e| Error::gateway(format!("JSON parse error: {}", e)))
    }

    /// POST a prompt to a media generation endpoint, returning the opaque
    /// reference from `data[0].url`.
    #[instrument(level = "info", skip(self, prompt), fields(endpoint = %endpoint, prompt_len = prompt.len()))]
    async fn media(&self, endpoint: &str, prompt: &str) -> Result<String> {
        let Some(key) = self.media_keys.api_key() else {
            return Err(Error::gateway("media generation unavailable: no media API key"));
        };
        let url = format!("{}/{}", self.media_base_url, endpoint);
        let res = self
            .client
            .post(&url)
            .header(USER_AGENT, "mentora-backend/0.1")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", key))
            .json(&MediaRequest { prompt: prompt.to_string(), n: 1 })
            .send()
            .await
            .map_err(|e| Error::gateway(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let msg = extract_provider_error(&body).unwrap_or(body);
            return Err(Error::gateway(format!("HTTP {}: {}", status, msg)));
        }

        let body: MediaResponse = res.json().await.map_err(|e| Error::gateway(e.to_string()))?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.url)
            .ok_or_else(|| Error::gateway("media response carried no reference"))
    }
}

#[async_trait]
impl Gateway for OpenAi {
    #[instrument(level = "info", skip(self), fields(topic_len = topic.len()))]
    async fn clarifying_questions(&self, topic: &str) -> Result<Vec<String>> {
        let user = fill_template(&self.prompts.clarify_user_template, &[("topic", topic)]);
        let raw = self
            .chat_json_raw(&self.fast_model, &self.prompts.clarify_system, &user, 0.7)
            .await?;
        let questions = decode_string_list(&raw, "questions")?;
        if questions.is_empty() {
            return Err(Error::gateway("model returned no clarifying questions"));
        }
        Ok(questions)
    }

    #[instrument(level = "info", skip(self, context), fields(topic_len = topic.len(), model = %self.strong_model))]
    async fn roadmap(&self, topic: &str, context: &str) -> Result<Vec<ModuleDraft>> {
        let user = fill_template(
            &self.prompts.roadmap_user_template,
            &[("topic", topic), ("context", context)],
        );
        let started = std::time::Instant::now();
        let raw = self
            .chat_json_raw(&self.strong_model, &self.prompts.roadmap_system, &user, 0.9)
            .await;
        match &raw {
            Ok(_) => info!(target: "gateway", elapsed = ?started.elapsed(), "roadmap response received"),
            Err(e) => error!(target: "gateway", elapsed = ?started.elapsed(), error = %e, "roadmap generation failed"),
        }
        let modules = decode_module_envelope(&raw?)?;
        if modules.is_empty() {
            return Err(Error::gateway("roadmap contained no modules"));
        }
        Ok(modules)
    }

    #[instrument(level = "info", skip(self, existing_topics), fields(existing = existing_topics.len()))]
    async fn expansion(
        &self,
        existing_topics: &[String],
        course_topic: &str,
        focus: Option<&str>,
    ) -> Result<Vec<ModuleDraft>> {
        let topics = existing_topics.join("; ");
        let user = fill_template(
            &self.prompts.expand_user_template,
            &[
                ("topics", topics.as_str()),
                ("topic", course_topic),
                ("focus", focus.unwrap_or("none")),
            ],
        );
        let raw = self
            .chat_json_raw(&self.strong_model, &self.prompts.expand_system, &user, 0.9)
            .await?;
        let modules = decode_module_envelope(&raw)?;
        if modules.is_empty() {
            return Err(Error::gateway("expansion contained no modules"));
        }
        Ok(modules)
    }

    #[instrument(level = "info", skip(self), fields(lesson = %lesson_title))]
    async fn lesson_content(&self, topic: &str, lesson_title: &str, module_title: &str) -> Result<String> {
        let user = fill_template(
            &self.prompts.lesson_user_template,
            &[
                ("topic", topic),
                ("lesson_title", lesson_title),
                ("module_title", module_title),
            ],
        );
        self.chat_plain(&self.strong_model, &self.prompts.lesson_system, &user, 0.7).await
    }

    #[instrument(level = "info", skip(self, lesson_content), fields(content_len = lesson_content.len()))]
    async fn quiz(&self, lesson_content: &str) -> Result<Vec<QuizQuestion>> {
        let user = fill_template(&self.prompts.quiz_user_template, &[("lesson_content", lesson_content)]);
        let raw = self
            .chat_json_raw(&self.fast_model, &self.prompts.quiz_system, &user, 0.5)
            .await?;
        decode_quiz_envelope(&raw)
    }

    #[instrument(level = "info", skip(self, lesson_content), fields(content_len = lesson_content.len()))]
    async fn coding_challenges(&self, lesson_content: &str) -> Result<Vec<CodingChallenge>> {
        let user = fill_template(
            &self.prompts.challenge_user_template,
            &[("lesson_content", lesson_content)],
        );
        let raw = self
            .chat_json_raw(&self.fast_model, &self.prompts.challenge_system, &user, 0.5)
            .await?;
        decode_challenge_envelope(&raw)
    }

    #[instrument(level = "info", skip(self, task, user_code, reference), fields(code_len = user_code.len()))]
    async fn validate_code(&self, task: &str, user_code: &str, reference: &str) -> Result<CodeReview> {
        let user = fill_template(
            &self.prompts.validate_user_template,
            &[
                ("task", task),
                ("user_code", user_code),
                ("reference_solution", reference),
            ],
        );
        self.chat_json(&self.strong_model, &self.prompts.validate_system, &user, 0.2).await
    }

    #[instrument(level = "info", skip(self, code), fields(%language, code_len = code.len()))]
    async fn simulate_code(&self, code: &str, language: &str) -> Result<String> {
        let user = fill_template(
            &self.prompts.simulate_user_template,
            &[("language", language), ("code", code)],
        );
        self.chat_plain(&self.fast_model, &self.prompts.simulate_system, &user, 0.0).await
    }

    #[instrument(level = "info", skip(self), fields(lesson = %lesson_title))]
    async fn illustration(&self, lesson_title: &str) -> Result<String> {
        let prompt = fill_template(&self.prompts.illustration_template, &[("lesson_title", lesson_title)]);
        self.media("images/generations", &prompt).await
    }

    #[instrument(level = "info", skip(self), fields(lesson = %lesson_title))]
    async fn video_summary(&self, lesson_title: &str) -> Result<String> {
        let prompt = fill_template(&self.prompts.video_template, &[("lesson_title", lesson_title)]);
        self.media("videos/generations", &prompt).await
    }

    #[instrument(level = "info", skip(self, instruction))]
    async fn edit_image(&self, image_ref: &str, instruction: &str) -> Result<String> {
        let prompt = format!("Edit the image at {}: {}", image_ref, instruction);
        self.media("images/generations", &prompt).await
    }

    #[instrument(level = "info", skip(self, prompt))]
    async fn animate_image(&self, image_ref: &str, prompt: &str) -> Result<String> {
        let prompt = format!("Animate the image at {}: {}", image_ref, prompt);
        self.media("videos/generations", &prompt).await
    }
}

// --- Tolerant envelope decoders ---

fn parse_value(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| Error::gateway(format!("not JSON: {}", e)))
}

/// Decode a list of strings wrapped either as `{"<key>": [...]}` or a bare
/// array.
pub fn decode_string_list(raw: &str, key: &str) -> Result<Vec<String>> {
    let value = parse_value(raw)?;
    let arr = match &value {
        Value::Object(map) => map.get(key).and_then(Value::as_array),
        Value::Array(a) => Some(a),
        _ => None,
    };
    let arr = arr.ok_or_else(|| Error::gateway(format!("no '{}' array in response", key)))?;
    Ok(arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
}

/// Decode roadmap/expansion modules. Known envelopes, in priority order:
/// `{"modules": [...]}`, `{"course": {"modules": [...]}}`, bare array.
/// Modules without lessons are dropped; a course must never be born with an
/// unreachable first module.
pub fn decode_module_envelope(raw: &str) -> Result<Vec<ModuleDraft>> {
    let value = parse_value(raw)?;
    let modules = value
        .get("modules")
        .or_else(|| value.get("course").and_then(|c| c.get("modules")))
        .or(match &value {
            Value::Array(_) => Some(&value),
            _ => None,
        })
        .cloned()
        .ok_or_else(|| Error::gateway("no known module envelope in response"))?;
    let drafts: Vec<ModuleDraft> =
        serde_json::from_value(modules).map_err(|e| Error::gateway(format!("module shape: {}", e)))?;
    let total = drafts.len();
    let kept: Vec<ModuleDraft> = drafts.into_iter().filter(|m| !m.lessons.is_empty()).collect();
    if kept.len() < total {
        warn!(target: "gateway", dropped = total - kept.len(), "dropped modules without lessons");
    }
    Ok(kept)
}

/// Decode quiz questions from `{"questions": [...]}` or a bare array,
/// dropping malformed entries (empty options, out-of-range answer index).
pub fn decode_quiz_envelope(raw: &str) -> Result<Vec<QuizQuestion>> {
    let value = parse_value(raw)?;
    let questions = value
        .get("questions")
        .or(match &value {
            Value::Array(_) => Some(&value),
            _ => None,
        })
        .cloned()
        .ok_or_else(|| Error::gateway("no known quiz envelope in response"))?;
    let questions: Vec<QuizQuestion> =
        serde_json::from_value(questions).map_err(|e| Error::gateway(format!("quiz shape: {}", e)))?;
    let total = questions.len();
    let kept: Vec<QuizQuestion> = questions.into_iter().filter(QuizQuestion::is_well_formed).collect();
    if kept.len() < total {
        warn!(target: "gateway", dropped = total - kept.len(), "dropped malformed quiz questions");
    }
    Ok(kept)
}

/// Challenge shape as emitted by the model; the id is usually absent.
#[derive(Deserialize)]
struct ChallengeDraft {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "starterCode", default)]
    starter_code: String,
    #[serde(rename = "solutionReference", default)]
    solution_reference: String,
    #[serde(default)]
    hint: String,
}

/// Decode coding challenges from `{"challenges": [...]}` or a bare array,
/// assigning fresh ids where the model omitted them.
pub fn decode_challenge_envelope(raw: &str) -> Result<Vec<CodingChallenge>> {
    let value = parse_value(raw)?;
    let challenges = value
        .get("challenges")
        .or(match &value {
            Value::Array(_) => Some(&value),
            _ => None,
        })
        .cloned()
        .ok_or_else(|| Error::gateway("no known challenge envelope in response"))?;
    let drafts: Vec<ChallengeDraft> = serde_json::from_value(challenges)
        .map_err(|e| Error::gateway(format!("challenge shape: {}", e)))?;
    Ok(drafts
        .into_iter()
        .map(|d| CodingChallenge {
            id: d.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            title: d.title,
            description: d.description,
            starter_code: d.starter_code,
            solution_reference: d.solution_reference,
            hint: d.hint,
        })
        .collect())
}

// --- Chat and media DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessageReq>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq {
    role: String,
    content: String,
}
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    r#type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResp,
}
#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[derive(Serialize)]
struct MediaRequest {
    prompt: String,
    n: u8,
}
#[derive(Deserialize)]
struct MediaResponse {
    data: Vec<MediaItem>,
}
#[derive(Deserialize)]
struct MediaItem {
    url: String,
}

/// Try to extract a clean error message from a provider error body.
fn extract_provider_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct EWrap {
        error: EObj,
    }
    #[derive(Deserialize)]
    struct EObj {
        message: String,
    }
    serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULES: &str = r#"[
        {"title": "Vectors", "description": "", "lessons": [{"title": "Intro"}]},
        {"title": "Matrices", "lessons": [{"title": "Basics", "description": "rows"}]}
    ]"#;

    #[test]
    fn module_envelopes_are_tried_in_priority_order() {
        let wrapped = format!(r#"{{"modules": {}}}"#, MODULES);
        assert_eq!(decode_module_envelope(&wrapped).unwrap().len(), 2);

        let nested = format!(r#"{{"course": {{"modules": {}}}}}"#, MODULES);
        assert_eq!(decode_module_envelope(&nested).unwrap().len(), 2);

        assert_eq!(decode_module_envelope(MODULES).unwrap().len(), 2);
    }

    #[test]
    fn modules_without_lessons_are_dropped() {
        let raw = r#"{"modules": [
            {"title": "Empty", "lessons": []},
            {"title": "Real", "lessons": [{"title": "Intro"}]}
        ]}"#;
        let modules = decode_module_envelope(raw).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].title, "Real");

        // All-empty decodes to nothing; roadmap/expansion then reject it.
        let raw = r#"{"modules": [{"title": "Empty", "lessons": []}]}"#;
        assert!(decode_module_envelope(raw).unwrap().is_empty());
    }

    #[test]
    fn unknown_module_envelopes_fail_instead_of_coercing() {
        let err = decode_module_envelope(r#"{"roadmap": []}"#).unwrap_err();
        assert!(matches!(err, Error::Gateway { .. }));
        assert!(decode_module_envelope("not json at all").is_err());
    }

    #[test]
    fn quiz_decoder_drops_malformed_questions() {
        let raw = r#"{"questions": [
            {"question": "ok?", "options": ["a", "b"], "correctAnswerIndex": 1},
            {"question": "bad index", "options": ["a"], "correctAnswerIndex": 3},
            {"question": "no options", "options": [], "correctAnswerIndex": 0}
        ]}"#;
        let quiz = decode_quiz_envelope(raw).unwrap();
        assert_eq!(quiz.len(), 1);
        assert_eq!(quiz[0].question, "ok?");
    }

    #[test]
    fn challenge_decoder_assigns_missing_ids() {
        let raw = r#"{"challenges": [
            {"title": "Sum", "starterCode": "fn s() {}", "solutionReference": "x", "hint": "h"}
        ]}"#;
        let challenges = decode_challenge_envelope(raw).unwrap();
        assert_eq!(challenges.len(), 1);
        assert!(!challenges[0].id.is_empty());
    }

    #[test]
    fn string_list_accepts_wrapped_and_bare_arrays() {
        let wrapped = r#"{"questions": ["a?", "b?"]}"#;
        assert_eq!(decode_string_list(wrapped, "questions").unwrap(), vec!["a?", "b?"]);
        assert_eq!(decode_string_list(r#"["x?"]"#, "questions").unwrap(), vec!["x?"]);
        assert!(decode_string_list(r#"{"answers": []}"#, "questions").is_err());
    }
}
