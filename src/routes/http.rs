//! HTTP endpoint handlers. These are thin wrappers that forward to the core
//! flows; error mapping to status codes happens here and nowhere deeper.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::Error;
use crate::flow;
use crate::flow::ClarifyOutcome;
use crate::protocol::*;
use crate::state::AppState;
use crate::store::{load_preferences, save_preferences};

/// Error envelope sent to clients. `transient` tells the UI to show a
/// retryable notice instead of a hard failure.
#[derive(Serialize)]
struct ErrorOut {
    message: String,
    transient: bool,
}

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Gateway { .. } => StatusCode::BAD_GATEWAY,
            Error::InvalidState { .. } => StatusCode::CONFLICT,
            Error::LockedLesson { .. } => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorOut { message: self.0.to_string(), transient: self.0.is_transient() };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
    Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(topic_len = body.topic.len()))]
pub async fn http_start_topic(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TopicIn>,
) -> ApiResult<Json<QuestionsOut>> {
    let questions = flow::start_topic(&state, &body.topic).await?;
    Ok(Json(QuestionsOut { questions }))
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.answer.len()))]
pub async fn http_clarify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClarifyIn>,
) -> ApiResult<Json<ClarifyOut>> {
    let out = match flow::submit_clarification(&state, &body.answer).await? {
        ClarifyOutcome::NextQuestion { question, .. } => {
            ClarifyOut { next_question: Some(question), course: None }
        }
        ClarifyOutcome::CourseCreated { course } => {
            info!(target: "course", course_id = %course.id, "course created via HTTP");
            ClarifyOut { next_question: None, course: Some(course_out(&course)) }
        }
    };
    Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_courses(State(state): State<Arc<AppState>>) -> Json<Vec<CourseSummaryOut>> {
    let repo = state.repo.read().await;
    let active = repo.active_id().map(str::to_string);
    let rows = repo
        .all()
        .iter()
        .map(|c| CourseSummaryOut {
            id: c.id.clone(),
            topic: c.topic.clone(),
            module_count: c.modules.len(),
            lesson_count: c.lesson_count(),
            created_at: c.created_at,
            active: active.as_deref() == Some(c.id.as_str()),
        })
        .collect();
    Json(rows)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CourseOut>> {
    let repo = state.repo.read().await;
    let course = repo.get(&id).ok_or_else(|| Error::not_found(&id))?;
    Ok(Json(course_out(course)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteOut>> {
    let outcome = flow::delete_course(&state, &id).await?;
    Ok(Json(DeleteOut { navigate_to_list: outcome.navigate_to_list }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_activate_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CourseOut>> {
    let mut repo = state.repo.write().await;
    repo.set_active(&id)?;
    let course = repo.get(&id).ok_or_else(|| Error::not_found(&id))?;
    Ok(Json(course_out(course)))
}

/// Open-lesson response: `locked` signals the silent no-op case.
#[derive(Serialize)]
pub struct OpenLessonOut {
    pub locked: bool,
    pub lesson: Option<LessonOut>,
}

#[instrument(level = "info", skip(state, body), fields(%id, m = body.module_index, l = body.lesson_index))]
pub async fn http_open_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<LessonSelectIn>,
) -> ApiResult<Json<OpenLessonOut>> {
    match flow::open_lesson(&state, &id, body.module_index, body.lesson_index).await {
        Ok(lesson) => Ok(Json(OpenLessonOut { locked: false, lesson: Some(lesson_out(&lesson)) })),
        // Locked target: no error surfaced to the end user, selection stays.
        Err(Error::LockedLesson { .. }) => Ok(Json(OpenLessonOut { locked: true, lesson: None })),
        Err(e) => Err(e.into()),
    }
}

#[instrument(level = "info", skip(state, body), fields(%id, skip_lesson = body.skip))]
pub async fn http_advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AdvanceIn>,
) -> ApiResult<Json<PhaseOut>> {
    let phase = flow::advance_to_challenge(&state, &id, body.skip).await?;
    Ok(Json(PhaseOut { phase }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_start_quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PhaseOut>> {
    let phase = flow::advance_to_quiz(&state, &id).await?;
    Ok(Json(PhaseOut { phase }))
}

#[instrument(level = "info", skip(state, body), fields(%id, answers = body.answers.len()))]
pub async fn http_submit_quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<QuizIn>,
) -> ApiResult<Json<crate::progress::QuizResult>> {
    let result = flow::submit_quiz(&state, &id, &body.answers).await?;
    Ok(Json(result))
}

#[instrument(level = "info", skip(state, body), fields(%id, %body.challenge_id))]
pub async fn http_submit_code(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CodeIn>,
) -> ApiResult<Json<CodeOut>> {
    let outcome = flow::attempt_challenge(&state, &id, &body.challenge_id, &body.code).await?;
    Ok(Json(CodeOut {
        passed: outcome.review.passed,
        feedback: outcome.review.feedback,
        all_passed: outcome.all_passed,
    }))
}

#[instrument(level = "info", skip(state, body), fields(%body.language, code_len = body.code.len()))]
pub async fn http_run_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunCodeIn>,
) -> Json<RunCodeOut> {
    let output = flow::simulate_code(&state, &body.code, &body.language).await;
    Json(RunCodeOut { output })
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_expand_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ExpandIn>,
) -> ApiResult<Json<CourseOut>> {
    let course = flow::expand_course(&state, &id, body.focus.as_deref()).await?;
    Ok(Json(course_out(&course)))
}

#[instrument(level = "info", skip(state, body), fields(%id, m = body.module_index, l = body.lesson_index))]
pub async fn http_generate_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<LessonSelectIn>,
) -> ApiResult<Json<VideoOut>> {
    let video = flow::generate_video_summary(&state, &id, body.module_index, body.lesson_index).await?;
    Ok(Json(VideoOut { video }))
}

#[instrument(level = "info", skip(state, body), fields(instr_len = body.instruction.len()))]
pub async fn http_edit_image(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EditImageIn>,
) -> ApiResult<Json<MediaOut>> {
    let reference = flow::edit_image(&state, &body.image, &body.instruction).await?;
    Ok(Json(MediaOut { reference }))
}

#[instrument(level = "info", skip(state, body), fields(prompt_len = body.prompt.len()))]
pub async fn http_animate_image(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnimateImageIn>,
) -> ApiResult<Json<MediaOut>> {
    let reference = flow::animate_image(&state, &body.image, &body.prompt).await?;
    Ok(Json(MediaOut { reference }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_preferences(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(load_preferences(&*state.store))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_set_preferences(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    save_preferences(&*state.store, &body).map_err(ApiError::from)?;
    Ok(Json(body))
}

#[instrument(level = "info", skip(state))]
pub async fn http_reset(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthOut>> {
    flow::reset_all(&state).await?;
    Ok(Json(HealthOut { ok: true }))
}
