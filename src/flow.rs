//! Core flows shared by both HTTP and WebSocket handlers.
//!
//! Every state transition lives here as an explicit function invoked from an
//! event handler, never as a side effect of producing a view. Gateway
//! failures are handled at this boundary: clarifying questions fall back to
//! fixed defaults, lesson sub-content degrades to placeholders or absence,
//! and a failed roadmap rolls the session back to the initial state.

use std::collections::HashMap;

use tracing::{error, info, instrument, warn};

use crate::config::{CODE_VALIDATION_UNAVAILABLE, DEFAULT_CLARIFYING_QUESTIONS, LESSON_CONTENT_PLACEHOLDER};
use crate::domain::{Course, Lesson};
use crate::error::{Error, Result};
use crate::gateway::CodeReview;
use crate::progress::{LessonPhase, Progression, QuizResult};
use crate::repo::DeleteOutcome;
use crate::session::{ClarificationSession, SessionStep};
use crate::state::AppState;
use crate::store::AppPhase;

/// What the clarification step hands back to the UI.
#[derive(Clone, Debug)]
pub enum ClarifyOutcome {
    /// Present this question next.
    NextQuestion { index: usize, question: String },
    /// All answers collected and the roadmap came back: a course now exists
    /// and is active.
    CourseCreated { course: Course },
}

/// Result of one coding-challenge attempt.
#[derive(Clone, Debug)]
pub struct ChallengeOutcome {
    pub review: CodeReview,
    /// True once every challenge of the active lesson has passed.
    pub all_passed: bool,
}

/// Submit a topic: fetch clarifying questions (fixed defaults if the gateway
/// fails) and open a fresh clarification session.
#[instrument(level = "info", skip(state), fields(topic_len = topic.len()))]
pub async fn start_topic(state: &AppState, topic: &str) -> Result<Vec<String>> {
    let questions = match &state.gateway {
        Some(gw) => match gw.clarifying_questions(topic).await {
            Ok(qs) => qs,
            Err(e) => {
                error!(target: "course", error = %e, "clarifying questions failed; using defaults");
                DEFAULT_CLARIFYING_QUESTIONS.iter().map(|s| s.to_string()).collect()
            }
        },
        None => DEFAULT_CLARIFYING_QUESTIONS.iter().map(|s| s.to_string()).collect(),
    };

    let session = ClarificationSession::start(topic, questions.clone())?;
    *state.session.write().await = Some(session);
    state.repo.write().await.set_app_phase(AppPhase::Clarifying)?;
    info!(target: "course", count = questions.len(), "clarification session started");
    Ok(questions)
}

/// Record one clarification answer. When the last answer lands, roadmap
/// generation runs; on success the new course is created and activated, on
/// failure the session is discarded and the app returns to the initial state
/// (no partial course is ever observable).
#[instrument(level = "info", skip(state, answer), fields(answer_len = answer.len()))]
pub async fn submit_clarification(state: &AppState, answer: &str) -> Result<ClarifyOutcome> {
    let mut guard = state.session.write().await;
    let Some(mut session) = guard.take() else {
        return Err(Error::invalid_state("no clarification session in progress"));
    };

    let step = match session.submit_answer(answer) {
        Ok(step) => step,
        Err(e) => {
            *guard = Some(session);
            return Err(e);
        }
    };

    match step {
        SessionStep::NextQuestion(index) => {
            let question = session.questions[index].clone();
            *guard = Some(session);
            Ok(ClarifyOutcome::NextQuestion { index, question })
        }
        SessionStep::Complete => {
            // The session is consumed either way: success hands off to the
            // course, failure resets to the initial screen.
            drop(guard);
            create_course(state, session).await.map(|course| ClarifyOutcome::CourseCreated { course })
        }
    }
}

async fn create_course(state: &AppState, session: ClarificationSession) -> Result<Course> {
    let gateway = state
        .gateway
        .as_ref()
        .ok_or_else(|| Error::gateway("course generation unavailable: no model configured"));

    let drafts = match gateway {
        Ok(gw) => gw.roadmap(&session.topic, &session.context()).await,
        Err(e) => Err(e),
    };

    let drafts = match drafts {
        Ok(d) => d,
        Err(e) => {
            error!(target: "course", error = %e, "roadmap generation failed; session reset");
            state.repo.write().await.set_app_phase(AppPhase::Home)?;
            return Err(e);
        }
    };

    let course = Course::new(session.topic, drafts);
    let mut repo = state.repo.write().await;
    repo.create(course.clone())?;
    repo.set_active(&course.id)?;
    repo.set_app_phase(AppPhase::Learning)?;
    drop(repo);
    state.progression.write().await.insert(course.id.clone(), Progression::default());
    info!(target: "course", course_id = %course.id, modules = course.modules.len(), "course created");
    Ok(course)
}

/// Run an engine operation against one course and persist the result by
/// whole-object replacement.
async fn mutate<T>(
    state: &AppState,
    course_id: &str,
    op: impl FnOnce(&mut Course, &mut Progression) -> Result<T>,
) -> Result<T> {
    let mut repo = state.repo.write().await;
    let mut progs = state.progression.write().await;
    let mut course = repo
        .get(course_id)
        .cloned()
        .ok_or_else(|| Error::not_found(course_id))?;
    let prog = progs.entry(course_id.to_string()).or_default();
    let out = op(&mut course, prog)?;
    repo.replace(course)?;
    Ok(out)
}

/// Navigate to a lesson. A `LockedLesson` error bubbles up so handlers can
/// turn it into a silent no-op.
pub async fn select_lesson(state: &AppState, course_id: &str, module: usize, lesson: usize) -> Result<()> {
    mutate(state, course_id, |course, prog| prog.select_lesson(course, module, lesson)).await
}

/// Navigate to a lesson and make sure its generated content is present.
pub async fn open_lesson(
    state: &AppState,
    course_id: &str,
    module: usize,
    lesson: usize,
) -> Result<Lesson> {
    select_lesson(state, course_id, module, lesson).await?;
    ensure_lesson_content(state, course_id, module, lesson).await
}

/// Fetch-and-cache lesson content, quiz, challenges, and illustration.
///
/// Only successful generations are cached, and the cache is then permanent:
/// a lesson that already has content is returned as-is with no gateway call.
/// A failed generation degrades that visit to an uncached placeholder, so a
/// later visit retries. An in-flight marker keyed by (course, module, lesson)
/// makes the check-then-fetch effectively atomic, so rapidly re-selecting the
/// same lesson issues at most one generation request.
#[instrument(level = "info", skip(state), fields(%course_id, %module, %lesson))]
pub async fn ensure_lesson_content(
    state: &AppState,
    course_id: &str,
    module: usize,
    lesson: usize,
) -> Result<Lesson> {
    let key = (course_id.to_string(), module, lesson);

    let (topic, module_title, snapshot) = {
        let repo = state.repo.read().await;
        let course = repo.get(course_id).ok_or_else(|| Error::not_found(course_id))?;
        let snapshot = course
            .lesson_at(module, lesson)
            .cloned()
            .ok_or_else(|| Error::invalid_state("lesson index out of range"))?;
        let module_title = course.modules.get(module).map(|m| m.title.clone()).unwrap_or_default();
        (course.topic.clone(), module_title, snapshot)
    };

    if snapshot.content.is_some() {
        return Ok(snapshot);
    }

    {
        let mut inflight = state.inflight.lock().await;
        if inflight.contains(&key) {
            // Another fetch for this lesson is running; hand back the
            // current (still-pending) lesson instead of duplicating it.
            return Ok(snapshot);
        }
        inflight.insert(key.clone());
    }

    let parts = generate_lesson_parts(state, &topic, &module_title, &snapshot).await;

    // Always clear the marker before merging.
    state.inflight.lock().await.remove(&key);

    // A failed generation degrades this visit only: the placeholder is handed
    // back without being cached, and the next visit retries.
    let Some(parts) = parts else {
        let mut degraded = snapshot;
        degraded.content = Some(LESSON_CONTENT_PLACEHOLDER.to_string());
        return Ok(degraded);
    };

    let mut repo = state.repo.write().await;
    let mut course = repo
        .get(course_id)
        .cloned()
        .ok_or_else(|| Error::not_found(course_id))?;
    let slot = course
        .lesson_at_mut(module, lesson)
        .ok_or_else(|| Error::invalid_state("lesson index out of range"))?;
    // Cache at most once; a concurrent write wins and stays.
    if slot.content.is_none() {
        slot.content = Some(parts.content);
        slot.quiz = Some(parts.quiz);
        slot.coding_challenges = Some(parts.challenges);
        slot.illustration = parts.illustration;
    }
    let updated = slot.clone();
    repo.replace(course)?;
    Ok(updated)
}

struct LessonParts {
    content: String,
    quiz: Vec<crate::domain::QuizQuestion>,
    challenges: Vec<crate::domain::CodingChallenge>,
    illustration: Option<String>,
}

/// `None` means nothing usable was generated; the caller must not cache it.
async fn generate_lesson_parts(
    state: &AppState,
    topic: &str,
    module_title: &str,
    lesson: &Lesson,
) -> Option<LessonParts> {
    let gw = state.gateway.as_ref()?;

    let content = match gw.lesson_content(topic, &lesson.title, module_title).await {
        Ok(text) => text,
        Err(e) => {
            error!(target: "gateway", error = %e, "lesson content failed; degrading to placeholder");
            return None;
        }
    };

    // Sub-content degrades independently; none of it blocks reading.
    let quiz = gw.quiz(&content).await.unwrap_or_else(|e| {
        warn!(target: "gateway", error = %e, "quiz generation failed; lesson gets none");
        Vec::new()
    });
    let challenges = gw.coding_challenges(&content).await.unwrap_or_else(|e| {
        warn!(target: "gateway", error = %e, "challenge generation failed; lesson gets none");
        Vec::new()
    });
    let illustration = match gw.illustration(&lesson.title).await {
        Ok(reference) => Some(reference),
        Err(e) => {
            warn!(target: "gateway", error = %e, "illustration failed; lesson has none");
            None
        }
    };

    Some(LessonParts { content, quiz, challenges, illustration })
}

/// `Reading -> Challenge`, optionally skipping (which completes the lesson).
pub async fn advance_to_challenge(state: &AppState, course_id: &str, skip: bool) -> Result<LessonPhase> {
    mutate(state, course_id, |course, prog| {
        prog.advance_to_challenge(course, skip)?;
        Ok(prog.phase)
    })
    .await
}

/// `Challenge -> Quiz`, once every coding challenge has passed.
pub async fn advance_to_quiz(state: &AppState, course_id: &str) -> Result<LessonPhase> {
    mutate(state, course_id, |course, prog| {
        prog.advance_to_quiz(course)?;
        Ok(prog.phase)
    })
    .await
}

/// Grade the quiz and unlock the next lesson.
pub async fn submit_quiz(
    state: &AppState,
    course_id: &str,
    answers: &HashMap<usize, usize>,
) -> Result<QuizResult> {
    mutate(state, course_id, |course, prog| prog.submit_quiz(course, answers)).await
}

/// Validate one coding-challenge attempt via the gateway and record a pass.
/// Gateway failure degrades to a not-passed verdict with generic feedback.
#[instrument(level = "info", skip(state, code), fields(%course_id, %challenge_id, code_len = code.len()))]
pub async fn attempt_challenge(
    state: &AppState,
    course_id: &str,
    challenge_id: &str,
    code: &str,
) -> Result<ChallengeOutcome> {
    let (task, reference, challenge_count) = {
        let repo = state.repo.read().await;
        let course = repo.get(course_id).ok_or_else(|| Error::not_found(course_id))?;
        let lesson = course
            .current_lesson()
            .ok_or_else(|| Error::invalid_state("no current lesson"))?;
        let challenges = lesson.coding_challenges.as_deref().unwrap_or_default();
        let challenge = challenges
            .iter()
            .find(|c| c.id == challenge_id)
            .ok_or_else(|| Error::invalid_state("unknown challenge for the active lesson"))?;
        (
            format!("{}\n{}", challenge.title, challenge.description),
            challenge.solution_reference.clone(),
            challenges.len(),
        )
    };

    let review = match &state.gateway {
        Some(gw) => match gw.validate_code(&task, code, &reference).await {
            Ok(review) => review,
            Err(e) => {
                error!(target: "gateway", error = %e, "code validation failed; generic verdict");
                CodeReview { passed: false, feedback: CODE_VALIDATION_UNAVAILABLE.to_string() }
            }
        },
        None => CodeReview { passed: false, feedback: CODE_VALIDATION_UNAVAILABLE.to_string() },
    };

    let mut progs = state.progression.write().await;
    let prog = progs.entry(course_id.to_string()).or_default();
    if review.passed {
        prog.tracker.record_pass(challenge_id);
    }
    let all_passed = prog.tracker.all_passed(challenge_count);
    Ok(ChallengeOutcome { review, all_passed })
}

/// Best-effort mocked execution of user code.
pub async fn simulate_code(state: &AppState, code: &str, language: &str) -> String {
    match &state.gateway {
        Some(gw) => match gw.simulate_code(code, language).await {
            Ok(output) => output,
            Err(e) => {
                warn!(target: "gateway", error = %e, "code simulation failed");
                "Execution output unavailable right now.".to_string()
            }
        },
        None => "Execution output unavailable right now.".to_string(),
    }
}

/// Append two generated modules to an existing course. On gateway failure the
/// course is untouched and the error surfaces as a transient notice.
#[instrument(level = "info", skip(state, focus), fields(%course_id))]
pub async fn expand_course(state: &AppState, course_id: &str, focus: Option<&str>) -> Result<Course> {
    let (topic, existing) = {
        let repo = state.repo.read().await;
        let course = repo.get(course_id).ok_or_else(|| Error::not_found(course_id))?;
        (
            course.topic.clone(),
            course.modules.iter().map(|m| m.title.clone()).collect::<Vec<_>>(),
        )
    };

    let gw = state
        .gateway
        .as_ref()
        .ok_or_else(|| Error::gateway("course expansion unavailable: no model configured"))?;
    let drafts = gw.expansion(&existing, &topic, focus).await?;

    let mut repo = state.repo.write().await;
    let mut course = repo
        .get(course_id)
        .cloned()
        .ok_or_else(|| Error::not_found(course_id))?;
    course.append_modules(drafts);
    repo.replace(course.clone())?;
    info!(target: "course", modules = course.modules.len(), "course expanded");
    Ok(course)
}

/// Delete a course; deleting the active one clears the pointer and tells the
/// caller to navigate to the course list.
pub async fn delete_course(state: &AppState, course_id: &str) -> Result<DeleteOutcome> {
    let mut repo = state.repo.write().await;
    let outcome = repo.delete(course_id)?;
    if outcome.navigate_to_list {
        repo.set_app_phase(AppPhase::Home)?;
    }
    drop(repo);
    state.progression.write().await.remove(course_id);
    state
        .inflight
        .lock()
        .await
        .retain(|(id, _, _)| id != course_id);
    Ok(outcome)
}

/// Generate a video summary for a lesson. The request is tagged with its
/// target (course id + indices); if the course or lesson is gone by the time
/// the result arrives, the result is discarded rather than merged into
/// unrelated state. A cached video is returned without a new request.
#[instrument(level = "info", skip(state), fields(%course_id, %module, %lesson))]
pub async fn generate_video_summary(
    state: &AppState,
    course_id: &str,
    module: usize,
    lesson: usize,
) -> Result<Option<String>> {
    let title = {
        let repo = state.repo.read().await;
        let course = repo.get(course_id).ok_or_else(|| Error::not_found(course_id))?;
        let lesson = course
            .lesson_at(module, lesson)
            .ok_or_else(|| Error::invalid_state("lesson index out of range"))?;
        if let Some(existing) = &lesson.video {
            return Ok(Some(existing.clone()));
        }
        lesson.title.clone()
    };

    let Some(gw) = &state.gateway else { return Ok(None) };
    let reference = match gw.video_summary(&title).await {
        Ok(r) => r,
        Err(e) => {
            warn!(target: "gateway", error = %e, "video summary failed; lesson has none");
            return Ok(None);
        }
    };

    // Merge only if the tagged target still exists; a stale result for a
    // deleted course is dropped on the floor.
    let mut repo = state.repo.write().await;
    let Some(mut course) = repo.get(course_id).cloned() else {
        info!(target: "course", %course_id, "discarding video for deleted course");
        return Ok(None);
    };
    match course.lesson_at_mut(module, lesson) {
        Some(slot) if slot.video.is_none() => {
            slot.video = Some(reference.clone());
            repo.replace(course)?;
            Ok(Some(reference))
        }
        Some(slot) => Ok(slot.video.clone()),
        None => Ok(None),
    }
}

/// Creative tools tab: AI image editing. Thin gateway passthrough.
pub async fn edit_image(state: &AppState, image_ref: &str, instruction: &str) -> Result<String> {
    let gw = state
        .gateway
        .as_ref()
        .ok_or_else(|| Error::gateway("image editing unavailable: no model configured"))?;
    gw.edit_image(image_ref, instruction).await
}

/// Creative tools tab: image-to-video generation. Thin gateway passthrough.
pub async fn animate_image(state: &AppState, image_ref: &str, prompt: &str) -> Result<String> {
    let gw = state
        .gateway
        .as_ref()
        .ok_or_else(|| Error::gateway("animation unavailable: no model configured"))?;
    gw.animate_image(image_ref, prompt).await
}

/// Full state reset, offered by the top-level error boundary: discard every
/// course, session, and persisted record and land on the initial screen.
#[instrument(level = "info", skip(state))]
pub async fn reset_all(state: &AppState) -> Result<()> {
    let ids: Vec<String> = {
        let repo = state.repo.read().await;
        repo.all().iter().map(|c| c.id.clone()).collect()
    };
    let mut repo = state.repo.write().await;
    for id in ids {
        let _ = repo.delete(&id);
    }
    repo.set_app_phase(AppPhase::Home)?;
    drop(repo);
    *state.session.write().await = None;
    state.progression.write().await.clear();
    state.inflight.lock().await.clear();
    warn!(target: "course", "full state reset performed");
    Ok(())
}
