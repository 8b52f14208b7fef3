//! End-to-end flow tests: a scripted gateway plus an in-memory store drive
//! the full topic -> clarification -> course -> lesson loop, including the
//! degraded paths the gateway failure contract promises.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use mentora_backend::config::{DEFAULT_CLARIFYING_QUESTIONS, LESSON_CONTENT_PLACEHOLDER};
use mentora_backend::domain::{CodingChallenge, LessonDraft, LessonStatus, ModuleDraft, QuizQuestion};
use mentora_backend::error::{Error, Result};
use mentora_backend::flow::{self, ClarifyOutcome};
use mentora_backend::gateway::{CodeReview, Gateway};
use mentora_backend::progress::LessonPhase;
use mentora_backend::state::AppState;
use mentora_backend::store::{AppPhase, MemoryStore, Store};

fn drafts(spec: &[(&str, &[&str])]) -> Vec<ModuleDraft> {
    spec.iter()
        .map(|(title, lessons)| ModuleDraft {
            title: (*title).to_string(),
            description: format!("About {title}"),
            lessons: lessons
                .iter()
                .map(|l| LessonDraft { title: (*l).to_string(), description: String::new() })
                .collect(),
        })
        .collect()
}

/// Scripted gateway. Individual operations can be told to fail or to park
/// mid-call; successful calls return fixed, recognizable content and are
/// counted.
#[derive(Default)]
struct FakeGateway {
    fail_questions: bool,
    fail_roadmap: bool,
    fail_lesson_content: AtomicBool,
    /// When set, `lesson_content` signals `entered` and parks until `release`.
    block_lesson_content: AtomicBool,
    entered: Notify,
    release: Notify,
    lesson_content_calls: AtomicUsize,
}

fn scripted_err() -> Error {
    Error::gateway("scripted failure")
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn clarifying_questions(&self, topic: &str) -> Result<Vec<String>> {
        if self.fail_questions {
            return Err(scripted_err());
        }
        Ok(vec![
            format!("What do you already know about {topic}?"),
            "How much time per week can you spend?".to_string(),
            "Do you prefer theory or practice?".to_string(),
        ])
    }

    async fn roadmap(&self, _topic: &str, _context: &str) -> Result<Vec<ModuleDraft>> {
        if self.fail_roadmap {
            return Err(scripted_err());
        }
        Ok(drafts(&[
            ("Vectors", &["Introduction to Vectors", "Dot Products"]),
            ("Matrices", &["Matrix Multiplication"]),
        ]))
    }

    async fn expansion(
        &self,
        _existing_topics: &[String],
        _course_topic: &str,
        _focus: Option<&str>,
    ) -> Result<Vec<ModuleDraft>> {
        Ok(drafts(&[
            ("Eigenvalues", &["Characteristic Polynomials"]),
            ("Decompositions", &["SVD"]),
        ]))
    }

    async fn lesson_content(
        &self,
        _topic: &str,
        lesson_title: &str,
        _module_title: &str,
    ) -> Result<String> {
        self.lesson_content_calls.fetch_add(1, Ordering::SeqCst);
        if self.block_lesson_content.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.fail_lesson_content.load(Ordering::SeqCst) {
            return Err(scripted_err());
        }
        Ok(format!("# {lesson_title}\n\nGenerated body."))
    }

    async fn quiz(&self, _lesson_content: &str) -> Result<Vec<QuizQuestion>> {
        Ok(vec![QuizQuestion {
            question: "Is a vector a direction with magnitude?".to_string(),
            options: vec!["No".to_string(), "Yes".to_string()],
            correct_answer_index: 1,
        }])
    }

    async fn coding_challenges(&self, _lesson_content: &str) -> Result<Vec<CodingChallenge>> {
        Ok(vec![CodingChallenge {
            id: "ch1".to_string(),
            title: "Add two vectors".to_string(),
            description: "Implement component-wise addition.".to_string(),
            starter_code: "fn add(a: &[f64], b: &[f64]) -> Vec<f64> { todo!() }".to_string(),
            solution_reference: "zip + map + collect".to_string(),
            hint: "Iterate both slices together.".to_string(),
        }])
    }

    async fn validate_code(&self, _task: &str, user_code: &str, _reference: &str) -> Result<CodeReview> {
        Ok(CodeReview {
            passed: user_code.contains("zip"),
            feedback: "Reviewed.".to_string(),
        })
    }

    async fn simulate_code(&self, _code: &str, _language: &str) -> Result<String> {
        Ok("[1.0, 2.0]".to_string())
    }

    async fn illustration(&self, _lesson_title: &str) -> Result<String> {
        Ok("img://illustration".to_string())
    }

    async fn video_summary(&self, _lesson_title: &str) -> Result<String> {
        Ok("vid://summary".to_string())
    }

    async fn edit_image(&self, _image_ref: &str, _instruction: &str) -> Result<String> {
        Ok("img://edited".to_string())
    }

    async fn animate_image(&self, _image_ref: &str, _prompt: &str) -> Result<String> {
        Ok("vid://animated".to_string())
    }
}

fn app(gateway: FakeGateway) -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::default());
    let state = AppState::with_parts(store.clone(), Some(Arc::new(gateway)));
    (store, state)
}

/// Run the whole clarification dialog and return the created course.
async fn create_course(state: &AppState, topic: &str) -> mentora_backend::domain::Course {
    let questions = flow::start_topic(state, topic).await.unwrap();
    for (i, _) in questions.iter().enumerate() {
        match flow::submit_clarification(state, &format!("answer {i}")).await.unwrap() {
            ClarifyOutcome::NextQuestion { index, .. } => assert_eq!(index, i + 1),
            ClarifyOutcome::CourseCreated { course } => {
                assert_eq!(i, questions.len() - 1);
                return course;
            }
        }
    }
    unreachable!("dialog ended without a course");
}

#[tokio::test]
async fn clarifying_questions_fall_back_to_defaults() {
    let (_, state) = app(FakeGateway { fail_questions: true, ..Default::default() });
    let questions = flow::start_topic(&state, "Linear Algebra").await.unwrap();
    assert_eq!(questions, DEFAULT_CLARIFYING_QUESTIONS.to_vec());
    // A session opened anyway; the dialog proceeds with the defaults.
    assert!(state.session.read().await.is_some());
    assert_eq!(state.repo.read().await.app_phase(), AppPhase::Clarifying);
}

#[tokio::test]
async fn roadmap_failure_leaves_no_partial_course() {
    let (_, state) = app(FakeGateway { fail_roadmap: true, ..Default::default() });
    let questions = flow::start_topic(&state, "Linear Algebra").await.unwrap();
    for _ in 0..questions.len() - 1 {
        flow::submit_clarification(&state, "answer").await.unwrap();
    }

    let err = flow::submit_clarification(&state, "last answer").await.unwrap_err();
    assert!(matches!(err, Error::Gateway { .. }));
    assert!(err.is_transient());

    let repo = state.repo.read().await;
    assert!(repo.all().is_empty());
    assert_eq!(repo.active_id(), None);
    assert_eq!(repo.app_phase(), AppPhase::Home);
    drop(repo);
    assert!(state.session.read().await.is_none());
}

#[tokio::test]
async fn full_lesson_loop_completes_and_unlocks_the_next_lesson() {
    let (store, state) = app(FakeGateway::default());
    let course = create_course(&state, "Linear Algebra").await;
    assert_eq!(course.modules.len(), 2);
    assert_eq!(course.lesson_at(0, 0).unwrap().status, LessonStatus::Unlocked);
    assert_eq!(state.repo.read().await.app_phase(), AppPhase::Learning);

    let lesson = flow::open_lesson(&state, &course.id, 0, 0).await.unwrap();
    assert!(lesson.content.as_deref().unwrap().starts_with("# Introduction to Vectors"));
    assert_eq!(lesson.quiz.as_ref().unwrap().len(), 1);
    assert_eq!(lesson.coding_challenges.as_ref().unwrap().len(), 1);
    assert_eq!(lesson.illustration.as_deref(), Some("img://illustration"));

    let phase = flow::advance_to_challenge(&state, &course.id, false).await.unwrap();
    assert_eq!(phase, LessonPhase::Challenge);

    // Quiz is gated until the challenge passes.
    let err = flow::advance_to_quiz(&state, &course.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));

    let failed = flow::attempt_challenge(&state, &course.id, "ch1", "fn add() {}").await.unwrap();
    assert!(!failed.review.passed);
    assert!(!failed.all_passed);

    let passed = flow::attempt_challenge(&state, &course.id, "ch1", "a.iter().zip(b)").await.unwrap();
    assert!(passed.review.passed);
    assert!(passed.all_passed);

    let phase = flow::advance_to_quiz(&state, &course.id).await.unwrap();
    assert_eq!(phase, LessonPhase::Quiz);

    let result = flow::submit_quiz(&state, &course.id, &HashMap::from([(0, 1)])).await.unwrap();
    assert_eq!((result.correct, result.total), (1, 1));
    assert_eq!(result.unlocked, Some((0, 1)));
    assert!(!result.at_end);

    let repo = state.repo.read().await;
    let after = repo.get(&course.id).unwrap();
    assert_eq!(after.lesson_at(0, 0).unwrap().status, LessonStatus::Completed);
    assert_eq!(after.lesson_at(0, 1).unwrap().status, LessonStatus::Unlocked);
    assert_eq!(after.lesson_at(1, 0).unwrap().status, LessonStatus::Locked);
    drop(repo);

    // Restart: a fresh state over the same store resumes with everything.
    let reopened = AppState::with_parts(store, None);
    let repo = reopened.repo.read().await;
    assert_eq!(repo.active_id(), Some(course.id.as_str()));
    let resumed = repo.get(&course.id).unwrap();
    assert!(resumed.lesson_at(0, 0).unwrap().content.is_some());
    assert_eq!(resumed.lesson_at(0, 1).unwrap().status, LessonStatus::Unlocked);
    assert_eq!(repo.app_phase(), AppPhase::Learning);
}

#[tokio::test]
async fn lesson_content_is_generated_once_and_cached() {
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(FakeGateway::default());
    let state = AppState::with_parts(store, Some(gateway.clone()));
    let course = create_course(&state, "Linear Algebra").await;

    flow::open_lesson(&state, &course.id, 0, 0).await.unwrap();
    flow::open_lesson(&state, &course.id, 0, 0).await.unwrap();
    flow::open_lesson(&state, &course.id, 0, 0).await.unwrap();

    assert_eq!(gateway.lesson_content_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_content_generation_is_not_cached() {
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(FakeGateway::default());
    gateway.fail_lesson_content.store(true, Ordering::SeqCst);
    let state = AppState::with_parts(store, Some(gateway.clone()));
    let course = create_course(&state, "Linear Algebra").await;

    // During the outage the visit degrades to a placeholder...
    let degraded = flow::open_lesson(&state, &course.id, 0, 0).await.unwrap();
    assert_eq!(degraded.content.as_deref(), Some(LESSON_CONTENT_PLACEHOLDER));
    assert!(degraded.quiz.is_none());
    assert!(degraded.coding_challenges.is_none());

    // ...and nothing is persisted on the lesson.
    {
        let repo = state.repo.read().await;
        let stored = repo.get(&course.id).unwrap().lesson_at(0, 0).unwrap().clone();
        assert!(stored.content.is_none());
        assert!(stored.quiz.is_none());
    }

    // Once the gateway recovers, the next visit generates real content.
    gateway.fail_lesson_content.store(false, Ordering::SeqCst);
    let lesson = flow::open_lesson(&state, &course.id, 0, 0).await.unwrap();
    assert!(lesson.content.as_deref().unwrap().starts_with("# Introduction to Vectors"));
    assert_eq!(lesson.quiz.as_ref().unwrap().len(), 1);
    assert_eq!(gateway.lesson_content_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_lesson_opens_issue_one_generation_request() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.block_lesson_content.store(true, Ordering::SeqCst);
    let state = Arc::new(AppState::with_parts(
        Arc::new(MemoryStore::default()),
        Some(gateway.clone()),
    ));
    let course = create_course(&state, "Linear Algebra").await;

    let first = tokio::spawn({
        let state = state.clone();
        let id = course.id.clone();
        async move { flow::ensure_lesson_content(&state, &id, 0, 0).await }
    });
    gateway.entered.notified().await;

    // While the first fetch is parked inside the gateway, re-selecting the
    // lesson hands back the still-pending snapshot without a second request.
    let pending = flow::ensure_lesson_content(&state, &course.id, 0, 0).await.unwrap();
    assert!(pending.content.is_none());
    assert_eq!(gateway.lesson_content_calls.load(Ordering::SeqCst), 1);

    gateway.release.notify_one();
    let lesson = first.await.unwrap().unwrap();
    assert!(lesson.content.is_some());
    assert_eq!(gateway.lesson_content_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn locked_lessons_cannot_be_opened() {
    let (_, state) = app(FakeGateway::default());
    let course = create_course(&state, "Linear Algebra").await;

    let err = flow::open_lesson(&state, &course.id, 1, 0).await.unwrap_err();
    assert!(matches!(err, Error::LockedLesson { module_index: 1, lesson_index: 0 }));

    // The selection did not move.
    let repo = state.repo.read().await;
    let after = repo.get(&course.id).unwrap();
    assert_eq!((after.current_module_index, after.current_lesson_index), (0, 0));
}

#[tokio::test]
async fn expansion_appends_locked_modules_and_keeps_the_prefix() {
    let (_, state) = app(FakeGateway::default());
    let course = create_course(&state, "Linear Algebra").await;
    let before = course.modules.clone();

    let expanded = flow::expand_course(&state, &course.id, Some("spectral theory")).await.unwrap();
    assert_eq!(expanded.modules.len(), before.len() + 2);
    assert_eq!(&expanded.modules[..before.len()], &before[..]);
    assert!(expanded.modules[before.len()..]
        .iter()
        .flat_map(|m| &m.lessons)
        .all(|l| l.status == LessonStatus::Locked));
}

#[tokio::test]
async fn deleting_the_active_course_navigates_home() {
    let (_, state) = app(FakeGateway::default());
    let course = create_course(&state, "Linear Algebra").await;

    let outcome = flow::delete_course(&state, &course.id).await.unwrap();
    assert!(outcome.navigate_to_list);

    let repo = state.repo.read().await;
    assert!(repo.all().is_empty());
    assert_eq!(repo.active_id(), None);
    assert_eq!(repo.app_phase(), AppPhase::Home);
}

#[tokio::test]
async fn video_summary_is_cached_after_the_first_request() {
    let (_, state) = app(FakeGateway::default());
    let course = create_course(&state, "Linear Algebra").await;
    flow::open_lesson(&state, &course.id, 0, 0).await.unwrap();

    let first = flow::generate_video_summary(&state, &course.id, 0, 0).await.unwrap();
    assert_eq!(first.as_deref(), Some("vid://summary"));
    let second = flow::generate_video_summary(&state, &course.id, 0, 0).await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn offline_mode_degrades_instead_of_failing() {
    let store = Arc::new(MemoryStore::default());
    let state = AppState::with_parts(store, None);

    // Clarification works on defaults.
    let questions = flow::start_topic(&state, "Chess").await.unwrap();
    assert_eq!(questions, DEFAULT_CLARIFYING_QUESTIONS.to_vec());

    // Course creation is the one thing that genuinely needs the model.
    for _ in 0..questions.len() - 1 {
        flow::submit_clarification(&state, "answer").await.unwrap();
    }
    let err = flow::submit_clarification(&state, "last").await.unwrap_err();
    assert!(matches!(err, Error::Gateway { .. }));

    // Code execution degrades to a notice, not an error.
    let output = flow::simulate_code(&state, "print(1)", "python").await;
    assert!(!output.is_empty());
}

#[tokio::test]
async fn reset_all_clears_courses_sessions_and_store() {
    let (store, state) = app(FakeGateway::default());
    let course = create_course(&state, "Linear Algebra").await;
    flow::open_lesson(&state, &course.id, 0, 0).await.unwrap();

    flow::reset_all(&state).await.unwrap();

    let repo = state.repo.read().await;
    assert!(repo.all().is_empty());
    assert_eq!(repo.app_phase(), AppPhase::Home);
    drop(repo);
    assert!(state.session.read().await.is_none());

    // The persisted record reflects the reset too.
    let raw = store.get("state").unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["courses"].as_array().unwrap().len(), 0);
}
