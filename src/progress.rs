//! Course progression engine: per-lesson substate machine, unlock/complete
//! rules, and transient challenge completion tracking.
//!
//! The engine mutates a `Course` in place; the caller persists the result via
//! whole-object replacement through the repository. Substate and challenge
//! tracking are transient and reset whenever the active lesson changes.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::{Course, LessonStatus};
use crate::error::{Error, Result};

/// Per-lesson substate. Reset to `Reading` whenever the active lesson changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonPhase {
    Reading,
    Challenge,
    Quiz,
}

/// Transient record of which coding challenges passed for the active lesson.
/// Not persisted: evaluation is delegated to the gateway on every attempt, so
/// this is recomputed from scratch each time the challenge screen is opened.
#[derive(Clone, Debug, Default)]
pub struct ChallengeTracker {
    passed: HashSet<String>,
}

impl ChallengeTracker {
    /// Idempotently record a passing attempt.
    pub fn record_pass(&mut self, challenge_id: impl Into<String>) {
        self.passed.insert(challenge_id.into());
    }

    pub fn all_passed(&self, challenge_count: usize) -> bool {
        self.passed.len() == challenge_count
    }

    pub fn passed_count(&self) -> usize {
        self.passed.len()
    }
}

/// Outcome of a quiz submission.
#[derive(Clone, Debug, Serialize)]
pub struct QuizResult {
    pub correct: usize,
    pub total: usize,
    /// Position that moved from `Locked` to `Unlocked`, if any.
    pub unlocked: Option<(usize, usize)>,
    /// True when no further lesson exists after the one just completed.
    #[serde(rename = "atEnd")]
    pub at_end: bool,
}

/// Progression state for one course.
#[derive(Clone, Debug)]
pub struct Progression {
    pub phase: LessonPhase,
    pub tracker: ChallengeTracker,
}

impl Default for Progression {
    fn default() -> Self {
        Self { phase: LessonPhase::Reading, tracker: ChallengeTracker::default() }
    }
}

impl Progression {
    /// Navigate to a lesson. A `Locked` target is rejected and the current
    /// selection stays where it was; callers surface that as a silent no-op.
    #[instrument(level = "debug", skip(self, course), fields(course_id = %course.id))]
    pub fn select_lesson(
        &mut self,
        course: &mut Course,
        module_index: usize,
        lesson_index: usize,
    ) -> Result<()> {
        let lesson = course
            .lesson_at(module_index, lesson_index)
            .ok_or_else(|| Error::invalid_state("lesson index out of range"))?;
        if lesson.status == LessonStatus::Locked {
            return Err(Error::LockedLesson { module_index, lesson_index });
        }
        course.current_module_index = module_index;
        course.current_lesson_index = lesson_index;
        self.phase = LessonPhase::Reading;
        self.tracker = ChallengeTracker::default();
        debug!(target: "course", %module_index, %lesson_index, "lesson selected");
        Ok(())
    }

    /// `Reading -> Challenge`. With `skip` the active lesson is marked
    /// completed immediately; otherwise status is finalized at quiz submission.
    pub fn advance_to_challenge(&mut self, course: &mut Course, skip: bool) -> Result<()> {
        if self.phase != LessonPhase::Reading {
            return Err(Error::invalid_state("advance_to_challenge is only valid while reading"));
        }
        if skip {
            let (mi, li) = (course.current_module_index, course.current_lesson_index);
            if let Some(lesson) = course.lesson_at_mut(mi, li) {
                lesson.status.promote(LessonStatus::Completed);
            }
        }
        self.phase = LessonPhase::Challenge;
        Ok(())
    }

    /// `Challenge -> Quiz`. Requires all coding challenges of the active
    /// lesson solved, or the lesson to have none at all.
    pub fn advance_to_quiz(&mut self, course: &Course) -> Result<()> {
        if self.phase != LessonPhase::Challenge {
            return Err(Error::invalid_state("advance_to_quiz is only valid from the challenge step"));
        }
        let challenge_count = course
            .current_lesson()
            .and_then(|l| l.coding_challenges.as_ref())
            .map_or(0, Vec::len);
        if challenge_count > 0 && !self.tracker.all_passed(challenge_count) {
            return Err(Error::invalid_state(format!(
                "{} of {} coding challenges passed",
                self.tracker.passed_count(),
                challenge_count
            )));
        }
        self.phase = LessonPhase::Quiz;
        Ok(())
    }

    /// Grade a quiz submission, mark the active lesson completed, and unlock
    /// the next lesson if one exists. Does not navigate; the caller decides
    /// when to `select_lesson`.
    ///
    /// A missing or out-of-range answer fails with `InvalidState` and leaves
    /// the lesson status untouched. A lesson without a quiz accepts an empty
    /// submission (the quiz step is a pass-through).
    #[instrument(level = "info", skip(self, course, answers), fields(course_id = %course.id))]
    pub fn submit_quiz(
        &mut self,
        course: &mut Course,
        answers: &HashMap<usize, usize>,
    ) -> Result<QuizResult> {
        if self.phase != LessonPhase::Quiz {
            return Err(Error::invalid_state("submit_quiz is only valid from the quiz step"));
        }
        let (mi, li) = (course.current_module_index, course.current_lesson_index);
        let lesson = course
            .lesson_at(mi, li)
            .ok_or_else(|| Error::invalid_state("no current lesson to grade"))?;

        let quiz = lesson.quiz.clone().unwrap_or_default();
        let mut correct = 0usize;
        for (qi, question) in quiz.iter().enumerate() {
            let Some(&choice) = answers.get(&qi) else {
                return Err(Error::invalid_state(format!("question {} has no answer", qi)));
            };
            if choice >= question.options.len() {
                return Err(Error::invalid_state(format!("question {} answer out of range", qi)));
            }
            if choice == question.correct_answer_index {
                correct += 1;
            }
        }

        if let Some(lesson) = course.lesson_at_mut(mi, li) {
            lesson.status.promote(LessonStatus::Completed);
        }

        let mut unlocked = None;
        let next = course.next_position();
        if let Some((nm, nl)) = next {
            if let Some(next_lesson) = course.lesson_at_mut(nm, nl) {
                if next_lesson.status == LessonStatus::Locked {
                    next_lesson.status = LessonStatus::Unlocked;
                    unlocked = Some((nm, nl));
                }
            }
        }

        let result = QuizResult { correct, total: quiz.len(), unlocked, at_end: next.is_none() };
        info!(
            target: "course",
            correct = result.correct,
            total = result.total,
            at_end = result.at_end,
            "quiz submitted"
        );
        Ok(result)
    }
}

/// Terminal predicate: true when the current indices point past the module
/// list, or the current lesson is completed and nothing comes after it.
/// Rendering code asks this instead of indexing blindly.
pub fn is_at_end(course: &Course) -> bool {
    match course.current_lesson() {
        None => true,
        Some(lesson) => lesson.status == LessonStatus::Completed && course.next_position().is_none(),
    }
}
