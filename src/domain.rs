//! Domain models: courses, modules, lessons, quizzes, coding challenges.
//!
//! A `Course` is created whole at roadmap-generation time and only ever
//! mutated by whole-object replacement through the repository. Lesson status
//! moves in one direction only (`Locked -> Unlocked -> Completed`); generated
//! sub-content is cached on the lesson and never regenerated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lock/progress status of a single lesson.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    Locked,
    Unlocked,
    Completed,
}

impl Default for LessonStatus {
    fn default() -> Self {
        LessonStatus::Locked
    }
}

impl LessonStatus {
    /// Monotonic promotion: a status never moves backwards. Promoting a
    /// `Completed` lesson to `Unlocked` (or anything to `Locked`) is a no-op.
    pub fn promote(&mut self, to: LessonStatus) {
        if (to as u8) > (*self as u8) {
            *self = to;
        }
    }
}

/// One multiple-choice quiz question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    #[serde(rename = "correctAnswerIndex")]
    pub correct_answer_index: usize,
}

impl QuizQuestion {
    /// A question is usable only if it has options and an in-range answer.
    pub fn is_well_formed(&self) -> bool {
        !self.options.is_empty() && self.correct_answer_index < self.options.len()
    }
}

/// A coding exercise attached to a lesson. `solution_reference` is used for
/// server-side validation only and must never reach the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodingChallenge {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "starterCode")]
    pub starter_code: String,
    #[serde(rename = "solutionReference")]
    pub solution_reference: String,
    pub hint: String,
}

/// The atomic unit of content. Optional fields are generated lazily via the
/// gateway and cached here permanently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: LessonStatus,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub illustration: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub quiz: Option<Vec<QuizQuestion>>,
    #[serde(default, rename = "codingChallenges")]
    pub coding_challenges: Option<Vec<CodingChallenge>>,
}

/// A named, ordered group of lessons. Modules are append-only: expansion adds
/// new modules at the end, never reorders or removes existing ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub title: String,
    pub description: String,
    pub lessons: Vec<Lesson>,
}

/// A generated curriculum for one topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub topic: String,
    pub modules: Vec<Module>,
    #[serde(rename = "currentModuleIndex")]
    pub current_module_index: usize,
    #[serde(rename = "currentLessonIndex")]
    pub current_lesson_index: usize,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Module shape as produced by the gateway, before ids and statuses exist.
#[derive(Clone, Debug, Deserialize)]
pub struct ModuleDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lessons: Vec<LessonDraft>,
}

/// Lesson shape as produced by the gateway.
#[derive(Clone, Debug, Deserialize)]
pub struct LessonDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

fn materialize_module(module_index: usize, draft: ModuleDraft) -> Module {
    let lessons = draft
        .lessons
        .into_iter()
        .enumerate()
        .map(|(li, l)| Lesson {
            id: format!("m{}-l{}", module_index + 1, li + 1),
            title: l.title,
            description: l.description,
            status: LessonStatus::Locked,
            content: None,
            illustration: None,
            video: None,
            quiz: None,
            coding_challenges: None,
        })
        .collect();
    Module {
        id: format!("m{}", module_index + 1),
        title: draft.title,
        description: draft.description,
        lessons,
    }
}

impl Course {
    /// Build a whole course from a roadmap. The very first lesson of the very
    /// first module starts `Unlocked`; everything else starts `Locked`.
    pub fn new(topic: impl Into<String>, roadmap: Vec<ModuleDraft>) -> Self {
        let mut modules: Vec<Module> = roadmap
            .into_iter()
            .enumerate()
            .map(|(mi, d)| materialize_module(mi, d))
            .collect();
        if let Some(first) = modules.first_mut().and_then(|m| m.lessons.first_mut()) {
            first.status = LessonStatus::Unlocked;
        }
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            modules,
            current_module_index: 0,
            current_lesson_index: 0,
            created_at: Utc::now(),
        }
    }

    /// Append expansion modules. New lessons all start `Locked`; nothing in
    /// the existing prefix is touched and nothing is auto-unlocked.
    pub fn append_modules(&mut self, drafts: Vec<ModuleDraft>) {
        let offset = self.modules.len();
        self.modules.extend(
            drafts
                .into_iter()
                .enumerate()
                .map(|(i, d)| materialize_module(offset + i, d)),
        );
    }

    pub fn lesson_at(&self, module_index: usize, lesson_index: usize) -> Option<&Lesson> {
        self.modules.get(module_index)?.lessons.get(lesson_index)
    }

    pub fn lesson_at_mut(&mut self, module_index: usize, lesson_index: usize) -> Option<&mut Lesson> {
        self.modules.get_mut(module_index)?.lessons.get_mut(lesson_index)
    }

    /// The single addressable current lesson, if the indices are in range.
    pub fn current_lesson(&self) -> Option<&Lesson> {
        self.lesson_at(self.current_module_index, self.current_lesson_index)
    }

    /// Position after the current lesson: next lesson in the module, or the
    /// first lesson of the next module, or `None` when the course is exhausted.
    pub fn next_position(&self) -> Option<(usize, usize)> {
        let module = self.modules.get(self.current_module_index)?;
        if self.current_lesson_index + 1 < module.lessons.len() {
            return Some((self.current_module_index, self.current_lesson_index + 1));
        }
        self.modules
            .iter()
            .enumerate()
            .skip(self.current_module_index + 1)
            .find(|(_, m)| !m.lessons.is_empty())
            .map(|(mi, _)| (mi, 0))
    }

    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }
}

#[cfg(test)]
pub(crate) fn draft(titles: &[(&str, &[&str])]) -> Vec<ModuleDraft> {
    titles
        .iter()
        .map(|(title, lessons)| ModuleDraft {
            title: (*title).to_string(),
            description: String::new(),
            lessons: lessons
                .iter()
                .map(|l| LessonDraft { title: (*l).to_string(), description: String::new() })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_course_unlocks_only_the_first_lesson() {
        let course = Course::new("Linear Algebra", draft(&[("Vectors", &["Intro", "Dot product"])]));
        assert_eq!(course.lesson_at(0, 0).unwrap().status, LessonStatus::Unlocked);
        assert_eq!(course.lesson_at(0, 1).unwrap().status, LessonStatus::Locked);
        assert_eq!(course.current_module_index, 0);
        assert_eq!(course.current_lesson_index, 0);
    }

    #[test]
    fn status_promotion_is_monotonic() {
        let mut status = LessonStatus::Completed;
        status.promote(LessonStatus::Unlocked);
        assert_eq!(status, LessonStatus::Completed);
        status.promote(LessonStatus::Locked);
        assert_eq!(status, LessonStatus::Completed);

        let mut status = LessonStatus::Locked;
        status.promote(LessonStatus::Unlocked);
        assert_eq!(status, LessonStatus::Unlocked);
    }

    #[test]
    fn append_modules_leaves_prefix_untouched_and_locks_the_suffix() {
        let mut course = Course::new("Rust", draft(&[("Basics", &["Ownership"])]));
        let before = course.modules.clone();

        course.append_modules(draft(&[("Async", &["Futures", "Tasks"]), ("Macros", &["Declarative"])]));

        assert_eq!(course.modules.len(), 3);
        assert_eq!(&course.modules[..1], &before[..]);
        assert_eq!(course.modules[1].id, "m2");
        assert_eq!(course.modules[2].id, "m3");
        assert!(course.modules[1..]
            .iter()
            .flat_map(|m| &m.lessons)
            .all(|l| l.status == LessonStatus::Locked));
    }

    #[test]
    fn next_position_walks_modules_and_skips_empty_ones() {
        let mut course = Course::new("T", draft(&[("A", &["a1", "a2"]), ("B", &[]), ("C", &["c1"])]));
        assert_eq!(course.next_position(), Some((0, 1)));
        course.current_lesson_index = 1;
        assert_eq!(course.next_position(), Some((2, 0)));
        course.current_module_index = 2;
        course.current_lesson_index = 0;
        assert_eq!(course.next_position(), None);
    }

    #[test]
    fn malformed_quiz_questions_are_detected() {
        let good = QuizQuestion {
            question: "2+2?".into(),
            options: vec!["3".into(), "4".into()],
            correct_answer_index: 1,
        };
        assert!(good.is_well_formed());

        let out_of_range = QuizQuestion { correct_answer_index: 2, ..good.clone() };
        assert!(!out_of_range.is_well_formed());

        let no_options = QuizQuestion { options: vec![], correct_answer_index: 0, ..good };
        assert!(!no_options.is_well_formed());
    }
}
