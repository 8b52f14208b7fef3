//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//!
//! Outbound course shapes strip `solution_reference` from coding challenges:
//! the reference solution is for server-side grading only and must never
//! reach the client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{CodingChallenge, Course, Lesson, LessonStatus, Module, QuizQuestion};
use crate::progress::{LessonPhase, QuizResult};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartTopic {
        topic: String,
    },
    ClarifyAnswer {
        answer: String,
    },
    OpenLesson {
        #[serde(rename = "courseId")]
        course_id: String,
        #[serde(rename = "moduleIndex")]
        module_index: usize,
        #[serde(rename = "lessonIndex")]
        lesson_index: usize,
    },
    AdvanceToChallenge {
        #[serde(rename = "courseId")]
        course_id: String,
        #[serde(default)]
        skip: bool,
    },
    AdvanceToQuiz {
        #[serde(rename = "courseId")]
        course_id: String,
    },
    SubmitQuiz {
        #[serde(rename = "courseId")]
        course_id: String,
        answers: HashMap<usize, usize>,
    },
    SubmitCode {
        #[serde(rename = "courseId")]
        course_id: String,
        #[serde(rename = "challengeId")]
        challenge_id: String,
        code: String,
    },
    RunCode {
        code: String,
        language: String,
    },
    ExpandCourse {
        #[serde(rename = "courseId")]
        course_id: String,
        #[serde(default)]
        focus: Option<String>,
    },
    DeleteCourse {
        #[serde(rename = "courseId")]
        course_id: String,
    },
    GenerateVideo {
        #[serde(rename = "courseId")]
        course_id: String,
        #[serde(rename = "moduleIndex")]
        module_index: usize,
        #[serde(rename = "lessonIndex")]
        lesson_index: usize,
    },
    EditImage {
        image: String,
        instruction: String,
    },
    AnimateImage {
        image: String,
        prompt: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    ClarifyingQuestions {
        questions: Vec<String>,
    },
    NextQuestion {
        index: usize,
        question: String,
    },
    CourseCreated {
        course: CourseOut,
    },
    Lesson {
        lesson: LessonOut,
    },
    Phase {
        phase: LessonPhase,
    },
    QuizGraded {
        result: QuizResult,
    },
    CodeResult {
        passed: bool,
        feedback: String,
        #[serde(rename = "allPassed")]
        all_passed: bool,
    },
    CodeOutput {
        output: String,
    },
    CourseUpdated {
        course: CourseOut,
    },
    CourseDeleted {
        #[serde(rename = "navigateToList")]
        navigate_to_list: bool,
    },
    Video {
        video: Option<String>,
    },
    Media {
        reference: String,
    },
    /// Silent no-op: the target lesson is still locked.
    LessonLocked,
    Error {
        message: String,
        transient: bool,
    },
}

//
// Outbound course shapes (solution-free)
//

#[derive(Clone, Debug, Serialize)]
pub struct ChallengeOut {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "starterCode")]
    pub starter_code: String,
    pub hint: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LessonOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: LessonStatus,
    pub content: Option<String>,
    pub illustration: Option<String>,
    pub video: Option<String>,
    pub quiz: Option<Vec<QuizQuestion>>,
    #[serde(rename = "codingChallenges")]
    pub coding_challenges: Option<Vec<ChallengeOut>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModuleOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub lessons: Vec<LessonOut>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CourseOut {
    pub id: String,
    pub topic: String,
    pub modules: Vec<ModuleOut>,
    #[serde(rename = "currentModuleIndex")]
    pub current_module_index: usize,
    #[serde(rename = "currentLessonIndex")]
    pub current_lesson_index: usize,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "atEnd")]
    pub at_end: bool,
}

fn challenge_out(c: &CodingChallenge) -> ChallengeOut {
    ChallengeOut {
        id: c.id.clone(),
        title: c.title.clone(),
        description: c.description.clone(),
        starter_code: c.starter_code.clone(),
        hint: c.hint.clone(),
    }
}

pub fn lesson_out(l: &Lesson) -> LessonOut {
    LessonOut {
        id: l.id.clone(),
        title: l.title.clone(),
        description: l.description.clone(),
        status: l.status,
        content: l.content.clone(),
        illustration: l.illustration.clone(),
        video: l.video.clone(),
        quiz: l.quiz.clone(),
        coding_challenges: l
            .coding_challenges
            .as_ref()
            .map(|cs| cs.iter().map(challenge_out).collect()),
    }
}

fn module_out(m: &Module) -> ModuleOut {
    ModuleOut {
        id: m.id.clone(),
        title: m.title.clone(),
        description: m.description.clone(),
        lessons: m.lessons.iter().map(lesson_out).collect(),
    }
}

/// Convert full `Course` (internal) to the public DTO.
pub fn course_out(c: &Course) -> CourseOut {
    CourseOut {
        id: c.id.clone(),
        topic: c.topic.clone(),
        modules: c.modules.iter().map(module_out).collect(),
        current_module_index: c.current_module_index,
        current_lesson_index: c.current_lesson_index,
        created_at: c.created_at,
        at_end: crate::progress::is_at_end(c),
    }
}

/// Compact course row for the course-list view.
#[derive(Clone, Debug, Serialize)]
pub struct CourseSummaryOut {
    pub id: String,
    pub topic: String,
    #[serde(rename = "moduleCount")]
    pub module_count: usize,
    #[serde(rename = "lessonCount")]
    pub lesson_count: usize,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub active: bool,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct TopicIn {
    pub topic: String,
}
#[derive(Serialize)]
pub struct QuestionsOut {
    pub questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClarifyIn {
    pub answer: String,
}
#[derive(Serialize)]
pub struct ClarifyOut {
    #[serde(rename = "nextQuestion")]
    pub next_question: Option<String>,
    pub course: Option<CourseOut>,
}

#[derive(Debug, Deserialize)]
pub struct LessonSelectIn {
    #[serde(rename = "moduleIndex")]
    pub module_index: usize,
    #[serde(rename = "lessonIndex")]
    pub lesson_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceIn {
    #[serde(default)]
    pub skip: bool,
}
#[derive(Serialize)]
pub struct PhaseOut {
    pub phase: LessonPhase,
}

#[derive(Debug, Deserialize)]
pub struct QuizIn {
    pub answers: HashMap<usize, usize>,
}

#[derive(Debug, Deserialize)]
pub struct CodeIn {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,
    pub code: String,
}
#[derive(Serialize)]
pub struct CodeOut {
    pub passed: bool,
    pub feedback: String,
    #[serde(rename = "allPassed")]
    pub all_passed: bool,
}

#[derive(Debug, Deserialize)]
pub struct RunCodeIn {
    pub code: String,
    pub language: String,
}
#[derive(Serialize)]
pub struct RunCodeOut {
    pub output: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpandIn {
    #[serde(default)]
    pub focus: Option<String>,
}

#[derive(Serialize)]
pub struct DeleteOut {
    #[serde(rename = "navigateToList")]
    pub navigate_to_list: bool,
}

#[derive(Serialize)]
pub struct VideoOut {
    pub video: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditImageIn {
    pub image: String,
    pub instruction: String,
}
#[derive(Debug, Deserialize)]
pub struct AnimateImageIn {
    pub image: String,
    pub prompt: String,
}
#[derive(Serialize)]
pub struct MediaOut {
    pub reference: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
