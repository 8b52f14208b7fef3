//! Clarification session: collects one free-text answer per clarifying
//! question, strictly in order, before course generation is allowed to run.
//!
//! The session never calls the gateway itself. It only signals completion;
//! the caller (see `flow`) then runs roadmap generation and discards the
//! session whether that succeeds or fails.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Transient Q&A state between topic submission and roadmap generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClarificationSession {
    pub topic: String,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    #[serde(rename = "currentQuestionIndex")]
    pub current_question_index: usize,
}

/// What `submit_answer` tells the caller to do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStep {
    /// Present the question at this index next.
    NextQuestion(usize),
    /// All questions answered; the caller must now run course generation.
    Complete,
}

impl ClarificationSession {
    /// Start a session. `questions` must be non-empty.
    pub fn start(topic: impl Into<String>, questions: Vec<String>) -> Result<Self> {
        if questions.is_empty() {
            return Err(Error::invalid_state("clarification requires at least one question"));
        }
        Ok(Self {
            topic: topic.into(),
            questions,
            answers: Vec::new(),
            current_question_index: 0,
        })
    }

    /// Record the answer to the current question, in order, no skipping.
    pub fn submit_answer(&mut self, text: impl Into<String>) -> Result<SessionStep> {
        if self.is_complete() {
            return Err(Error::invalid_state("all clarifying questions already answered"));
        }
        self.answers.push(text.into());
        self.current_question_index += 1;
        if self.is_complete() {
            Ok(SessionStep::Complete)
        } else {
            Ok(SessionStep::NextQuestion(self.current_question_index))
        }
    }

    pub fn is_complete(&self) -> bool {
        self.answers.len() == self.questions.len()
    }

    /// Q/A pairs joined into the context string handed to roadmap generation.
    pub fn context(&self) -> String {
        self.questions
            .iter()
            .zip(&self.answers)
            .map(|(q, a)| format!("Q: {}\nA: {}", q, a))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions() -> Vec<String> {
        vec!["Why?".into(), "Level?".into(), "Goal?".into()]
    }

    #[test]
    fn answers_are_collected_in_order_until_complete() {
        let mut s = ClarificationSession::start("Rust", questions()).unwrap();
        assert_eq!(s.submit_answer("curiosity").unwrap(), SessionStep::NextQuestion(1));
        assert_eq!(s.submit_answer("beginner").unwrap(), SessionStep::NextQuestion(2));
        assert!(!s.is_complete());
        assert_eq!(s.submit_answer("a job").unwrap(), SessionStep::Complete);
        assert!(s.is_complete());
        assert_eq!(s.answers.len(), 3);
        assert_eq!(s.current_question_index, 3);
    }

    #[test]
    fn submitting_past_the_end_is_rejected() {
        let mut s = ClarificationSession::start("Rust", vec!["One?".into()]).unwrap();
        s.submit_answer("done").unwrap();
        let err = s.submit_answer("extra").unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(s.answers.len(), 1);
    }

    #[test]
    fn empty_question_list_is_rejected() {
        assert!(ClarificationSession::start("Rust", vec![]).is_err());
    }

    #[test]
    fn context_interleaves_questions_and_answers() {
        let mut s = ClarificationSession::start("Rust", vec!["Why?".into()]).unwrap();
        s.submit_answer("fun").unwrap();
        assert_eq!(s.context(), "Q: Why?\nA: fun");
    }
}
