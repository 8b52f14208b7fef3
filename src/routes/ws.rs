//! WebSocket endpoint: one JSON message in, one JSON reply out.
//!
//! The socket shares the same core flows as the HTTP handlers; the only
//! WS-specific behavior is the error mapping (`LockedLesson` becomes a
//! dedicated silent-no-op message instead of an error).

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tracing::{debug, info, instrument, warn};

use crate::error::Error;
use crate::flow;
use crate::flow::ClarifyOutcome;
use crate::protocol::{course_out, lesson_out, ClientWsMessage, ServerWsMessage};
use crate::state::AppState;
use crate::util::trunc_for_log;

#[instrument(level = "info", skip_all)]
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    info!(target: "mentora_backend", "websocket connected");

    while let Some(Ok(msg)) = socket.recv().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            // Binary / ping / pong frames are ignored.
            _ => continue,
        };
        debug!(target: "mentora_backend", raw = %trunc_for_log(&text, 200), "ws message");

        let reply = match serde_json::from_str::<ClientWsMessage>(&text) {
            Ok(parsed) => handle_client_ws(&state, parsed).await,
            Err(e) => ServerWsMessage::Error {
                message: format!("invalid message: {e}"),
                transient: false,
            },
        };

        let payload = match serde_json::to_string(&reply) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "mentora_backend", error = %e, "failed to encode ws reply");
                continue;
            }
        };
        if socket.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }

    info!(target: "mentora_backend", "websocket closed");
}

fn error_reply(e: Error) -> ServerWsMessage {
    match e {
        Error::LockedLesson { .. } => ServerWsMessage::LessonLocked,
        e => ServerWsMessage::Error { message: e.to_string(), transient: e.is_transient() },
    }
}

async fn handle_client_ws(state: &AppState, msg: ClientWsMessage) -> ServerWsMessage {
    match msg {
        ClientWsMessage::Ping => ServerWsMessage::Pong,

        ClientWsMessage::StartTopic { topic } => match flow::start_topic(state, &topic).await {
            Ok(questions) => ServerWsMessage::ClarifyingQuestions { questions },
            Err(e) => error_reply(e),
        },

        ClientWsMessage::ClarifyAnswer { answer } => {
            match flow::submit_clarification(state, &answer).await {
                Ok(ClarifyOutcome::NextQuestion { index, question }) => {
                    ServerWsMessage::NextQuestion { index, question }
                }
                Ok(ClarifyOutcome::CourseCreated { course }) => {
                    ServerWsMessage::CourseCreated { course: course_out(&course) }
                }
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::OpenLesson { course_id, module_index, lesson_index } => {
            match flow::open_lesson(state, &course_id, module_index, lesson_index).await {
                Ok(lesson) => ServerWsMessage::Lesson { lesson: lesson_out(&lesson) },
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::AdvanceToChallenge { course_id, skip } => {
            match flow::advance_to_challenge(state, &course_id, skip).await {
                Ok(phase) => ServerWsMessage::Phase { phase },
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::AdvanceToQuiz { course_id } => {
            match flow::advance_to_quiz(state, &course_id).await {
                Ok(phase) => ServerWsMessage::Phase { phase },
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::SubmitQuiz { course_id, answers } => {
            match flow::submit_quiz(state, &course_id, &answers).await {
                Ok(result) => ServerWsMessage::QuizGraded { result },
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::SubmitCode { course_id, challenge_id, code } => {
            match flow::attempt_challenge(state, &course_id, &challenge_id, &code).await {
                Ok(outcome) => ServerWsMessage::CodeResult {
                    passed: outcome.review.passed,
                    feedback: outcome.review.feedback,
                    all_passed: outcome.all_passed,
                },
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::RunCode { code, language } => {
            let output = flow::simulate_code(state, &code, &language).await;
            ServerWsMessage::CodeOutput { output }
        }

        ClientWsMessage::ExpandCourse { course_id, focus } => {
            match flow::expand_course(state, &course_id, focus.as_deref()).await {
                Ok(course) => ServerWsMessage::CourseUpdated { course: course_out(&course) },
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::DeleteCourse { course_id } => {
            match flow::delete_course(state, &course_id).await {
                Ok(outcome) => {
                    ServerWsMessage::CourseDeleted { navigate_to_list: outcome.navigate_to_list }
                }
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::GenerateVideo { course_id, module_index, lesson_index } => {
            match flow::generate_video_summary(state, &course_id, module_index, lesson_index).await
            {
                Ok(video) => ServerWsMessage::Video { video },
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::EditImage { image, instruction } => {
            match flow::edit_image(state, &image, &instruction).await {
                Ok(reference) => ServerWsMessage::Media { reference },
                Err(e) => error_reply(e),
            }
        }

        ClientWsMessage::AnimateImage { image, prompt } => {
            match flow::animate_image(state, &image, &prompt).await {
                Ok(reference) => ServerWsMessage::Media { reference },
                Err(e) => error_reply(e),
            }
        }
    }
}
