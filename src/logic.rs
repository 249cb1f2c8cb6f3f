//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Both transports turn a request into a `QuizCommand`, run it against the
//! player's controller and ship the snapshot together with any notices the
//! operation queued.

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::{info, instrument, warn};

use crate::domain::Language;
use crate::error::QuizError;
use crate::protocol::{HintOut, SessionReply};
use crate::session::{Notice, SessionController};

#[derive(Debug, Clone, PartialEq)]
pub enum QuizCommand {
  Snapshot,
  Start,
  SelectAnswer(String),
  Advance,
  ChangeLanguage(Language),
  Abandon,
}

impl QuizCommand {
  fn name(&self) -> &'static str {
    match self {
      QuizCommand::Snapshot => "snapshot",
      QuizCommand::Start => "start",
      QuizCommand::SelectAnswer(_) => "select_answer",
      QuizCommand::Advance => "advance",
      QuizCommand::ChangeLanguage(_) => "change_language",
      QuizCommand::Abandon => "abandon",
    }
  }
}

/// A failed operation plus whatever the player should be told about it.
#[derive(Debug)]
pub struct Failure {
  pub error: QuizError,
  pub notices: Vec<Notice>,
}

impl From<QuizError> for Failure {
  fn from(error: QuizError) -> Self {
    Self { error, notices: Vec::new() }
  }
}

#[instrument(level = "info", skip(ctrl), fields(player = %ctrl.player(), op = cmd.name()))]
pub async fn execute(ctrl: &Arc<SessionController>, cmd: QuizCommand) -> Result<SessionReply, Failure> {
  let result = match cmd {
    QuizCommand::Snapshot => Ok(ctrl.snapshot().await),
    QuizCommand::Start => ctrl.start().await,
    QuizCommand::SelectAnswer(choice) => ctrl.select_answer(&choice).await,
    QuizCommand::Advance => ctrl.advance().await,
    QuizCommand::ChangeLanguage(lang) => ctrl.change_language(lang).await,
    QuizCommand::Abandon => Ok(ctrl.abandon().await),
  };
  let notices = ctrl.take_notices().await;
  match result {
    Ok(session) => Ok(SessionReply { session, notices }),
    Err(error) => {
      warn!(target: "quiz", error = %error, "Quiz operation failed");
      Err(Failure { error, notices })
    }
  }
}

#[instrument(level = "info", skip(ctrl), fields(player = %ctrl.player()))]
pub async fn hint(ctrl: &SessionController) -> Result<HintOut, Failure> {
  let result = ctrl.hint().await;
  let notices = ctrl.take_notices().await;
  match result {
    Ok(hint) => {
      info!(target: "quiz", served = hint.is_some(), "Hint served");
      Ok(HintOut { hint, notices })
    }
    Err(error) => Err(Failure { error, notices }),
  }
}

/// HTTP status for an error surfaced to a client.
pub fn status_for(err: &QuizError) -> StatusCode {
  match err {
    QuizError::Generation(_) | QuizError::Translation(_) | QuizError::Hint(_) => StatusCode::BAD_GATEWAY,
    QuizError::Unauthorized | QuizError::InvalidCredentials => StatusCode::UNAUTHORIZED,
    QuizError::AccountExists(_) | QuizError::InvalidTransition { .. } => StatusCode::CONFLICT,
    QuizError::InvalidSignup(_) => StatusCode::BAD_REQUEST,
    QuizError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    QuizError::Image(_)
    | QuizError::Adaptation(_)
    | QuizError::Persistence(_)
    | QuizError::Llm(_)
    | QuizError::Io(_)
    | QuizError::Json(_)
    | QuizError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}
