//! Error types for the quiz backend.
//!
//! Variants follow the failure classes of a quiz session: generation failures
//! end the session, everything else degrades gracefully and is at most
//! reported to the player as a notice.

/// A specialized `Result` type for quiz operations.
pub type Result<T> = std::result::Result<T, QuizError>;

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
  // ------------------------------------------------------------------
  // Collaborator failures
  // ------------------------------------------------------------------
  /// No question could be produced. Fatal to the current session.
  #[error("question generation failed: {0}")]
  Generation(String),

  /// Image generation failed. Cosmetic; a placeholder is shown instead.
  #[error("image generation failed: {0}")]
  Image(String),

  /// A translation fan-out failed or produced an inconsistent question.
  #[error("translation failed: {0}")]
  Translation(String),

  /// Difficulty recommendation failed. The previous difficulty is kept.
  #[error("difficulty adaptation failed: {0}")]
  Adaptation(String),

  /// Hint generation failed.
  #[error("hint generation failed: {0}")]
  Hint(String),

  /// Leaderboard storage could not be read or written.
  #[error("leaderboard persistence failed: {0}")]
  Persistence(String),

  /// Raw LLM transport/parse failure, before it is classified by the caller.
  #[error("LLM error: {0}")]
  Llm(String),

  /// An external call did not finish in time.
  #[error("{what} timed out after {secs}s")]
  Timeout { what: &'static str, secs: u64 },

  // ------------------------------------------------------------------
  // Identity
  // ------------------------------------------------------------------
  #[error("not signed in")]
  Unauthorized,

  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("an account already exists for {0}")]
  AccountExists(String),

  #[error("invalid sign-up: {0}")]
  InvalidSignup(String),

  // ------------------------------------------------------------------
  // State machine
  // ------------------------------------------------------------------
  /// Operation not valid in the current phase; the state is unchanged.
  #[error("cannot {op} while {phase}")]
  InvalidTransition { op: &'static str, phase: String },

  // ------------------------------------------------------------------
  // Conversions
  // ------------------------------------------------------------------
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),
}

impl QuizError {
  pub fn invalid_transition(op: &'static str, phase: impl std::fmt::Display) -> Self {
    Self::InvalidTransition { op, phase: phase.to_string() }
  }

  /// True for failures that end the running session.
  pub const fn is_fatal(&self) -> bool {
    matches!(self, Self::Generation(_))
  }

  /// Re-tag a low-level failure (`Llm`, `Http`, `Json`, `Timeout`) with the
  /// class of the operation it happened in.
  pub fn classify(self, wrap: fn(String) -> QuizError) -> QuizError {
    match self {
      Self::Llm(_) | Self::Http(_) | Self::Json(_) | Self::Timeout { .. } | Self::Io(_) => wrap(self.to_string()),
      other => other,
    }
  }
}
