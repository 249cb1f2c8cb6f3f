//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Quiz endpoints authenticate with `Authorization: Bearer <token>`.

use std::sync::Arc;

use axum::{
  async_trait,
  extract::{FromRequestParts, State},
  http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::auth::Identity;
use crate::error::QuizError;
use crate::logic::{self, status_for, Failure, QuizCommand};
use crate::protocol::*;
use crate::state::AppState;

/// Error response: `{error, notices}` plus a login redirect on 401.
pub struct ApiError(pub Failure);

impl From<QuizError> for ApiError {
  fn from(e: QuizError) -> Self {
    ApiError(e.into())
  }
}

impl From<Failure> for ApiError {
  fn from(f: Failure) -> Self {
    ApiError(f)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = status_for(&self.0.error);
    let redirect = (status == StatusCode::UNAUTHORIZED).then_some("/login");
    let body = ErrorOut { error: self.0.error.to_string(), notices: self.0.notices, redirect };
    (status, Json(body)).into_response()
  }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
  let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
  let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?.trim();
  (!token.is_empty()).then(|| token.to_string())
}

/// The signed-in caller, resolved from the bearer token.
pub struct AuthUser {
  pub token: String,
  pub identity: Identity,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
    let token = bearer_token(&parts.headers).ok_or(QuizError::Unauthorized)?;
    let identity = state.identity.current_user(&token).await?;
    Ok(AuthUser { token, identity })
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, llm_enabled: state.llm_enabled })
}

// --- Identity ---

#[instrument(level = "info", skip(state, body))]
pub async fn http_signup(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SignupIn>,
) -> Result<Json<AuthOut>, ApiError> {
  let (token, user) = state.identity.sign_up(&body.email, &body.password, body.display_name.as_deref()).await?;
  Ok(Json(AuthOut { token, user }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_login(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LoginIn>,
) -> Result<Json<AuthOut>, ApiError> {
  let (token, user) = state.identity.sign_in(&body.email, &body.password).await?;
  Ok(Json(AuthOut { token, user }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_guest(State(state): State<Arc<AppState>>) -> Json<AuthOut> {
  let (token, user) = state.identity.sign_in_guest().await;
  Json(AuthOut { token, user })
}

#[instrument(level = "info", skip(state, auth), fields(user_id = %auth.identity.user_id))]
pub async fn http_logout(State(state): State<Arc<AppState>>, auth: AuthUser) -> Json<OkOut> {
  let ok = state.identity.sign_out(&auth.token).await;
  state.end_session(&auth.identity.user_id).await;
  Json(OkOut { ok })
}

#[instrument(level = "info", skip(auth), fields(user_id = %auth.identity.user_id))]
pub async fn http_me(auth: AuthUser) -> Json<MeOut> {
  Json(MeOut { user: auth.identity })
}

// --- Quiz ---

async fn run(state: &AppState, auth: &AuthUser, cmd: QuizCommand) -> Result<Json<SessionReply>, ApiError> {
  let ctrl = state.session_for(&auth.identity).await;
  let reply = logic::execute(&ctrl, cmd).await?;
  info!(
    target: "quiz",
    user_id = %auth.identity.user_id,
    phase = %reply.session.phase,
    question = reply.session.question_number,
    score = reply.session.score,
    "HTTP quiz reply"
  );
  Ok(Json(reply))
}

#[instrument(level = "info", skip(state, auth), fields(user_id = %auth.identity.user_id))]
pub async fn http_get_quiz(State(state): State<Arc<AppState>>, auth: AuthUser) -> Result<Json<SessionReply>, ApiError> {
  run(&state, &auth, QuizCommand::Snapshot).await
}

#[instrument(level = "info", skip(state, auth), fields(user_id = %auth.identity.user_id))]
pub async fn http_start(State(state): State<Arc<AppState>>, auth: AuthUser) -> Result<Json<SessionReply>, ApiError> {
  run(&state, &auth, QuizCommand::Start).await
}

#[instrument(level = "info", skip(state, auth, body), fields(user_id = %auth.identity.user_id))]
pub async fn http_answer(
  State(state): State<Arc<AppState>>,
  auth: AuthUser,
  Json(body): Json<AnswerIn>,
) -> Result<Json<SessionReply>, ApiError> {
  run(&state, &auth, QuizCommand::SelectAnswer(body.choice)).await
}

#[instrument(level = "info", skip(state, auth), fields(user_id = %auth.identity.user_id))]
pub async fn http_next(State(state): State<Arc<AppState>>, auth: AuthUser) -> Result<Json<SessionReply>, ApiError> {
  run(&state, &auth, QuizCommand::Advance).await
}

#[instrument(level = "info", skip(state, auth, body), fields(user_id = %auth.identity.user_id, language = ?body.language))]
pub async fn http_language(
  State(state): State<Arc<AppState>>,
  auth: AuthUser,
  Json(body): Json<LanguageIn>,
) -> Result<Json<SessionReply>, ApiError> {
  run(&state, &auth, QuizCommand::ChangeLanguage(body.language)).await
}

#[instrument(level = "info", skip(state, auth), fields(user_id = %auth.identity.user_id))]
pub async fn http_abandon(State(state): State<Arc<AppState>>, auth: AuthUser) -> Result<Json<SessionReply>, ApiError> {
  run(&state, &auth, QuizCommand::Abandon).await
}

#[instrument(level = "info", skip(state, auth), fields(user_id = %auth.identity.user_id))]
pub async fn http_hint(State(state): State<Arc<AppState>>, auth: AuthUser) -> Result<Json<HintOut>, ApiError> {
  let ctrl = state.session_for(&auth.identity).await;
  Ok(Json(logic::hint(&ctrl).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_leaderboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.leaderboard().await)
}
