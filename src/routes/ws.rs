//! WebSocket upgrade + message loop. The token is checked before upgrading;
//! each client message is parsed as JSON, run against the player's session
//! and answered with a single JSON message.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::{IntoResponse, Response},
};
use tracing::{info, error, instrument, debug};

use crate::auth::Identity;
use crate::error::QuizError;
use crate::logic::{self, QuizCommand};
use crate::protocol::{ClientWsMessage, ServerWsMessage, WsQuery};
use crate::routes::http::ApiError;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state, q))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, Query(q): Query<WsQuery>) -> Response {
  let token = q.token.unwrap_or_default();
  let identity = match state.identity.current_user(&token).await {
    Ok(who) => who,
    Err(e) => return ApiError::from(e).into_response(),
  };
  info!(target: "globalmind", user_id = %identity.user_id, "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, identity))
}

#[instrument(level = "info", skip(socket, state, identity), fields(user_id = %identity.user_id))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, identity: Identity) {
  info!(target: "globalmind", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "globalmind", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &identity).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e), notices: Vec::new() },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e), "notices": [] }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "globalmind", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "globalmind", "WebSocket disconnected");
}

fn failure_message(f: logic::Failure) -> ServerWsMessage {
  ServerWsMessage::Error { message: f.error.to_string(), notices: f.notices }
}

#[instrument(level = "info", skip(state, identity))]
pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, identity: &Identity) -> ServerWsMessage {
  let cmd = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,
    ClientWsMessage::Leaderboard => return ServerWsMessage::Leaderboard { scores: state.leaderboard().await },
    ClientWsMessage::Hint => {
      // A signed-out token may still hold an open socket.
      if let Err(e) = ensure_signed_in(state, identity).await {
        return failure_message(e.into());
      }
      let ctrl = state.session_for(identity).await;
      return match logic::hint(&ctrl).await {
        Ok(out) => ServerWsMessage::Hint { hint: out.hint, notices: out.notices },
        Err(f) => failure_message(f),
      };
    }
    ClientWsMessage::Start => QuizCommand::Start,
    ClientWsMessage::SelectAnswer { choice } => QuizCommand::SelectAnswer(choice),
    ClientWsMessage::Advance => QuizCommand::Advance,
    ClientWsMessage::ChangeLanguage { language } => QuizCommand::ChangeLanguage(language),
    ClientWsMessage::Abandon => QuizCommand::Abandon,
    ClientWsMessage::Snapshot => QuizCommand::Snapshot,
  };

  if let Err(e) = ensure_signed_in(state, identity).await {
    return failure_message(e.into());
  }
  let ctrl = state.session_for(identity).await;
  match logic::execute(&ctrl, cmd).await {
    Ok(reply) => ServerWsMessage::Session { session: reply.session, notices: reply.notices },
    Err(f) => failure_message(f),
  }
}

async fn ensure_signed_in(state: &AppState, identity: &Identity) -> Result<(), QuizError> {
  if state.identity.is_active(&identity.user_id).await {
    Ok(())
  } else {
    Err(QuizError::Unauthorized)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::IdentityProvider;
  use crate::collaborators::testing::Fakes;
  use crate::config::QuizSettings;
  use crate::session::Phase;

  #[tokio::test]
  async fn dispatches_session_messages() {
    let fakes = Fakes::new();
    let state = AppState::from_parts(QuizSettings::default(), fakes.collaborators(), IdentityProvider::default());
    let (_, me) = state.identity.sign_in_guest().await;

    assert!(matches!(handle_client_ws(ClientWsMessage::Ping, &state, &me).await, ServerWsMessage::Pong));

    match handle_client_ws(ClientWsMessage::Start, &state, &me).await {
      ServerWsMessage::Session { session, .. } => assert_eq!(session.phase, Phase::Playing),
      other => panic!("unexpected reply: {other:?}"),
    }
    match handle_client_ws(ClientWsMessage::Advance, &state, &me).await {
      ServerWsMessage::Error { message, .. } => assert!(message.contains("advance")),
      other => panic!("unexpected reply: {other:?}"),
    }
    assert!(matches!(
      handle_client_ws(ClientWsMessage::Hint, &state, &me).await,
      ServerWsMessage::Hint { hint: Some(_), .. }
    ));
  }

  #[tokio::test]
  async fn signed_out_socket_is_refused() {
    let fakes = Fakes::new();
    let state = AppState::from_parts(QuizSettings::default(), fakes.collaborators(), IdentityProvider::default());
    let (token, me) = state.identity.sign_in_guest().await;
    state.identity.sign_out(&token).await;

    assert!(matches!(
      handle_client_ws(ClientWsMessage::Start, &state, &me).await,
      ServerWsMessage::Error { .. }
    ));
  }
}
