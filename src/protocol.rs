//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::domain::{Language, PlayerScore};
use crate::session::{Notice, SessionSnapshot};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Start,
    SelectAnswer {
        choice: String,
    },
    Advance,
    ChangeLanguage {
        language: Language,
    },
    Hint,
    Abandon,
    Snapshot,
    Leaderboard,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionSnapshot,
        notices: Vec<Notice>,
    },
    Hint {
        hint: Option<String>,
        notices: Vec<Notice>,
    },
    Leaderboard {
        scores: Vec<PlayerScore>,
    },
    Error {
        message: String,
        notices: Vec<Notice>,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize)]
pub struct SessionReply {
    pub session: SessionSnapshot,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
pub struct HintOut {
    pub hint: Option<String>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub notices: Vec<Notice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupIn {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginIn {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthOut {
    pub token: String,
    pub user: Identity,
}

#[derive(Serialize)]
pub struct MeOut {
    pub user: Identity,
}

#[derive(Deserialize)]
pub struct AnswerIn {
    pub choice: String,
}

#[derive(Deserialize)]
pub struct LanguageIn {
    pub language: Language,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

#[derive(Serialize)]
pub struct OkOut {
    pub ok: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub llm_enabled: bool,
}
