//! Application state: configuration, collaborators, identity and live sessions.
//!
//! This module owns:
//!   - the quiz settings and prompts (from TOML or defaults)
//!   - the collaborator set (OpenAI when configured, offline otherwise)
//!   - the identity provider (accounts + bearer tokens)
//!   - one session controller per signed-in user

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::auth::{Identity, IdentityProvider};
use crate::collaborators::Collaborators;
use crate::config::{load_agent_config_from_env, QuizSettings};
use crate::domain::PlayerScore;
use crate::leaderboard::{self, JsonFileStore, LeaderboardStore, MemoryStore};
use crate::openai::OpenAI;
use crate::session::SessionController;

pub struct AppState {
    pub settings: QuizSettings,
    pub collab: Collaborators,
    pub identity: IdentityProvider,
    pub llm_enabled: bool,
    sessions: RwLock<HashMap<String, Arc<SessionController>>>,
}

impl AppState {
    /// Build state from env: load config, pick the leaderboard store, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let store: Arc<dyn LeaderboardStore> = if cfg.quiz.leaderboard_path.trim().is_empty() {
            warn!(target: "globalmind", "No leaderboard_path configured; scores are kept in memory only");
            Arc::new(MemoryStore::default())
        } else {
            info!(target: "globalmind", path = %cfg.quiz.leaderboard_path, "Leaderboard persisted to JSON file");
            Arc::new(JsonFileStore::new(&cfg.quiz.leaderboard_path))
        };

        // Build optional OpenAI client (if API key present).
        let (collab, llm_enabled) = match OpenAI::from_env(cfg.prompts.clone()) {
            Some(oa) => {
                info!(
                    target: "globalmind",
                    base_url = %oa.base_url,
                    fast_model = %oa.fast_model,
                    strong_model = %oa.strong_model,
                    image_model = %oa.image_model,
                    "OpenAI enabled."
                );
                (llm_collaborators(oa, store), true)
            }
            None => {
                warn!(target: "globalmind", "OpenAI disabled (no OPENAI_API_KEY). Using the built-in question bank.");
                (Collaborators::offline(store), false)
            }
        };

        let identity = IdentityProvider::from_config(&cfg.accounts, cfg.quiz.token_ttl());
        let mut state = Self::from_parts(cfg.quiz, collab, identity);
        state.llm_enabled = llm_enabled;
        state
    }

    pub fn from_parts(settings: QuizSettings, collab: Collaborators, identity: IdentityProvider) -> Self {
        Self { settings, collab, identity, llm_enabled: false, sessions: RwLock::new(HashMap::new()) }
    }

    /// The player's controller, created on first use. Creating one also drops
    /// controllers whose user no longer holds a live token.
    #[instrument(level = "debug", skip(self, who), fields(user_id = %who.user_id))]
    pub async fn session_for(&self, who: &Identity) -> Arc<SessionController> {
        if let Some(s) = self.sessions.read().await.get(&who.user_id) {
            return s.clone();
        }
        let live = self.identity.active_users().await;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|user_id, _| user_id == &who.user_id || live.contains(user_id));
        if sessions.len() < before {
            info!(target: "quiz", dropped = before - sessions.len(), "Idle sessions dropped");
        }
        sessions
            .entry(who.user_id.clone())
            .or_insert_with(|| {
                info!(target: "quiz", user_id = %who.user_id, player = %who.display_name, "Session created");
                Arc::new(SessionController::new(who.display_name.clone(), self.settings.clone(), self.collab.clone()))
            })
            .clone()
    }

    /// Drop the player's controller once they hold no live token.
    pub async fn end_session(&self, user_id: &str) {
        if self.identity.is_active(user_id).await {
            debug!(target: "quiz", %user_id, "Session kept for another signed-in device");
            return;
        }
        if self.sessions.write().await.remove(user_id).is_some() {
            info!(target: "quiz", %user_id, "Session closed");
        }
    }

    pub async fn leaderboard(&self) -> Vec<PlayerScore> {
        leaderboard::load_scores(&*self.collab.leaderboard).await
    }
}

/// One client serves every collaborator role.
fn llm_collaborators(oa: OpenAI, leaderboard: Arc<dyn LeaderboardStore>) -> Collaborators {
    let oa = Arc::new(oa);
    Collaborators {
        questions: oa.clone(),
        images: oa.clone(),
        translator: oa.clone(),
        adaptor: oa.clone(),
        hints: oa,
        leaderboard,
    }
}
