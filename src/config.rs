//! Loading agent configuration (prompts, quiz settings, preloaded accounts) from TOML.
//!
//! See `AgentConfig`, `Prompts` and `QuizSettings` for the expected schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Difficulty;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub quiz: QuizSettings,
  #[serde(default)]
  pub accounts: Vec<AccountCfg>,
}

/// Account entry accepted in TOML configuration.
/// `password_hash` is an argon2 PHC string, never a plain password.
#[derive(Clone, Debug, Deserialize)]
pub struct AccountCfg {
  pub email: String,
  pub password_hash: String,
  #[serde(default)] pub display_name: Option<String>,
}

/// Session tuning and external-call timeouts.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QuizSettings {
  pub starting_difficulty: Difficulty,
  pub placeholder_image: String,
  /// JSON file for the leaderboard. Empty keeps it in memory.
  pub leaderboard_path: String,
  pub generation_timeout_secs: u64,
  pub image_timeout_secs: u64,
  pub translation_timeout_secs: u64,
  pub adaptation_timeout_secs: u64,
  pub hint_timeout_secs: u64,
  /// Idle lifetime of a bearer token.
  pub token_ttl_secs: u64,
}

impl Default for QuizSettings {
  fn default() -> Self {
    Self {
      starting_difficulty: Difficulty::Easy,
      placeholder_image: "https://placehold.co/600x400.png".into(),
      leaderboard_path: "./data/leaderboard.json".into(),
      generation_timeout_secs: 45,
      image_timeout_secs: 60,
      translation_timeout_secs: 20,
      adaptation_timeout_secs: 15,
      hint_timeout_secs: 20,
      token_ttl_secs: 12 * 60 * 60,
    }
  }
}

impl QuizSettings {
  pub fn generation_timeout(&self) -> Duration { Duration::from_secs(self.generation_timeout_secs) }
  pub fn image_timeout(&self) -> Duration { Duration::from_secs(self.image_timeout_secs) }
  pub fn translation_timeout(&self) -> Duration { Duration::from_secs(self.translation_timeout_secs) }
  pub fn adaptation_timeout(&self) -> Duration { Duration::from_secs(self.adaptation_timeout_secs) }
  pub fn hint_timeout(&self) -> Duration { Duration::from_secs(self.hint_timeout_secs) }
  pub fn token_ttl(&self) -> Duration { Duration::from_secs(self.token_ttl_secs) }
}

/// Prompts used by the OpenAI client. Defaults target the GlobalMind quiz
/// (global cultures, languages and education systems, in Brazilian Portuguese).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Question generation
  pub question_system: String,
  pub question_user_template: String,
  // Hints
  pub hint_system: String,
  pub hint_user_template: String,
  // Translation
  pub translate_system: String,
  // Difficulty adaptation
  pub adapt_system: String,
  pub adapt_user_template: String,
  // Images
  pub image_prompt_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_system: "You are a creative quiz master for \"GlobalMind Quiz\". Respond ONLY with strict JSON.".into(),
      question_user_template: "Generate one unique, engaging quiz question in Brazilian Portuguese about global cultures, languages and educational systems.\n\
Difficulty: '{difficulty}'. Category: '{category}'.\n\
Decide if it is 'multiple-choice' (4 distinct options) or 'true-false' (options exactly \"Verdadeiro\" and \"Falso\").\n\
Do NOT repeat any of these previously asked questions:\n{history}\n\
The 'answer' field must EXACTLY match one of the strings in 'options'.\n\
Return JSON with fields: question, options, answer, type, difficulty, category, explanation, imageHint (a two-word English hint for an illustrative image).".into(),
      hint_system: "You are a helpful quiz assistant. Reply with ONE subtle hint in Brazilian Portuguese. Never reveal the answer or name any option.".into(),
      hint_user_template: "Question: \"{question}\"\nOptions:\n{options}\nCorrect answer: \"{answer}\"\nGive the hint now.".into(),
      translate_system: "You are an expert translator. Translate the user's text into {language}. Output ONLY the translated text, without introductions, explanations or quotation marks.".into(),
      adapt_system: "You adjust quiz difficulty. Respond ONLY with strict JSON: {\"difficultyLevel\": \"easy\"|\"medium\"|\"hard\", \"reasoning\": string}.".into(),
      adapt_user_template: "Correct answers: {correct}\nTotal questions in quiz: {total}\nQuestions answered so far: {answered}\n\
Accuracy below 40% => easy; 40% to 75% => medium; above 75% => hard. Be conservative early in the quiz.\n\
Write a short, encouraging reasoning in Brazilian Portuguese.".into(),
      image_prompt_template: "A vibrant, high-quality, photorealistic image for a quiz game, representing the concept: {hint}. Visually appealing and clear. No text or logos.".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "globalmind", %path, accounts = cfg.accounts.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "globalmind", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "globalmind", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}
