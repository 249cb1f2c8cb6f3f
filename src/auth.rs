//! Identity: email/password accounts, guest sign-in and bearer tokens.
//!
//! Accounts and tokens live in memory. Accounts may be preloaded from the
//! TOML config with an argon2 PHC hash. Tokens are opaque UUID v4 strings
//! that expire after `ttl` without use; expired ones are swept on issue.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use argon2::{
  password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
  Argon2,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AccountCfg;
use crate::error::{QuizError, Result};

pub const GUEST_NAME: &str = "Convidado";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
  pub user_id: String,
  pub email: Option<String>,
  pub display_name: String,
  pub guest: bool,
}

#[derive(Clone, Debug)]
struct Account {
  user_id: String,
  email: String,
  display_name: String,
  password_hash: String,
}

impl Account {
  fn identity(&self) -> Identity {
    Identity {
      user_id: self.user_id.clone(),
      email: Some(self.email.clone()),
      display_name: self.display_name.clone(),
      guest: false,
    }
  }
}

struct Grant {
  identity: Identity,
  last_seen: Instant,
}

impl Grant {
  fn is_live(&self, ttl: Duration) -> bool {
    self.last_seen.elapsed() <= ttl
  }
}

pub struct IdentityProvider {
  /// Keyed by normalized (trimmed, lowercase) email.
  accounts: RwLock<HashMap<String, Account>>,
  tokens: RwLock<HashMap<String, Grant>>,
  ttl: Duration,
}

impl Default for IdentityProvider {
  fn default() -> Self {
    Self::with_ttl(DEFAULT_TOKEN_TTL)
  }
}

impl IdentityProvider {
  pub fn with_ttl(ttl: Duration) -> Self {
    Self { accounts: RwLock::new(HashMap::new()), tokens: RwLock::new(HashMap::new()), ttl }
  }

  /// Preload accounts from config. Entries with an unparsable hash are skipped.
  pub fn from_config(accounts: &[AccountCfg], ttl: Duration) -> Self {
    let mut map = HashMap::new();
    for a in accounts {
      let email = normalize_email(&a.email);
      if PasswordHash::new(&a.password_hash).is_err() {
        warn!(target: "globalmind", %email, "Skipping configured account with an invalid password hash");
        continue;
      }
      let display_name = a.display_name.clone().unwrap_or_else(|| default_display_name(&email));
      map.insert(
        email.clone(),
        Account { user_id: Uuid::new_v4().to_string(), email, display_name, password_hash: a.password_hash.clone() },
      );
    }
    Self { accounts: RwLock::new(map), ..Self::with_ttl(ttl) }
  }

  #[instrument(level = "info", skip(self, email, password, display_name), fields(email = %email.trim()))]
  pub async fn sign_up(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<(String, Identity)> {
    let email = normalize_email(email);
    validate_email(&email)?;
    if password.is_empty() {
      return Err(QuizError::InvalidSignup("password must not be empty".into()));
    }
    if self.accounts.read().await.contains_key(&email) {
      return Err(QuizError::AccountExists(email));
    }

    let password_hash = hash_password(password.to_string()).await?;
    let display_name = display_name
      .map(str::trim)
      .filter(|n| !n.is_empty())
      .map(str::to_string)
      .unwrap_or_else(|| default_display_name(&email));
    let account = Account { user_id: Uuid::new_v4().to_string(), email: email.clone(), display_name, password_hash };

    let identity = {
      let mut accounts = self.accounts.write().await;
      // Re-check: another sign-up may have won while we were hashing.
      if accounts.contains_key(&email) {
        return Err(QuizError::AccountExists(email));
      }
      let identity = account.identity();
      accounts.insert(email, account);
      identity
    };
    info!(target: "globalmind", user_id = %identity.user_id, "Account created");
    Ok((self.issue(identity.clone()).await, identity))
  }

  #[instrument(level = "info", skip(self, email, password), fields(email = %email.trim()))]
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<(String, Identity)> {
    let email = normalize_email(email);
    let account = self.accounts.read().await.get(&email).cloned().ok_or(QuizError::InvalidCredentials)?;
    if !verify_password(password.to_string(), account.password_hash.clone()).await {
      warn!(target: "globalmind", %email, "Sign-in rejected");
      return Err(QuizError::InvalidCredentials);
    }
    let identity = account.identity();
    info!(target: "globalmind", user_id = %identity.user_id, "Signed in");
    Ok((self.issue(identity.clone()).await, identity))
  }

  pub async fn sign_in_guest(&self) -> (String, Identity) {
    let identity = Identity {
      user_id: format!("guest-{}", Uuid::new_v4()),
      email: None,
      display_name: GUEST_NAME.into(),
      guest: true,
    };
    info!(target: "globalmind", user_id = %identity.user_id, "Guest signed in");
    (self.issue(identity.clone()).await, identity)
  }

  /// True if the token was known.
  pub async fn sign_out(&self, token: &str) -> bool {
    self.tokens.write().await.remove(token).is_some()
  }

  /// Resolve a token and refresh its idle timer. Expired tokens are removed.
  pub async fn current_user(&self, token: &str) -> Result<Identity> {
    let mut tokens = self.tokens.write().await;
    match tokens.get_mut(token) {
      Some(grant) if grant.is_live(self.ttl) => {
        grant.last_seen = Instant::now();
        return Ok(grant.identity.clone());
      }
      Some(_) => {}
      None => return Err(QuizError::Unauthorized),
    }
    if let Some(grant) = tokens.remove(token) {
      debug!(target: "globalmind", user_id = %grant.identity.user_id, "Token expired");
    }
    Err(QuizError::Unauthorized)
  }

  /// True while the user holds at least one live token.
  pub async fn is_active(&self, user_id: &str) -> bool {
    self.tokens.read().await.values().any(|g| g.identity.user_id == user_id && g.is_live(self.ttl))
  }

  /// Users holding at least one live token.
  pub async fn active_users(&self) -> HashSet<String> {
    self
      .tokens
      .read()
      .await
      .values()
      .filter(|g| g.is_live(self.ttl))
      .map(|g| g.identity.user_id.clone())
      .collect()
  }

  async fn issue(&self, identity: Identity) -> String {
    let token = Uuid::new_v4().to_string();
    let mut tokens = self.tokens.write().await;
    let before = tokens.len();
    tokens.retain(|_, g| g.is_live(self.ttl));
    if tokens.len() < before {
      debug!(target: "globalmind", swept = before - tokens.len(), "Expired tokens swept");
    }
    tokens.insert(token.clone(), Grant { identity, last_seen: Instant::now() });
    token
  }
}

fn normalize_email(email: &str) -> String {
  email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<()> {
  let ok = match email.split_once('@') {
    Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'),
    None => false,
  };
  if ok && !email.contains(char::is_whitespace) {
    Ok(())
  } else {
    Err(QuizError::InvalidSignup(format!("'{email}' is not a valid email address")))
  }
}

fn default_display_name(email: &str) -> String {
  email.split('@').next().unwrap_or(email).to_string()
}

/// Argon2 is CPU-bound; keep it off the async workers.
pub async fn hash_password(password: String) -> Result<String> {
  tokio::task::spawn_blocking(move || {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map(|h| h.to_string())
      .map_err(|e| QuizError::InvalidSignup(format!("failed to hash password: {e}")))
  })
  .await
  .map_err(|e| QuizError::Io(std::io::Error::other(e)))?
}

async fn verify_password(password: String, hash: String) -> bool {
  tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
    Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
    Err(_) => false,
  })
  .await
  .unwrap_or(false)
}
