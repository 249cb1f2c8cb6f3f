//! Leaderboard ordering rule and its stores.
//!
//! The board is kept sorted by score, highest first, capped at ten entries.
//! Ties keep insertion order.

use std::path::PathBuf;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use crate::domain::PlayerScore;
use crate::error::{QuizError, Result};

pub const LEADERBOARD_CAPACITY: usize = 10;

/// Insert an entry, keep the board sorted (stable) and capped.
pub fn insert(board: &mut Vec<PlayerScore>, entry: PlayerScore) {
  board.push(entry);
  board.sort_by(|a, b| b.score.cmp(&a.score));
  board.truncate(LEADERBOARD_CAPACITY);
}

pub trait LeaderboardStore: Send + Sync {
  fn read_all(&self) -> BoxFuture<'_, Result<Vec<PlayerScore>>>;
  /// Insert one entry and persist the board as a single step; concurrent
  /// calls never overwrite each other. Returns the stored board.
  fn record(&self, entry: PlayerScore) -> BoxFuture<'_, Result<Vec<PlayerScore>>>;
}

/// Record a finished score. Storage failures are logged and swallowed.
#[instrument(level = "info", skip(store, entry), fields(name = %entry.name, score = entry.score))]
pub async fn save_score(store: &dyn LeaderboardStore, entry: PlayerScore) -> Option<Vec<PlayerScore>> {
  match store.record(entry).await {
    Ok(board) => {
      info!(target: "quiz", entries = board.len(), "Leaderboard saved");
      Some(board)
    }
    Err(e) => {
      error!(target: "quiz", error = %e, "Failed to save leaderboard");
      None
    }
  }
}

/// Loads the board for display; failures yield an empty board.
pub async fn load_scores(store: &dyn LeaderboardStore) -> Vec<PlayerScore> {
  store.read_all().await.unwrap_or_else(|e| {
    error!(target: "quiz", error = %e, "Failed to load leaderboard");
    Vec::new()
  })
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
  scores: Mutex<Vec<PlayerScore>>,
  writes: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
  /// Number of `record` calls so far.
  pub fn writes(&self) -> usize {
    self.writes.load(std::sync::atomic::Ordering::SeqCst)
  }
}

impl LeaderboardStore for MemoryStore {
  fn read_all(&self) -> BoxFuture<'_, Result<Vec<PlayerScore>>> {
    Box::pin(async move { Ok(self.scores.lock().await.clone()) })
  }

  fn record(&self, entry: PlayerScore) -> BoxFuture<'_, Result<Vec<PlayerScore>>> {
    Box::pin(async move {
      let mut board = self.scores.lock().await;
      insert(&mut board, entry);
      self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      Ok(board.clone())
    })
  }
}

/// Pretty JSON array on disk. A missing file reads as an empty board.
pub struct JsonFileStore {
  path: PathBuf,
  // Held for a whole read or read-insert-write.
  lock: Mutex<()>,
}

impl JsonFileStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), lock: Mutex::new(()) }
  }

  async fn load(&self) -> Result<Vec<PlayerScore>> {
    match tokio::fs::read_to_string(&self.path).await {
      Ok(s) if s.trim().is_empty() => Ok(Vec::new()),
      Ok(s) => serde_json::from_str(&s)
        .map_err(|e| QuizError::Persistence(format!("{}: {}", self.path.display(), e))),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(target: "quiz", path = %self.path.display(), "No leaderboard file yet");
        Ok(Vec::new())
      }
      Err(e) => Err(QuizError::Persistence(format!("{}: {}", self.path.display(), e))),
    }
  }

  async fn store(&self, scores: &[PlayerScore]) -> Result<()> {
    if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(dir).await?;
    }
    let json = serde_json::to_string_pretty(scores)?;
    tokio::fs::write(&self.path, json).await?;
    Ok(())
  }
}

impl LeaderboardStore for JsonFileStore {
  fn read_all(&self) -> BoxFuture<'_, Result<Vec<PlayerScore>>> {
    Box::pin(async move {
      let _guard = self.lock.lock().await;
      self.load().await
    })
  }

  fn record(&self, entry: PlayerScore) -> BoxFuture<'_, Result<Vec<PlayerScore>>> {
    Box::pin(async move {
      let _guard = self.lock.lock().await;
      let mut board = self.load().await.unwrap_or_else(|e| {
        error!(target: "quiz", error = %e, "Failed to load leaderboard; starting from an empty board");
        Vec::new()
      });
      insert(&mut board, entry);
      self.store(&board).await?;
      Ok(board)
    })
  }
}
