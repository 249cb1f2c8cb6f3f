//! Collaborator interfaces used by the session controller, with typed
//! request/response records and the offline implementations used when no
//! LLM is configured.
//!
//! Traits return boxed futures so they can live behind `Arc<dyn ...>`.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Category, Difficulty, Language, Question, QuestionType};
use crate::error::{QuizError, Result};
use crate::leaderboard::LeaderboardStore;
use crate::seeds::seed_questions;

// ------------------------------------------------------------------
// Request / response records
// ------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct QuestionRequest {
  pub difficulty: Difficulty,
  pub category: Category,
  /// Texts of every question already presented in this session.
  pub history: Vec<String>,
}

/// A question as produced by a generator, before it gets a session id and image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
  pub question: String,
  pub options: Vec<String>,
  pub answer: String,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub difficulty: Difficulty,
  pub category: Category,
  pub explanation: String,
  #[serde(default)]
  pub image_hint: String,
}

impl GeneratedQuestion {
  /// Attach the session sequence number and validate the result.
  pub fn into_question(self, id: u32) -> Result<Question> {
    let q = Question {
      id,
      question: self.question.trim().to_string(),
      image: None,
      image_hint: self.image_hint,
      options: self.options.into_iter().map(|o| o.trim().to_string()).collect(),
      answer: self.answer.trim().to_string(),
      kind: self.kind,
      difficulty: self.difficulty,
      category: self.category,
      explanation: self.explanation,
    };
    q.validate()?;
    Ok(q)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HintRequest {
  pub question: String,
  pub options: Vec<String>,
  pub answer: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdaptRequest {
  pub correct: usize,
  pub total: usize,
  pub answered: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptResponse {
  pub difficulty_level: Difficulty,
  pub reasoning: String,
}

// ------------------------------------------------------------------
// Traits
// ------------------------------------------------------------------

pub trait QuestionGenerator: Send + Sync {
  fn generate(&self, req: QuestionRequest) -> BoxFuture<'_, Result<GeneratedQuestion>>;
}

pub trait ImageGenerator: Send + Sync {
  /// Returns an image reference (URL or data URI) for a short textual hint.
  fn generate(&self, hint: String) -> BoxFuture<'_, Result<String>>;
}

pub trait Translator: Send + Sync {
  fn translate(&self, text: String, target: Language) -> BoxFuture<'_, Result<String>>;
}

pub trait DifficultyAdaptor: Send + Sync {
  fn recommend(&self, req: AdaptRequest) -> BoxFuture<'_, Result<AdaptResponse>>;
}

pub trait HintGenerator: Send + Sync {
  fn hint(&self, req: HintRequest) -> BoxFuture<'_, Result<String>>;
}

/// Everything a session controller talks to.
#[derive(Clone)]
pub struct Collaborators {
  pub questions: Arc<dyn QuestionGenerator>,
  pub images: Arc<dyn ImageGenerator>,
  pub translator: Arc<dyn Translator>,
  pub adaptor: Arc<dyn DifficultyAdaptor>,
  pub hints: Arc<dyn HintGenerator>,
  pub leaderboard: Arc<dyn LeaderboardStore>,
}

impl Collaborators {
  /// Offline wiring: built-in question bank, rule-based adaptation, no images
  /// or translation.
  pub fn offline(leaderboard: Arc<dyn LeaderboardStore>) -> Self {
    Self {
      questions: Arc::new(LocalBank::new(seed_questions())),
      images: Arc::new(NoImages),
      translator: Arc::new(NoTranslator),
      adaptor: Arc::new(RuleBasedAdaptor),
      hints: Arc::new(LocalHints),
      leaderboard,
    }
  }
}

// ------------------------------------------------------------------
// Offline implementations
// ------------------------------------------------------------------

/// Serves questions from a fixed bank, skipping anything already in the
/// session history. Prefers the requested difficulty and category, then the
/// difficulty alone, then any unused question.
pub struct LocalBank {
  bank: Vec<GeneratedQuestion>,
}

impl LocalBank {
  pub fn new(bank: Vec<GeneratedQuestion>) -> Self {
    Self { bank }
  }

  fn pick(&self, req: &QuestionRequest) -> Option<GeneratedQuestion> {
    use rand::seq::SliceRandom;

    let unused: Vec<&GeneratedQuestion> = self
      .bank
      .iter()
      .filter(|q| !req.history.iter().any(|h| h == &q.question))
      .collect();

    let exact: Vec<&GeneratedQuestion> = unused
      .iter()
      .copied()
      .filter(|q| q.difficulty == req.difficulty && q.category == req.category)
      .collect();
    let by_difficulty: Vec<&GeneratedQuestion> =
      unused.iter().copied().filter(|q| q.difficulty == req.difficulty).collect();

    let pool = if !exact.is_empty() {
      exact
    } else if !by_difficulty.is_empty() {
      by_difficulty
    } else {
      unused
    };
    pool.choose(&mut rand::thread_rng()).map(|q| (*q).clone())
  }
}

impl QuestionGenerator for LocalBank {
  fn generate(&self, req: QuestionRequest) -> BoxFuture<'_, Result<GeneratedQuestion>> {
    Box::pin(async move {
      let picked = self.pick(&req);
      debug!(target: "quiz", difficulty = %req.difficulty, category = req.category.label(), found = picked.is_some(), "Local bank lookup");
      picked.ok_or_else(|| QuizError::Generation("question bank exhausted".into()))
    })
  }
}

pub struct NoImages;

impl ImageGenerator for NoImages {
  fn generate(&self, _hint: String) -> BoxFuture<'_, Result<String>> {
    Box::pin(async { Err(QuizError::Image("image generation is not configured".into())) })
  }
}

pub struct NoTranslator;

impl Translator for NoTranslator {
  fn translate(&self, _text: String, target: Language) -> BoxFuture<'_, Result<String>> {
    Box::pin(async move {
      Err(QuizError::Translation(format!("translation to {} is not configured", target.name())))
    })
  }
}

/// Accuracy thresholds: below 40% easy, up to 75% medium, above that hard.
/// Before three answers it never goes past medium.
pub struct RuleBasedAdaptor;

impl RuleBasedAdaptor {
  pub fn decide(req: AdaptRequest) -> AdaptResponse {
    if req.answered == 0 {
      return AdaptResponse {
        difficulty_level: Difficulty::Easy,
        reasoning: "Vamos começar com calma.".into(),
      };
    }
    let accuracy = req.correct as f32 / req.answered as f32;
    let (mut level, mut reasoning) = if accuracy < 0.40 {
      (Difficulty::Easy, "Vamos tentar uma um pouco mais fácil para pegar o ritmo.")
    } else if accuracy <= 0.75 {
      (Difficulty::Medium, "Bom trabalho! Vamos manter um desafio equilibrado.")
    } else {
      (Difficulty::Hard, "Você está indo muito bem! Vamos aumentar um pouco o desafio.")
    };
    if req.answered < 3 && level == Difficulty::Hard {
      level = Difficulty::Medium;
      reasoning = "Ótimo começo! Vamos subir o nível aos poucos.";
    }
    AdaptResponse { difficulty_level: level, reasoning: reasoning.into() }
  }
}

impl DifficultyAdaptor for RuleBasedAdaptor {
  fn recommend(&self, req: AdaptRequest) -> BoxFuture<'_, Result<AdaptResponse>> {
    Box::pin(async move { Ok(Self::decide(req)) })
  }
}

/// Hints without an LLM: never names the answer, only nudges.
pub struct LocalHints;

impl HintGenerator for LocalHints {
  fn hint(&self, req: HintRequest) -> BoxFuture<'_, Result<String>> {
    Box::pin(async move {
      let text = if req.options.len() == 2 {
        "Releia a afirmação com atenção: um único detalhe decide se ela é verdadeira.".to_string()
      } else {
        match req.answer.chars().next() {
          Some(first) => format!("A resposta correta começa com \"{}\".", first),
          None => "Elimine primeiro as opções que parecem menos prováveis.".to_string(),
        }
      };
      Ok(text)
    })
  }
}

// ------------------------------------------------------------------
// Scripted collaborators for tests
// ------------------------------------------------------------------

#[cfg(test)]
pub mod testing {
  use std::collections::{HashMap, VecDeque};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use tokio::sync::Semaphore;

  use super::*;
  use crate::leaderboard::MemoryStore;

  pub fn generated(text: &str, difficulty: Difficulty) -> GeneratedQuestion {
    GeneratedQuestion {
      question: text.into(),
      options: vec!["Lisboa".into(), "Paris".into(), "Roma".into(), "Berlim".into()],
      answer: "Paris".into(),
      kind: QuestionType::MultipleChoice,
      difficulty,
      category: Category::Culture,
      explanation: "Paris é a capital da França.".into(),
      image_hint: "Eiffel Tower".into(),
    }
  }

  /// Hands out queued answers; generates numbered questions once the queue is empty.
  #[derive(Default)]
  pub struct ScriptedQuestions {
    pub queue: Mutex<VecDeque<Result<GeneratedQuestion>>>,
    pub requests: Mutex<Vec<QuestionRequest>>,
  }

  impl ScriptedQuestions {
    pub fn push(&self, r: Result<GeneratedQuestion>) {
      self.queue.lock().unwrap().push_back(r);
    }
    pub fn requests(&self) -> Vec<QuestionRequest> {
      self.requests.lock().unwrap().clone()
    }
  }

  impl QuestionGenerator for ScriptedQuestions {
    fn generate(&self, req: QuestionRequest) -> BoxFuture<'_, Result<GeneratedQuestion>> {
      let n = {
        let mut reqs = self.requests.lock().unwrap();
        reqs.push(req.clone());
        reqs.len()
      };
      let next = self.queue.lock().unwrap().pop_front();
      Box::pin(async move {
        match next {
          Some(r) => r,
          None => Ok(generated(&format!("Qual é a capital? #{n}"), req.difficulty)),
        }
      })
    }
  }

  pub struct StaticImages(pub Option<String>);

  impl ImageGenerator for StaticImages {
    fn generate(&self, _hint: String) -> BoxFuture<'_, Result<String>> {
      let r = self.0.clone().ok_or_else(|| QuizError::Image("no image".into()));
      Box::pin(async move { r })
    }
  }

  /// Dictionary translator. Unknown texts get "[Xx] " prefixed, texts listed
  /// in `fail_on` fail, and `gate` (when set) holds every call until a permit
  /// is added for it. `numbered` tags each result with its call number so no
  /// two translations agree.
  #[derive(Default)]
  pub struct ScriptedTranslator {
    pub dict: HashMap<String, String>,
    pub fail_on: Vec<String>,
    pub gate: Option<Arc<Semaphore>>,
    pub numbered: bool,
    pub calls: AtomicUsize,
  }

  impl Translator for ScriptedTranslator {
    fn translate(&self, text: String, target: Language) -> BoxFuture<'_, Result<String>> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst);
      Box::pin(async move {
        if let Some(gate) = &self.gate {
          if let Ok(permit) = gate.acquire().await {
            permit.forget();
          }
        }
        if self.fail_on.contains(&text) {
          return Err(QuizError::Llm(format!("cannot translate '{text}'")));
        }
        Ok(match self.dict.get(&text) {
          Some(t) => t.clone(),
          None if self.numbered => format!("[{:?}#{}] {}", target, n, text),
          None => format!("[{:?}] {}", target, text),
        })
      })
    }
  }

  /// Never answers.
  pub struct Hung;

  impl QuestionGenerator for Hung {
    fn generate(&self, _req: QuestionRequest) -> BoxFuture<'_, Result<GeneratedQuestion>> {
      Box::pin(futures::future::pending())
    }
  }

  impl Translator for Hung {
    fn translate(&self, _text: String, _target: Language) -> BoxFuture<'_, Result<String>> {
      Box::pin(futures::future::pending())
    }
  }

  impl DifficultyAdaptor for Hung {
    fn recommend(&self, _req: AdaptRequest) -> BoxFuture<'_, Result<AdaptResponse>> {
      Box::pin(futures::future::pending())
    }
  }

  pub struct ScriptedAdaptor {
    pub response: Option<Difficulty>,
    pub requests: Mutex<Vec<AdaptRequest>>,
  }

  impl ScriptedAdaptor {
    pub fn returning(response: Option<Difficulty>) -> Self {
      Self { response, requests: Mutex::new(Vec::new()) }
    }
    pub fn requests(&self) -> Vec<AdaptRequest> {
      self.requests.lock().unwrap().clone()
    }
  }

  impl DifficultyAdaptor for ScriptedAdaptor {
    fn recommend(&self, req: AdaptRequest) -> BoxFuture<'_, Result<AdaptResponse>> {
      self.requests.lock().unwrap().push(req);
      let r = match self.response {
        Some(d) => Ok(AdaptResponse { difficulty_level: d, reasoning: "scripted".into() }),
        None => Err(QuizError::Adaptation("scripted failure".into())),
      };
      Box::pin(async move { r })
    }
  }

  pub struct Fakes {
    pub questions: Arc<ScriptedQuestions>,
    pub translator: Arc<ScriptedTranslator>,
    pub adaptor: Arc<ScriptedAdaptor>,
    pub store: Arc<MemoryStore>,
  }

  impl Fakes {
    pub fn new() -> Self {
      Self::with(ScriptedTranslator::default(), ScriptedAdaptor::returning(Some(Difficulty::Hard)))
    }

    pub fn with(translator: ScriptedTranslator, adaptor: ScriptedAdaptor) -> Self {
      Self {
        questions: Arc::new(ScriptedQuestions::default()),
        translator: Arc::new(translator),
        adaptor: Arc::new(adaptor),
        store: Arc::new(MemoryStore::default()),
      }
    }

    pub fn collaborators(&self) -> Collaborators {
      Collaborators {
        questions: self.questions.clone(),
        images: Arc::new(StaticImages(Some("https://img.example/q.png".into()))),
        translator: self.translator.clone(),
        adaptor: self.adaptor.clone(),
        hints: Arc::new(LocalHints),
        leaderboard: self.store.clone(),
      }
    }
  }
}
