//! Quiz session controller.
//!
//! One `SessionController` per player owns a single `SessionState` behind a
//! mutex. The lock is never held while a collaborator call is outstanding:
//! each operation takes what it needs, releases the lock, awaits the
//! collaborator, then re-locks and checks `seq` before applying the result.
//! `seq` changes whenever the displayed question changes, so results for a
//! question the player already left are dropped.
//!
//! Work that follows a transition into `generating` or `translating` runs on
//! a spawned task the caller awaits. A dropped request (client gone) does not
//! cancel it, so those states always resolve, at the latest by timeout.
//!
//! Lifecycle: welcome -> generating -> playing -> feedback -> (generating ->
//! playing -> feedback)* -> finished -> generating ...

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::collaborators::{AdaptRequest, Collaborators, HintRequest, QuestionRequest};
use crate::config::QuizSettings;
use crate::domain::{Category, Difficulty, Language, PlayerScore, Question, ADAPT_EVERY, SESSION_LENGTH};
use crate::error::{QuizError, Result};
use crate::leaderboard;
use crate::util::trunc_for_log;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  #[default]
  Welcome,
  Generating,
  Playing,
  Feedback,
  Finished,
}

impl std::fmt::Display for Phase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Phase::Welcome => "welcome",
      Phase::Generating => "generating",
      Phase::Playing => "playing",
      Phase::Feedback => "feedback",
      Phase::Finished => "finished",
    };
    f.write_str(s)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
  Info,
  Error,
}

/// Transient message for the player (a toast in the browser).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notice {
  pub level: NoticeLevel,
  pub title: String,
  pub message: String,
}

impl Notice {
  pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self { level: NoticeLevel::Info, title: title.into(), message: message.into() }
  }
  pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self { level: NoticeLevel::Error, title: title.into(), message: message.into() }
  }
}

/// The mutable record of one play-through.
#[derive(Debug, Default)]
pub struct SessionState {
  phase: Phase,
  current: Option<Question>,
  translated: Option<Question>,
  history: Vec<Question>,
  score: u32,
  correct: usize,
  incorrect: usize,
  current_streak: u32,
  longest_streak: u32,
  selected: Option<String>,
  last_correct: Option<bool>,
  language: Language,
  difficulty: Difficulty,
  adaptation: Option<String>,
  translating: bool,
  seq: u64,
  notices: Vec<Notice>,
}

impl SessionState {
  /// The question the player sees: the translated variant when present.
  pub fn displayed(&self) -> Option<&Question> {
    self.translated.as_ref().or(self.current.as_ref())
  }

  fn reset(&mut self, difficulty: Difficulty) {
    let language = self.language;
    let seq = self.seq;
    *self = SessionState { language, seq, difficulty, ..SessionState::default() };
  }

  fn begin_generating(&mut self) -> u64 {
    self.phase = Phase::Generating;
    self.current = None;
    self.translated = None;
    self.selected = None;
    self.last_correct = None;
    self.translating = false;
    self.seq += 1;
    self.seq
  }

  fn present(&mut self, q: Question) {
    self.history.push(q.clone());
    self.current = Some(q);
    self.translated = None;
    self.phase = Phase::Playing;
  }

  fn abort_to_welcome(&mut self) {
    self.phase = Phase::Welcome;
    self.current = None;
    self.translated = None;
    self.selected = None;
    self.last_correct = None;
    self.translating = false;
    self.seq += 1;
  }

  /// Scores `choice` against the displayed question and moves to feedback.
  fn apply_answer(&mut self, choice: &str) -> Result<bool> {
    if self.phase != Phase::Playing || self.translating {
      let phase = if self.translating { "translating".to_string() } else { self.phase.to_string() };
      return Err(QuizError::invalid_transition("select an answer", phase));
    }
    let (is_correct, difficulty) = match self.displayed() {
      Some(q) => (q.answer == choice, q.difficulty),
      None => return Err(QuizError::invalid_transition("select an answer", "no question is displayed")),
    };

    if is_correct {
      self.correct += 1;
      self.current_streak += 1;
      self.longest_streak = self.longest_streak.max(self.current_streak);
      self.score += difficulty.points();
    } else {
      self.incorrect += 1;
      self.current_streak = 0;
    }
    self.selected = Some(choice.to_string());
    self.last_correct = Some(is_correct);
    self.phase = Phase::Feedback;
    Ok(is_correct)
  }

  fn history_texts(&self) -> Vec<String> {
    self.history.iter().map(|q| q.question.clone()).collect()
  }

  fn notify(&mut self, notice: Notice) {
    self.notices.push(notice);
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    SessionSnapshot {
      phase: self.phase,
      question: self.displayed().cloned(),
      is_translated: self.translated.is_some(),
      question_number: self.history.len(),
      total_questions: SESSION_LENGTH,
      score: self.score,
      correct_answers: self.correct,
      incorrect_answers: self.incorrect,
      current_streak: self.current_streak,
      longest_streak: self.longest_streak,
      selected_answer: self.selected.clone(),
      is_answer_correct: self.last_correct,
      language: self.language,
      difficulty: self.difficulty,
      adaptation: self.adaptation.clone(),
      translating: self.translating,
    }
  }
}

/// What the view layer gets to render.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
  pub phase: Phase,
  pub question: Option<Question>,
  pub is_translated: bool,
  pub question_number: usize,
  pub total_questions: usize,
  pub score: u32,
  pub correct_answers: usize,
  pub incorrect_answers: usize,
  pub current_streak: u32,
  pub longest_streak: u32,
  pub selected_answer: Option<String>,
  pub is_answer_correct: Option<bool>,
  pub language: Language,
  pub difficulty: Difficulty,
  pub adaptation: Option<String>,
  pub translating: bool,
}

enum NextStep {
  Finish { score: u32 },
  Generate { seq: u64, presented: usize, correct: usize, difficulty: Difficulty, history: Vec<String> },
}

pub struct SessionController {
  player: String,
  settings: QuizSettings,
  collab: Collaborators,
  state: Mutex<SessionState>,
}

impl SessionController {
  pub fn new(player: impl Into<String>, settings: QuizSettings, collab: Collaborators) -> Self {
    let state = SessionState { difficulty: settings.starting_difficulty, ..SessionState::default() };
    Self { player: player.into(), settings, collab, state: Mutex::new(state) }
  }

  pub fn player(&self) -> &str {
    &self.player
  }

  pub async fn snapshot(&self) -> SessionSnapshot {
    self.state.lock().await.snapshot()
  }

  /// Drain pending notices.
  pub async fn take_notices(&self) -> Vec<Notice> {
    std::mem::take(&mut self.state.lock().await.notices)
  }

  /// Start (or restart) a quiz. Valid from welcome or finished.
  #[instrument(level = "info", skip(self), fields(player = %self.player))]
  pub async fn start(self: &Arc<Self>) -> Result<SessionSnapshot> {
    let seq = {
      let mut st = self.state.lock().await;
      if !matches!(st.phase, Phase::Welcome | Phase::Finished) {
        return Err(QuizError::invalid_transition("start a quiz", st.phase));
      }
      st.reset(self.settings.starting_difficulty);
      st.begin_generating()
    };
    let difficulty = self.settings.starting_difficulty;
    info!(target: "quiz", player = %self.player, %difficulty, "Quiz started");
    self.detached(move |this| async move { this.fetch_and_present(seq, difficulty, Vec::new(), 1).await }).await
  }

  /// Leave the running quiz and go back to the welcome view.
  #[instrument(level = "info", skip(self), fields(player = %self.player))]
  pub async fn abandon(&self) -> SessionSnapshot {
    let mut st = self.state.lock().await;
    if st.phase != Phase::Welcome {
      info!(target: "quiz", player = %self.player, answered = st.history.len(), "Quiz abandoned");
      st.abort_to_welcome();
    }
    st.snapshot()
  }

  /// Commit an answer for the displayed question.
  #[instrument(level = "info", skip(self, choice), fields(player = %self.player))]
  pub async fn select_answer(&self, choice: &str) -> Result<SessionSnapshot> {
    let mut st = self.state.lock().await;
    let correct = st.apply_answer(choice)?;
    info!(target: "quiz", player = %self.player, question = st.history.len(), correct, score = st.score, streak = st.current_streak, "Answer committed");
    Ok(st.snapshot())
  }

  /// Move on from feedback: finish after the last question, otherwise
  /// (possibly) adapt difficulty and request the next question.
  #[instrument(level = "info", skip(self), fields(player = %self.player))]
  pub async fn advance(self: &Arc<Self>) -> Result<SessionSnapshot> {
    let step = {
      let mut st = self.state.lock().await;
      if st.phase != Phase::Feedback {
        return Err(QuizError::invalid_transition("advance", st.phase));
      }
      let presented = st.history.len();
      if presented >= SESSION_LENGTH {
        st.phase = Phase::Finished;
        st.selected = None;
        st.last_correct = None;
        st.translating = false;
        st.seq += 1;
        NextStep::Finish { score: st.score }
      } else {
        let history = st.history_texts();
        let seq = st.begin_generating();
        NextStep::Generate { seq, presented, correct: st.correct, difficulty: st.difficulty, history }
      }
    };

    self.detached(move |this| async move { this.proceed(step).await }).await
  }

  async fn proceed(&self, step: NextStep) -> Result<SessionSnapshot> {
    match step {
      NextStep::Finish { score } => {
        info!(target: "quiz", player = %self.player, score, "Quiz finished");
        leaderboard::save_score(&*self.collab.leaderboard, PlayerScore::now(self.player.clone(), score)).await;
        Ok(self.snapshot().await)
      }
      NextStep::Generate { seq, presented, correct, difficulty, history } => {
        let difficulty = if presented > 0 && presented % ADAPT_EVERY == 0 {
          self.adapt(seq, correct, presented, difficulty).await
        } else {
          difficulty
        };
        self.fetch_and_present(seq, difficulty, history, presented as u32 + 1).await
      }
    }
  }

  /// Switch the interface language, translating the displayed question.
  #[instrument(level = "info", skip(self), fields(player = %self.player))]
  pub async fn change_language(self: &Arc<Self>, lang: Language) -> Result<SessionSnapshot> {
    let job = {
      let mut st = self.state.lock().await;
      if st.translating {
        return Err(QuizError::invalid_transition("change language", "translating"));
      }
      if lang.is_source() {
        st.language = lang;
        st.translated = None;
        return Ok(st.snapshot());
      }
      if st.language == lang && st.translated.is_some() {
        return Ok(st.snapshot());
      }
      st.language = lang;
      st.translated = None;
      match st.current.clone() {
        Some(q) => {
          st.translating = true;
          Some((st.seq, q))
        }
        None => None,
      }
    };

    if let Some((seq, q)) = job {
      self.detached(move |this| async move { this.run_translation(seq, q, lang).await }).await?;
    }
    Ok(self.snapshot().await)
  }

  /// One subtle hint for the displayed question, in the interface language
  /// when possible. `None` if the player moved on while it was generated.
  #[instrument(level = "info", skip(self), fields(player = %self.player))]
  pub async fn hint(&self) -> Result<Option<String>> {
    let (seq, req, lang) = {
      let st = self.state.lock().await;
      match (&st.current, st.phase) {
        (Some(q), Phase::Playing) => (
          st.seq,
          HintRequest { question: q.question.clone(), options: q.options.clone(), answer: q.answer.clone() },
          st.language,
        ),
        _ => return Err(QuizError::invalid_transition("ask for a hint", st.phase)),
      }
    };

    let result = with_timeout(self.settings.hint_timeout(), "hint generation", self.collab.hints.hint(req))
      .await
      .map_err(|e| e.classify(QuizError::Hint));

    let hint = match result {
      Ok(h) => h,
      Err(e) => {
        warn!(target: "quiz", player = %self.player, error = %e, "Hint unavailable");
        let mut st = self.state.lock().await;
        if st.seq == seq {
          st.notify(Notice::error("Dica indisponível", "Não foi possível gerar uma dica agora."));
        }
        return Err(e);
      }
    };

    let hint = if lang.is_source() {
      hint
    } else {
      match self.translate_one(hint.clone(), lang).await {
        Ok(t) => t,
        Err(e) => {
          debug!(target: "quiz", error = %e, "Hint translation failed; using source text");
          hint
        }
      }
    };

    if self.state.lock().await.seq != seq {
      debug!(target: "quiz", player = %self.player, "Discarding hint for a question no longer displayed");
      return Ok(None);
    }
    Ok(Some(hint))
  }

  // ----------------------------------------------------------------
  // Internals
  // ----------------------------------------------------------------

  /// Run `work` on its own task and wait for it.
  async fn detached<T, F>(self: &Arc<Self>, work: impl FnOnce(Arc<Self>) -> F) -> Result<T>
  where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
  {
    tokio::spawn(work(self.clone()).in_current_span())
      .await
      .map_err(|e| QuizError::Io(std::io::Error::other(e)))?
  }

  /// Request a question, illustrate it and present it, unless the session
  /// moved on meanwhile. Generation failures abort to welcome.
  async fn fetch_and_present(
    &self,
    seq: u64,
    difficulty: Difficulty,
    history: Vec<String>,
    id: u32,
  ) -> Result<SessionSnapshot> {
    let req = QuestionRequest { difficulty, category: Category::random(), history };
    let category = req.category;
    let result = self.produce_question(req, id).await;

    let translate = {
      let mut st = self.state.lock().await;
      if st.seq != seq {
        debug!(target: "quiz", player = %self.player, "Discarding question for a superseded request");
        return Ok(st.snapshot());
      }
      match result {
        Ok(q) => {
          info!(
            target: "quiz",
            player = %self.player,
            id = q.id,
            %difficulty,
            category = category.label(),
            preview = %trunc_for_log(&q.question, 40),
            "Question presented"
          );
          st.present(q);
        }
        Err(e) => {
          warn!(target: "quiz", player = %self.player, error = %e, "Question generation failed; aborting session");
          st.abort_to_welcome();
          st.notify(Notice::error("Erro ao gerar pergunta", "Não foi possível carregar a próxima pergunta. Tente novamente."));
          return Err(e);
        }
      }
      if st.language.is_source() {
        None
      } else {
        st.translating = true;
        st.current.clone().map(|q| (q, st.language))
      }
    };

    if let Some((q, lang)) = translate {
      // A failure here is already reported as a notice and rolled back.
      let _ = self.run_translation(seq, q, lang).await;
    }
    Ok(self.snapshot().await)
  }

  async fn produce_question(&self, req: QuestionRequest, id: u32) -> Result<Question> {
    let generated = with_timeout(self.settings.generation_timeout(), "question generation", self.collab.questions.generate(req))
      .await
      .map_err(|e| e.classify(QuizError::Generation))?;
    let mut q = generated.into_question(id)?;
    q.image = Some(self.illustrate(&q.image_hint).await);
    Ok(q)
  }

  /// Image for a hint, or the placeholder on any failure.
  async fn illustrate(&self, hint: &str) -> String {
    if hint.trim().is_empty() {
      return self.settings.placeholder_image.clone();
    }
    match with_timeout(self.settings.image_timeout(), "image generation", self.collab.images.generate(hint.to_string())).await {
      Ok(url) => url,
      Err(e) => {
        warn!(target: "quiz", %hint, error = %e, "Image generation failed; using placeholder");
        self.settings.placeholder_image.clone()
      }
    }
  }

  /// Ask for a new difficulty. Any failure keeps `previous`.
  async fn adapt(&self, seq: u64, correct: usize, answered: usize, previous: Difficulty) -> Difficulty {
    let req = AdaptRequest { correct, total: SESSION_LENGTH, answered };
    let result = with_timeout(self.settings.adaptation_timeout(), "difficulty adaptation", self.collab.adaptor.recommend(req))
      .await
      .map_err(|e| e.classify(QuizError::Adaptation));

    match result {
      Ok(rec) => {
        info!(target: "quiz", player = %self.player, correct, answered, from = %previous, to = %rec.difficulty_level, "Difficulty adapted");
        let mut st = self.state.lock().await;
        if st.seq == seq {
          st.difficulty = rec.difficulty_level;
          st.adaptation = Some(rec.reasoning.clone());
          st.notify(Notice::info("IA Adaptativa", rec.reasoning));
        }
        rec.difficulty_level
      }
      Err(e) => {
        warn!(target: "quiz", player = %self.player, error = %e, "Difficulty adaptation failed; keeping previous difficulty");
        previous
      }
    }
  }

  /// Translate `q` and apply the result atomically if `seq` still matches.
  /// On failure the language reverts to the source and one notice is queued.
  async fn run_translation(&self, seq: u64, q: Question, lang: Language) -> Result<()> {
    let result = self.translate_question(&q, lang).await;

    let mut st = self.state.lock().await;
    if st.seq != seq {
      debug!(target: "quiz", player = %self.player, question = q.id, "Discarding stale translation");
      return Ok(());
    }
    st.translating = false;
    match result {
      Ok(t) => {
        info!(target: "quiz", player = %self.player, question = q.id, lang = lang.name(), "Question translated");
        st.translated = Some(t);
        Ok(())
      }
      Err(e) => {
        warn!(target: "quiz", player = %self.player, question = q.id, lang = lang.name(), error = %e, "Translation failed; reverting language");
        st.language = Language::SOURCE;
        st.translated = None;
        st.notify(Notice::error("Erro de tradução", format!("Não foi possível traduzir para {}.", lang.name())));
        Err(e)
      }
    }
  }

  /// Fan out one request per field and wait for all of them.
  async fn translate_question(&self, q: &Question, lang: Language) -> Result<Question> {
    let n = q.options.len();
    let mut fields = Vec::with_capacity(n + 3);
    fields.push(q.question.clone());
    fields.extend(q.options.iter().cloned());
    fields.push(q.explanation.clone());
    fields.push(q.answer.clone());

    let mut out = try_join_all(fields.into_iter().map(|text| self.translate_one(text, lang))).await?;
    if out.len() != n + 3 {
      return Err(QuizError::Translation(format!("expected {} fields, got {}", n + 3, out.len())));
    }
    let answer = out.pop().unwrap_or_default();
    let explanation = out.pop().unwrap_or_default();
    let question = out.remove(0);

    let translated = Question { question, options: out, answer, explanation, ..q.clone() };
    if translated.options.len() != n || !translated.answer_in_options() {
      return Err(QuizError::Translation(format!(
        "translated answer '{}' is not one of the translated options",
        translated.answer
      )));
    }
    Ok(translated)
  }

  async fn translate_one(&self, text: String, lang: Language) -> Result<String> {
    with_timeout(self.settings.translation_timeout(), "translation", self.collab.translator.translate(text, lang))
      .await
      .map(|t| t.trim().to_string())
      .map_err(|e| e.classify(QuizError::Translation))
  }
}

async fn with_timeout<T>(limit: Duration, what: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
  match tokio::time::timeout(limit, fut).await {
    Ok(r) => r,
    Err(_) => Err(QuizError::Timeout { what, secs: limit.as_secs() }),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use tokio::sync::Semaphore;

  use super::*;
  use crate::collaborators::testing::{generated, Fakes, Hung, ScriptedAdaptor, ScriptedTranslator, StaticImages};
  use crate::collaborators::{GeneratedQuestion, NoImages};
  use crate::domain::QuestionType;

  fn controller(fakes: &Fakes) -> Arc<SessionController> {
    Arc::new(SessionController::new("Ana", QuizSettings::default(), fakes.collaborators()))
  }

  async fn answer_and_advance(c: &Arc<SessionController>, choice: &str) -> SessionSnapshot {
    c.select_answer(choice).await.unwrap();
    c.advance().await.unwrap()
  }

  async fn wait_until_translating(c: &SessionController) {
    while !c.snapshot().await.translating {
      tokio::task::yield_now().await;
    }
  }

  #[tokio::test]
  async fn start_presents_first_question_at_starting_difficulty() {
    let fakes = Fakes::new();
    let c = controller(&fakes);

    let snap = c.start().await.unwrap();
    assert_eq!(snap.phase, Phase::Playing);
    assert_eq!(snap.question_number, 1);
    let q = snap.question.unwrap();
    assert_eq!(q.id, 1);
    assert_eq!(q.image.as_deref(), Some("https://img.example/q.png"));

    let reqs = fakes.questions.requests();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].difficulty, Difficulty::Easy);
    assert!(reqs[0].history.is_empty());
  }

  #[tokio::test]
  async fn score_sums_points_of_correct_answers() {
    let fakes = Fakes::new();
    fakes.questions.push(Ok(generated("Q1", Difficulty::Easy)));
    fakes.questions.push(Ok(generated("Q2", Difficulty::Easy)));
    fakes.questions.push(Ok(generated("Q3", Difficulty::Hard)));
    let c = controller(&fakes);

    c.start().await.unwrap();
    answer_and_advance(&c, "Paris").await;
    answer_and_advance(&c, "Paris").await;
    let snap = c.select_answer("Paris").await.unwrap();

    assert_eq!(snap.score, 40);
    assert_eq!(snap.correct_answers, 3);
    assert_eq!(snap.phase, Phase::Feedback);
    assert_eq!(snap.is_answer_correct, Some(true));
  }

  #[tokio::test]
  async fn wrong_answer_resets_streak_but_keeps_longest() {
    let fakes = Fakes::new();
    let c = controller(&fakes);

    c.start().await.unwrap();
    answer_and_advance(&c, "Paris").await;
    answer_and_advance(&c, "Paris").await;
    let snap = c.select_answer("Roma").await.unwrap();

    assert_eq!(snap.current_streak, 0);
    assert_eq!(snap.longest_streak, 2);
    assert_eq!(snap.incorrect_answers, 1);
    assert_eq!(snap.score, 20);
    assert_eq!(snap.selected_answer.as_deref(), Some("Roma"));
    assert_eq!(snap.is_answer_correct, Some(false));
  }

  #[tokio::test]
  async fn second_selection_before_advance_is_ignored() {
    let fakes = Fakes::new();
    let c = controller(&fakes);
    c.start().await.unwrap();

    let first = c.select_answer("Roma").await.unwrap();
    let err = c.select_answer("Paris").await.unwrap_err();
    assert!(matches!(err, QuizError::InvalidTransition { .. }));
    assert_eq!(c.snapshot().await, first);
  }

  #[tokio::test]
  async fn operations_outside_their_phase_are_rejected() {
    let fakes = Fakes::new();
    let c = controller(&fakes);

    assert!(c.select_answer("Paris").await.is_err());
    assert!(c.advance().await.is_err());
    assert!(c.hint().await.is_err());

    c.start().await.unwrap();
    assert!(c.start().await.is_err());
    assert!(c.advance().await.is_err());
  }

  #[tokio::test]
  async fn adaptation_runs_every_third_question_and_drives_next_request() {
    let fakes = Fakes::new();
    let c = controller(&fakes);

    c.start().await.unwrap();
    for _ in 0..SESSION_LENGTH {
      answer_and_advance(&c, "Paris").await;
    }

    let answered: Vec<usize> = fakes.adaptor.requests().iter().map(|r| r.answered).collect();
    assert_eq!(answered, vec![3, 6, 9]);
    assert!(fakes.adaptor.requests().iter().all(|r| r.total == SESSION_LENGTH));
    assert_eq!(fakes.adaptor.requests()[0].correct, 3);

    let reqs = fakes.questions.requests();
    assert_eq!(reqs.len(), SESSION_LENGTH);
    assert_eq!(reqs[2].difficulty, Difficulty::Easy);
    assert_eq!(reqs[3].difficulty, Difficulty::Hard);
    assert_eq!(reqs[3].history.len(), 3);
    assert_eq!(c.snapshot().await.adaptation.as_deref(), Some("scripted"));
  }

  #[tokio::test]
  async fn adaptation_failure_keeps_previous_difficulty() {
    let fakes = Fakes::with(ScriptedTranslator::default(), ScriptedAdaptor::returning(None));
    let c = controller(&fakes);

    c.start().await.unwrap();
    for _ in 0..3 {
      answer_and_advance(&c, "Paris").await;
    }

    let snap = c.snapshot().await;
    assert_eq!(snap.phase, Phase::Playing);
    assert_eq!(snap.difficulty, Difficulty::Easy);
    assert_eq!(fakes.questions.requests()[3].difficulty, Difficulty::Easy);
    assert!(c.take_notices().await.is_empty());
  }

  #[tokio::test]
  async fn tenth_advance_finishes_and_saves_once() {
    let fakes = Fakes::new();
    let c = controller(&fakes);

    c.start().await.unwrap();
    for _ in 0..SESSION_LENGTH - 1 {
      answer_and_advance(&c, "Paris").await;
    }
    assert_eq!(fakes.store.writes(), 0);

    c.select_answer("Paris").await.unwrap();
    let snap = c.advance().await.unwrap();
    assert_eq!(snap.phase, Phase::Finished);
    assert_eq!(fakes.store.writes(), 1);

    let board = leaderboard::load_scores(&*fakes.store).await;
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].name, "Ana");
    assert_eq!(board[0].score, snap.score);

    // Finished is terminal until restarted.
    assert!(c.advance().await.is_err());
    let restarted = c.start().await.unwrap();
    assert_eq!(restarted.score, 0);
    assert_eq!(restarted.question_number, 1);
  }

  #[tokio::test]
  async fn generation_failure_aborts_to_welcome() {
    let fakes = Fakes::new();
    fakes.questions.push(Err(QuizError::Llm("HTTP 503".into())));
    let c = controller(&fakes);

    let err = c.start().await.unwrap_err();
    assert!(err.is_fatal());
    let snap = c.snapshot().await;
    assert_eq!(snap.phase, Phase::Welcome);
    assert!(snap.question.is_none());
    assert_eq!(c.take_notices().await.len(), 1);

    // And mid-session.
    c.start().await.unwrap();
    fakes.questions.push(Err(QuizError::Generation("empty".into())));
    c.select_answer("Paris").await.unwrap();
    assert!(c.advance().await.is_err());
    assert_eq!(c.snapshot().await.phase, Phase::Welcome);
  }

  #[tokio::test]
  async fn invalid_generated_question_is_a_generation_failure() {
    let fakes = Fakes::new();
    let mut bad: GeneratedQuestion = generated("Q", Difficulty::Easy);
    bad.kind = QuestionType::TrueFalse;
    fakes.questions.push(Ok(bad));
    let c = controller(&fakes);

    assert!(matches!(c.start().await, Err(QuizError::Generation(_))));
    assert_eq!(c.snapshot().await.phase, Phase::Welcome);
  }

  #[tokio::test]
  async fn image_failure_falls_back_to_placeholder() {
    let fakes = Fakes::new();
    let mut collab = fakes.collaborators();
    collab.images = Arc::new(NoImages);
    let settings = QuizSettings::default();
    let placeholder = settings.placeholder_image.clone();
    let c = Arc::new(SessionController::new("Ana", settings, collab));

    let snap = c.start().await.unwrap();
    assert_eq!(snap.phase, Phase::Playing);
    assert_eq!(snap.question.unwrap().image, Some(placeholder));
  }

  #[tokio::test]
  async fn translation_replaces_displayed_question_and_answers_match_translated_text() {
    let fakes = Fakes::new();
    let c = controller(&fakes);
    c.start().await.unwrap();

    let snap = c.change_language(Language::En).await.unwrap();
    assert!(snap.is_translated);
    assert_eq!(snap.language, Language::En);
    let q = snap.question.unwrap();
    assert!(q.question.starts_with("[En] "));
    assert_eq!(q.answer, "[En] Paris");
    // question, 4 options, explanation, answer
    assert_eq!(fakes.translator.calls.load(std::sync::atomic::Ordering::SeqCst), 7);

    let snap = c.select_answer("[En] Paris").await.unwrap();
    assert_eq!(snap.is_answer_correct, Some(true));
  }

  #[tokio::test]
  async fn next_question_is_translated_when_language_is_not_source() {
    let fakes = Fakes::new();
    let c = controller(&fakes);
    c.start().await.unwrap();
    c.change_language(Language::Es).await.unwrap();

    let snap = answer_and_advance(&c, "[Es] Paris").await;
    assert!(snap.is_translated);
    assert_eq!(snap.question.unwrap().id, 2);
    assert_eq!(fakes.questions.requests()[1].history.len(), 1);
    // History keeps the source text.
    assert!(!fakes.questions.requests()[1].history[0].starts_with('['));
  }

  #[tokio::test]
  async fn one_failing_translation_rolls_everything_back() {
    let translator = ScriptedTranslator { fail_on: vec!["Roma".into()], ..Default::default() };
    let fakes = Fakes::with(translator, ScriptedAdaptor::returning(Some(Difficulty::Medium)));
    let c = controller(&fakes);
    let before = c.start().await.unwrap();

    let err = c.change_language(Language::Fr).await.unwrap_err();
    assert!(matches!(err, QuizError::Translation(_)));

    let after = c.snapshot().await;
    assert_eq!(after.question, before.question);
    assert_eq!(after.language, Language::Pt);
    assert!(!after.translating);
    let notices = c.take_notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
  }

  #[tokio::test]
  async fn translated_answer_outside_options_is_a_translation_failure() {
    let translator = ScriptedTranslator { numbered: true, ..Default::default() };
    let fakes = Fakes::with(translator, ScriptedAdaptor::returning(Some(Difficulty::Medium)));
    let c = controller(&fakes);
    let before = c.start().await.unwrap();

    assert!(matches!(c.change_language(Language::En).await, Err(QuizError::Translation(_))));
    let after = c.snapshot().await;
    assert_eq!(after.question, before.question);
    assert_eq!(after.language, Language::Pt);
    assert_eq!(c.take_notices().await.len(), 1);
  }

  #[tokio::test]
  async fn switching_back_to_source_clears_translation_without_requests() {
    let fakes = Fakes::new();
    let c = controller(&fakes);
    let original = c.start().await.unwrap().question;
    c.change_language(Language::En).await.unwrap();
    let calls = fakes.translator.calls.load(std::sync::atomic::Ordering::SeqCst);

    let snap = c.change_language(Language::Pt).await.unwrap();
    assert!(!snap.is_translated);
    assert_eq!(snap.question, original);
    assert_eq!(fakes.translator.calls.load(std::sync::atomic::Ordering::SeqCst), calls);
  }

  #[tokio::test]
  async fn input_is_disabled_while_translating() {
    let gate = Arc::new(Semaphore::new(0));
    let translator = ScriptedTranslator { gate: Some(gate.clone()), ..Default::default() };
    let fakes = Fakes::with(translator, ScriptedAdaptor::returning(Some(Difficulty::Medium)));
    let c = controller(&fakes);
    c.start().await.unwrap();

    let task = tokio::spawn({
      let c = c.clone();
      async move { c.change_language(Language::En).await }
    });
    wait_until_translating(&c).await;

    assert!(c.select_answer("Paris").await.is_err());
    assert!(c.change_language(Language::Es).await.is_err());

    gate.add_permits(7);
    task.await.unwrap().unwrap();
    assert!(c.select_answer("[En] Paris").await.unwrap().is_answer_correct.unwrap());
  }

  #[tokio::test]
  async fn stale_translation_is_discarded_after_advance() {
    let gate = Arc::new(Semaphore::new(0));
    let translator = ScriptedTranslator { gate: Some(gate.clone()), ..Default::default() };
    let fakes = Fakes::with(translator, ScriptedAdaptor::returning(Some(Difficulty::Medium)));
    let c = controller(&fakes);
    c.start().await.unwrap();
    c.select_answer("Paris").await.unwrap();

    // Translate question 1 while in feedback, then advance past it.
    let stale = tokio::spawn({
      let c = c.clone();
      async move { c.change_language(Language::En).await }
    });
    wait_until_translating(&c).await;
    let next = tokio::spawn({
      let c = c.clone();
      async move { c.advance().await }
    });
    while c.snapshot().await.question_number < 2 {
      tokio::task::yield_now().await;
    }

    gate.add_permits(14);
    stale.await.unwrap().unwrap();
    next.await.unwrap().unwrap();

    let snap = c.snapshot().await;
    let q = snap.question.unwrap();
    assert_eq!(q.id, 2);
    assert!(q.question.starts_with("[En] "));
    assert!(q.question.ends_with("#2"));
    assert_eq!(snap.language, Language::En);
    assert!(c.take_notices().await.is_empty());
  }

  #[tokio::test]
  async fn hint_for_displayed_question() {
    let fakes = Fakes::new();
    let c = controller(&fakes);
    c.start().await.unwrap();

    let hint = c.hint().await.unwrap().unwrap();
    assert!(!hint.contains("Paris"));
    // Hints never change the game state.
    assert_eq!(c.snapshot().await.phase, Phase::Playing);
  }

  #[tokio::test]
  async fn abandon_returns_to_welcome_from_anywhere() {
    let fakes = Fakes::new();
    let mut collab = fakes.collaborators();
    collab.images = Arc::new(StaticImages(None));
    let c = Arc::new(SessionController::new("Ana", QuizSettings::default(), collab));

    c.start().await.unwrap();
    c.select_answer("Paris").await.unwrap();
    let snap = c.abandon().await;
    assert_eq!(snap.phase, Phase::Welcome);
    assert!(snap.question.is_none());
    assert!(c.start().await.is_ok());
  }

  #[tokio::test]
  async fn dropped_language_request_still_applies_the_translation() {
    let gate = Arc::new(Semaphore::new(0));
    let translator = ScriptedTranslator { gate: Some(gate.clone()), ..Default::default() };
    let fakes = Fakes::with(translator, ScriptedAdaptor::returning(Some(Difficulty::Medium)));
    let c = controller(&fakes);
    c.start().await.unwrap();

    let request = tokio::spawn({
      let c = c.clone();
      async move { c.change_language(Language::En).await }
    });
    wait_until_translating(&c).await;
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    gate.add_permits(7);
    while c.snapshot().await.translating {
      tokio::task::yield_now().await;
    }
    let snap = c.snapshot().await;
    assert!(snap.is_translated);
    assert_eq!(snap.language, Language::En);
    assert!(c.select_answer("[En] Paris").await.unwrap().is_answer_correct.unwrap());
  }

  #[tokio::test(start_paused = true)]
  async fn dropped_start_with_hung_generator_still_returns_to_welcome() {
    let fakes = Fakes::new();
    let mut collab = fakes.collaborators();
    collab.questions = Arc::new(Hung);
    let c = Arc::new(SessionController::new("Ana", QuizSettings::default(), collab));

    let request = tokio::spawn({
      let c = c.clone();
      async move { c.start().await }
    });
    while c.snapshot().await.phase != Phase::Generating {
      tokio::task::yield_now().await;
    }
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    while c.snapshot().await.phase == Phase::Generating {
      tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(c.snapshot().await.phase, Phase::Welcome);
    assert_eq!(c.take_notices().await.len(), 1);
    // The session accepts a new start.
    assert!(matches!(c.start().await, Err(QuizError::Generation(_))));
  }

  #[tokio::test(start_paused = true)]
  async fn hung_generator_times_out_back_to_welcome() {
    let fakes = Fakes::new();
    let mut collab = fakes.collaborators();
    collab.questions = Arc::new(Hung);
    let settings = QuizSettings::default();
    let limit = settings.generation_timeout();
    let c = Arc::new(SessionController::new("Ana", settings, collab));

    let began = tokio::time::Instant::now();
    let err = c.start().await.unwrap_err();
    assert!(matches!(err, QuizError::Generation(_)));
    assert!(began.elapsed() >= limit);

    let snap = c.snapshot().await;
    assert_eq!(snap.phase, Phase::Welcome);
    assert!(snap.question.is_none());
    let notices = c.take_notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
  }

  #[tokio::test(start_paused = true)]
  async fn hung_translator_times_out_and_language_reverts() {
    let fakes = Fakes::new();
    let mut collab = fakes.collaborators();
    collab.translator = Arc::new(Hung);
    let c = Arc::new(SessionController::new("Ana", QuizSettings::default(), collab));
    let before = c.start().await.unwrap();

    assert!(matches!(c.change_language(Language::En).await, Err(QuizError::Translation(_))));
    let after = c.snapshot().await;
    assert_eq!(after.language, Language::Pt);
    assert!(!after.translating);
    assert_eq!(after.question, before.question);
    assert_eq!(c.take_notices().await.len(), 1);
    assert!(c.select_answer("Paris").await.is_ok());
  }

  #[tokio::test(start_paused = true)]
  async fn hung_adaptor_times_out_and_keeps_difficulty() {
    let fakes = Fakes::new();
    let mut collab = fakes.collaborators();
    collab.adaptor = Arc::new(Hung);
    let c = Arc::new(SessionController::new("Ana", QuizSettings::default(), collab));

    c.start().await.unwrap();
    for _ in 0..3 {
      answer_and_advance(&c, "Paris").await;
    }

    let snap = c.snapshot().await;
    assert_eq!(snap.phase, Phase::Playing);
    assert_eq!(snap.question_number, 4);
    assert_eq!(snap.difficulty, Difficulty::Easy);
    assert!(snap.adaptation.is_none());
    assert_eq!(fakes.questions.requests()[3].difficulty, Difficulty::Easy);
    assert!(c.take_notices().await.is_empty());
  }
}
