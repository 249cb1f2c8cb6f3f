//! Domain models: difficulty, category, language, questions and leaderboard entries.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};

/// Number of questions in one session.
pub const SESSION_LENGTH: usize = 10;

/// Difficulty is re-evaluated every this many presented questions.
pub const ADAPT_EVERY: usize = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  #[default]
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

  /// Points awarded for a correct answer at this difficulty.
  pub const fn points(self) -> u32 {
    match self {
      Difficulty::Easy => 10,
      Difficulty::Medium => 15,
      Difficulty::Hard => 20,
    }
  }

  pub const fn as_str(self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The three fixed question categories. Labels are part of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
  #[serde(rename = "Cultura")]
  Culture,
  #[serde(rename = "Idioma")]
  Language,
  #[serde(rename = "Sistemas Educacionais")]
  EducationSystems,
}

impl Category {
  pub const ALL: [Category; 3] = [Category::Culture, Category::Language, Category::EducationSystems];

  pub const fn label(self) -> &'static str {
    match self {
      Category::Culture => "Cultura",
      Category::Language => "Idioma",
      Category::EducationSystems => "Sistemas Educacionais",
    }
  }

  pub fn random() -> Self {
    *Self::ALL.choose(&mut rand::thread_rng()).unwrap_or(&Category::Culture)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
  MultipleChoice,
  TrueFalse,
}

impl QuestionType {
  pub const fn option_count(self) -> usize {
    match self {
      QuestionType::MultipleChoice => 4,
      QuestionType::TrueFalse => 2,
    }
  }
}

/// Interface languages. Questions are generated in Brazilian Portuguese,
/// which is the canonical source language.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  #[default]
  Pt,
  En,
  Es,
  Fr,
}

impl Language {
  pub const SOURCE: Language = Language::Pt;

  /// Human-readable name handed to the translator.
  pub const fn name(self) -> &'static str {
    match self {
      Language::Pt => "Brazilian Portuguese",
      Language::En => "English",
      Language::Es => "Spanish",
      Language::Fr => "French",
    }
  }

  pub const fn is_source(self) -> bool {
    matches!(self, Language::Pt)
  }
}

/// One trivia item. Immutable once received from the generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: u32,
  pub question: String,
  #[serde(default)] pub image: Option<String>,
  #[serde(default)] pub image_hint: String,
  pub options: Vec<String>,
  pub answer: String,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub difficulty: Difficulty,
  pub category: Category,
  pub explanation: String,
}

impl Question {
  /// Boundary check applied to every question coming from a generator.
  pub fn validate(&self) -> Result<()> {
    if self.question.trim().is_empty() {
      return Err(QuizError::Generation("question text is empty".into()));
    }
    let expected = self.kind.option_count();
    if self.options.len() != expected {
      return Err(QuizError::Generation(format!(
        "{:?} question needs {} options, got {}",
        self.kind, expected, self.options.len()
      )));
    }
    if self.options.iter().any(|o| o.trim().is_empty()) {
      return Err(QuizError::Generation("question has an empty option".into()));
    }
    if !self.answer_in_options() {
      return Err(QuizError::Generation(format!("answer '{}' is not one of the options", self.answer)));
    }
    Ok(())
  }

  pub fn answer_in_options(&self) -> bool {
    self.options.iter().any(|o| o == &self.answer)
  }
}

/// Leaderboard entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerScore {
  pub name: String,
  pub score: u32,
  pub date: DateTime<Utc>,
}

impl PlayerScore {
  pub fn now(name: impl Into<String>, score: u32) -> Self {
    Self { name: name.into(), score, date: Utc::now() }
  }
}

#[cfg(test)]
pub(crate) fn sample_question(id: u32, difficulty: Difficulty) -> Question {
  Question {
    id,
    question: format!("Pergunta {id}?"),
    image: None,
    image_hint: "world map".into(),
    options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
    answer: "A".into(),
    kind: QuestionType::MultipleChoice,
    difficulty,
    category: Category::Culture,
    explanation: "Porque sim.".into(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn points_per_difficulty() {
    assert_eq!(Difficulty::Easy.points(), 10);
    assert_eq!(Difficulty::Medium.points(), 15);
    assert_eq!(Difficulty::Hard.points(), 20);
  }

  #[test]
  fn category_labels_on_the_wire() {
    let json = serde_json::to_string(&Category::EducationSystems).unwrap();
    assert_eq!(json, "\"Sistemas Educacionais\"");
    let c: Category = serde_json::from_str("\"Idioma\"").unwrap();
    assert_eq!(c, Category::Language);
  }

  #[test]
  fn question_uses_original_field_names() {
    let q = sample_question(1, Difficulty::Hard);
    let v = serde_json::to_value(&q).unwrap();
    assert_eq!(v["type"], "multiple-choice");
    assert_eq!(v["difficulty"], "hard");
    assert_eq!(v["imageHint"], "world map");
  }

  #[test]
  fn validate_rejects_answer_outside_options() {
    let mut q = sample_question(1, Difficulty::Easy);
    q.answer = "E".into();
    assert!(matches!(q.validate(), Err(QuizError::Generation(_))));
  }

  #[test]
  fn validate_checks_option_count_per_type() {
    let mut q = sample_question(1, Difficulty::Easy);
    q.kind = QuestionType::TrueFalse;
    assert!(q.validate().is_err());

    q.options = vec!["Verdadeiro".into(), "Falso".into()];
    q.answer = "Falso".into();
    assert!(q.validate().is_ok());
  }

  #[test]
  fn only_portuguese_is_source() {
    assert!(Language::Pt.is_source());
    assert!(!Language::En.is_source());
    assert_eq!(Language::Es.name(), "Spanish");
  }
}
