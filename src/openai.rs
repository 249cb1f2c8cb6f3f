//! Minimal OpenAI client for the quiz collaborators.
//!
//! Chat completions return either plain text or a strict JSON object; the
//! images endpoint returns a URL or base64 PNG. Calls are instrumented and log
//! model names, latencies and token usage (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::time::{Duration, Instant};

use base64::Engine as _;
use futures::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::collaborators::{
  AdaptRequest, AdaptResponse, DifficultyAdaptor, GeneratedQuestion, HintGenerator, HintRequest, ImageGenerator,
  QuestionGenerator, QuestionRequest, Translator,
};
use crate::config::Prompts;
use crate::domain::Language;
use crate::error::{QuizError, Result};
use crate::util::{bullet_list, fill_template, strip_quotes, trunc_for_log};

const UA: &str = "globalmind-quiz-backend/0.1";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub image_model: String,
  pub prompts: Prompts,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model = std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model = std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let image_model = std::env::var("OPENAI_IMAGE_MODEL").unwrap_or_else(|_| "gpt-image-1".into());

    // Per-operation deadlines are enforced by the session; this is the outer bound.
    let client = reqwest::Client::builder().timeout(Duration::from_secs(90)).build().ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model, image_model, prompts })
  }

  async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
    let url = format!("{}{}", self.base_url, path);
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, UA)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(body)
      .send()
      .await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(QuizError::Llm(format!("OpenAI HTTP {}: {}", status, trunc_for_log(&msg, 300))));
    }
    Ok(res)
  }

  async fn chat(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
    json: bool,
  ) -> Result<String> {
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: json.then(|| ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self.post("/chat/completions", &req).await?;
    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    first_content(body)
  }

  /// Plain-text chat completion. Used for translations and hints.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_plain(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String> {
    Ok(self.chat(model, system, user, temperature, false).await?.trim().to_string())
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T> {
    let text = self.chat(model, system, user, temperature, true).await?;
    serde_json::from_str::<T>(&text)
      .map_err(|e| QuizError::Llm(format!("JSON parse error: {} in {}", e, trunc_for_log(&text, 120))))
  }

  // --- High-level helpers (domain-specialized) ---

  #[instrument(
    level = "info",
    skip(self, req),
    fields(difficulty = %req.difficulty, category = req.category.label(), history = req.history.len(), model = %self.strong_model)
  )]
  pub async fn generate_question(&self, req: &QuestionRequest) -> Result<GeneratedQuestion> {
    let user = question_prompt(&self.prompts, req);
    let start = Instant::now();
    let result = self.chat_json::<GeneratedQuestion>(&self.strong_model, &self.prompts.question_system, &user, 0.9).await;
    let elapsed = start.elapsed();

    match &result {
      Ok(q) => info!(?elapsed, preview = %trunc_for_log(&q.question, 40), "Question generated"),
      Err(e) => error!(?elapsed, error = %e, "Model call failed during question generation"),
    }
    result
  }

  #[instrument(level = "info", skip(self, text), fields(text_len = text.len(), lang = target.name()))]
  pub async fn translate_text(&self, text: &str, target: Language) -> Result<String> {
    let input = text.trim();
    if input.is_empty() {
      return Ok(String::new());
    }
    let system = fill_template(&self.prompts.translate_system, &[("language", target.name())]);
    let out = self.chat_plain(&self.fast_model, &system, input, 0.0).await?;
    let out = strip_quotes(&out);
    if out.is_empty() {
      return Err(QuizError::Llm("empty translation".into()));
    }
    Ok(out.to_string())
  }

  #[instrument(level = "info", skip(self), fields(model = %self.fast_model))]
  pub async fn recommend_difficulty(&self, req: AdaptRequest) -> Result<AdaptResponse> {
    let (correct, total, answered) = (req.correct.to_string(), req.total.to_string(), req.answered.to_string());
    let user = fill_template(
      &self.prompts.adapt_user_template,
      &[("correct", &correct), ("total", &total), ("answered", &answered)],
    );
    self.chat_json(&self.fast_model, &self.prompts.adapt_system, &user, 0.2).await
  }

  #[instrument(level = "info", skip(self, req), fields(question_len = req.question.len()))]
  pub async fn hint_for(&self, req: &HintRequest) -> Result<String> {
    let options = bullet_list(&req.options);
    let user = fill_template(
      &self.prompts.hint_user_template,
      &[("question", &req.question), ("options", &options), ("answer", &req.answer)],
    );
    let hint = self.chat_plain(&self.fast_model, &self.prompts.hint_system, &user, 0.7).await?;
    if hint.is_empty() {
      return Err(QuizError::Llm("empty hint".into()));
    }
    Ok(hint)
  }

  #[instrument(level = "info", skip(self), fields(model = %self.image_model))]
  pub async fn generate_image(&self, hint: &str) -> Result<String> {
    let req = ImageRequest {
      model: self.image_model.clone(),
      prompt: fill_template(&self.prompts.image_prompt_template, &[("hint", hint)]),
      n: 1,
      size: "1024x1024".into(),
    };
    let start = Instant::now();
    let res = self.post("/images/generations", &req).await?;
    let body: ImageResponse = res.json().await?;
    let image = body
      .data
      .into_iter()
      .next()
      .ok_or_else(|| QuizError::Llm("no image in response".into()))
      .and_then(image_reference);
    match &image {
      Ok(r) => info!(elapsed = ?start.elapsed(), bytes = r.len(), "Image generated"),
      Err(e) => warn!(elapsed = ?start.elapsed(), error = %e, "Image response unusable"),
    }
    image
  }
}

// --- Collaborator trait impls ---

impl QuestionGenerator for OpenAI {
  fn generate(&self, req: QuestionRequest) -> BoxFuture<'_, Result<GeneratedQuestion>> {
    Box::pin(async move { self.generate_question(&req).await })
  }
}

impl ImageGenerator for OpenAI {
  fn generate(&self, hint: String) -> BoxFuture<'_, Result<String>> {
    Box::pin(async move { self.generate_image(&hint).await })
  }
}

impl Translator for OpenAI {
  fn translate(&self, text: String, target: Language) -> BoxFuture<'_, Result<String>> {
    Box::pin(async move { self.translate_text(&text, target).await })
  }
}

impl DifficultyAdaptor for OpenAI {
  fn recommend(&self, req: AdaptRequest) -> BoxFuture<'_, Result<AdaptResponse>> {
    Box::pin(async move { self.recommend_difficulty(req).await })
  }
}

impl HintGenerator for OpenAI {
  fn hint(&self, req: HintRequest) -> BoxFuture<'_, Result<String>> {
    Box::pin(async move { self.hint_for(&req).await })
  }
}

// --- Pure helpers ---

fn question_prompt(prompts: &Prompts, req: &QuestionRequest) -> String {
  let history = bullet_list(&req.history);
  fill_template(
    &prompts.question_user_template,
    &[("difficulty", req.difficulty.as_str()), ("category", req.category.label()), ("history", &history)],
  )
}

fn first_content(body: ChatCompletionResponse) -> Result<String> {
  body
    .choices
    .into_iter()
    .next()
    .and_then(|c| c.message.content)
    .filter(|t| !t.trim().is_empty())
    .ok_or_else(|| QuizError::Llm("empty completion".into()))
}

/// A hosted URL as-is, or base64 PNG bytes as a data URI.
fn image_reference(d: ImageDatum) -> Result<String> {
  if let Some(url) = d.url.filter(|u| !u.is_empty()) {
    return Ok(url);
  }
  let b64 = d.b64_json.ok_or_else(|| QuizError::Llm("image has neither url nor b64_json".into()))?;
  base64::engine::general_purpose::STANDARD
    .decode(b64.as_bytes())
    .map_err(|e| QuizError::Llm(format!("invalid base64 image: {e}")))?;
  Ok(format!("data:image/png;base64,{}", b64))
}

// --- DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ImageRequest {
  model: String,
  prompt: String,
  n: u8,
  size: String,
}
#[derive(Deserialize)]
struct ImageResponse { data: Vec<ImageDatum> }
#[derive(Deserialize)]
struct ImageDatum {
  #[serde(default)] url: Option<String>,
  #[serde(default)] b64_json: Option<String>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
