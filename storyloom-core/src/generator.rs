//! Text-generation collaborator boundary.
//!
//! Character and author agents talk to a language model only through the
//! [`TextGenerator`] trait. A returned `Err` means the collaborator failed
//! outright; an `Ok` whose `json` is `None` means it answered but the answer
//! could not be parsed.

use async_trait::async_trait;
use claude::{Claude, Message, Request, StopReason};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a text-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

/// One request to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    /// Ask for a single JSON object as the reply.
    pub expect_json: bool,
}

impl GenerationRequest {
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            expect_json: true,
        }
    }

    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            expect_json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// The collaborator's answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub content: Option<String>,
    /// Parsed structured payload, when one was requested and parsed.
    pub json: Option<Value>,
    pub usage: TokenUsage,
}

impl Generation {
    /// Wrap raw text, parsing a JSON object out of it when possible.
    pub fn from_text(content: impl Into<String>, expect_json: bool) -> Self {
        let content = content.into();
        let json = if expect_json {
            extract_json(&content)
        } else {
            None
        };
        Self {
            content: Some(content),
            json,
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// A language-model backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError>;
}

/// Model settings for [`ClaudeGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// The model to use (defaults to the client's model).
    pub model: Option<String>,

    /// Maximum tokens per reply.
    pub max_tokens: usize,

    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 1000,
            temperature: Some(1.0),
        }
    }
}

impl GeneratorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

/// [`TextGenerator`] backed by the Claude Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeGenerator {
    client: Claude,
    config: GeneratorConfig,
}

impl ClaudeGenerator {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: GeneratorConfig::default(),
        }
    }

    /// Create a generator from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, GenerationError> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    fn build_request(&self, request: &GenerationRequest) -> Request {
        let mut messages = vec![Message::user(&request.user)];
        if request.expect_json {
            // Prefilling the reply keeps the model from adding prose first.
            messages.push(Message::assistant("{"));
        }

        let mut api_request = Request::new(messages)
            .with_system(&request.system)
            .with_max_tokens(self.config.max_tokens);

        if let Some(ref model) = self.config.model {
            api_request = api_request.with_model(model);
        }
        if let Some(temp) = self.config.temperature {
            api_request = api_request.with_temperature(temp);
        }
        api_request
    }
}

#[async_trait]
impl TextGenerator for ClaudeGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        let response = self.client.complete(self.build_request(&request)).await?;

        if response.stop_reason == StopReason::MaxTokens {
            warn!(max_tokens = self.config.max_tokens, "reply was cut off at the token limit");
        }

        let mut text = response.text();
        if request.expect_json {
            text.insert(0, '{');
        }

        let usage = TokenUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
        };
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "generation complete"
        );

        let generation = Generation::from_text(text, request.expect_json).with_usage(usage);
        if request.expect_json && generation.json.is_none() {
            warn!("expected a JSON object but could not parse the reply");
        }
        Ok(generation)
    }
}

/// Parse the outermost `{...}` object embedded in `text`.
///
/// Tolerates code fences and prose around the object. Returns `None` when
/// there is no parseable object.
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}
