//! Request and response bodies of the local service's HTTP API.

use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

pub const DEFAULT_TEMPERATURE: f32 = 0.2;
const MAX_PROJECT_NAME_CHARS: usize = 120;

/// One message of the conversation sent with a chat request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`. The response is the streamed event body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub project_id: i64,
    /// `None` lets the service pick its default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    /// Starts a request with a single user message.
    pub fn user(project_id: i64, text: impl Into<String>) -> Self {
        Self {
            project_id,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            messages: vec![ChatMessage::user(text)],
            system_prompt: None,
        }
    }

    /// Selects a model. Blank names fall back to the service default.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = Some(model).filter(|m| !m.trim().is_empty());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = Some(prompt).filter(|p| !p.trim().is_empty());
        self
    }

    /// Appends a message to the conversation.
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.messages.is_empty() {
            return Err(ClientError::Validation(
                "at least one message is required".into(),
            ));
        }
        if self.messages.iter().any(|m| m.content.trim().is_empty()) {
            return Err(ClientError::Validation(
                "message content must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// `GET /api/healthz`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub ok: bool,
    pub version: String,
    #[serde(default)]
    pub ollama_available: bool,
}

/// `GET /api/ollama/status`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BackendStatus {
    pub ok: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// A locally installed model as listed by the service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// `GET /api/models`. `message` explains an empty list.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ProjectList {
    pub projects: Vec<Project>,
}

/// Body of `POST /api/projects`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectCreate {
    pub name: String,
}

impl ProjectCreate {
    pub fn new(name: impl Into<String>) -> Result<Self, ClientError> {
        let name = name.into().trim().to_string();
        let chars = name.chars().count();
        if chars == 0 || chars > MAX_PROJECT_NAME_CHARS {
            return Err(ClientError::Validation(format!(
                "project name must be 1..={MAX_PROJECT_NAME_CHARS} characters"
            )));
        }
        Ok(Self { name })
    }
}

/// Body of `POST /api/models/pull`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub model: String,
}

impl PullRequest {
    pub fn new(model: impl Into<String>) -> Result<Self, ClientError> {
        let model = model.into().trim().to_string();
        if model.is_empty() {
            return Err(ClientError::Validation("model name must not be empty".into()));
        }
        Ok(Self { model })
    }
}

/// Answer to `POST /api/models/pull`: where to read the progress stream.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PullStart {
    #[serde(default)]
    pub ok: bool,
    pub stream_url: String,
}

/// A summarized knowledge unit derived from an uploaded file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Capsule {
    pub id: i64,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Similarity score, present on search results when embeddings are on.
    #[serde(default)]
    pub score: Option<f64>,
}

impl Capsule {
    /// First `max_chars` characters of the capsule text.
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct CapsuleList {
    pub capsules: Vec<Capsule>,
}

#[derive(Deserialize)]
pub(crate) struct SearchResults {
    #[serde(default)]
    pub results: Vec<Capsule>,
}
