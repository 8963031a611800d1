use std::pin::Pin;

use futures::StreamExt as _;
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{
    BackendStatus, Capsule, CapsuleList, ChatRequest, Health, ModelList, Project, ProjectCreate,
    ProjectList, PullRequest, PullStart, SearchResults,
};
use crate::config::ClientConfig;
use crate::errors::{ClientError, StreamError};
use crate::pull::{PullEvents, pull_events};
use crate::render::RenderTarget;
use crate::session::{AbortHandle, AbortSignal, SessionReport, StreamSession};

/// Response body of a chat request, chunk by chunk.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, StreamError>> + Send + 'static>>;

/// Opens the streamed response for a chat request.
///
/// Errors returned here happen before any byte of the reply was received and
/// are handed to the caller unchanged.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ClientError>;
}

/// Validates `request`, opens its stream and binds it to a new session
/// rendering into `target`.
pub async fn start_chat<T, R>(
    transport: &T,
    request: &ChatRequest,
    target: R,
) -> Result<ChatRun<R>, ClientError>
where
    T: ChatTransport + ?Sized,
    R: RenderTarget,
{
    request.validate()?;
    let stream = transport.open_stream(request).await?;
    let session = StreamSession::new(target);
    debug!(session_id = %session.id(), project_id = request.project_id, model = ?request.model, "chat stream opened");
    let (abort, signal) = AbortHandle::channel();
    Ok(ChatRun {
        session,
        stream,
        abort,
        signal,
    })
}

/// A chat reply whose stream is open but not yet consumed.
pub struct ChatRun<R> {
    session: StreamSession<R>,
    stream: ByteStream,
    abort: AbortHandle,
    signal: AbortSignal,
}

impl<R: RenderTarget> ChatRun<R> {
    pub fn session_id(&self) -> uuid::Uuid {
        self.session.id()
    }

    /// Returns a handle that cancels the run from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Consumes the stream until the session ends.
    pub async fn wait(self) -> SessionReport<R> {
        self.session.run(self.stream, self.signal).await
    }
}

/// HTTP client for the local PrivateSpark service.
#[derive(Clone)]
pub struct SparkClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl SparkClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Creates a client from `PRIVATESPARK_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a chat request and returns the run rendering into `target`.
    pub async fn chat<R: RenderTarget>(
        &self,
        request: &ChatRequest,
        target: R,
    ) -> Result<ChatRun<R>, ClientError> {
        start_chat(self, request, target).await
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        self.get_json("/api/healthz", &[]).await
    }

    /// Whether the model backend behind the service is reachable.
    pub async fn status(&self) -> Result<BackendStatus, ClientError> {
        self.get_json("/api/ollama/status", &[]).await
    }

    pub async fn models(&self) -> Result<ModelList, ClientError> {
        self.get_json("/api/models", &[]).await
    }

    /// Asks the service to download `model` and streams its progress.
    pub async fn pull_model(&self, model: &str) -> Result<PullEvents, ClientError> {
        let body = PullRequest::new(model)?;
        let start: PullStart = self.post_json("/api/models/pull", &body).await?;
        let url = if start.stream_url.starts_with("http") {
            start.stream_url
        } else {
            self.config.endpoint(&start.stream_url)
        };
        debug!(model = %body.model, %url, "model pull started");
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("pull request failed: {e}")))?;
        let response = check_status(&url, response).await?;
        Ok(pull_events(body_stream(response, "pull")))
    }

    /// Lists projects, newest first.
    pub async fn projects(&self) -> Result<Vec<Project>, ClientError> {
        let list: ProjectList = self.get_json("/api/projects", &[]).await?;
        Ok(list.projects)
    }

    pub async fn create_project(&self, name: &str) -> Result<Project, ClientError> {
        let body = ProjectCreate::new(name)?;
        self.post_json("/api/projects", &body).await
    }

    pub async fn capsules(&self, project_id: i64) -> Result<Vec<Capsule>, ClientError> {
        let list: CapsuleList = self
            .get_json(&format!("/api/projects/{project_id}/capsules"), &[])
            .await?;
        Ok(list.capsules)
    }

    /// Full-text search over a project's capsules. A blank query lists them.
    pub async fn search(&self, project_id: i64, query: &str) -> Result<Vec<Capsule>, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return self.capsules(project_id).await;
        }
        let results: SearchResults = self
            .get_json(
                "/api/search",
                &[("project_id", project_id.to_string()), ("q", query.to_string())],
            )
            .await?;
        Ok(results.results)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = self.config.endpoint(path);
        let request = self
            .http
            .get(&url)
            .query(query)
            .timeout(self.config.timeout);
        decode_json(&url, request).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.config.endpoint(path);
        let request = self.http.post(&url).json(body).timeout(self.config.timeout);
        decode_json(&url, request).await
    }
}

#[async_trait::async_trait]
impl ChatTransport for SparkClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ClientError> {
        let url = self.config.endpoint("/api/chat");
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("chat request failed: {e}")))?;
        let response = check_status(&url, response).await?;
        Ok(body_stream(response, "chat"))
    }
}

fn body_stream(response: reqwest::Response, what: &'static str) -> ByteStream {
    let stream = response.bytes_stream().map(move |chunk| {
        chunk.map_err(|e| StreamError::transport(format!("{what} stream read failed: {e}")))
    });
    Box::pin(stream)
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ClientError::Http {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn decode_json<T: DeserializeOwned>(
    url: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ClientError> {
    let response = request
        .send()
        .await
        .map_err(|e| ClientError::Transport(format!("request to {url} failed: {e}")))?;
    let response = check_status(url, response).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::Transport(format!("reading {url} failed: {e}")))?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(format!("{url}: {e}")))
}
