//! Model Gateway — dispatches an ordered message list to one of several
//! interchangeable text-generation backends.
//!
//! The gateway holds no per-call state. Backend selection is a pure function
//! of the model selector (see `routing`); per-backend parameter quirks are
//! normalized here so callers never branch on provider identity.

pub mod local;
pub mod openai;
pub mod routing;

pub use routing::{route_for, BackendKind, ModelRoute, DEFAULT_TEMPERATURE, MAX_COMPLETION_TOKENS};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Settings;
use local::{LocalChatBackend, LocalChatClient};
use openai::ChatCompletionsClient;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("No backend is configured for model '{0}'")]
    NotConfigured(String),

    #[error("Provider returned an error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(timeout_secs)
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }

    /// Transport-level failures (including timeouts) are retryable;
    /// provider rejections and decode failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Transport(_))
    }
}

// ──────────────────────────────────────────────
// Messages and requests
// ──────────────────────────────────────────────

/// One role/content pair in the order-sensitive prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// A fully normalized generation request handed to a backend.
///
/// `temperature` is already resolved against the route's parameter set —
/// backends serialize it only when present.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_completion_tokens: u32,
}

// ──────────────────────────────────────────────
// Fragment stream
// ──────────────────────────────────────────────

/// Lazy, finite, non-restartable sequence of generated text fragments.
///
/// Concatenating every fragment yields the same content the non-streaming
/// call would have returned. The first `Err` is terminal: no further
/// fragments are yielded after it. Dropping the stream closes the channel,
/// which signals cancellation to the producing task.
pub struct FragmentStream {
    rx: mpsc::Receiver<Result<String, GatewayError>>,
    finished: bool,
}

impl FragmentStream {
    /// Channel capacity used by all producers; small enough that an
    /// abandoned consumer stops the producer promptly.
    pub const CAPACITY: usize = 16;

    /// Create a producer/consumer pair.
    pub fn channel() -> (mpsc::Sender<Result<String, GatewayError>>, Self) {
        let (tx, rx) = mpsc::channel(Self::CAPACITY);
        (tx, Self { rx, finished: false })
    }

    /// Next fragment, or `None` when the sequence is complete.
    pub async fn next(&mut self) -> Option<Result<String, GatewayError>> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(Err(e)) => {
                self.finished = true;
                self.rx.close();
                Some(Err(e))
            }
            other => other,
        }
    }

    /// Drain the stream into one string. An error anywhere discards the
    /// partial concatenation — it must never be treated as a finished answer.
    pub async fn collect(mut self) -> Result<String, GatewayError> {
        let mut full = String::new();
        while let Some(fragment) = self.next().await {
            full.push_str(&fragment?);
        }
        Ok(full)
    }
}

// ──────────────────────────────────────────────
// Backend abstraction
// ──────────────────────────────────────────────

/// A text-generation backend: one single-shot form, one incremental form.
pub trait ChatBackend: Send + Sync {
    fn complete(&self, req: ChatRequest) -> BoxFuture<'_, Result<String, GatewayError>>;

    fn stream(&self, req: ChatRequest) -> BoxFuture<'_, Result<FragmentStream, GatewayError>>;
}

// ──────────────────────────────────────────────
// Gateway
// ──────────────────────────────────────────────

/// Dispatches requests to the configured backends. Constructed once at
/// startup and shared; holds no mutable state.
pub struct ModelGateway {
    fast: Option<Box<dyn ChatBackend>>,
    primary: Option<Box<dyn ChatBackend>>,
    local: Option<Box<dyn ChatBackend>>,
}

impl ModelGateway {
    /// Build real HTTP backends from settings. A provider without an API key
    /// is left unconfigured; dispatching to it yields `NotConfigured`.
    pub fn from_settings(settings: &Settings) -> Self {
        let timeout = settings.request_timeout_secs;
        let fast = settings.fast_api_key.as_deref().map(|key| {
            Box::new(ChatCompletionsClient::new(&settings.fast_base_url, key, timeout))
                as Box<dyn ChatBackend>
        });
        let primary = settings.primary_api_key.as_deref().map(|key| {
            Box::new(ChatCompletionsClient::new(&settings.primary_base_url, key, timeout))
                as Box<dyn ChatBackend>
        });
        let local = Some(Box::new(LocalChatBackend::new(LocalChatClient::new(
            &settings.local_base_url,
            timeout,
        ))) as Box<dyn ChatBackend>);
        Self { fast, primary, local }
    }

    /// Assemble a gateway from explicit backends (tests use this with stubs).
    pub fn with_backends(
        fast: Option<Box<dyn ChatBackend>>,
        primary: Option<Box<dyn ChatBackend>>,
        local: Option<Box<dyn ChatBackend>>,
    ) -> Self {
        Self { fast, primary, local }
    }

    /// Capability query: is the backend serving this model configured?
    /// Checked before dispatch so "not configured" never surfaces from deep
    /// inside a call chain.
    pub fn supports(&self, model: &str) -> bool {
        self.slot(route_for(model).backend).is_some()
    }

    /// Single-shot generation.
    pub async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GatewayError> {
        let (backend, route) = self.backend_for(model)?;
        let req = normalize_request(model, messages, route);
        tracing::debug!(model = %model, backend = ?route.backend, "dispatching completion");
        backend.complete(req).await
    }

    /// Incremental generation. The returned stream is lazy and cancellable;
    /// see `FragmentStream`.
    pub async fn generate_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream, GatewayError> {
        let (backend, route) = self.backend_for(model)?;
        let req = normalize_request(model, messages, route);
        tracing::debug!(model = %model, backend = ?route.backend, "dispatching streaming completion");
        backend.stream(req).await
    }

    fn backend_for(&self, model: &str) -> Result<(&dyn ChatBackend, ModelRoute), GatewayError> {
        let route = route_for(model);
        match self.slot(route.backend) {
            Some(backend) => Ok((backend, route)),
            None => Err(GatewayError::NotConfigured(model.to_string())),
        }
    }

    fn slot(&self, kind: BackendKind) -> Option<&dyn ChatBackend> {
        match kind {
            BackendKind::Fast => self.fast.as_deref(),
            BackendKind::Primary => self.primary.as_deref(),
            BackendKind::Local => self.local.as_deref(),
        }
    }
}

/// Apply the route's parameter set to a raw message list.
fn normalize_request(model: &str, messages: &[ChatMessage], route: ModelRoute) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: messages.to_vec(),
        temperature: route.send_temperature.then_some(DEFAULT_TEMPERATURE),
        max_completion_tokens: MAX_COMPLETION_TOKENS,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
