//! Local inference backend.
//!
//! The local server exposes only a blocking call. To keep the caller's
//! async runtime responsive, the call runs on the blocking worker pool and
//! its output is re-chunked into the same fragment shape that natively
//! streaming backends produce. The worker writes into a bounded channel:
//! when the consumer drops the stream, the next send fails and the worker
//! stops instead of accumulating output nobody will read.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatMessage, ChatRequest, FragmentStream, GatewayError};

/// Blocking HTTP client for a local chat endpoint.
pub struct LocalChatClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl LocalChatClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Synchronous generation — the only call the local server offers.
    pub fn complete_blocking(&self, req: &ChatRequest) -> Result<String, GatewayError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = LocalChatRequest {
            model: &req.model,
            messages: &req.messages,
            stream: false,
            options: LocalOptions {
                temperature: req.temperature,
                num_predict: req.max_completion_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GatewayError::Api { status: status.as_u16(), body });
        }

        let parsed: LocalChatResponse = response
            .json()
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

/// Request body for the local POST `/api/chat`.
#[derive(Serialize)]
struct LocalChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: LocalOptions,
}

#[derive(Serialize)]
struct LocalOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    num_predict: u32,
}

#[derive(Deserialize)]
struct LocalChatResponse {
    message: LocalChatMessage,
}

#[derive(Deserialize)]
struct LocalChatMessage {
    content: String,
}

/// Adapter that lifts the blocking client into the gateway's backend shape.
pub struct LocalChatBackend {
    client: Arc<LocalChatClient>,
}

impl LocalChatBackend {
    pub fn new(client: LocalChatClient) -> Self {
        Self { client: Arc::new(client) }
    }
}

impl ChatBackend for LocalChatBackend {
    fn complete(&self, req: ChatRequest) -> BoxFuture<'_, Result<String, GatewayError>> {
        let client = Arc::clone(&self.client);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || client.complete_blocking(&req))
                .await
                .map_err(|e| GatewayError::Transport(format!("worker task failed: {e}")))?
        })
    }

    fn stream(&self, req: ChatRequest) -> BoxFuture<'_, Result<FragmentStream, GatewayError>> {
        let client = Arc::clone(&self.client);
        Box::pin(async move {
            let (tx, stream) = FragmentStream::channel();

            tokio::task::spawn_blocking(move || {
                let result = client.complete_blocking(&req);
                match result {
                    Ok(text) => {
                        for fragment in rechunk(&text) {
                            // Consumer dropped the stream — stop immediately.
                            if tx.blocking_send(Ok(fragment)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                    }
                }
            });

            Ok(stream)
        })
    }
}

/// Split a completed response into word-sized fragments, preserving order
/// and whitespace so concatenation reproduces the text exactly.
pub(crate) fn rechunk(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(|s| s.to_string()).collect()
}
