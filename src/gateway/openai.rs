//! OpenAI-compatible chat-completions client.
//!
//! Serves both the fast-inference provider and the default provider — the
//! two differ only in base URL and credential. Streaming uses the
//! server-sent-events form of the same endpoint (`data:` lines carrying
//! incremental deltas, closed by a `[DONE]` sentinel).

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatMessage, ChatRequest, FragmentStream, GatewayError};

pub struct ChatCompletionsClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ChatCompletionsClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, req: &ChatRequest, stream: bool) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &req.model,
            messages: &req.messages,
            temperature: req.temperature,
            max_completion_tokens: req.max_completion_tokens,
            stream,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status: status.as_u16(), body });
        }
        Ok(response)
    }
}

/// Request body for POST `/chat/completions`.
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_completion_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// One SSE `data:` payload in the streaming form.
#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the delta text from one SSE data payload, if any.
fn delta_text(payload: &str) -> Result<Option<String>, GatewayError> {
    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|e| GatewayError::Decode(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

impl ChatBackend for ChatCompletionsClient {
    fn complete(&self, req: ChatRequest) -> BoxFuture<'_, Result<String, GatewayError>> {
        Box::pin(async move {
            let response = self.send(&req, false).await?;
            let parsed: CompletionResponse = response
                .json()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| GatewayError::Decode("response carried no content".to_string()))
        })
    }

    fn stream(&self, req: ChatRequest) -> BoxFuture<'_, Result<FragmentStream, GatewayError>> {
        Box::pin(async move {
            let response = self.send(&req, true).await?;
            let timeout_secs = self.timeout_secs;
            let (tx, stream) = FragmentStream::channel();

            // The reader task owns the response body. A failed send means the
            // consumer dropped the stream; returning drops the body and
            // releases the connection.
            tokio::spawn(async move {
                let mut body = response.bytes_stream();
                let mut buffer = String::new();

                while let Some(next) = body.next().await {
                    let bytes = match next {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            let _ = tx.send(Err(GatewayError::from_reqwest(e, timeout_secs))).await;
                            return;
                        }
                    };
                    buffer.push_str(&String::from_utf8_lossy(&bytes));

                    while let Some(newline) = buffer.find('\n') {
                        let line: String = buffer.drain(..=newline).collect();
                        let line = line.trim();
                        let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
                            continue;
                        };
                        if payload == "[DONE]" {
                            return;
                        }
                        match delta_text(payload) {
                            Ok(Some(text)) => {
                                if tx.send(Ok(text)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                    }
                }
            });

            Ok(stream)
        })
    }
}
