//! HTTP provider speaking the chat-completions wire shape.
//!
//! Retry, backoff, and timeouts are deliberately absent — network resilience
//! is the provider collaborator's own concern, layered by the host.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::provider::types::{
    ChatRequest, ChatResponse, Sender, StreamChunk, ToolCall, ToolChoice,
};
use crate::provider::{OnChunk, Provider};

pub struct HttpProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Provider for HttpProvider {
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        let body = build_request_body(&self.model, &request);
        if request.debug {
            debug!(body = %body, "chat request");
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = response.json().await?;
        Ok(into_chat_response(api_response))
    }

    async fn send_message_stream(
        &self,
        request: ChatRequest,
        on_chunk: &OnChunk<'_>,
    ) -> Result<(), Error> {
        let mut body = build_request_body(&self.model, &request);
        body["stream"] = serde_json::Value::Bool(true);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let byte_stream = response.bytes_stream();
        parse_sse_stream(byte_stream, on_chunk).await
    }
}

fn build_request_body(model: &str, request: &ChatRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = std::iter::once(serde_json::json!({
        "role": "system",
        "content": request.system_prompt,
    }))
    .chain(request.messages.iter().map(|m| {
        serde_json::json!({
            "role": match m.sender {
                Sender::User => "user",
                Sender::Assistant => "assistant",
            },
            "content": m.content,
        })
    }))
    .collect();

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
        body["tool_choice"] = match &request.tool_choice {
            ToolChoice::Auto => serde_json::json!("auto"),
            ToolChoice::None => serde_json::json!("none"),
            ToolChoice::Tool { name } => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        };
    }

    body
}

// --- Response types ---

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    /// The wire carries arguments as an encoded JSON string; dispatch
    /// parses it (defaulting to `{}` on failure).
    #[serde(default)]
    arguments: String,
}

fn into_chat_response(api: ApiResponse) -> ChatResponse {
    let Some(choice) = api.choices.into_iter().next() else {
        return ChatResponse::default();
    };
    ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls: choice
            .message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall {
                name: c.function.name,
                arguments: serde_json::Value::String(c.function.arguments),
            })
            .collect(),
    }
}

// --- SSE parsing ---

/// Parse an SSE byte stream, invoking `on_chunk` per content delta and once
/// with a terminal chunk when the stream signals completion.
pub(crate) async fn parse_sse_stream<S>(stream: S, on_chunk: &OnChunk<'_>) -> Result<(), Error>
where
    S: futures::Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    let mut buffer = String::new();
    let mut done = false;

    tokio::pin!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Error::Http)?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // Process complete SSE lines; a trailing partial line stays buffered.
        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim().to_string();
            buffer = buffer[line_end + 1..].to_string();

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                if !done {
                    done = true;
                    on_chunk(StreamChunk::done());
                }
                continue;
            }
            if let Some(delta) = parse_delta(data) {
                if !delta.is_empty() && !done {
                    on_chunk(StreamChunk::delta(delta));
                }
            }
        }
    }

    if !done {
        on_chunk(StreamChunk::done());
    }
    Ok(())
}

fn parse_delta(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string)
}
