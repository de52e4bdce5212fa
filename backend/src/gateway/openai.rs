//! OpenAI completion gateway
//!
//! Streams chat completions from the Chat Completions endpoint and runs
//! one-shot JSON prompts for the expert editor.

use crate::chat::models::{ChatMessage, MessageRole};
use crate::gateway::openai_types::{
    ChatCompletionRequest, ChatCompletionResponse, ContentPart, ImageUrl, RequestContent,
    RequestMessage, ResponseFormat, StreamChunk,
};
use crate::gateway::{
    CompletionChunk, CompletionGateway, CompletionRequest, CompletionStream, GatewayError,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, error};

const SERVICE: &str = "OpenAI API";

/// Completion gateway backed by an OpenAI-compatible API
pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

/// What a single SSE line carried
#[derive(Debug, PartialEq)]
enum SseLine {
    Chunks(Vec<CompletionChunk>),
    Done,
    Skip,
}

impl OpenAiGateway {
    /// Create a gateway for `model` at `base_url` (e.g. `https://api.openai.com/v1`)
    pub fn new(client: reqwest::Client, api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, GatewayError> {
        if self.api_key.is_empty() {
            return Err(GatewayError::Unavailable("OpenAI API key is empty".to_string()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            url = %url,
            model = %self.model,
            stream = body.stream,
            messages = body.messages.len(),
            "Calling OpenAI API"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = GatewayError::from_response(SERVICE, response).await;
            error!(error = %err, rate_limited = err.is_rate_limited(), "OpenAI API returned error status");
            return Err(err);
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    async fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, GatewayError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: to_request_messages(&request.system, &request.messages),
            stream: true,
            response_format: None,
        };
        let response = self.post(&body).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;
            let mut done = false;
            'read: while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => buffer.extend_from_slice(&chunk),
                    Err(e) => {
                        yield Err(GatewayError::from(e));
                        return;
                    }
                }
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        Ok(SseLine::Chunks(chunks)) => {
                            for chunk in chunks {
                                if matches!(chunk, CompletionChunk::Finished { .. }) {
                                    finished = true;
                                }
                                yield Ok(chunk);
                            }
                        }
                        Ok(SseLine::Done) => {
                            done = true;
                            break 'read;
                        }
                        Ok(SseLine::Skip) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
            // Final event without a trailing newline
            if !done && !buffer.is_empty() {
                match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                    Ok(SseLine::Chunks(chunks)) => {
                        for chunk in chunks {
                            if matches!(chunk, CompletionChunk::Finished { .. }) {
                                finished = true;
                            }
                            yield Ok(chunk);
                        }
                    }
                    Ok(SseLine::Done) | Ok(SseLine::Skip) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            if !finished {
                yield Ok(CompletionChunk::Finished { reason: "stop".to_string() });
            }
        };

        Ok(Box::pin(stream))
    }

    async fn generate_object(&self, prompt: &str) -> Result<serde_json::Value, GatewayError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![RequestMessage {
                role: "user",
                content: RequestContent::Text(prompt.to_string()),
            }],
            stream: false,
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };
        let response_body = self.post(&body).await?.text().await?;

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&response_body).map_err(|e| {
                GatewayError::Decode(format!(
                    "Failed to parse JSON response from OpenAI API: {} - Response body: {}",
                    e, response_body
                ))
            })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| GatewayError::Decode("OpenAI API response contains no content".to_string()))?;

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            GatewayError::Decode(format!("Model answer is not JSON: {} - {}", e, content))
        })?;
        if !value.is_object() {
            return Err(GatewayError::Decode(format!(
                "Model answer is not a JSON object: {}",
                content
            )));
        }
        Ok(value)
    }
}

/// Parse one line of the SSE body
fn parse_sse_line(line: &str) -> Result<SseLine, GatewayError> {
    let line = line.trim();
    let data = match line.strip_prefix("data:") {
        Some(d) => d.trim_start(),
        None => return Ok(SseLine::Skip),
    };
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
        GatewayError::Decode(format!("Failed to parse OpenAI stream chunk: {} - {}", e, data))
    })?;

    let mut out = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            out.push(CompletionChunk::TextDelta(content));
        }
        if let Some(reason) = choice.finish_reason {
            out.push(CompletionChunk::Finished { reason });
        }
    }
    Ok(SseLine::Chunks(out))
}

/// Convert the conversation into request messages, system prompt first
///
/// Image attachments become `image_url` parts; any other file is referenced
/// by a text line carrying its name, type and URL. Messages without any
/// usable content are skipped.
fn to_request_messages(system: &str, messages: &[ChatMessage]) -> Vec<RequestMessage> {
    let mut out = vec![RequestMessage {
        role: "system",
        content: RequestContent::Text(system.to_string()),
    }];

    for message in messages {
        let text = message.text();
        let files: Vec<_> = message.files().collect();

        let content = if files.is_empty() {
            if text.trim().is_empty() {
                continue;
            }
            RequestContent::Text(text)
        } else {
            let mut parts = Vec::new();
            if !text.trim().is_empty() {
                parts.push(ContentPart::Text { text });
            }
            for file in files {
                if file.media_type.starts_with("image/") {
                    parts.push(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: file.url.clone(),
                        },
                    });
                } else {
                    parts.push(ContentPart::Text {
                        text: format!(
                            "Attached file: {} ({}) {}",
                            file.filename.as_deref().unwrap_or("file"),
                            file.media_type,
                            file.url
                        ),
                    });
                }
            }
            RequestContent::Parts(parts)
        };

        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        };
        out.push(RequestMessage { role, content });
    }
    out
}
