//! OpenAI chat completions wire types
//!
//! Structs that mirror the request/response JSON of the
//! `/chat/completions` endpoint, streamed and non-streamed.

use serde::{Deserialize, Serialize};

/// Request body for `/chat/completions`
#[derive(Serialize, Debug)]
pub struct ChatCompletionRequest {
    /// Model name
    pub model: String,
    /// Conversation, system prompt first
    pub messages: Vec<RequestMessage>,
    /// Whether to stream the answer as SSE
    pub stream: bool,
    /// Constrain the answer format (JSON mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// One message sent to the model
#[derive(Serialize, Debug, PartialEq)]
pub struct RequestMessage {
    /// "system", "user" or "assistant"
    pub role: &'static str,
    /// Plain text or multi-part content
    pub content: RequestContent,
}

/// Message content: a string, or parts when images are attached
#[derive(Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum RequestContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A single content part
#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference by URL
#[derive(Serialize, Debug, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

/// Response format selector
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
}

/// One SSE `data:` payload of a streamed completion
#[derive(Deserialize, Debug)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
    /// Set on the last chunk of a choice
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Non-streamed completion
#[derive(Deserialize, Debug)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}
