//! Streaming utilities for Server-Sent Events (SSE)
//!
//! Turns a completion stream into SSE `data:` lines carrying JSON events,
//! terminated by [`SSE_DONE_SIGNAL`].

use crate::error::AppError;
use crate::gateway::{CompletionChunk, CompletionStream};
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use futures_util::{stream::Stream, StreamExt};
use serde_json::json;
use tracing::warn;

/// SSE stream termination signal
pub const SSE_DONE_SIGNAL: &str = "[DONE]";

/// SSE error prefix
pub const SSE_ERROR_PREFIX: &str = "[ERROR]";

/// Wrap a stream of event payloads into an SSE HTTP response
///
/// # Arguments
/// * `events` - Payloads; each becomes one `data:` line
///
/// # Returns
/// * `Result<Response, AppError>` - SSE HTTP response or error
pub fn create_sse_response(
    events: impl Stream<Item = String> + Send + 'static,
) -> Result<Response, AppError> {
    let sse_stream =
        events.map(|data| Ok::<_, std::io::Error>(format!("data: {}\n\n", data)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(sse_stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build SSE response: {}", e)))
}

/// Map completion chunks to UI stream events
///
/// Text arrives as `{"type":"text-delta","delta":...}`, the end as
/// `{"type":"finish","finishReason":...}` followed by [`SSE_DONE_SIGNAL`].
/// A failure mid-stream yields `[ERROR] <message>` and ends the stream.
pub fn completion_events(mut completion: CompletionStream) -> impl Stream<Item = String> {
    use async_stream::stream;

    stream! {
        while let Some(chunk) = completion.next().await {
            match chunk {
                Ok(CompletionChunk::TextDelta(delta)) => {
                    yield json!({ "type": "text-delta", "delta": delta }).to_string();
                }
                Ok(CompletionChunk::Finished { reason }) => {
                    yield json!({ "type": "finish", "finishReason": reason }).to_string();
                }
                Err(e) => {
                    warn!(error = %e, "Completion stream failed");
                    yield format!("{} {}", SSE_ERROR_PREFIX, e);
                    return;
                }
            }
        }
        yield SSE_DONE_SIGNAL.to_string();
    }
}
