//! HTTP API tests against a live router
//!
//! Each test binds the router to an ephemeral port over an in-memory SQLite
//! store, a scripted completion gateway and recording uploads.

mod common;

use botchat_backend::api;
use botchat_backend::chat::models::{Expert, Session};
use botchat_backend::gateway::{DataGateway, SqliteGateway};
use botchat_backend::personas;
use botchat_backend::state::AppState;
use common::{RecordingUploads, ScriptedCompletion};
use serde_json::{json, Value};
use std::sync::Arc;

struct TestApp {
    base: String,
    client: reqwest::Client,
    data: Arc<SqliteGateway>,
    completion: Arc<ScriptedCompletion>,
    uploads: Arc<RecordingUploads>,
}

impl TestApp {
    async fn start(max_upload_bytes: usize) -> Self {
        let data = Arc::new(SqliteGateway::in_memory().await.unwrap());
        data.seed_experts(&personas::seed_experts()).await.unwrap();
        let completion = Arc::new(ScriptedCompletion::new(&["Hi ", "there"]));
        let uploads = Arc::new(RecordingUploads::default());
        let state = AppState::new(
            data.clone(),
            completion.clone(),
            uploads.clone(),
            max_upload_bytes,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, api::router(state)).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            data,
            completion,
            uploads,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn experts(&self) -> Vec<Expert> {
        serde_json::from_value(self.get_json("/api/experts").await).unwrap()
    }

    async fn create_session(&self, expert_id: &str) -> Session {
        let response = self
            .post("/api/sessions", json!({ "expertId": expert_id }))
            .await;
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }
}

fn user_message(id: &str, text: &str) -> Value {
    json!({ "id": id, "role": "user", "parts": [{ "type": "text", "text": text }] })
}

fn multipart_body(boundary: &str, session_id: &str, files: &[(&str, &str, usize)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"sessionId\"\r\n\r\n{}\r\n",
            boundary, session_id
        )
        .as_bytes(),
    );
    for (name, media_type, size) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                boundary, name, media_type
            )
            .as_bytes(),
        );
        body.extend(std::iter::repeat(b'x').take(*size));
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

async fn upload(app: &TestApp, files: &[(&str, &str, usize)]) -> reqwest::Response {
    let boundary = "botchat-test-boundary";
    app.client
        .post(app.url("/api/attachments/upload"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(multipart_body(boundary, "s-upload", files))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::start(1024).await;
    let body = app.get_json("/api/health").await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_chat_streams_sse_with_session_expert_prompt() {
    let app = TestApp::start(1024).await;
    let kate = app
        .experts()
        .await
        .into_iter()
        .find(|e| e.slug == "travel-concierge")
        .unwrap();
    let session = app.create_session(&kate.id).await;

    let response = app
        .post(
            "/api/chat",
            json!({
                "sessionId": session.id,
                "messages": [user_message("m1", "Which bag for a week in Rome?")],
            }),
        )
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let body = response.text().await.unwrap();
    assert_eq!(body.matches("\"text-delta\"").count(), 2);
    assert!(body.contains("\"finishReason\":\"stop\""));
    assert!(body.ends_with("data: [DONE]\n\n"));

    let request = app.completion.last_request().unwrap();
    assert_eq!(request.system, kate.system_prompt);
    assert_eq!(request.messages[0].text(), "Which bag for a week in Rome?");
}

#[tokio::test]
async fn test_chat_uses_preset_without_session() {
    let app = TestApp::start(1024).await;
    let response = app
        .post(
            "/api/chat",
            json!({ "presetId": "brand-voice", "messages": [user_message("m1", "Slogan?")] }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let _ = response.text().await.unwrap();

    assert_eq!(
        app.completion.last_request().unwrap().system,
        personas::system_prompt_for("brand-voice").unwrap()
    );
}

#[tokio::test]
async fn test_chat_rejects_empty_messages() {
    let app = TestApp::start(1024).await;
    let response = app.post("/api/chat", json!({ "messages": [] })).await;
    assert_eq!(response.status(), 400);
    assert_eq!(app.completion.calls(), 0);
}

#[tokio::test]
async fn test_message_sync_round_trip() {
    let app = TestApp::start(1024).await;
    let expert = app.experts().await.remove(0);
    let session = app.create_session(&expert.id).await;

    let missing = app
        .post("/api/messages/sync", json!({ "messages": [] }))
        .await;
    assert_eq!(missing.status(), 400);
    let error: Value = missing.json().await.unwrap();
    assert_eq!(error["error"], "Missing sessionId.");

    let response = app
        .post(
            "/api/messages/sync",
            json!({
                "sessionId": session.id,
                "messages": [
                    user_message("u1", "Carry-on size limits?"),
                    { "id": "a1", "role": "assistant", "parts": [{ "type": "text", "text": "Usually 55 cm." }] },
                ],
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({ "ok": true }));

    let messages = app
        .get_json(&format!("/api/sessions/{}/messages", session.id))
        .await;
    let ids: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["u1", "a1"]);

    let sessions: Vec<Session> =
        serde_json::from_value(app.get_json("/api/sessions").await).unwrap();
    assert_eq!(sessions[0].title, "Carry-on size limits?");
    assert_eq!(sessions[0].last_message.as_deref(), Some("Usually 55 cm."));
}

#[tokio::test]
async fn test_expert_admin_flow() {
    let app = TestApp::start(1024).await;
    assert_eq!(app.experts().await.len(), 4);

    let saved = app
        .post(
            "/api/experts",
            json!({
                "name": "Packing Coach",
                "agent_name": "Pia",
                "system_prompt": "You help people pack light.",
            }),
        )
        .await;
    assert_eq!(saved.status(), 200);
    let experts: Vec<Expert> = saved.json().await.unwrap();
    assert_eq!(experts.len(), 5);
    let coach = experts.last().unwrap().clone();
    assert_eq!(coach.slug, "packing-coach");

    let incomplete = app.post("/api/experts", json!({ "name": "Nameless" })).await;
    assert_eq!(incomplete.status(), 400);

    let reordered: Vec<Expert> = app
        .post("/api/experts/reorder", json!({ "from": 4, "to": 0 }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(reordered[0].id, coach.id);
    assert_eq!(app.experts().await[0].id, coach.id);

    let session = app.create_session(&coach.id).await;
    let conflict = app
        .post("/api/experts/delete", json!({ "id": coach.id }))
        .await;
    assert_eq!(conflict.status(), 409);

    let deleted = app
        .post("/api/sessions/delete", json!({ "sessionId": session.id }))
        .await;
    assert_eq!(deleted.status(), 200);
    let removed = app
        .post("/api/experts/delete", json!({ "id": coach.id }))
        .await;
    assert_eq!(removed.status(), 200);
    assert_eq!(app.data.list_experts().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_expert_generate() {
    let app = TestApp::start(1024).await;
    let response = app
        .post("/api/experts/generate", json!({ "name": "Packing Coach" }))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["system_prompt"], "You are generated.");

    let missing = app.post("/api/experts/generate", json!({})).await;
    assert_eq!(missing.status(), 400);
}

#[tokio::test]
async fn test_upload_preserves_order() {
    let app = TestApp::start(1024).await;
    let response = upload(
        &app,
        &[
            ("A.png", "image/png", 10),
            ("B.pdf", "application/pdf", 10),
            ("C.txt", "text/plain", 10),
        ],
    )
    .await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let names: Vec<&str> = body["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["filename"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["A.png", "B.pdf", "C.txt"]);
    assert_eq!(body["files"][0]["mediaType"], "image/png");
    assert_eq!(
        body["files"][0]["url"],
        "https://files.test/s-upload/A.png"
    );
}

#[tokio::test]
async fn test_upload_rejects_oversized_file_before_sending() {
    let app = TestApp::start(16).await;
    let response = upload(
        &app,
        &[("small.txt", "text/plain", 4), ("big.bin", "application/octet-stream", 64)],
    )
    .await;

    assert_eq!(response.status(), 413);
    assert!(app.uploads.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_requires_files() {
    let app = TestApp::start(16).await;
    let response = upload(&app, &[]).await;
    assert_eq!(response.status(), 400);
}
