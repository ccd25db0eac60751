//! the recipe backend contract: `POST {base}/chat` with json bodies.
//!
//! native requests go through `ureq` on a blocking tokio worker; wasm uses
//! `gloo-net` on the browser's fetch. failures are reported as `BackendError`
//! and never parsed further.

use std::sync::Arc;

use async_trait::async_trait;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::conversation::Role;
use crate::recipe::Recipe;

/// env var holding the backend base url.
pub const API_URL_ENV: &str = "RECIPE_API_URL";

/// one prior turn as echoed upstream (recipes are never sent back).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// request body for `/chat`. `conversation_history` excludes `query` itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatQuery {
    pub query: String,
    pub conversation_history: Vec<HistoryEntry>,
}

/// successful response body.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// anything that can answer a `ChatQuery`. swap in a fake for tests.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RecipeBackend: Send + Sync {
    async fn chat(&self, query: &ChatQuery) -> Result<ChatReply, BackendError>;
}

/// the backend used by every `Conversation` in the app.
#[derive(Resource, Clone)]
pub struct Backend(pub Arc<dyn RecipeBackend>);

impl Backend {
    pub fn new(backend: impl RecipeBackend + 'static) -> Self {
        Self(Arc::new(backend))
    }
}

/// process-wide backend location.
///
/// an empty base url is allowed: requests then go to `/chat` and fail like
/// any other transport error.
#[derive(Resource, Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var(API_URL_ENV).unwrap_or_default();
        if base_url.is_empty() {
            warn!(target: "bevy_recipe_chat", "{} is not set; chat requests will fail", API_URL_ENV);
        }
        Self { base_url }
    }

    pub fn chat_url(&self) -> String {
        let base = self.base_url.strip_suffix('/').unwrap_or(&self.base_url);
        format!("{}/chat", base)
    }
}

/// http implementation of the backend contract.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self { url: config.chat_url() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn post_blocking(url: &str, query: &ChatQuery) -> Result<ChatReply, BackendError> {
    let agent = ureq::Agent::new_with_defaults();
    let res = agent
        .post(url)
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .send_json(query)
        .map_err(|e| match e {
            ureq::Error::StatusCode(code) => BackendError::Status(code),
            other => BackendError::Transport(other.to_string()),
        })?;
    let status = res.status();
    if !status.is_success() {
        return Err(BackendError::Status(status.as_u16()));
    }
    let text = res
        .into_body()
        .read_to_string()
        .map_err(|e| BackendError::Transport(e.to_string()))?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl RecipeBackend for HttpBackend {
    async fn chat(&self, query: &ChatQuery) -> Result<ChatReply, BackendError> {
        let url = self.url.clone();
        let query = query.clone();
        // ureq is blocking; keep it off the async workers
        tokio::task::spawn_blocking(move || post_blocking(&url, &query))
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl RecipeBackend for HttpBackend {
    async fn chat(&self, query: &ChatQuery) -> Result<ChatReply, BackendError> {
        use gloo_net::http::Request;

        let resp = Request::post(&self.url)
            .header("accept", "application/json")
            .json(query)
            .map_err(|e| BackendError::Transport(e.to_string()))?
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if !resp.ok() {
            return Err(BackendError::Status(resp.status()));
        }
        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn query() -> ChatQuery {
        ChatQuery {
            query: "pasta".into(),
            conversation_history: vec![HistoryEntry {
                role: Role::Assistant,
                content: "hi".into(),
            }],
        }
    }

    /// what the test server saw: lowercased head and raw body.
    struct CapturedRequest {
        head: String,
        body: String,
    }

    /// read headers plus `content-length` bytes so closing doesn't reset the peer.
    fn read_request(stream: &mut std::net::TcpStream) -> Option<CapturedRequest> {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) | Err(_) => return None,
                Ok(n) => n,
            };
            data.extend_from_slice(&buf[..n]);
            let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + len {
                let body = String::from_utf8_lossy(&data[end + 4..end + 4 + len]).into_owned();
                return Some(CapturedRequest { head, body });
            }
        }
    }

    /// serve exactly one canned http response on a random local port and hand
    /// the request it answered back to the test.
    fn one_shot_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, flume::Receiver<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = flume::bounded(1);
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                if let Some(req) = read_request(&mut stream) {
                    let _ = tx.send(req);
                }
                let resp = format!(
                    "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes());
            }
        });
        (format!("http://{addr}/"), rx)
    }

    #[test]
    fn chat_url_strips_one_trailing_slash() {
        assert_eq!(BackendConfig::new("https://api.example/").chat_url(), "https://api.example/chat");
        assert_eq!(BackendConfig::new("https://api.example").chat_url(), "https://api.example/chat");
        assert_eq!(BackendConfig::default().chat_url(), "/chat");
    }

    #[test]
    fn query_serializes_lowercase_roles() {
        let v = serde_json::to_value(query()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "query": "pasta",
                "conversation_history": [{ "role": "assistant", "content": "hi" }]
            })
        );
    }

    #[test]
    fn reply_without_recipes_is_empty() {
        let r: ChatReply = serde_json::from_str(r#"{"answer":"hello"}"#).unwrap();
        assert_eq!(r.answer, "hello");
        assert!(r.recipes.is_empty());
    }

    #[test]
    fn reply_keeps_recipes_with_float_counts() {
        let r: ChatReply = serde_json::from_str(
            r#"{"answer": "Try the Beef Stew", "recipes": [{
                "title": "Beef Stew", "ingredients": "beef, carrots", "instructions": "c(\"Brown\", \"Simmer\")",
                "cook_time": "2 hours", "prep_time": "20 minutes", "rating": 4.6, "images": [],
                "description": "", "category": "Dinner", "servings": 4.0}]}"#,
        )
        .unwrap();
        assert_eq!(r.recipes.len(), 1);
        assert_eq!(r.recipes[0].title, "Beef Stew");
        assert_eq!(r.recipes[0].servings, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_backend_reads_success_body() {
        let (base, _) = one_shot_server("HTTP/1.1 200 OK", r#"{"answer":"try soup","recipes":[]}"#);
        let backend = HttpBackend::new(&BackendConfig::new(base));
        let reply = backend.chat(&query()).await.unwrap();
        assert_eq!(reply.answer, "try soup");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_backend_posts_json_query_to_chat() {
        let (base, seen) = one_shot_server("HTTP/1.1 200 OK", r#"{"answer":"ok"}"#);
        let backend = HttpBackend::new(&BackendConfig::new(base));
        backend.chat(&query()).await.unwrap();

        let req = seen.recv_async().await.unwrap();
        assert!(req.head.starts_with("post /chat http/1.1"), "head: {}", req.head);
        assert!(
            req.head.lines().any(|l| l.trim() == "content-type: application/json"),
            "head: {}",
            req.head
        );
        let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "query": "pasta",
                "conversation_history": [{ "role": "assistant", "content": "hi" }]
            })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_backend_maps_server_error_to_status() {
        let (base, _) = one_shot_server("HTTP/1.1 500 Internal Server Error", r#"{"error":"boom"}"#);
        let backend = HttpBackend::new(&BackendConfig::new(base));
        let err = backend.chat(&query()).await.unwrap_err();
        assert!(matches!(err, BackendError::Status(500)), "got {err:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_backend_reports_malformed_json() {
        let (base, _) = one_shot_server("HTTP/1.1 200 OK", "not json");
        let backend = HttpBackend::new(&BackendConfig::new(base));
        let err = backend.chat(&query()).await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)), "got {err:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_base_url_fails_as_transport() {
        let backend = HttpBackend::new(&BackendConfig::default());
        let err = backend.chat(&query()).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)), "got {err:?}");
    }
}
