use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::state::{Mode, Settings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("No API key configured (set MCQ_REMOTE_API_KEY).")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// "Send a prompt, get text back."
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn query(&self, prompt: &str, model: &str) -> Result<String, QueryError>;
}

/// HTTP backend: an OpenAI-style chat endpoint (remote) or a bare
/// `{prompt, model}` generate endpoint (local).
pub struct LlmClient {
    client: reqwest::Client,
    mode: Mode,
    remote_api_url: String,
    api_key: Option<String>,
    local_server_url: String,
}

impl LlmClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            mode: settings.mode,
            remote_api_url: settings.remote_api_url.clone(),
            api_key: Some(settings.remote_api_key.clone()).filter(|k| !k.is_empty()),
            local_server_url: settings.local_server_url.clone(),
        })
    }

    async fn query_remote(&self, prompt: &str, model: &str) -> Result<String, QueryError> {
        let key = self.api_key.as_ref().ok_or(QueryError::MissingApiKey)?;
        let messages = vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": 150,
            "temperature": 0,
        });

        let req = self
            .client
            .post(&self.remote_api_url)
            .header("Authorization", format!("Bearer {}", key))
            .json(&body);
        let json = send_json(req).await?;
        Ok(extract_remote_text(&json))
    }

    async fn query_local(&self, prompt: &str, model: &str) -> Result<String, QueryError> {
        let body = serde_json::json!({ "prompt": prompt, "model": model });
        let req = self.client.post(&self.local_server_url).json(&body);
        let json = send_json(req).await?;
        Ok(extract_local_text(&json))
    }
}

#[async_trait]
impl ModelBackend for LlmClient {
    async fn query(&self, prompt: &str, model: &str) -> Result<String, QueryError> {
        debug!(mode = ?self.mode, model, prompt_len = prompt.len(), "querying model");
        match self.mode {
            Mode::Remote => self.query_remote(prompt, model).await,
            Mode::Local => self.query_local(prompt, model).await,
        }
    }
}

async fn send_json(req: reqwest::RequestBuilder) -> Result<Value, QueryError> {
    let resp = req.send().await?;
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(QueryError::Status {
            status: status.as_u16(),
            body: text.chars().take(300).collect(),
        });
    }
    serde_json::from_str(&text).map_err(|e| QueryError::Malformed(e.to_string()))
}

fn non_empty(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// `choices[0].message.content`, then `choices[0].text`, then `output`,
/// else the whole document.
pub fn extract_remote_text(json: &Value) -> String {
    let first = json["choices"].get(0);
    first
        .and_then(|c| non_empty(&c["message"]["content"]))
        .or_else(|| first.and_then(|c| non_empty(&c["text"])))
        .or_else(|| non_empty(&json["output"]))
        .unwrap_or_else(|| json.to_string())
}

/// `text`, then `output`, else the whole document.
pub fn extract_local_text(json: &Value) -> String {
    non_empty(&json["text"])
        .or_else(|| non_empty(&json["output"]))
        .unwrap_or_else(|| json.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answers one HTTP request with a canned response and returns the raw
    /// request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/generate", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf).into_owned()
        });
        (url, handle)
    }

    fn request_body(request: &str) -> Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_remote_request_shape() {
        let (url, server) = serve_once("200 OK", r#"{"choices":[{"message":{"content":"B"}}]}"#).await;
        let settings = Settings {
            remote_api_url: url,
            remote_api_key: "sk-test".to_string(),
            ..Settings::default()
        };
        let client = LlmClient::new(&settings).unwrap();
        assert_eq!(client.query("Pick one", "gpt-test").await.unwrap(), "B");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/generate"));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer sk-test"));
        let body = request_body(&request);
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Pick one");
    }

    #[tokio::test]
    async fn test_local_request_shape() {
        let (url, server) = serve_once("200 OK", r#"{"text":"C"}"#).await;
        let settings = Settings {
            mode: Mode::Local,
            local_server_url: url,
            ..Settings::default()
        };
        let client = LlmClient::new(&settings).unwrap();
        assert_eq!(client.query("Pick one", "llama3").await.unwrap(), "C");

        let request = server.await.unwrap();
        assert!(!request.to_ascii_lowercase().contains("authorization:"));
        assert_eq!(
            request_body(&request),
            json!({"prompt": "Pick one", "model": "llama3"})
        );
    }

    #[tokio::test]
    async fn test_error_status_is_a_status_error() {
        let (url, _server) = serve_once("500 Internal Server Error", "boom").await;
        let settings = Settings {
            mode: Mode::Local,
            local_server_url: url,
            ..Settings::default()
        };
        let client = LlmClient::new(&settings).unwrap();
        match client.query("Pick one", "llama3").await {
            Err(QueryError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_status_becomes_failed_answer() {
        use crate::cache::store::MemoryStore;
        use crate::cache::types::TtlPolicy;
        use crate::cache::CacheHandle;
        use crate::detect::types::{Mcq, McqSource};
        use crate::relay::Relay;
        use std::sync::Arc;

        let (url, _server) = serve_once("503 Service Unavailable", "overloaded").await;
        let settings = Settings {
            mode: Mode::Local,
            local_server_url: url,
            ..Settings::default()
        };
        let client = Arc::new(LlmClient::new(&settings).unwrap());
        let cache = CacheHandle::spawn(MemoryStore::new(), TtlPolicy::default());
        let relay = Relay::new(cache, client, "llama3");

        let mcq = Mcq {
            id: "x".into(),
            question: "What is 2+2?".into(),
            options: vec!["3".into(), "4".into()],
            source: McqSource::TextHeuristic,
            anchor: None,
        };
        let answer = relay.handle(&mcq).await;
        assert!(answer.failed);
        assert_eq!(answer.choice, None);
        assert_eq!(
            answer.text,
            "Error querying model: backend returned 503: overloaded"
        );
    }

    #[test]
    fn test_extract_remote_chat_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "B"}}]});
        assert_eq!(extract_remote_text(&body), "B");
    }

    #[test]
    fn test_extract_remote_fallbacks() {
        assert_eq!(extract_remote_text(&json!({"choices": [{"text": "C"}]})), "C");
        assert_eq!(extract_remote_text(&json!({"output": "D"})), "D");
        let odd = json!({"error": {"message": "quota"}});
        assert_eq!(extract_remote_text(&odd), odd.to_string());
        // null content (tool calls etc.) falls through
        let null = json!({"choices": [{"message": {"content": null}}], "output": "A"});
        assert_eq!(extract_remote_text(&null), "A");
    }

    #[test]
    fn test_extract_local() {
        assert_eq!(extract_local_text(&json!({"text": "A"})), "A");
        assert_eq!(extract_local_text(&json!({"output": "B"})), "B");
        assert_eq!(extract_local_text(&json!({"result": 1})), r#"{"result":1}"#);
    }

    #[tokio::test]
    async fn test_remote_without_key_short_circuits() {
        let settings = Settings {
            // Unroutable: the call must fail before any request is made.
            remote_api_url: "http://127.0.0.1:9/never".to_string(),
            ..Settings::default()
        };
        let client = LlmClient::new(&settings).unwrap();
        let err = client.query("prompt", "m").await.unwrap_err();
        assert!(matches!(err, QueryError::MissingApiKey));
    }
}
