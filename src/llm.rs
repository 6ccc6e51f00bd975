use crate::config::Config;
use crate::conversation::Role;
use crate::error::LlmError;
use crate::streaming::TextStream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Message in the request payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Body of a chat-completion request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
}

/// Client for the chat-completion endpoint.
///
/// Every public call makes a single best-effort attempt. Failures are logged
/// and answered with the configured fallback reply, never returned.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    stream: bool,
    api_key: Option<String>,
    fallback_reply: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            stream: config.stream,
            api_key: config.get_api_key(),
            fallback_reply: config.fallback_reply.clone(),
        }
    }

    /// Whether replies are requested incrementally by default
    pub fn streams(&self) -> bool {
        self.stream
    }

    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    /// Ask for a reply in one piece
    pub async fn ask(&self, prompt: &str) -> String {
        if prompt.trim().is_empty() {
            return String::new();
        }

        match self.complete(prompt).await {
            Ok(reply) => reply,
            Err(e) => self.fallback(e),
        }
    }

    /// Ask for a streamed reply, handing each fragment to `on_chunk` as it
    /// arrives. Returns the concatenation of all fragments.
    pub async fn ask_streaming<F>(&self, prompt: &str, on_chunk: F) -> String
    where
        F: FnMut(&str),
    {
        if prompt.trim().is_empty() {
            return String::new();
        }

        let result = match self.stream(prompt).await {
            Ok(stream) => stream.collect_with(on_chunk).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => self.fallback(e),
        }
    }

    /// Open a streamed reply as a lazy sequence of text fragments
    pub async fn stream(&self, prompt: &str) -> Result<TextStream, LlmError> {
        if prompt.trim().is_empty() {
            return Err(LlmError::EmptyPrompt);
        }
        let response = self.send(prompt, true).await?;
        Ok(TextStream::from_body(response.bytes_stream()))
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self.send(prompt, false).await?;
        let body: serde_json::Value = serde_json::from_slice(&response.bytes().await?)?;

        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .filter(|content| !content.trim().is_empty())
            .map(|content| content.to_string())
            .ok_or(LlmError::MissingField("choices[0].message.content"))
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let payload = self.payload(prompt, stream);

        debug!(
            "POST {} (model {}, stream {})",
            self.endpoint, self.model, stream
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        Ok(response)
    }

    fn payload(&self, prompt: &str, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            stream,
        }
    }

    fn fallback(&self, e: LlmError) -> String {
        error!("Completion request failed: {}", e);
        self.fallback_reply.clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one HTTP exchange on localhost and hand back the raw
    /// request that was received.
    pub(crate) async fn serve_once(
        status: &str,
        content_type: &str,
        body: String,
    ) -> (String, JoinHandle<String>) {
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );
        serve_raw(response).await
    }

    /// Like [`serve_once`], but writes `response` verbatim, pauses, then
    /// closes the connection.
    async fn serve_raw(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;

            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.ok();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            socket.shutdown().await.ok();
            request
        });

        (format!("http://{}/v1/chat/completions", addr), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    pub(crate) fn sse_body(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str(&format!(
                "data: {}\n\n",
                serde_json::json!({ "choices": [{ "delta": { "content": chunk } }] })
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    pub(crate) fn client_for(endpoint: &str) -> LlmClient {
        let config = Config {
            api_key: Some("sk-test".to_string()),
            endpoint: endpoint.to_string(),
            ..Config::default()
        };
        LlmClient::new(&config)
    }

    #[test]
    fn payload_carries_model_single_message_and_flags() {
        let client = client_for("http://localhost");
        let payload = serde_json::to_value(client.payload("Hallo", true)).unwrap();

        assert_eq!(payload["model"], "gpt-3.5-turbo");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"], "Hallo");
        assert!((payload["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(payload["stream"], true);
    }

    #[tokio::test]
    async fn streamed_chunks_concatenate_to_reply() {
        let (endpoint, server) =
            serve_once("200 OK", "text/event-stream", sse_body(&["Hel", "lo", "!"])).await;
        let client = client_for(&endpoint);
        let mut chunks = Vec::new();

        let reply = client
            .ask_streaming("Say hello", |chunk| chunks.push(chunk.to_string()))
            .await;

        assert_eq!(chunks, vec!["Hel", "lo", "!"]);
        assert_eq!(reply, chunks.concat());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("\"stream\":true"));
    }

    #[tokio::test]
    async fn malformed_record_does_not_abort_stream() {
        let mut body = sse_body(&["one"]);
        body = body.replace("data: [DONE]\n\n", "data: {broken\n\n");
        body.push_str(&sse_body(&["two"]));
        let (endpoint, _server) = serve_once("200 OK", "text/event-stream", body).await;

        let mut chunks = Vec::new();
        let reply = client_for(&endpoint)
            .ask_streaming("count", |chunk| chunks.push(chunk.to_string()))
            .await;

        assert_eq!(chunks, vec!["one", "two"]);
        assert_eq!(reply, "onetwo");
    }

    #[tokio::test]
    async fn non_streaming_reply_is_extracted() {
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Die Bibliothek öffnet um 8 Uhr." } }]
        })
        .to_string();
        let (endpoint, server) = serve_once("200 OK", "application/json", body).await;

        let reply = client_for(&endpoint).ask("Wann öffnet die Bibliothek?").await;

        assert_eq!(reply, "Die Bibliothek öffnet um 8 Uhr.");
        assert!(server.await.unwrap().contains("\"stream\":false"));
    }

    #[tokio::test]
    async fn error_status_yields_fallback() {
        let (endpoint, _server) = serve_once(
            "401 Unauthorized",
            "application/json",
            r#"{"error":{"message":"bad key"}}"#.to_string(),
        )
        .await;
        let client = client_for(&endpoint);
        let mut chunks = Vec::new();

        let reply = client
            .ask_streaming("hi", |chunk| chunks.push(chunk.to_string()))
            .await;

        assert_eq!(reply, client.fallback_reply());
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn missing_field_yields_fallback() {
        let (endpoint, _server) =
            serve_once("200 OK", "application/json", r#"{"choices":[]}"#.to_string()).await;
        let client = client_for(&endpoint);

        assert_eq!(client.ask("hi").await, client.fallback_reply());
    }

    #[tokio::test]
    async fn empty_content_yields_fallback() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":""}}]}"#;
        let (endpoint, _server) = serve_once("200 OK", "application/json", body.to_string()).await;
        let client = client_for(&endpoint);

        let reply = client.ask("hi").await;

        assert!(!reply.is_empty());
        assert_eq!(reply, client.fallback_reply());
    }

    #[tokio::test]
    async fn dropped_connection_mid_stream_yields_fallback() {
        let partial = sse_body(&["partial"]).replace("data: [DONE]\n\n", "");
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\n\r\n{}",
            partial.len() + 100,
            partial
        );
        let (endpoint, _server) = serve_raw(response).await;
        let client = client_for(&endpoint);
        let mut seen = Vec::new();

        let reply = client
            .ask_streaming("hi", |chunk| seen.push(chunk.to_string()))
            .await;

        assert_eq!(seen, vec!["partial"]);
        assert_eq!(reply, client.fallback_reply());
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_fallback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(&format!("http://{}/v1/chat/completions", addr));

        let reply = client.ask("hi").await;

        assert!(!reply.is_empty());
        assert_eq!(reply, client.fallback_reply());
    }

    #[tokio::test]
    async fn missing_api_key_yields_fallback_without_request() {
        let config = Config {
            api_key: None,
            endpoint: "http://127.0.0.1:9/never".to_string(),
            ..Config::default()
        };
        let mut client = LlmClient::new(&config);
        client.api_key = None;

        assert_eq!(client.ask("hi").await, client.fallback_reply());
    }

    #[tokio::test]
    async fn empty_prompt_issues_no_request() {
        let client = client_for("http://127.0.0.1:9/never");
        assert_eq!(client.ask("   ").await, "");
        assert_eq!(client.ask_streaming("\n", |_| {}).await, "");
    }

    #[tokio::test]
    async fn stream_refuses_empty_prompt() {
        let client = client_for("http://127.0.0.1:9/never");
        assert!(matches!(client.stream("  \t ").await, Err(LlmError::EmptyPrompt)));
    }
}
