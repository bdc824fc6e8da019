//! OpenAI-compatible chat client
//!
//! Every supported vendor (hosted or local) speaks the same
//! `POST {base_url}/chat/completions` protocol, so one client covers
//! them all once credentials are resolved.

use agent_core::{
    credentials::{ClientSettings, CredentialResolver, EnvSnapshot, LlmOptions, ResolvedCredentials},
    error::{AgentError, Result},
    message::Message,
    provider::{
        text_fragments, Completion, CompletionStream, FinishReason, GenerationOptions,
        LlmProvider, StreamChunk, TextStream, TokenUsage,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::sse::decode_stream;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one `data:` payload. Malformed payloads are skipped.
pub(crate) fn parse_stream_data(data: &str) -> Option<StreamChunk> {
    let event: ChatStreamEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable stream event");
            return None;
        }
    };

    let delta = event
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();

    Some(StreamChunk {
        delta,
        done: false,
        usage: event.usage,
    })
}

/// Client for any OpenAI-compatible endpoint
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    credentials: ResolvedCredentials,
    settings: ClientSettings,
}

impl OpenAiCompatProvider {
    /// Resolve credentials from `options` and `env`, then build the client
    pub fn new(options: &LlmOptions, env: &EnvSnapshot) -> Result<Self> {
        let resolver = CredentialResolver::new(env);
        let credentials = resolver.resolve(options)?;
        let settings = resolver.settings(options);
        Self::with_credentials(credentials, settings)
    }

    /// Resolve everything from the process environment
    pub fn from_env() -> Result<Self> {
        Self::new(&LlmOptions::default(), &EnvSnapshot::from_process())
    }

    pub fn with_credentials(credentials: ResolvedCredentials, settings: ClientSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AgentError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            provider = %credentials.provider,
            model = %credentials.model,
            base_url = %credentials.base_url,
            "Model client ready"
        );

        Ok(Self {
            http,
            credentials,
            settings,
        })
    }

    pub fn credentials(&self) -> &ResolvedCredentials {
        &self.credentials
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.credentials.base_url.trim_end_matches('/'), path)
    }

    fn request_body(&self, messages: &[Message], options: &GenerationOptions, stream: bool) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": options.model.as_deref().unwrap_or(&self.credentials.model),
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.settings.temperature),
        });

        if let Some(max_tokens) = options.max_tokens.or(self.settings.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }
        if !options.stop_sequences.is_empty() {
            body["stop"] = json!(options.stop_sequences);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn post_chat(&self, body: &Value) -> Result<reqwest::Response> {
        let url = self.endpoint("chat/completions");
        tracing::debug!(%url, "POST chat completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.credentials.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        tracing::error!(%status, body = %text, "Chat completion rejected");
        Err(AgentError::Provider(format!("status {}: {}", status, text)))
    }

    /// One blocking call returning the full reply text
    pub async fn invoke(&self, messages: &[Message], options: &GenerationOptions) -> Result<String> {
        self.complete(messages, options)
            .await
            .map(|c| c.content)
            .map_err(AgentError::into_model_call)
    }

    /// Stream reply text fragments in arrival order
    pub async fn think(&self, messages: &[Message], options: &GenerationOptions) -> Result<TextStream> {
        let stream = self
            .complete_stream(messages, options)
            .await
            .map_err(AgentError::into_model_call)?;
        Ok(Box::pin(
            text_fragments(stream).map(|item| item.map_err(AgentError::into_model_call)),
        ))
    }
}

fn into_completion(response: ChatResponse, fallback_model: &str) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::Provider("response contained no choices".into()))?;

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        model: response.model.unwrap_or_else(|| fallback_model.to_string()),
        usage: response.usage,
        finish_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.credentials.provider.as_str()
    }

    fn default_model(&self) -> &str {
        &self.credentials.model
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .http
            .get(self.endpoint("models"))
            .bearer_auth(&self.credentials.api_key)
            .send()
            .await;

        match response {
            Ok(r) => Ok(r.status().is_success()),
            Err(e) => {
                tracing::warn!(provider = %self.credentials.provider, "Health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let body = self.request_body(messages, options, false);
        let response = self.post_chat(&body).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("invalid completion body: {}", e)))?;

        let model = options.model.as_deref().unwrap_or(&self.credentials.model);
        into_completion(parsed, model)
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let body = self.request_body(messages, options, true);
        let response = self.post_chat(&body).await?;
        Ok(decode_stream(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::credentials::ProviderKind;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn ollama_env() -> EnvSnapshot {
        EnvSnapshot::empty().with("OLLAMA_HOST", "http://localhost:11434/v1/")
    }

    #[test]
    fn test_new_resolves_from_snapshot() {
        let provider = OpenAiCompatProvider::new(&LlmOptions::new(), &ollama_env()).unwrap();

        assert_eq!(provider.credentials().provider, ProviderKind::Ollama);
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.credentials().api_key, "ollama");
        assert_eq!(
            provider.endpoint("chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_new_propagates_configuration_errors() {
        let result = OpenAiCompatProvider::new(&LlmOptions::new(), &EnvSnapshot::empty());
        assert!(matches!(result, Err(AgentError::Configuration(_))));
    }

    #[test]
    fn test_request_body_defaults_and_overrides() {
        let provider = OpenAiCompatProvider::new(
            &LlmOptions::new().model("llama3.2").max_tokens(256),
            &ollama_env(),
        )
        .unwrap();
        let messages = vec![Message::system("Be brief."), Message::user("Hi")];

        let body = provider.request_body(&messages, &GenerationOptions::default(), false);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hi");
        assert_eq!(body["max_tokens"], 256);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!(body.get("stream").is_none());
        assert!(body.get("stop").is_none());

        let options = GenerationOptions {
            stop_sequences: vec!["Observation:".into()],
            ..GenerationOptions::default()
        }
        .with_model("qwen2.5")
        .with_temperature(0.0);
        let body = provider.request_body(&messages, &options, true);
        assert_eq!(body["model"], "qwen2.5");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["stop"][0], "Observation:");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_completion_from_response() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "model": "deepseek-chat",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
        }"#;
        let completion = into_completion(serde_json::from_str(raw).unwrap(), "fallback").unwrap();

        assert_eq!(completion.content, "Hi!");
        assert_eq!(completion.model, "deepseek-chat");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.unwrap().total_tokens, 11);
    }

    #[test]
    fn test_completion_without_choices_is_an_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            into_completion(parsed, "m"),
            Err(AgentError::Provider(_))
        ));
    }

    /// Read one HTTP request (headers plus `Content-Length` body)
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer a single request with `response`, returning the request text
    async fn serve_once(response: String) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });
        (addr, handle)
    }

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        )
    }

    fn local_provider(addr: SocketAddr) -> OpenAiCompatProvider {
        let options = LlmOptions::new()
            .provider("custom")
            .api_key("test-key")
            .base_url(format!("http://{}/v1", addr))
            .model("local-model")
            .timeout(5);
        OpenAiCompatProvider::new(&options, &EnvSnapshot::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_invoke_returns_reply_text() {
        let body = r#"{"model":"local-model","choices":[{"message":{"role":"assistant","content":"Paris."},"finish_reason":"stop"}]}"#;
        let (addr, server) = serve_once(http_response("200 OK", "application/json", body)).await;
        let provider = local_provider(addr);

        let reply = provider
            .invoke(&[Message::user("Capital of France?")], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "Paris.");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer test-key"));
        assert!(request.contains(r#""model":"local-model""#));
    }

    #[tokio::test]
    async fn test_invoke_rejected_status_is_model_call_error() {
        let (addr, server) = serve_once(http_response(
            "500 Internal Server Error",
            "text/plain",
            "upstream exploded",
        ))
        .await;
        let provider = local_provider(addr);

        let err = provider
            .invoke(&[Message::user("Hi")], &GenerationOptions::default())
            .await
            .unwrap_err();
        match err {
            AgentError::ModelCall(msg) => {
                assert!(msg.contains("500"), "{}", msg);
                assert!(msg.contains("upstream exploded"), "{}", msg);
            }
            other => panic!("expected ModelCall, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_invoke_unreachable_endpoint_is_model_call_error() {
        // Bind then release a port so nothing is listening on it
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let provider = local_provider(addr);

        let err = provider
            .invoke(&[Message::user("Hi")], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelCall(_)), "{:?}", err);

        let err = provider
            .think(&[Message::user("Hi")], &GenerationOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::ModelCall(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_think_streams_fragments_in_order() {
        let events = [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":", world"}}]}"#,
            "data: [DONE]",
        ];
        let body = events.join("\n\n") + "\n\n";
        let (addr, server) = serve_once(http_response("200 OK", "text/event-stream", &body)).await;
        let provider = local_provider(addr);

        let fragments: Vec<String> = provider
            .think(&[Message::user("Greet me")], &GenerationOptions::default())
            .await
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hel", "lo", ", world"]);

        let request = server.await.unwrap();
        assert!(request.contains(r#""stream":true"#));
    }

    #[tokio::test]
    async fn test_think_rejected_status_is_model_call_error() {
        let (addr, server) = serve_once(http_response(
            "401 Unauthorized",
            "application/json",
            r#"{"error":"bad key"}"#,
        ))
        .await;
        let provider = local_provider(addr);

        let err = provider
            .think(&[Message::user("Hi")], &GenerationOptions::default())
            .await
            .err()
            .unwrap();
        match err {
            AgentError::ModelCall(msg) => assert!(msg.contains("401"), "{}", msg),
            other => panic!("expected ModelCall, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[test]
    fn test_parse_stream_data() {
        let chunk = parse_stream_data(r#"{"choices":[{"delta":{"content":"tok"}}]}"#).unwrap();
        assert_eq!(chunk.delta, "tok");
        assert!(!chunk.done);

        let role_only = parse_stream_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(role_only.delta, "");

        assert!(parse_stream_data("not json").is_none());
    }
}
