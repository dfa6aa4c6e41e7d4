//! # Ark Gateway
//!
//! HTTP client for the Volcengine Ark chat-completions API. Sends the image as
//! a base64 data URI alongside the prompt and returns the first choice's text.

use super::payload::{ChatCompletionRequest, ChatCompletionResponse};
use super::{AnalysisGateway, AnalysisRequest};
use crate::config::GatewayConfig;
use crate::error::{AnalyzerError, AnalyzerResult};
use async_trait::async_trait;
use reqwest::{header, Client, Url};
use std::time::Instant;
use tracing::{debug, error, info};

pub struct ArkGateway {
    client: Client,
    endpoint: Url,
    model_id: String,
    temperature: f32,
    max_tokens: u32,
}

impl std::fmt::Debug for ArkGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArkGateway")
            .field("endpoint", &self.endpoint.as_str())
            .field("model_id", &self.model_id)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ArkGateway {
    /// Create a new gateway client from configuration
    pub fn new(config: &GatewayConfig) -> AnalyzerResult<Self> {
        let base_url = config.resolved_base_url();
        let endpoint = Url::parse(&format!("{base_url}/chat/completions")).map_err(|e| {
            AnalyzerError::ConfigurationError(format!("Invalid base URL '{base_url}': {e}"))
        })?;

        if config.api_key.is_empty() {
            return Err(AnalyzerError::ConfigurationError(
                "gateway.api_key is empty; set it in the config file or ARCHVIEW_API_KEY"
                    .to_string(),
            ));
        }

        let mut default_headers = header::HeaderMap::new();
        let mut auth_value = header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| AnalyzerError::ConfigurationError(format!("Invalid API key: {e}")))?;
        auth_value.set_sensitive(true);
        default_headers.insert(header::AUTHORIZATION, auth_value);

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("archview-core/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers)
            .build()
            .map_err(|e| {
                AnalyzerError::ConfigurationError(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            endpoint = %endpoint,
            model_id = %config.model_id,
            timeout_seconds = config.timeout_seconds,
            "Created ArkGateway"
        );

        Ok(Self {
            client,
            endpoint,
            model_id: config.model_id.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisGateway for ArkGateway {
    async fn analyze(&self, request: AnalysisRequest) -> AnalyzerResult<String> {
        let body = ChatCompletionRequest::multimodal(
            &self.model_id,
            &request.prompt,
            &request.image_format,
            &request.image_bytes,
            self.temperature,
            self.max_tokens,
        );

        debug!(
            endpoint = %self.endpoint,
            image_bytes = request.image_bytes.len(),
            image_format = %request.image_format,
            "Calling analysis provider"
        );

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalyzerError::computation(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                status = status.as_u16(),
                "Analysis provider request failed: {}", error_text
            );
            return Err(AnalyzerError::computation(format!(
                "Provider returned {status}: {error_text}"
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            AnalyzerError::computation(format!("Failed to parse provider response: {e}"))
        })?;

        let content = completion
            .first_content()
            .ok_or_else(|| AnalyzerError::computation("Provider response contained no text"))?
            .to_string();

        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            response_chars = content.chars().count(),
            "Analysis provider call completed"
        );

        Ok(content)
    }

    fn name(&self) -> &'static str {
        "ark"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn gateway_config(base_url: &str) -> GatewayConfig {
        GatewayConfig {
            base_url: Some(base_url.to_string()),
            api_key: "secret-key".to_string(),
            model_id: "vision-test".to_string(),
            timeout_seconds: 5,
            ..GatewayConfig::default()
        }
    }

    fn sample_request() -> AnalysisRequest {
        AnalysisRequest {
            image_bytes: Arc::from(&b"\x89PNG fake"[..]),
            image_format: "png".to_string(),
            prompt: "describe the diagram".to_string(),
        }
    }

    /// Serve exactly one HTTP response and hand back the raw request
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
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
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });

        (format!("http://{addr}/api/v3"), handle)
    }

    #[test]
    fn test_requires_api_key() {
        let mut config = gateway_config("http://localhost:1/api/v3");
        config.api_key.clear();
        let err = ArkGateway::new(&config).unwrap_err();
        assert!(matches!(err, AnalyzerError::ConfigurationError(_)));
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ArkGateway::new(&gateway_config("not a url")).unwrap_err();
        assert!(matches!(err, AnalyzerError::ConfigurationError(_)));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let gateway = ArkGateway::new(&gateway_config("http://localhost:1/api/v3")).unwrap();
        let rendered = format!("{gateway:?}");
        assert!(!rendered.contains("secret-key"));
        assert_eq!(
            gateway.endpoint().as_str(),
            "http://localhost:1/api/v3/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_successful_call() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"API gateway calls two services."}}]}"#,
        )
        .await;

        let gateway = ArkGateway::new(&gateway_config(&base_url)).unwrap();
        let text = gateway.analyze(sample_request()).await.unwrap();
        assert_eq!(text, "API gateway calls two services.");

        let raw_request = server.await.unwrap();
        assert!(raw_request.starts_with("POST /api/v3/chat/completions"));
        assert!(raw_request
            .to_ascii_lowercase()
            .contains("authorization: bearer secret-key"));
        assert!(raw_request.contains("data:image/png;base64,"));
        assert!(raw_request.contains("describe the diagram"));
    }

    #[tokio::test]
    async fn test_provider_error_status() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 429 Too Many Requests",
            r#"{"error":{"message":"rate limited"}}"#,
        )
        .await;

        let gateway = ArkGateway::new(&gateway_config(&base_url)).unwrap();
        let err = gateway.analyze(sample_request()).await.unwrap_err();
        match err {
            AnalyzerError::ComputationError(message) => {
                assert!(message.contains("429"));
                assert!(message.contains("rate limited"));
            }
            other => panic!("expected computation error, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", r#"{"choices":[]}"#).await;

        let gateway = ArkGateway::new(&gateway_config(&base_url)).unwrap();
        let err = gateway.analyze(sample_request()).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::ComputationError(_)));
        server.await.unwrap();
    }
}
