use super::chat::{ChatProvider, ChatRequest, ChatResponse, ProviderError};
use crate::error::GearError;
use async_trait::async_trait;
use reqwest::Client;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Auth {
    Bearer(String),
    /// Azure deployments authenticate with an `api-key` header.
    ApiKey(String),
}

/// OpenAI-compatible chat completions endpoint.
///
/// Works with OpenAI itself, Azure OpenAI deployments and servers that speak
/// the same protocol (vLLM, Ollama, OpenRouter, ...). Wrap it in a
/// [`ChatModel`](crate::ChatModel) to get retries, history and cost.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: Client,
    endpoint: String,
    auth: Auth,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: OPENAI_API_URL.to_string(),
            auth: Auth::Bearer(api_key.into()),
        }
    }

    /// Reads `OPENAI_API_KEY`, and `OPENAI_BASE_URL` when set.
    pub fn from_env() -> Result<Self, GearError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            GearError::Configuration("OPENAI_API_KEY is not set".to_string())
        })?;
        let provider = Self::new(key);
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(base) if !base.trim().is_empty() => provider.with_base_url(&base),
            _ => provider,
        })
    }

    /// Targets an Azure OpenAI deployment.
    pub fn azure(
        resource_endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            endpoint: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                resource_endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
            auth: Auth::ApiKey(api_key.into()),
        }
    }

    /// Points at another OpenAI-compatible server, e.g. `http://localhost:8000/v1`.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        self
    }

    /// Uses a preconfigured HTTP client (proxies, custom TLS, ...).
    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let builder = self.http.post(&self.endpoint).json(request);
        let builder = match &self.auth {
            Auth::Bearer(key) => builder.bearer_auth(key),
            Auth::ApiKey(key) => builder.header("api-key", key),
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let provider = OpenAiProvider::new("sk-test");
        assert_eq!(provider.endpoint(), OPENAI_API_URL);
        assert_eq!(provider.auth, Auth::Bearer("sk-test".to_string()));
    }

    #[test]
    fn test_base_url_override() {
        let provider = OpenAiProvider::new("k").with_base_url("http://localhost:8000/v1/");
        assert_eq!(provider.endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_azure_endpoint() {
        let provider =
            OpenAiProvider::azure("https://acme.openai.azure.com/", "gpt4", "2024-02-01", "key");
        assert_eq!(
            provider.endpoint(),
            "https://acme.openai.azure.com/openai/deployments/gpt4/chat/completions?api-version=2024-02-01"
        );
        assert_eq!(provider.auth, Auth::ApiKey("key".to_string()));
    }

    fn empty_request() -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            parameters: serde_json::Map::new(),
        }
    }

    /// Serves one canned HTTP response on a free local port.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // bind a free port, then release it so nothing listens there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = OpenAiProvider::new("k").with_base_url(&format!("http://{addr}/v1"));
        let err = provider.complete(&empty_request()).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_success_response_is_parsed() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 61\r\nconnection: close\r\n\r\n{\"choices\":[{\"message\":{\"role\":\"assistant\",\"content\":\"hi\"}}]}",
        )
        .await;
        let provider = OpenAiProvider::new("k").with_base_url(&base);

        let response = provider.complete(&empty_request()).await.unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_rate_limit_status_is_transient() {
        let base = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 4\r\nconnection: close\r\n\r\nslow",
        )
        .await;
        let provider = OpenAiProvider::new("k").with_base_url(&base);

        let err = provider.complete(&empty_request()).await.unwrap_err();
        assert_eq!(err, ProviderError::RateLimited("slow".to_string()));
        assert!(err.is_transient());
    }
}
