use crate::config::{ApiKey, RemoteConfig};
use crate::poem::{Emotion, PoemOrigin, PoemRequest, PoemSource, RemoteError};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "poem::remote";

const TEMPERATURE: f64 = 0.8;
const MAX_TOKENS: u32 = 300;
const TOP_P: f64 = 0.9;
const FREQUENCY_PENALTY: f64 = 0.3;
const PRESENCE_PENALTY: f64 = 0.3;

const SYSTEM_PROMPT: &str = "You are a tender, emotionally intimate poet. \
Write free verse of 8 to 12 lines, no rhyme scheme and no title. \
Speak in the first person, close and honest, as if the reader confided in you. \
Use concrete images drawn from the body and the everyday world. \
Always end on a quiet note of hope or acceptance. \
Reply with the poem text only.";

fn user_prompt(emotion: &str) -> String {
    format!("Write a poem for someone who is feeling: {emotion}")
}

/// Chat-completion client for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiPoemClient {
    client: Client,
    config: RemoteConfig,
}

impl OpenAiPoemClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// One round trip: no retries, no streaming.
    pub async fn request(&self, emotion: &Emotion, credential: &ApiKey) -> Result<String, RemoteError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_owned(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(emotion.as_str()),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            top_p: TOP_P,
            frequency_penalty: FREQUENCY_PENALTY,
            presence_penalty: PRESENCE_PENALTY,
        };

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(credential.expose())
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let err = match classify_status(status) {
                Some(err) => err,
                None => {
                    // Only the generic case needs the body, and only for its message.
                    let body = response.text().await.unwrap_or_default();
                    service_error(status, &body)
                }
            };
            tracing::debug!(target: LOG_TARGET, status = status.as_u16(), error = %err, "completion rejected");
            return Err(err);
        }

        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        extract_poem(&text)
    }
}

impl PoemSource for OpenAiPoemClient {
    fn origin(&self) -> PoemOrigin {
        PoemOrigin::Remote
    }

    fn compose(&self, request: PoemRequest) -> BoxFuture<'_, Result<String, RemoteError>> {
        async move {
            // Nothing to authorize with, so do not spend a round trip.
            let Some(credential) = request.credential else {
                return Err(RemoteError::Unauthorized);
            };
            self.request(&request.emotion, &credential).await
        }
        .boxed()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn classify_status(status: StatusCode) -> Option<RemoteError> {
    match status {
        StatusCode::UNAUTHORIZED => Some(RemoteError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Some(RemoteError::RateLimited),
        StatusCode::BAD_REQUEST => Some(RemoteError::BadRequest),
        _ => None,
    }
}

fn service_error(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"));
    RemoteError::Service(message)
}

fn extract_poem(body: &str) -> Result<String, RemoteError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        tracing::debug!(target: LOG_TARGET, error = %e, "undecodable completion body");
        RemoteError::EmptyResponse
    })?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .map(|content| content.trim().to_owned())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(RemoteError::EmptyResponse);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accepts a single connection, answers it with the canned response and
    /// hands back the raw request it received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        serve_raw(format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ))
        .await
    }

    /// Like [`serve_once`] but writes `response` byte for byte, so headers
    /// may promise more body than is sent.
    async fn serve_raw(response: String) -> (String, JoinHandle<String>) {
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
                if request_complete(&raw) {
                    break;
                }
            }
            // The client may hang up as soon as it has the status line.
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            String::from_utf8(raw).unwrap()
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..split]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= split + 4 + content_length
    }

    fn client_for(base_url: &str) -> OpenAiPoemClient {
        OpenAiPoemClient::new(RemoteConfig::new(base_url, "test-model").unwrap())
    }

    fn emotion() -> Emotion {
        Emotion::new("quietly hopeful").unwrap()
    }

    fn key() -> ApiKey {
        ApiKey::new("sk-test").unwrap()
    }

    #[tokio::test]
    async fn success_returns_trimmed_first_choice() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"\n  the light returns\n"}},{"message":{"content":"second"}}]}"#,
        )
        .await;

        let poem = client_for(&url).request(&emotion(), &key()).await.unwrap();
        assert_eq!(poem, "the light returns");

        let raw = server.await.unwrap();
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("POST /v1/chat/completions"));
        assert!(head.to_lowercase().contains("authorization: bearer sk-test"));

        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("quietly hopeful"));
        assert_eq!(json["temperature"], 0.8);
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["top_p"], 0.9);
        assert_eq!(json["frequency_penalty"], 0.3);
        assert_eq!(json["presence_penalty"], 0.3);
    }

    #[tokio::test]
    async fn status_codes_are_classified() {
        let cases = [
            ("401 Unauthorized", RemoteError::Unauthorized),
            ("429 Too Many Requests", RemoteError::RateLimited),
            ("400 Bad Request", RemoteError::BadRequest),
        ];
        for (status_line, expected) in cases {
            let (url, server) = serve_once(status_line, r#"{"error":{"message":"nope"}}"#).await;
            let err = client_for(&url).request(&emotion(), &key()).await.unwrap_err();
            assert_eq!(err, expected);
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn truncated_rejection_body_keeps_status_classification() {
        let cases = [
            ("401 Unauthorized", RemoteError::Unauthorized),
            ("429 Too Many Requests", RemoteError::RateLimited),
            ("400 Bad Request", RemoteError::BadRequest),
        ];
        for (status_line, expected) in cases {
            let (url, server) = serve_raw(format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: 500\r\nConnection: close\r\n\r\n{{\"error\":"
            ))
            .await;
            let err = client_for(&url).request(&emotion(), &key()).await.unwrap_err();
            assert_eq!(err, expected);
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn truncated_service_error_body_gets_generic_message() {
        let (url, server) = serve_raw(
            "HTTP/1.1 502 Bad Gateway\r\nContent-Length: 500\r\nConnection: close\r\n\r\n{\"err".to_owned(),
        )
        .await;
        let err = client_for(&url).request(&emotion(), &key()).await.unwrap_err();
        assert_eq!(err, RemoteError::Service("HTTP 502 Bad Gateway".to_owned()));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn other_failures_carry_server_message() {
        let (url, server) = serve_once(
            "500 Internal Server Error",
            r#"{"error":{"message":"The server had an error"}}"#,
        )
        .await;
        let err = client_for(&url).request(&emotion(), &key()).await.unwrap_err();
        assert_eq!(err, RemoteError::Service("The server had an error".to_owned()));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn other_failures_without_message_get_generic_one() {
        let (url, server) = serve_once("503 Service Unavailable", "").await;
        let err = client_for(&url).request(&emotion(), &key()).await.unwrap_err();
        assert_eq!(err, RemoteError::Service("HTTP 503 Service Unavailable".to_owned()));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn blank_or_missing_content_is_empty_response() {
        for body in [
            r#"{"choices":[{"message":{"content":"   \n"}}]}"#,
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{}}]}"#,
            "not json",
        ] {
            let (url, server) = serve_once("200 OK", body).await;
            let err = client_for(&url).request(&emotion(), &key()).await.unwrap_err();
            assert_eq!(err, RemoteError::EmptyResponse, "body: {body}");
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{addr}/v1"))
            .request(&emotion(), &key())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)), "{err:?}");
    }

    #[tokio::test]
    async fn compose_without_credential_skips_the_network() {
        // Nothing is listening here; reaching the network would yield Network.
        let client = client_for("http://127.0.0.1:9/v1");
        let err = client
            .compose(PoemRequest {
                emotion: emotion(),
                credential: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Unauthorized);
    }
}
