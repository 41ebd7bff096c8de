use crate::credential_store::CredentialStore;
use crate::errors::{ApiError, ErrorClass};
use crate::models::{AuthResult, LoginCredentials, LoginRequest, UserProfile};
use crate::session::SessionManager;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeResult {
    Success,
    Failure {
        status: Option<u16>,
        class: ErrorClass,
        message: String,
    },
}

/// Result of one completed network operation, as seen by subscribers.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub operation: String,
    pub result: OutcomeResult,
    pub completed_at: DateTime<Utc>,
}

impl OperationOutcome {
    pub fn success(operation: &str) -> Self {
        OperationOutcome {
            operation: operation.to_string(),
            result: OutcomeResult::Success,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(operation: &str, error: &ApiError) -> Self {
        OperationOutcome {
            operation: operation.to_string(),
            result: OutcomeResult::Failure {
                status: error.status(),
                class: error.class(),
                message: error.to_string(),
            },
            completed_at: Utc::now(),
        }
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self.result,
            OutcomeResult::Failure {
                class: ErrorClass::AuthenticationFailure,
                ..
            }
        )
    }
}

/// Broadcast stream of every completed network operation.
#[derive(Debug, Clone)]
pub struct OutcomeBus {
    sender: broadcast::Sender<OperationOutcome>,
}

impl Default for OutcomeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        OutcomeBus { sender }
    }

    pub fn publish(&self, outcome: OperationOutcome) {
        // No subscribers is fine; the outcome is simply dropped
        let _ = self.sender.send(outcome);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperationOutcome> {
        self.sender.subscribe()
    }
}

/// The login operation of the network layer.
pub trait AuthApi: Send + Sync {
    fn login(
        &self,
        credentials: &LoginCredentials,
    ) -> impl Future<Output = Result<AuthResult, ApiError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

pub struct ApiClient<S> {
    client: Client,
    base_url: Url,
    retry_count: u32,
    session: SessionManager<S>,
    outcomes: OutcomeBus,
}

impl<S: CredentialStore> ApiClient<S> {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        retry_count: u32,
        session: SessionManager<S>,
        outcomes: OutcomeBus,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(format!("session-gate/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(ApiClient {
            client,
            base_url: normalize_base_url(base_url)?,
            retry_count,
            session,
            outcomes,
        })
    }

    pub fn outcomes(&self) -> &OutcomeBus {
        &self.outcomes
    }

    /// Authenticated GET; the stored token goes into the `Authorization` header as-is.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let result = self.get_json_inner(path).await;
        self.publish(path, &result);
        result
    }

    async fn get_json_inner<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let token = self.session.token().await?.ok_or(ApiError::MissingToken)?;
        let url = self.base_url.join(path)?;

        let response = self
            .send_with_retry(|| {
                self.client
                    .get(url.clone())
                    .header(AUTHORIZATION, token.expose_secret().as_str())
            })
            .await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn login_inner(&self, credentials: &LoginCredentials) -> Result<AuthResult, ApiError> {
        let url = self.base_url.join("login")?;
        let body = LoginRequest {
            site_engineer: credentials,
        };

        let response = self
            .send_with_retry(|| self.client.post(url.clone()).json(&body))
            .await?;
        let response = check_status(response).await?;

        let token = response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| SecretString::new(v.to_string()))
            .ok_or(ApiError::MissingAuthorizationHeader)?;

        let bytes = response.bytes().await?;
        let user: UserProfile = serde_json::from_slice(&bytes)?;

        Ok(AuthResult { token, user })
    }

    /// Retries only failures that never produced an HTTP status.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.status().is_none() && attempt < self.retry_count => {
                    attempt += 1;
                    tracing::warn!("Request failed ({}), retrying ({}/{})", e, attempt, self.retry_count);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn publish<T>(&self, operation: &str, result: &Result<T, ApiError>) {
        let outcome = match result {
            Ok(_) => OperationOutcome::success(operation),
            Err(e) => OperationOutcome::failure(operation, e),
        };
        self.outcomes.publish(outcome);
    }
}

impl<S: CredentialStore> AuthApi for ApiClient<S> {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResult, ApiError> {
        let result = self.login_inner(credentials).await;
        self.publish("login", &result);
        result
    }
}

/// Makes `join` append to the base path instead of replacing its last segment.
fn normalize_base_url(base_url: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message: error_message(status.canonical_reason(), &text),
    })
}

/// Server-provided `error` field, falling back to the status text.
fn error_message(reason: Option<&str>, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| reason.unwrap_or("Request failed").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_store::MemoryStore;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers a single request with `response`, returning the raw request text.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + content_length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (format!("http://{}/api/v1", addr), handle)
    }

    fn http_response(status_line: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\n{}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            extra_headers,
            body.len(),
            body
        )
    }

    fn client(base_url: &str, retry_count: u32) -> (ApiClient<MemoryStore>, SessionManager<MemoryStore>) {
        let session = SessionManager::new(Arc::new(MemoryStore::new()));
        let client = ApiClient::new(
            base_url,
            Duration::from_secs(5),
            retry_count,
            session.clone(),
            OutcomeBus::new(),
        )
        .unwrap();
        (client, session)
    }

    #[test]
    fn test_normalize_base_url_keeps_last_segment() {
        let url = normalize_base_url("http://localhost:3000/api/v1").unwrap();
        assert_eq!(
            url.join("login").unwrap().as_str(),
            "http://localhost:3000/api/v1/login"
        );
    }

    #[test]
    fn test_error_message_prefers_server_field() {
        assert_eq!(
            error_message(Some("Unauthorized"), r#"{"error":"Invalid email or password"}"#),
            "Invalid email or password"
        );
        assert_eq!(error_message(Some("Unauthorized"), "<html>"), "Unauthorized");
        assert_eq!(error_message(None, ""), "Request failed");
    }

    #[test]
    fn test_outcome_classification() {
        let denied = ApiError::Status {
            status: 403,
            message: "Forbidden".to_string(),
        };
        assert!(OperationOutcome::failure("projects", &denied).is_authentication_failure());

        let broken = ApiError::Status {
            status: 502,
            message: "Bad Gateway".to_string(),
        };
        assert!(!OperationOutcome::failure("projects", &broken).is_authentication_failure());
        assert!(!OperationOutcome::success("projects").is_authentication_failure());
    }

    #[tokio::test]
    async fn test_login_reads_token_from_authorization_header() {
        let (base_url, server) = serve_once(http_response(
            "200 OK",
            "Authorization: Bearer abc\r\n",
            r#"{"id":3,"is_auto_reference":true}"#,
        ))
        .await;
        let (client, _) = client(&base_url, 0);
        let mut outcomes = client.outcomes().subscribe();

        let result = client
            .login(&LoginCredentials::new("a@example.com", "secret1"))
            .await
            .unwrap();

        assert_eq!(result.token.expose_secret(), "Bearer abc");
        assert!(result.user.is_auto_reference);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v1/login"));
        assert!(request.contains(r#""site_engineer""#));

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.operation, "login");
        assert_eq!(outcome.result, OutcomeResult::Success);
    }

    #[tokio::test]
    async fn test_login_failure_carries_status_and_server_message() {
        let (base_url, _server) = serve_once(http_response(
            "401 Unauthorized",
            "",
            r#"{"error":"Invalid email or password"}"#,
        ))
        .await;
        let (client, _) = client(&base_url, 0);

        let err = client
            .login(&LoginCredentials::new("a@example.com", "secret1"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(
            err.to_string(),
            "Request failed with status 401: Invalid email or password"
        );
    }

    #[tokio::test]
    async fn test_login_without_authorization_header_fails() {
        let (base_url, _server) = serve_once(http_response("200 OK", "", r#"{"id":3}"#)).await;
        let (client, _) = client(&base_url, 0);

        let err = client
            .login(&LoginCredentials::new("a@example.com", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingAuthorizationHeader));
    }

    #[tokio::test]
    async fn test_get_json_without_token_is_authentication_failure() {
        let (client, _) = client("http://127.0.0.1:9/api", 0);
        let mut outcomes = client.outcomes().subscribe();

        let err = client
            .get_json::<serde_json::Value>("projects")
            .await
            .unwrap_err();

        assert!(err.is_authentication_failure());
        assert!(outcomes.recv().await.unwrap().is_authentication_failure());
    }

    #[tokio::test]
    async fn test_get_json_sends_stored_token() {
        let (base_url, server) =
            serve_once(http_response("200 OK", "", r#"[{"id":1}]"#)).await;
        let (client, session) = client(&base_url, 0);
        session
            .establish(&SecretString::new("Bearer xyz".to_string()), &UserProfile::default())
            .await
            .unwrap();

        let body: serde_json::Value = client.get_json("projects").await.unwrap();
        assert_eq!(body[0]["id"], 1);

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /api/v1/projects"));
        assert!(request.contains("authorization: bearer xyz"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (client, _) = client(&format!("http://{}/api", addr), 1);
        let err = client
            .login(&LoginCredentials::new("a@example.com", "secret1"))
            .await
            .unwrap_err();

        assert!(err.is_transport_failure());
        assert_eq!(err.class(), ErrorClass::NetworkFailure);
    }
}
