//! HTTP client adapter for the platform REST API.
//!
//! ```text
//! caller ──► ApiClient::request ──► CredentialProvider (bearer token)
//!                 │
//!                 ▼
//!            reqwest ──► 2xx: decode JSON
//!                     ├─► 401 on an authenticated call: UnauthorizedHandler, ApiError::Unauthorized
//!                     ├─► other status: ApiError::Status { backend message }
//!                     └─► transport failure: ApiError::Network
//! ```
//!
//! The client is a plain value handed to whoever needs it. There is one
//! credential source and one 401 hook per client.

pub mod backend;
pub mod types;

use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;

pub use backend::{AuthApi, ChatApi, DocumentApi};

/// Supplies the bearer token for outgoing requests.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<SecretString>;
}

/// Called once for every authenticated request answered with HTTP 401.
pub trait UnauthorizedHandler: Send + Sync {
    fn on_unauthorized(&self);
}

/// Whether a request carries the session credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Auth {
    Bearer,
    Anonymous,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
    unauthorized: Arc<dyn UnauthorizedHandler>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        config: &ApiConfig,
        credentials: Arc<dyn CredentialProvider>,
        unauthorized: Arc<dyn UnauthorizedHandler>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("lexdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            credentials,
            unauthorized,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Build a request, injecting the bearer token when `auth` asks for it.
    ///
    /// Returns whether a credential was actually attached, which decides if a
    /// 401 means "session expired" or just "bad credentials".
    pub(crate) fn request(&self, method: Method, path: &str, auth: Auth) -> (RequestBuilder, bool) {
        tracing::debug!(%method, path, "API request");
        let mut builder = self.http.request(method, self.url(path));
        let mut authenticated = false;
        if auth == Auth::Bearer
            && let Some(token) = self.credentials.bearer_token()
        {
            builder = builder.bearer_auth(token.expose_secret());
            authenticated = true;
        }
        (builder, authenticated)
    }

    /// Send and map the status. Successful responses are returned untouched.
    pub(crate) async fn execute(
        &self,
        builder: RequestBuilder,
        authenticated: bool,
    ) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED && authenticated {
            tracing::warn!("Authenticated request rejected with 401, ending session");
            self.unauthorized.on_unauthorized();
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let message = backend_message(&body);
        tracing::debug!(status = status.as_u16(), %message, "API request failed");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let (builder, authenticated) = self.request(Method::GET, path, Auth::Bearer);
        let response = self.execute(builder.query(query), authenticated).await?;
        decode(response).await
    }

    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        auth: Auth,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (builder, authenticated) = self.request(method, path, auth);
        let response = self.execute(builder.json(body), authenticated).await?;
        decode(response).await
    }

    /// Like [`send_json`](Self::send_json) but ignores the response body.
    pub(crate) async fn send_unit<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        auth: Auth,
    ) -> Result<(), ApiError>
    where
        B: Serialize + ?Sized,
    {
        let (mut builder, authenticated) = self.request(method, path, auth);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder, authenticated).await?;
        Ok(())
    }

    pub(crate) async fn send_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T, ApiError> {
        let (builder, authenticated) = self.request(Method::POST, path, Auth::Bearer);
        let response = self.execute(builder.multipart(form), authenticated).await?;
        decode(response).await
    }

    pub(crate) async fn get_bytes(&self, path: &str) -> Result<Bytes, ApiError> {
        let (builder, authenticated) = self.request(Method::GET, path, Auth::Bearer);
        let response = self.execute(builder, authenticated).await?;
        Ok(response.bytes().await?)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Pull a human-readable message out of an error body.
///
/// Backends answer `{"message": ...}`, `{"error": ...}` or plain text.
pub(crate) fn backend_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "msg"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.trim().to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.starts_with('<') {
        // HTML error pages from proxies are not worth showing.
        return String::new();
    }
    trimmed.chars().take(300).collect()
}
