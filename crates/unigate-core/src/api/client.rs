//! Session client for the university portal REST API.
//!
//! `SessionClient` owns the persisted credentials and performs every
//! request that needs identity. An authenticated request that comes back
//! 401 triggers one token refresh and one retry; the retry's outcome is
//! final.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{CredentialStore, StoreError, StoreKey};
use crate::config::{Config, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::models::{
    Credential, DashboardStats, LoginEnvelope, LoginResponse, RegistrationForm, Session,
    UserProfile,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Authentication endpoint; also the target of the connectivity probe
pub const LOGIN_PATH: &str = "/accounts/login/";

pub const REGISTER_PATH: &str = "/accounts/register/";

pub const REFRESH_PATH: &str = "/token/refresh/";

pub const DASHBOARD_STATS_PATH: &str = "/accounts/dashboard-stats/";

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// One authenticated call: method, path relative to the base URL,
/// optional JSON body and extra headers.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    headers: HeaderMap,
}

impl AuthRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header. `Authorization` is always replaced by the session token.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub struct SessionClientBuilder {
    base_url: String,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl SessionClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.base_url.clone())
            .request_timeout(config.request_timeout())
            .probe_timeout(config.probe_timeout())
    }

    /// Hard limit on every login, registration, refresh and resource call
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn build<S: CredentialStore>(self, store: S) -> Result<SessionClient<S>, ApiError> {
        let client = Client::builder().timeout(self.request_timeout).build()?;

        Ok(SessionClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            probe_timeout: self.probe_timeout,
            store: Arc::new(store),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }
}

/// Authenticated API session client.
///
/// Clone is cheap: clones share the connection pool, the credential store
/// and the refresh lock.
pub struct SessionClient<S> {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
    store: Arc<S>,
    /// Serializes token refreshes across concurrent requests
    refresh_lock: Arc<Mutex<()>>,
}

impl<S> Clone for SessionClient<S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            probe_timeout: self.probe_timeout,
            store: Arc::clone(&self.store),
            refresh_lock: Arc::clone(&self.refresh_lock),
        }
    }
}

impl<S: CredentialStore> SessionClient<S> {
    /// Client with default timeouts
    pub fn new(base_url: impl Into<String>, store: S) -> Result<Self, ApiError> {
        SessionClientBuilder::new(base_url).build(store)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    // ===== Session state =====

    /// Read a slot; an empty string counts as absent
    fn read(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        Ok(self.store.get(key)?.filter(|value| !value.is_empty()))
    }

    /// Cached profile of the logged-in user
    pub fn current_user(&self) -> Result<Option<UserProfile>, StoreError> {
        match self.read(StoreKey::User)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stored session, if both tokens are present
    pub fn session(&self) -> Result<Option<Session>, StoreError> {
        let access = self.read(StoreKey::AccessToken)?;
        let refresh = self.read(StoreKey::RefreshToken)?;
        let credential = match (access, refresh) {
            (Some(access), Some(refresh)) => Credential { access, refresh },
            _ => return Ok(None),
        };

        let user = match self.current_user() {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Cached user profile unreadable");
                None
            }
        };

        Ok(Some(Session { credential, user }))
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.session(), Ok(Some(_)))
    }

    fn store_session(&self, envelope: &LoginEnvelope) -> Result<(), StoreError> {
        let profile = serde_json::to_string(&envelope.user)?;

        let result = self
            .store
            .set(StoreKey::AccessToken, &envelope.access)
            .and_then(|_| self.store.set(StoreKey::RefreshToken, &envelope.refresh))
            .and_then(|_| self.store.set(StoreKey::User, &profile));

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session, rolling back");
            if let Err(clear_err) = self.clear_session() {
                warn!(error = %clear_err, "Failed to roll back partial session");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Delete all three session slots.
    ///
    /// Every slot is attempted; the first failure is returned.
    pub fn clear_session(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in StoreKey::ALL {
            if let Err(e) = self.store.delete(key) {
                warn!(key = %key, error = %e, "Failed to delete stored credential");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ===== Operations =====

    /// Probe the login endpoint with a bodyless OPTIONS request.
    ///
    /// Never fails: any transport error or non-success status is `false`.
    pub async fn check_connectivity(&self) -> bool {
        let result = self
            .client
            .request(Method::OPTIONS, self.url(LOGIN_PATH))
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                debug!(status = status.as_u16(), "Connectivity probe answered");
                status.is_success()
            }
            Err(e) => {
                warn!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }

    /// Log in and persist the resulting session
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginEnvelope, ApiError> {
        info!(username, "Attempting login");

        if !self.check_connectivity().await {
            return Err(ApiError::Connection);
        }

        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;

        let (status, body) = read_response(response).await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Login rejected");
            return Err(ApiError::from_login_failure(status, &body));
        }

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))?;
        let envelope = parsed
            .into_envelope()
            .map_err(|reason| ApiError::InvalidResponse(reason.to_string()))?;

        self.store_session(&envelope)?;

        info!(username = %envelope.user.username, role = %envelope.user.role, "Login successful");
        Ok(envelope)
    }

    /// Create an account. Does not start a session.
    pub async fn register(&self, form: &RegistrationForm) -> Result<Value, ApiError> {
        info!(username = %form.username, email = %form.email, role = %form.role, "Attempting registration");

        if !self.check_connectivity().await {
            return Err(ApiError::Connection);
        }

        let response = self
            .client
            .post(self.url(REGISTER_PATH))
            .json(form)
            .send()
            .await?;

        let (status, body) = read_response(response).await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Registration rejected");
            return Err(ApiError::from_registration_failure(status, &body));
        }

        info!(username = %form.username, "Registration successful");
        parse_body(&body)
    }

    /// Send an authenticated request and decode its JSON body.
    ///
    /// A 401 leads to one refresh and one retry with the new token. A
    /// failed refresh has already cleared the stored session and surfaces
    /// as `SessionExpired`.
    pub async fn request<T: DeserializeOwned>(&self, request: &AuthRequest) -> Result<T, ApiError> {
        let token = self
            .read(StoreKey::AccessToken)?
            .ok_or(ApiError::AuthRequired)?;

        let mut response = self.send_authorized(request, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path = %request.path, "Access token rejected, refreshing");
            let token = self
                .refresh_after_unauthorized(&token)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Token refresh failed, session cleared");
                    ApiError::SessionExpired {
                        source: Box::new(e),
                    }
                })?;
            response = self.send_authorized(request, &token).await?;
        }

        let (status, body) = read_response(response).await?;
        if !status.is_success() {
            debug!(path = %request.path, status = status.as_u16(), "Request failed");
            return Err(ApiError::from_request_failure(status, &body));
        }
        parse_body(&body)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(&AuthRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))?;
        self.request(&AuthRequest::post(path, body)).await
    }

    /// Dashboard counters for the logged-in user's role
    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.get_json(DASHBOARD_STATS_PATH).await
    }

    /// Clear the stored session. Never fails; storage errors are logged.
    pub fn logout(&self) {
        info!("Logging out");
        if let Err(e) = self.clear_session() {
            warn!(error = %e, "Failed to clear stored session during logout");
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// On any failure the stored session is cleared before the error is
    /// returned. Only the access token is replaced on success.
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    // ===== Internals =====

    async fn send_authorized(&self, request: &AuthRequest, token: &str) -> Result<Response, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.extend(request.headers.clone());
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::InvalidResponse("Stored access token is not a valid header value".to_string()))?;
        headers.insert(header::AUTHORIZATION, bearer);

        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// Refresh after `stale` was rejected, unless a concurrent request has
    /// already replaced it. Any failure clears the stored session.
    async fn refresh_after_unauthorized(&self, stale: &str) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let result = match self.read(StoreKey::AccessToken) {
            Ok(Some(current)) if current != stale => {
                debug!("Access token already renewed by a concurrent request");
                return Ok(current);
            }
            Ok(_) => self.exchange_refresh_token().await,
            Err(e) => Err(e.into()),
        };
        self.clear_on_failure(result)
    }

    /// Caller must hold `refresh_lock`
    async fn refresh_locked(&self) -> Result<String, ApiError> {
        let result = self.exchange_refresh_token().await;
        self.clear_on_failure(result)
    }

    fn clear_on_failure(&self, result: Result<String, ApiError>) -> Result<String, ApiError> {
        if result.is_err() {
            if let Err(clear_err) = self.clear_session() {
                warn!(error = %clear_err, "Failed to clear session after refresh failure");
            }
        }
        result
    }

    async fn exchange_refresh_token(&self) -> Result<String, ApiError> {
        let refresh = self
            .read(StoreKey::RefreshToken)?
            .ok_or(ApiError::NoRefreshToken)?;

        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&json!({ "refresh": refresh }))
            .send()
            .await?;

        let (status, body) = read_response(response).await?;
        if !status.is_success() {
            return Err(ApiError::RefreshRejected(status));
        }

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))?;
        if parsed.access.trim().is_empty() {
            return Err(ApiError::InvalidResponse(
                "refresh response contained an empty access token".to_string(),
            ));
        }
        self.store.set(StoreKey::AccessToken, &parsed.access)?;

        info!("Access token refreshed");
        Ok(parsed.access)
    }
}

async fn read_response(response: Response) -> Result<(StatusCode, String), ApiError> {
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

/// Decode a success body; an empty body decodes as JSON `null`
fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let text = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(text)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
}
