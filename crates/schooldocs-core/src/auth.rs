//! Auth coordinator: login, registration, token refresh and session checks.
//!
//! The coordinator is the only writer of the session. It also serves as the
//! [`TokenRefresher`] the HTTP client falls back on when a call returns 401.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{ApiError, ApiErrorKind, ApiResult};
use crate::http::{Blob, HttpClient, RequestDescriptor, TokenRefresher};
use crate::session::{Profile, Role, Session, SessionHandle, SessionUpdate};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const ME_PATH: &str = "/api/users/me";
pub const PROFILE_PATH: &str = "/api/users/profile";

/// Whether the session currently holds an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

/// Account registration form.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterFields {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
}

/// Confirmation returned by the register endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub message: Option<String>,
    pub id: Option<i64>,
}

#[derive(Clone)]
pub struct Auth {
    http: HttpClient,
    /// Serializes 401 recovery so concurrent failures share one refresh.
    refresh_gate: Arc<Mutex<()>>,
}

impl Auth {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn session(&self) -> &SessionHandle {
        self.http.session()
    }

    pub fn state(&self) -> AuthState {
        if self.session().is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        }
    }

    /// Logs in and stores the returned tokens.
    ///
    /// The full profile is then fetched on a best-effort basis; a failure
    /// there is logged and does not fail the login.
    ///
    /// # Errors
    /// Returns the portal's error for rejected credentials, `Network` if the
    /// portal is unreachable, or `Storage` if the session cannot be saved.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
        let body = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let data = self
            .http
            .send(&RequestDescriptor::post(LOGIN_PATH, Some(body)))
            .await?;
        let update = token_update(data)?;
        let access = update.access_token.clone().unwrap_or_default();
        self.store(update)?;
        tracing::info!("logged in");

        let me = RequestDescriptor::get(ME_PATH).bearer(&access);
        match self.http.send(&me).await {
            Ok(Some(Value::Object(profile))) => self.store(SessionUpdate::profile(profile))?,
            Ok(_) => tracing::warn!("user profile response was not an object; keeping login info"),
            Err(err) => tracing::warn!("failed to fetch user profile, keeping login info: {err}"),
        }

        Ok(self.session().snapshot())
    }

    /// Creates an account. Does not log in.
    ///
    /// # Errors
    /// Returns the portal's error (e.g. email already registered) or `Network`.
    pub async fn register(&self, fields: &RegisterFields) -> ApiResult<Registration> {
        let body = serde_json::json!({
            "email": fields.email.trim(),
            "name": fields.name.trim(),
            "password": fields.password,
            "role": fields.role,
        });
        let data = self
            .http
            .send(&RequestDescriptor::post(REGISTER_PATH, Some(body)))
            .await?;
        tracing::info!(role = %fields.role, "registered account");
        Ok(data
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// A refresh token the portal rejects leaves the session anonymous.
    ///
    /// # Errors
    /// Returns `NotAuthenticated` when no refresh token is held, otherwise
    /// the refresh endpoint's error.
    pub async fn refresh(&self) -> ApiResult<Session> {
        let refresh_token = self.session().refresh_token();
        if refresh_token.is_empty() {
            return Err(ApiError::not_authenticated("no refresh token"));
        }

        let request = RequestDescriptor::post(REFRESH_PATH, None).bearer(&refresh_token);
        let data = match self.http.send(&request).await {
            Ok(data) => data,
            Err(err) => {
                if err.kind == ApiErrorKind::Http {
                    tracing::info!("refresh token rejected, signing out: {err}");
                    self.clear_quietly();
                }
                return Err(err);
            }
        };

        self.store(token_update(data)?)?;
        tracing::debug!("access token refreshed");
        Ok(self.session().snapshot())
    }

    /// Validates the session by fetching the profile.
    ///
    /// On failure, one refresh and profile re-fetch is attempted. If that
    /// fails too, the session is cleared.
    ///
    /// # Errors
    /// Returns `NotAuthenticated` without an access token and `SessionExpired`
    /// once the refresh path is exhausted.
    pub async fn check_auth(&self) -> ApiResult<Profile> {
        if !self.session().is_authenticated() {
            return Err(ApiError::not_authenticated("not logged in"));
        }

        let first = match self.fetch_profile().await {
            Ok(profile) => return Ok(profile),
            Err(err) => err,
        };
        tracing::debug!("profile check failed, trying refresh: {first}");

        let retried = match self.refresh().await {
            Ok(_) => self.fetch_profile().await,
            Err(err) => Err(err),
        };
        match retried {
            Ok(profile) => Ok(profile),
            Err(err) => {
                tracing::info!("session expired: {err}");
                self.clear_quietly();
                Err(ApiError::session_expired())
            }
        }
    }

    /// Fetches `/api/users/me` and `/api/users/profile`, merges them (profile
    /// fields win) and caches the result in the session.
    ///
    /// No 401 recovery happens here; [`Self::check_auth`] owns that path.
    ///
    /// # Errors
    /// Returns the first failing endpoint's error.
    pub async fn fetch_profile(&self) -> ApiResult<Profile> {
        let access = self.session().access_token();
        let me = self
            .http
            .send(&RequestDescriptor::get(ME_PATH).bearer(&access))
            .await?;
        let profile = RequestDescriptor::get(PROFILE_PATH)
            .bearer(&access)
            .header("Cache-Control", "no-cache")
            .query("t", Utc::now().timestamp_millis().to_string());
        let profile = self.http.send(&profile).await?;

        let mut merged = into_object(me);
        merged.extend(into_object(profile));
        self.store(SessionUpdate::profile(merged.clone()))?;
        Ok(merged)
    }

    /// Fails with `PermissionDenied` unless the session's role is `role`.
    ///
    /// # Errors
    /// Returns `PermissionDenied` on a role mismatch.
    pub fn require_role(&self, role: Role) -> ApiResult<()> {
        match self.session().snapshot().effective_role() {
            Some(actual) if actual == role => Ok(()),
            _ => Err(ApiError::permission_denied(format!(
                "permission denied: only {role}s can access this"
            ))),
        }
    }

    /// Clears the session unconditionally.
    ///
    /// # Errors
    /// Returns `Storage` if the persisted copy cannot be removed; the
    /// in-memory session is cleared regardless.
    pub fn sign_out(&self) -> ApiResult<()> {
        self.session().clear().map_err(|err| ApiError::storage(&err))?;
        tracing::info!("signed out");
        Ok(())
    }

    /// Authenticated JSON call with transparent 401 recovery.
    ///
    /// # Errors
    /// See [`HttpClient::request`].
    pub async fn request(&self, request: RequestDescriptor) -> ApiResult<Option<Value>> {
        self.http.request(request, self).await
    }

    /// Authenticated binary call with transparent 401 recovery.
    ///
    /// # Errors
    /// See [`HttpClient::request_blob`].
    pub async fn request_blob(&self, request: RequestDescriptor) -> ApiResult<Blob> {
        self.http.request_blob(request, self).await
    }

    /// Bearer header for the current access token.
    pub fn authorized(&self, request: RequestDescriptor) -> RequestDescriptor {
        request.bearer(&self.session().access_token())
    }

    pub(crate) fn store(&self, update: SessionUpdate) -> ApiResult<()> {
        self.session()
            .set(update)
            .map_err(|err| ApiError::storage(&err))
    }

    fn clear_quietly(&self) {
        if let Err(err) = self.session().clear() {
            tracing::warn!("failed to clear session: {err:#}");
        }
    }
}

impl TokenRefresher for Auth {
    async fn refresh_access_token(&self, rejected: &str) -> ApiResult<String> {
        let _gate = self.refresh_gate.lock().await;
        let current = self.session().access_token();
        if !current.is_empty() && current != rejected {
            tracing::debug!("access token already refreshed by a concurrent request");
            return Ok(current);
        }
        let session = self.refresh().await?;
        Ok(session.access_token)
    }
}

fn token_update(data: Option<Value>) -> ApiResult<SessionUpdate> {
    let update: SessionUpdate = data
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    if update.access_token.as_deref().is_none_or(str::is_empty) {
        return Err(ApiError::not_authenticated(
            "portal response did not include an access token",
        ));
    }
    Ok(update)
}

fn into_object(value: Option<Value>) -> Profile {
    match value {
        Some(Value::Object(map)) => map,
        _ => Profile::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_token_update_requires_access_token() {
        assert!(token_update(None).is_err());
        assert!(token_update(Some(json!({"access_token": ""}))).is_err());

        let update = token_update(Some(json!({
            "access_token": "a",
            "refresh_token": "r",
            "role": "teacher",
            "user_info": {"name": "Wang"}
        })))
        .unwrap();
        assert_eq!(update.access_token.as_deref(), Some("a"));
        assert_eq!(update.role.as_deref(), Some("teacher"));
    }

    #[test]
    fn test_require_role() {
        let auth = Auth::new(HttpClient::with_base_url(
            "http://portal.invalid",
            SessionHandle::in_memory(),
        ));
        assert!(auth.require_role(Role::Teacher).is_err());

        auth.store(SessionUpdate {
            access_token: Some("a".into()),
            role: Some("teacher".into()),
            ..SessionUpdate::default()
        })
        .unwrap();
        assert!(auth.require_role(Role::Teacher).is_ok());
        let err = auth.require_role(Role::Student).unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::PermissionDenied);
    }

    #[test]
    fn test_sign_out_clears_state() {
        let auth = Auth::new(HttpClient::with_base_url(
            "http://portal.invalid",
            SessionHandle::in_memory(),
        ));
        auth.store(SessionUpdate {
            access_token: Some("a".into()),
            refresh_token: Some("r".into()),
            ..SessionUpdate::default()
        })
        .unwrap();
        assert_eq!(auth.state(), AuthState::Authenticated);

        auth.sign_out().unwrap();
        assert_eq!(auth.state(), AuthState::Anonymous);
        assert!(auth.session().refresh_token().is_empty());
    }
}
