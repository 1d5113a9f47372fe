//! Shared helpers for portal integration tests.

#![allow(dead_code)]

use schooldocs_core::api::PortalApi;
use schooldocs_core::auth::Auth;
use schooldocs_core::http::HttpClient;
use schooldocs_core::session::{SessionHandle, SessionUpdate};
use wiremock::matchers::header;
use wiremock::MockServer;

pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Auth coordinator against `server` with an in-memory session.
pub fn auth_for(server: &MockServer) -> Auth {
    Auth::new(HttpClient::with_base_url(
        server.uri(),
        SessionHandle::in_memory(),
    ))
}

pub fn api_for(server: &MockServer) -> PortalApi {
    PortalApi::new(auth_for(server))
}

/// Seeds the session as if a teacher had logged in earlier.
pub fn seed(auth: &Auth, access: &str, refresh: &str, role: &str) {
    auth.session()
        .set(SessionUpdate {
            access_token: Some(access.to_string()),
            refresh_token: Some(refresh.to_string()),
            role: Some(role.to_string()),
            user_info: None,
        })
        .unwrap();
}

pub fn bearer(token: &str) -> wiremock::matchers::HeaderExactMatcher {
    header("Authorization", format!("Bearer {token}").as_str())
}
