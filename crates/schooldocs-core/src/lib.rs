//! Client library for the school document portal: session store, HTTP
//! client with token refresh, auth coordinator and view controllers.

pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod format;
pub mod http;
pub mod logging;
pub mod roster;
pub mod session;

use anyhow::Result;

use crate::api::PortalApi;
use crate::auth::Auth;
use crate::config::Config;
use crate::http::HttpClient;
use crate::session::{SessionHandle, SessionStore};

/// Wires the session store, HTTP client and auth coordinator from config.
///
/// # Errors
/// Returns an error if the stored session cannot be read or the base URL is invalid.
pub fn connect(config: &Config) -> Result<PortalApi> {
    let session = SessionHandle::new(SessionStore::open(config)?);
    let http = HttpClient::new(config, session)?;
    Ok(PortalApi::new(Auth::new(http)))
}
