//! Dashboard command handler.

use anyhow::{Context, Result};
use schooldocs_core::api::PortalApi;
use schooldocs_core::dashboard;

use crate::cli::Reported;
use crate::cli::render::TerminalDashboard;

pub async fn show(api: &PortalApi) -> Result<()> {
    match dashboard::ensure_auth_and_load(api.auth(), &TerminalDashboard).await {
        Ok(_) => Ok(()),
        // Already told to log in.
        Err(err) if err.needs_login() => Err(Reported.into()),
        Err(err) => Err(err).context("load dashboard"),
    }
}
