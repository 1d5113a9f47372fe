//! Roster command handlers (teachers only).

use anyhow::{Context, Result};
use schooldocs_core::api::PortalApi;
use schooldocs_core::roster::RosterController;

use crate::cli::Reported;
use crate::cli::render::TerminalRoster;

async fn authorized_roster(api: PortalApi) -> Result<RosterController<TerminalRoster>> {
    let roster = RosterController::new(api, TerminalRoster);
    roster.authorize().await.context("cannot open the student roster")?;
    Ok(roster)
}

pub async fn list(api: PortalApi, search: Option<&str>) -> Result<()> {
    let roster = authorized_roster(api).await?;
    if let Some(query) = search {
        roster.set_query(query);
    }
    // The view prints load failures.
    if roster.load().await.is_err() {
        return Err(Reported.into());
    }
    Ok(())
}

pub async fn show(api: PortalApi, id: i64) -> Result<()> {
    let roster = authorized_roster(api).await?;
    match roster.open_detail(id).await {
        Some(Ok(_)) => Ok(()),
        Some(Err(_)) => Err(Reported.into()),
        // Only one detail request is ever issued here.
        None => {
            tracing::debug!(id, "student detail superseded");
            Ok(())
        }
    }
}
