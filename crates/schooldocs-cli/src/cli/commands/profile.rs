//! Profile command handlers.

use anyhow::{Context, Result};
use schooldocs_core::api::{PortalApi, ProfileUpdate};
use schooldocs_core::format;
use serde_json::Value;

pub async fn update(api: &PortalApi, update: &ProfileUpdate) -> Result<()> {
    if update.is_empty() {
        anyhow::bail!("Nothing to update; pass --name, --student-id, --grade or --class-name");
    }
    let profile = api
        .update_profile(update)
        .await
        .context("profile update failed")?;

    let field = |key: &str| profile.get(key).and_then(Value::as_str);
    println!("✓ Profile updated");
    println!("  Name:       {}", format::or_not_set(field("name")));
    println!("  Student ID: {}", format::or_not_set(field("student_id")));
    println!("  Grade:      {}", format::or_not_set(field("grade")));
    println!("  Class:      {}", format::or_not_set(field("class_name")));
    Ok(())
}
