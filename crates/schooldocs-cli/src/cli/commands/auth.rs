//! Account and session command handlers.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use dialoguer::Password;
use schooldocs_core::api::PortalApi;
use schooldocs_core::auth::RegisterFields;
use schooldocs_core::config::Config;
use schooldocs_core::session::Role;
use serde_json::Value;

use crate::cli::render;

/// Uses the given password or asks for one without echoing it.
fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    if !io::stdin().is_terminal() {
        anyhow::bail!("No password given; pass --password or set SCHOOLDOCS_PASSWORD");
    }
    Password::new()
        .with_prompt("Password")
        .interact()
        .context("read password")
}

pub async fn register(
    api: &PortalApi,
    email: &str,
    name: &str,
    role: Role,
    password: Option<String>,
) -> Result<()> {
    let fields = RegisterFields {
        email: email.to_string(),
        name: name.to_string(),
        password: password_or_prompt(password)?,
        role,
    };
    let registration = api
        .auth()
        .register(&fields)
        .await
        .context("registration failed")?;

    match registration.id {
        Some(id) => println!("✓ Registered {role} account #{id}"),
        None => println!("✓ Registered {role} account"),
    }
    if let Some(message) = registration.message.filter(|m| !m.is_empty()) {
        println!("  {message}");
    }
    println!("  Log in with: schooldocs login --email {}", email.trim());
    Ok(())
}

pub async fn login(api: &PortalApi, email: &str, password: Option<String>) -> Result<()> {
    let password = password_or_prompt(password)?;
    let session = api
        .auth()
        .login(email, &password)
        .await
        .context("login failed")?;

    println!("✓ {}", session.status_line());
    if let Some(name) = session.profile.get("name").and_then(Value::as_str) {
        println!("  Welcome, {name}");
    }
    Ok(())
}

pub fn logout(api: &PortalApi) -> Result<()> {
    let was_logged_in = api.auth().session().is_authenticated();
    api.auth().sign_out().context("logout failed")?;
    if was_logged_in {
        println!("✓ Logged out");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

pub fn status(api: &PortalApi, config: &Config) {
    let session = api.auth().session().snapshot();
    println!("{}", session.status_line());
    println!("  Portal:  {}", api.auth().http().base_url());
    println!("  Storage: {}", config.storage.as_str());
    if session.is_authenticated() && !session.has_refresh_token() {
        println!("  (no refresh token; you will need to log in again when the session expires)");
    }
}

pub async fn whoami(api: &PortalApi) -> Result<()> {
    let profile = api.auth().check_auth().await.context("session check failed")?;

    let mut table = render::table(["Field", "Value"]);
    for (key, value) in &profile {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        table.add_row(vec![key.clone(), value]);
    }
    println!("{}", api.auth().session().snapshot().status_line());
    println!("{table}");
    Ok(())
}
