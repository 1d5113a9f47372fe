//! Dashboard hub: validates the session and shows the profile and modules.

use serde_json::Value;

use crate::auth::Auth;
use crate::error::ApiResult;
use crate::session::{Profile, Role};

/// A dashboard entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Module {
    pub key: &'static str,
    pub title: &'static str,
    pub teacher_only: bool,
}

pub const MODULES: &[Module] = &[
    Module {
        key: "documents",
        title: "My documents",
        teacher_only: false,
    },
    Module {
        key: "profile",
        title: "Profile",
        teacher_only: false,
    },
    Module {
        key: "students",
        title: "Student roster",
        teacher_only: true,
    },
];

/// Modules visible to `role`; teacher-only modules need the teacher role.
pub fn visible_modules(role: Option<Role>) -> Vec<Module> {
    MODULES
        .iter()
        .filter(|m| !m.teacher_only || role == Some(Role::Teacher))
        .copied()
        .collect()
}

/// Profile basics shown in the dashboard header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSummary {
    pub name: Option<String>,
    pub student_id: Option<String>,
    pub grade: Option<String>,
    pub class_name: Option<String>,
    pub role: Option<Role>,
}

impl ProfileSummary {
    pub fn from_profile(profile: &Profile, fallback_role: Option<Role>) -> Self {
        let field = |key: &str| {
            profile
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            name: field("name"),
            student_id: field("student_id"),
            grade: field("grade"),
            class_name: field("class_name"),
            role: field("role").and_then(|r| r.parse().ok()).or(fallback_role),
        }
    }
}

/// Render port for the dashboard.
pub trait DashboardView {
    fn render_profile(&self, summary: &ProfileSummary);
    fn render_modules(&self, modules: &[Module]);
    /// The session is missing or expired; the user must log in.
    fn redirect_to_login(&self);
}

/// Checks the session, then renders the profile and module list.
///
/// Sends the user to login when the session cannot be validated.
///
/// # Errors
/// Returns the session check error after redirecting.
pub async fn ensure_auth_and_load<V: DashboardView>(
    auth: &Auth,
    view: &V,
) -> ApiResult<ProfileSummary> {
    let profile = match auth.check_auth().await {
        Ok(profile) => profile,
        Err(err) => {
            if err.needs_login() {
                view.redirect_to_login();
            }
            return Err(err);
        }
    };

    let summary = ProfileSummary::from_profile(&profile, auth.session().snapshot().role);
    view.render_profile(&summary);
    view.render_modules(&visible_modules(summary.role));
    Ok(summary)
}
