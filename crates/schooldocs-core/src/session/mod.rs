//! Session store: tokens, role and cached profile.
//!
//! The store is the only piece of shared mutable state in the client. It is
//! wrapped in a [`SessionHandle`] that the HTTP client and auth coordinator
//! receive explicitly, so tests can run several independent sessions.

mod storage;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
pub use storage::{FileBackend, MemoryBackend, PersistedSession, SessionBackend};

use crate::config::{Config, StorageScope, paths};

/// Opaque user profile as returned by the portal.
pub type Profile = Map<String, Value>;

/// Callback invoked after every session mutation (status line refresh).
///
/// Through a [`SessionHandle`] the hook runs after the lock is released, so
/// it may read the handle again.
pub type StatusHook = Arc<dyn Fn(&Session) + Send + Sync>;

/// Portal account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// Current authentication state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub role: Option<Role>,
    pub profile: Profile,
}

impl Session {
    /// A non-empty access token means the user is considered logged in.
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Short human-readable auth status.
    pub fn status_line(&self) -> String {
        if !self.is_authenticated() {
            return "Not logged in".to_string();
        }
        match self.role {
            Some(role) => format!("Logged in ({role})"),
            None => "Logged in".to_string(),
        }
    }

    /// Role from the session, falling back to the profile's `role` field.
    pub fn effective_role(&self) -> Option<Role> {
        self.role.or_else(|| {
            self.profile
                .get("role")
                .and_then(Value::as_str)
                .and_then(|r| r.parse().ok())
        })
    }

    fn from_persisted(persisted: &PersistedSession) -> Self {
        Self {
            access_token: persisted.access_token.clone().unwrap_or_default(),
            refresh_token: persisted.refresh_token.clone().unwrap_or_default(),
            role: persisted
                .user_role
                .as_deref()
                .and_then(|r| r.parse().ok()),
            profile: persisted.profile(),
        }
    }

    fn to_persisted(&self) -> PersistedSession {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        PersistedSession {
            access_token: non_empty(&self.access_token),
            refresh_token: non_empty(&self.refresh_token),
            user_role: self.role.map(|r| r.as_str().to_string()),
            user_info: (!self.profile.is_empty()).then(|| Value::Object(self.profile.clone())),
        }
    }
}

/// Partial session update, as returned by the login/refresh endpoints.
///
/// Empty or missing fields leave the current value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Option<String>,
    pub user_info: Option<Value>,
}

impl SessionUpdate {
    pub fn profile(profile: Profile) -> Self {
        Self {
            user_info: Some(Value::Object(profile)),
            ..Self::default()
        }
    }
}

/// Session state plus its persistence backend.
pub struct SessionStore {
    session: Session,
    backend: Box<dyn SessionBackend>,
    hook: Option<StatusHook>,
}

impl SessionStore {
    /// Reads the persisted session from `backend`; missing fields default to empty.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    pub fn load(backend: Box<dyn SessionBackend>) -> Result<Self> {
        let persisted = backend.load()?;
        Ok(Self {
            session: Session::from_persisted(&persisted),
            backend,
            hook: None,
        })
    }

    /// Opens the backend selected by `config.storage`.
    ///
    /// # Errors
    /// Returns an error if the persisted session cannot be read.
    pub fn open(config: &Config) -> Result<Self> {
        let backend: Box<dyn SessionBackend> = match config.storage {
            StorageScope::Persistent => Box::new(FileBackend::new(paths::session_path())),
            StorageScope::Session => Box::new(MemoryBackend::new()),
        };
        Self::load(backend)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Merges the non-empty fields of `update` and persists the result.
    ///
    /// # Errors
    /// Returns an error if the session cannot be persisted. The in-memory
    /// state is updated regardless.
    pub fn set(&mut self, update: SessionUpdate) -> Result<()> {
        let result = self.apply(update);
        self.notify();
        result
    }

    /// Drops every field and every persisted copy.
    ///
    /// # Errors
    /// Returns an error if the persisted copy cannot be removed. The
    /// in-memory state is cleared regardless.
    pub fn clear(&mut self) -> Result<()> {
        let result = self.wipe();
        self.notify();
        result
    }

    fn apply(&mut self, update: SessionUpdate) -> Result<()> {
        let SessionUpdate {
            access_token,
            refresh_token,
            role,
            user_info,
        } = update;

        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            self.session.access_token = token;
        }
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            self.session.refresh_token = token;
        }
        if let Some(role) = role.filter(|r| !r.is_empty()) {
            match role.parse() {
                Ok(role) => self.session.role = Some(role),
                Err(err) => tracing::warn!("ignoring session role: {err}"),
            }
        }
        if let Some(Value::Object(profile)) = user_info {
            self.session.profile = profile;
        }

        self.backend.save(&self.session.to_persisted())
    }

    fn wipe(&mut self) -> Result<()> {
        self.session = Session::default();
        self.backend.clear()
    }

    /// Hook and the state it should see, for running outside a lock.
    fn notice(&self) -> Option<(StatusHook, Session)> {
        self.hook
            .as_ref()
            .map(|hook| (Arc::clone(hook), self.session.clone()))
    }

    fn notify(&self) {
        if let Some(hook) = &self.hook {
            hook(&self.session);
        }
    }
}

fn run_hook(notice: Option<(StatusHook, Session)>) {
    if let Some((hook, session)) = notice {
        hook(&session);
    }
}

/// Shared handle to a [`SessionStore`].
///
/// The lock is only held for the duration of a single read or mutation and
/// never across an `.await`.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionStore>>,
}

impl SessionHandle {
    pub fn new(store: SessionStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// In-memory handle, mostly useful for tests and one-shot commands.
    pub fn in_memory() -> Self {
        Self::new(SessionStore {
            session: Session::default(),
            backend: Box::new(MemoryBackend::new()),
            hook: None,
        })
    }

    fn with<T>(&self, f: impl FnOnce(&mut SessionStore) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn snapshot(&self) -> Session {
        self.with(|store| store.session().clone())
    }

    pub fn access_token(&self) -> String {
        self.with(|store| store.session().access_token.clone())
    }

    pub fn refresh_token(&self) -> String {
        self.with(|store| store.session().refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.with(|store| store.session().is_authenticated())
    }

    pub fn set_status_hook(&self, hook: StatusHook) {
        let session = self.with(|store| {
            store.hook = Some(Arc::clone(&hook));
            store.session.clone()
        });
        hook(&session);
    }

    /// See [`SessionStore::set`].
    ///
    /// # Errors
    /// Returns an error if the session cannot be persisted.
    pub fn set(&self, update: SessionUpdate) -> Result<()> {
        let (result, notice) = self.with(|store| (store.apply(update), store.notice()));
        run_hook(notice);
        result
    }

    /// See [`SessionStore::clear`].
    ///
    /// # Errors
    /// Returns an error if the persisted copy cannot be removed.
    pub fn clear(&self) -> Result<()> {
        let (result, notice) = self.with(|store| (store.wipe(), store.notice()));
        run_hook(notice);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn update(access: &str, refresh: &str, role: &str) -> SessionUpdate {
        SessionUpdate {
            access_token: Some(access.to_string()),
            refresh_token: Some(refresh.to_string()),
            role: Some(role.to_string()),
            user_info: None,
        }
    }

    #[test]
    fn test_set_then_reload_roundtrips_access_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut store = SessionStore::load(Box::new(FileBackend::new(&path))).unwrap();
        store
            .set(SessionUpdate {
                access_token: Some("X".into()),
                ..SessionUpdate::default()
            })
            .unwrap();

        let reloaded = SessionStore::load(Box::new(FileBackend::new(&path))).unwrap();
        assert_eq!(reloaded.session().access_token, "X");
        assert!(reloaded.session().is_authenticated());
        assert!(reloaded.session().refresh_token.is_empty());
    }

    #[test]
    fn test_set_merges_only_non_empty_fields() {
        let mut store = SessionStore::load(Box::new(MemoryBackend::new())).unwrap();
        store.set(update("a1", "r1", "teacher")).unwrap();
        store.set(update("a2", "", "")).unwrap();

        let session = store.session();
        assert_eq!(session.access_token, "a2");
        assert_eq!(session.refresh_token, "r1");
        assert_eq!(session.role, Some(Role::Teacher));
    }

    #[test]
    fn test_set_ignores_unknown_role() {
        let mut store = SessionStore::load(Box::new(MemoryBackend::new())).unwrap();
        store.set(update("a", "r", "student")).unwrap();
        store.set(update("", "", "janitor")).unwrap();
        assert_eq!(store.session().role, Some(Role::Student));
    }

    #[test]
    fn test_set_replaces_profile() {
        let mut store = SessionStore::load(Box::new(MemoryBackend::new())).unwrap();
        let Value::Object(profile) = json!({"name": "Li Lei", "grade": "10"}) else {
            unreachable!()
        };
        store.set(SessionUpdate::profile(profile)).unwrap();
        assert_eq!(store.session().profile["name"], "Li Lei");
    }

    #[test]
    fn test_clear_removes_fields_and_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut store = SessionStore::load(Box::new(FileBackend::new(&path))).unwrap();
        store.set(update("a", "r", "student")).unwrap();
        assert!(path.exists());

        store.clear().unwrap();
        assert_eq!(store.session(), &Session::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_every_mutation_fires_status_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handle = SessionHandle::in_memory();
        handle.set_status_hook(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        // Registration renders the current status once.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.set(update("a", "r", "teacher")).unwrap();
        handle.clear().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_status_hook_can_read_the_handle() {
        let handle = SessionHandle::in_memory();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (reader, log) = (handle.clone(), Arc::clone(&seen));
        handle.set_status_hook(Arc::new(move |_| {
            log.lock().unwrap().push(reader.snapshot().status_line());
        }));

        handle.set(update("a", "r", "student")).unwrap();
        handle.clear().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Not logged in", "Logged in (student)", "Not logged in"]
        );
    }

    #[test]
    fn test_status_line() {
        let mut session = Session::default();
        assert_eq!(session.status_line(), "Not logged in");

        session.access_token = "a".into();
        assert_eq!(session.status_line(), "Logged in");

        session.role = Some(Role::Teacher);
        assert_eq!(session.status_line(), "Logged in (teacher)");
    }

    #[test]
    fn test_effective_role_falls_back_to_profile() {
        let mut session = Session::default();
        session.profile.insert("role".into(), json!("teacher"));
        assert_eq!(session.effective_role(), Some(Role::Teacher));

        session.role = Some(Role::Student);
        assert_eq!(session.effective_role(), Some(Role::Student));
    }
}
