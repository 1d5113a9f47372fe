//! Teacher-facing student roster.
//!
//! Listing is fetched once and filtered client-side; the current search
//! query survives a reload. Opening a student's
//! detail issues two parallel fetches tagged with a sequence number; only
//! the response for the most recent selection is rendered, so a slow
//! earlier request can never overwrite a newer one. Nothing is cancelled:
//! stale results are dropped on arrival.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::api::{PortalApi, Student, StudentDetail};
use crate::error::{ApiError, ApiResult};
use crate::session::Role;

/// Render port for the roster.
pub trait RosterView: Send + Sync {
    fn render_students(&self, students: &[Student]);
    fn render_load_error(&self, error: &ApiError);
    fn render_detail_loading(&self, student_id: i64);
    fn render_detail(&self, detail: &StudentDetail);
    fn render_detail_error(&self, student_id: i64, error: &ApiError);
    fn close_detail(&self);
}

/// Case-insensitive substring search over name, student ID, email, grade
/// and class. A blank query matches everything.
pub fn filter_students<'a>(students: &'a [Student], query: &str) -> Vec<&'a Student> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return students.iter().collect();
    }
    students
        .iter()
        .filter(|s| {
            [
                Some(s.name.as_str()),
                s.student_id.as_deref(),
                Some(s.email.as_str()),
                s.grade.as_deref(),
                s.class_name.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Counter identifying the latest in-flight detail request.
#[derive(Debug, Default)]
pub struct DetailSequence(AtomicU64);

impl DetailSequence {
    /// Starts a new request and returns its token.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.0.load(Ordering::SeqCst) == token
    }

    /// Invalidates every in-flight request.
    pub fn invalidate(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct RosterController<V: RosterView> {
    api: PortalApi,
    view: V,
    students: Mutex<Vec<Student>>,
    query: Mutex<String>,
    sequence: DetailSequence,
}

impl<V: RosterView> RosterController<V> {
    pub fn new(api: PortalApi, view: V) -> Self {
        Self {
            api,
            view,
            students: Mutex::new(Vec::new()),
            query: Mutex::new(String::new()),
            sequence: DetailSequence::default(),
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Validates the session and requires the teacher role.
    ///
    /// # Errors
    /// Returns `NotAuthenticated`/`SessionExpired` from the session check, or
    /// `PermissionDenied` for non-teachers.
    pub async fn authorize(&self) -> ApiResult<()> {
        self.api.auth().check_auth().await?;
        self.api.auth().require_role(Role::Teacher)
    }

    /// Fetches the roster and renders it, filtered by the current query.
    ///
    /// # Errors
    /// Returns the fetch error after rendering it.
    pub async fn load(&self) -> ApiResult<()> {
        match self.api.students().await {
            Ok(students) => {
                tracing::debug!(count = students.len(), "roster loaded");
                *self.students.lock().unwrap_or_else(PoisonError::into_inner) = students;
                let query = self.query.lock().unwrap_or_else(PoisonError::into_inner).clone();
                self.render_matches(&query);
                Ok(())
            }
            Err(err) => {
                self.view.render_load_error(&err);
                Err(err)
            }
        }
    }

    /// Sets the search query without rendering; applied by the next load.
    pub fn set_query(&self, query: &str) {
        *self.query.lock().unwrap_or_else(PoisonError::into_inner) = query.to_string();
    }

    /// Re-renders the loaded roster filtered by `query`.
    pub fn search(&self, query: &str) -> Vec<Student> {
        self.set_query(query);
        self.render_matches(query)
    }

    fn render_matches(&self, query: &str) -> Vec<Student> {
        let students = self.students.lock().unwrap_or_else(PoisonError::into_inner);
        let matches: Vec<Student> = filter_students(&students, query)
            .into_iter()
            .cloned()
            .collect();
        drop(students);
        self.view.render_students(&matches);
        matches
    }

    /// Opens the detail panel for one student.
    ///
    /// Returns `None` when a newer selection superseded this one before the
    /// responses arrived; nothing is rendered in that case.
    pub async fn open_detail(&self, student_id: i64) -> Option<ApiResult<StudentDetail>> {
        let token = self.sequence.next();
        self.view.render_detail_loading(student_id);

        let (student, documents) = tokio::join!(
            self.api.student(student_id),
            self.api.student_documents(student_id)
        );

        if !self.sequence.is_current(token) {
            tracing::debug!(student_id, token, "dropping stale student detail");
            return None;
        }

        let result = student.and_then(|student| {
            documents.map(|documents| StudentDetail { student, documents })
        });
        match &result {
            Ok(detail) => self.view.render_detail(detail),
            Err(err) => {
                self.view.render_detail_error(student_id, err);
                self.view.close_detail();
            }
        }
        Some(result)
    }

    /// Closes the detail panel; responses still in flight are discarded.
    pub fn close_detail(&self) {
        self.sequence.invalidate();
        self.view.close_detail();
    }
}
