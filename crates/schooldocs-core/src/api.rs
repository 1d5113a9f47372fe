//! Typed wrappers over the portal's roster, document and profile endpoints.
//!
//! Every call goes through [`Auth::request`], so an expired access token is
//! refreshed and the call replayed once.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{Auth, PROFILE_PATH};
use crate::error::{ApiError, ApiResult};
use crate::http::{Blob, RequestDescriptor};
use crate::session::{Profile, SessionUpdate};

pub const STUDENTS_PATH: &str = "/api/users/students";
pub const DOCUMENTS_PATH: &str = "/api/documents";

/// Roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub document_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Uploaded document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Student record plus their documents.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentDetail {
    pub student: Student,
    pub documents: Vec<Document>,
}

/// Editable profile fields; `None` leaves the server value unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.student_id.is_none()
            && self.grade.is_none()
            && self.class_name.is_none()
    }
}

#[derive(Clone)]
pub struct PortalApi {
    auth: Auth,
}

impl PortalApi {
    pub fn new(auth: Auth) -> Self {
        Self { auth }
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Lists every student (teacher only on the server side).
    ///
    /// # Errors
    /// Returns the portal's error or `Network`.
    pub async fn students(&self) -> ApiResult<Vec<Student>> {
        let data = self.get(STUDENTS_PATH).await?;
        let students = data
            .as_ref()
            .and_then(|v| v.get("students"))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        decode(Some(students), "student list")
    }

    /// # Errors
    /// Returns the portal's error or `Network`.
    pub async fn student(&self, id: i64) -> ApiResult<Student> {
        let data = self.get(&format!("{STUDENTS_PATH}/{id}")).await?;
        // The detail endpoint may wrap the record as `{student: {...}}`.
        let record = match data {
            Some(Value::Object(mut map)) if map.contains_key("student") => map.remove("student"),
            other => other,
        };
        decode(record, "student record")
    }

    /// # Errors
    /// Returns the portal's error or `Network`.
    pub async fn student_documents(&self, id: i64) -> ApiResult<Vec<Document>> {
        let data = self.get(&format!("{STUDENTS_PATH}/{id}/documents")).await?;
        decode_documents(data)
    }

    /// Documents uploaded by the logged-in user.
    ///
    /// # Errors
    /// Returns the portal's error or `Network`.
    pub async fn my_documents(&self) -> ApiResult<Vec<Document>> {
        let data = self.get(DOCUMENTS_PATH).await?;
        decode_documents(data)
    }

    /// Document content for inline viewing.
    ///
    /// # Errors
    /// Returns the portal's error or `Network`.
    pub async fn view_document(&self, id: i64) -> ApiResult<Blob> {
        let request = self
            .auth
            .authorized(RequestDescriptor::get(format!("{DOCUMENTS_PATH}/{id}/view")));
        self.auth.request_blob(request).await
    }

    /// Document content as an attachment (carries the original filename).
    ///
    /// # Errors
    /// Returns the portal's error or `Network`.
    pub async fn download_document(&self, id: i64) -> ApiResult<Blob> {
        let request = self.auth.authorized(RequestDescriptor::get(format!(
            "{DOCUMENTS_PATH}/{id}/download"
        )));
        self.auth.request_blob(request).await
    }

    /// Saves profile fields and merges the result into the cached profile.
    ///
    /// # Errors
    /// Returns the portal's error, `Network`, or `Storage`.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<Profile> {
        let body = serde_json::to_value(update).unwrap_or_default();
        let request = self
            .auth
            .authorized(RequestDescriptor::put(PROFILE_PATH, Some(body)));
        let data = self.auth.request(request).await?;

        let saved = match data.as_ref().and_then(|v| v.get("profile")) {
            Some(Value::Object(map)) => map.clone(),
            _ => Profile::new(),
        };
        let mut profile = self.auth.session().snapshot().profile;
        profile.extend(saved);
        self.auth.store(SessionUpdate::profile(profile.clone()))?;
        Ok(profile)
    }

    async fn get(&self, path: &str) -> ApiResult<Option<Value>> {
        let request = self.auth.authorized(RequestDescriptor::get(path));
        self.auth.request(request).await
    }
}

fn decode_documents(data: Option<Value>) -> ApiResult<Vec<Document>> {
    // Accept both a bare array and `{documents: [...]}`.
    let list = match data {
        Some(Value::Object(mut map)) => map.remove("documents"),
        other => other,
    };
    decode(Some(list.unwrap_or(Value::Array(Vec::new()))), "document list")
}

fn decode<T: DeserializeOwned>(data: Option<Value>, what: &str) -> ApiResult<T> {
    let value = data.unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|err| {
        tracing::warn!("unexpected {what} payload: {err}");
        ApiError::parse(format!("unexpected {what} from portal"))
    })
}
