//! Login, registration, refresh and session-check flows against a mock portal.

mod common;

use common::{api_for, auth_for, bearer, can_bind_localhost, seed};
use schooldocs_core::api::ProfileUpdate;
use schooldocs_core::auth::{AuthState, RegisterFields};
use schooldocs_core::error::ApiErrorKind;
use schooldocs_core::session::Role;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"email": "teacher@school.test", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a1",
            "refresh_token": "r1",
            "role": "teacher",
            "user_info": {"name": "Ms. Chen", "email": "teacher@school.test"}
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_stores_tokens_and_profile() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .and(bearer("a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 4,
            "name": "Chen Jing",
            "email": "teacher@school.test",
            "role": "teacher"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = auth.login("  teacher@school.test ", "hunter2").await.unwrap();

    assert_eq!(session.access_token, "a1");
    assert_eq!(session.refresh_token, "r1");
    assert_eq!(session.role, Some(Role::Teacher));
    assert_eq!(session.profile.get("name"), Some(&json!("Chen Jing")));
    assert_eq!(session.status_line(), "Logged in (teacher)");
    assert_eq!(auth.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_login_survives_profile_fetch_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let session = auth.login("teacher@school.test", "hunter2").await.unwrap();

    assert!(session.is_authenticated());
    // The login response's user_info stays the cached profile.
    assert_eq!(session.profile.get("name"), Some(&json!("Ms. Chen")));
}

#[tokio::test]
async fn test_login_rejected_keeps_session_anonymous() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "invalid email or password"})),
        )
        .mount(&server)
        .await;

    let err = auth.login("x@school.test", "wrong").await.unwrap_err();

    assert_eq!(err.message, "invalid email or password");
    assert_eq!(err.status, Some(401));
    assert_eq!(auth.state(), AuthState::Anonymous);
}

#[tokio::test]
async fn test_register_does_not_log_in() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(body_json(json!({
            "email": "new@school.test",
            "name": "Li Hua",
            "password": "pw123456",
            "role": "student"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"message": "registered", "id": 7})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fields = RegisterFields {
        email: "new@school.test".into(),
        name: " Li Hua ".into(),
        password: "pw123456".into(),
        role: Role::Student,
    };
    let registration = auth.register(&fields).await.unwrap();

    assert_eq!(registration.id, Some(7));
    assert_eq!(registration.message.as_deref(), Some("registered"));
    assert_eq!(auth.state(), AuthState::Anonymous);
}

#[tokio::test]
async fn test_register_conflict_surfaces_message() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "email already registered"})),
        )
        .mount(&server)
        .await;

    let fields = RegisterFields {
        email: "dup@school.test".into(),
        name: "Dup".into(),
        password: "pw".into(),
        role: Role::Teacher,
    };
    let err = auth.register(&fields).await.unwrap_err();
    assert_eq!(err.message, "email already registered");
}

#[tokio::test]
async fn test_refresh_without_token_makes_no_request() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = auth.refresh().await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::NotAuthenticated);
}

#[tokio::test]
async fn test_refresh_uses_refresh_token_as_bearer() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    seed(&auth, "a1", "r1", "student");
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(bearer("r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "a2"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = auth.refresh().await.unwrap();

    assert_eq!(session.access_token, "a2");
    assert_eq!(session.refresh_token, "r1");
    assert_eq!(session.role, Some(Role::Student));
}

#[tokio::test]
async fn test_check_auth_requires_access_token() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);

    let err = auth.check_auth().await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::NotAuthenticated);
    assert!(err.needs_login());
}

#[tokio::test]
async fn test_check_auth_merges_profile_over_me() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    seed(&auth, "a1", "r1", "student");
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .and(bearer("a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Old Name",
            "email": "s@school.test"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile"))
        .and(bearer("a1"))
        .and(header("cache-control", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "New Name",
            "grade": "10"
        })))
        .mount(&server)
        .await;

    let profile = auth.check_auth().await.unwrap();

    assert_eq!(profile.get("name"), Some(&json!("New Name")));
    assert_eq!(profile.get("email"), Some(&json!("s@school.test")));
    assert_eq!(profile.get("grade"), Some(&json!("10")));
    assert_eq!(auth.session().snapshot().profile, profile);
}

#[tokio::test]
async fn test_profile_request_is_cache_busted() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    seed(&auth, "a1", "r1", "student");
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    // Any profile request without the `t` parameter is rejected.
    Mock::given(method("GET"))
        .and(path("/api/users/profile"))
        .and(query_param_is_missing("t"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "N"})))
        .mount(&server)
        .await;

    let profile = auth.fetch_profile().await.unwrap();
    assert_eq!(profile.get("name"), Some(&json!("N")));
}

#[tokio::test]
async fn test_check_auth_recovers_with_refresh_token() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    seed(&auth, "expired", "r1", "teacher");

    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .and(bearer("expired"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"msg": "Token has expired"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(bearer("r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .and(bearer("fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Chen"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile"))
        .and(bearer("fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"class_name": "3-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let profile = auth.check_auth().await.unwrap();

    assert_eq!(profile.get("name"), Some(&json!("Chen")));
    assert_eq!(profile.get("class_name"), Some(&json!("3-1")));
    assert_eq!(auth.session().access_token(), "fresh");
}

#[tokio::test]
async fn test_check_auth_expires_session_when_refresh_fails() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    seed(&auth, "expired", "revoked", "teacher");

    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = auth.check_auth().await.unwrap_err();

    assert_eq!(err.kind, ApiErrorKind::SessionExpired);
    assert!(err.needs_login());
    let session = auth.session().snapshot();
    assert!(!session.is_authenticated());
    assert!(session.refresh_token.is_empty());
    assert!(session.role.is_none());
    assert!(session.profile.is_empty());
}

#[tokio::test]
async fn test_check_auth_expires_session_when_refetch_fails() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    seed(&auth, "expired", "r1", "student");

    // The profile endpoint keeps failing even with the fresh token.
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = auth.check_auth().await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::SessionExpired);
    assert_eq!(auth.state(), AuthState::Anonymous);
}

#[tokio::test]
async fn test_update_profile_merges_saved_fields() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let api = api_for(&server);
    seed(api.auth(), "a1", "r1", "student");
    api.auth()
        .session()
        .set(schooldocs_core::session::SessionUpdate::profile(
            serde_json::from_value(json!({"name": "Wei", "grade": "10"})).unwrap(),
        ))
        .unwrap();

    Mock::given(method("PUT"))
        .and(path("/api/users/profile"))
        .and(bearer("a1"))
        .and(body_json(json!({"grade": "11", "class_name": "11-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "profile updated",
            "profile": {"grade": "11", "class_name": "11-2"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let update = ProfileUpdate {
        grade: Some("11".into()),
        class_name: Some("11-2".into()),
        ..ProfileUpdate::default()
    };
    let profile = api.update_profile(&update).await.unwrap();

    assert_eq!(profile.get("name"), Some(&json!("Wei")));
    assert_eq!(profile.get("grade"), Some(&json!("11")));
    assert_eq!(
        api.auth().session().snapshot().profile.get("class_name"),
        Some(&Value::from("11-2"))
    );
}

#[tokio::test]
async fn test_sign_out_clears_everything() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let auth = auth_for(&server);
    seed(&auth, "a1", "r1", "teacher");

    auth.sign_out().unwrap();

    let session = auth.session().snapshot();
    assert_eq!(session.status_line(), "Not logged in");
    assert!(!session.has_refresh_token());
}
