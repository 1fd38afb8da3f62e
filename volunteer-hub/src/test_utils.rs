//! Shared fixtures for unit and integration tests.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::{
        applications::ApplicationCreate,
        shifts::Priority,
        users::{CurrentUser, Role, UserResponse},
    },
    auth::session,
    config::{
        AuthConfig, Config, DocumentsConfig, EmailConfig, EmailTransportConfig, LimitsConfig, NativeAuthConfig, NotificationsConfig,
        PasswordConfig, RateLimitConfig, SessionConfig,
    },
    db::{
        handlers::{Repository, Users, document_storage::LocalDocumentStore},
        models::{shifts::ShiftCreateDBRequest, users::UserCreateDBRequest},
    },
    limits::Limiters,
};

pub async fn create_test_app(pool: PgPool) -> (TestServer, crate::BackgroundServices) {
    let config = create_test_config();

    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

pub fn create_test_config() -> Config {
    // Unique per call so parallel tests don't share document or email directories
    let temp_dir = std::env::temp_dir().join(format!("vhub-test-{}-{}", std::process::id(), Uuid::new_v4().simple()));

    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        admin_password: None,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: AuthConfig {
            native: NativeAuthConfig {
                enabled: true,
                allow_registration: true,
                password: PasswordConfig {
                    // Cheap hashing keeps the suite fast
                    argon2_memory_kib: 128,
                    argon2_iterations: 1,
                    ..Default::default()
                },
                session: SessionConfig {
                    cookie_secure: false,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        },
        notifications: NotificationsConfig {
            enabled: false,
            ..Default::default()
        },
        limits: LimitsConfig {
            rate_limit: RateLimitConfig {
                enabled: false,
                ..Default::default()
            },
            max_document_bytes: 1024 * 1024,
        },
        documents: DocumentsConfig {
            storage_path: temp_dir.join("documents"),
        },
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: temp_dir.join("emails").to_string_lossy().to_string(),
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn create_test_state(pool: PgPool) -> AppState {
    create_test_state_with_config(pool, create_test_config())
}

pub fn create_test_state_with_config(pool: PgPool, config: Config) -> AppState {
    let document_store = Arc::new(LocalDocumentStore::new(config.documents.storage_path.clone()));
    let limiters = Limiters::new(&config.limits);
    AppState::builder()
        .db(pool)
        .config(config)
        .document_store(document_store)
        .limiters(limiters)
        .build()
}

async fn insert_user(pool: &PgPool, prefix: &str, roles: Vec<Role>, is_admin: bool) -> UserResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let username = format!("{prefix}_{}", Uuid::new_v4().simple());
    let email = format!("{username}@example.com");

    let user_create = UserCreateDBRequest {
        username,
        email,
        display_name: Some("Test User".to_string()),
        phone: None,
        is_admin,
        roles,
        password_hash: None,
    };

    let user = users_repo.create(&user_create).await.expect("Failed to create test user");
    UserResponse::from(user)
}

pub async fn create_test_user(pool: &PgPool, role: Role) -> UserResponse {
    insert_user(pool, "testuser", vec![role], false).await
}

pub async fn create_test_user_with_roles(pool: &PgPool, roles: Vec<Role>) -> UserResponse {
    insert_user(pool, "testuser", roles, false).await
}

pub async fn create_test_admin_user(pool: &PgPool, role: Role) -> UserResponse {
    insert_user(pool, "testadmin", vec![role], true).await
}

/// Session JWT for `user`, signed with the test secret.
pub fn session_token(user: &UserResponse) -> String {
    let current_user = CurrentUser::from(user.clone());
    session::create_session_token(&current_user, &create_test_config()).expect("Failed to create session token")
}

pub fn add_auth_headers(user: &UserResponse) -> Vec<(String, String)> {
    vec![("authorization".to_string(), format!("Bearer {}", session_token(user)))]
}

pub fn sample_application(email: &str) -> ApplicationCreate {
    ApplicationCreate {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: email.to_string(),
        phone: Some("+44 20 7946 0000".to_string()),
        skills: vec!["First Aid".to_string(), "driving".to_string()],
        interests: vec!["food bank".to_string()],
        availability: Some("weekends".to_string()),
        motivation: Some("I want to help my community".to_string()),
    }
}

/// A four hour shift. Flexible ones take two volunteers for one to four hours each.
pub fn sample_shift(created_by: crate::types::UserId, start: DateTime<Utc>, flexible: bool) -> ShiftCreateDBRequest {
    ShiftCreateDBRequest {
        title: "Food bank shift".to_string(),
        description: Some("Sorting donations".to_string()),
        location: Some("Community hall".to_string()),
        required_role: None,
        required_skills: vec![],
        start_time: start,
        end_time: start + Duration::hours(4),
        is_flexible: flexible,
        flexible_slots: if flexible { 2 } else { 0 },
        minimum_hours: flexible.then_some(1.0),
        maximum_hours: flexible.then_some(4.0),
        priority: Priority::Normal,
        created_by: Some(created_by),
    }
}
