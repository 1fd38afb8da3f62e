//! # volunteer-hub: Volunteer and charity operations backend
//!
//! `volunteer-hub` is the REST/JSON backend of a charity platform. It covers volunteer
//! onboarding, shift scheduling, help requests, support tickets, documents, messaging,
//! notifications and GDPR privacy requests, with dashboards for admins, staff and volunteers.
//!
//! ## Architecture
//!
//! The service is an [axum](https://github.com/tokio-rs/axum) web application backed by
//! PostgreSQL through [sqlx](https://github.com/launchbadge/sqlx):
//!
//! - **API layer** ([`api`]): route handlers and their request/response models
//! - **Authentication** ([`auth`]): JWT sessions, Argon2 passwords, role based permissions
//! - **Database layer** ([`db`]): one repository per table over `&mut PgConnection`
//! - **Scheduling** ([`scheduling`]): shift eligibility, booking ranges and recommendation scores
//! - **Notifications** ([`notifications`]): in-app feed plus an email outbox drained by a worker
//! - **Limits** ([`limits`]): per-client rate limiting of the public write endpoints
//!
//! ## Request flow
//!
//! 1. `TraceLayer` opens a span, the CORS layer answers preflights
//! 2. Public write routes pass through the [`limits::rate_limit`] middleware
//! 3. Extractors resolve the caller ([`api::models::users::CurrentUser`]) and check permissions
//! 4. The handler reads/writes rows, inside a transaction when more than one row changes
//! 5. Notifications and audit entries are written after the commit, best-effort
//!
//! ## Background services
//!
//! - **Outbox worker**: delivers queued notification emails with exponential backoff
//! - **Session purge**: drops expired entries from `revoked_tokens`
//!
//! Both stop through a shared `CancellationToken` on shutdown.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod errors;
pub mod limits;
pub mod notifications;
mod openapi;
pub mod scheduling;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers,
    api::models::users::Role,
    auth::password,
    config::CorsOrigin,
    db::{
        handlers::{Repository, RevokedTokens, Users, document_storage::DocumentStore, document_storage::LocalDocumentStore},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    limits::Limiters,
    openapi::ApiDoc,
};
pub use config::Config;
pub use types::UserId;

/// Embedded database migrations, run on every start.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// How often expired entries are dropped from `revoked_tokens`.
const REVOKED_TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .document_store(Arc::new(LocalDocumentStore::new("./documents")))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Where uploaded document bytes live
    pub document_store: Arc<dyn DocumentStore>,
    #[builder(default)]
    pub limiters: Limiters,
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: an existing account keeps its id and only has its password replaced when one is
/// given. Called on every start so there is always an admin able to log in.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> anyhow::Result<UserId> {
    let password_hash = match password {
        Some(pwd) => Some(password::hash_string(pwd).map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?),
        None => None,
    };

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing_user) = user_repo.get_user_by_email(email).await? {
        if password_hash.is_some() {
            let update = UserUpdateDBRequest {
                password_hash,
                ..Default::default()
            };
            user_repo.update(existing_user.id, &update).await?;
        }
        tx.commit().await?;
        return Ok(existing_user.id);
    }

    let user_create = UserCreateDBRequest {
        username: email.to_string(),
        email: email.to_string(),
        display_name: None,
        phone: None,
        is_admin: true,
        roles: vec![Role::Admin],
        password_hash,
    };

    let created_user = user_repo.create(&user_create).await?;
    tx.commit().await?;

    info!("Created initial admin user {}", email);
    Ok(created_user.id)
}

/// Connect to the configured database and run migrations.
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool_settings = &config.database.pool;
    let mut options = PgPoolOptions::new()
        .max_connections(pool_settings.max_connections)
        .min_connections(pool_settings.min_connections)
        .acquire_timeout(Duration::from_secs(pool_settings.acquire_timeout_secs));
    if pool_settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(pool_settings.idle_timeout_secs));
    }
    if pool_settings.max_lifetime_secs > 0 {
        options = options.max_lifetime(Duration::from_secs(pool_settings.max_lifetime_secs));
    }

    let pool = options.connect(&config.database.url).await?;
    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let mut origins = Vec::new();
    for origin in &cors_config.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut exposed = vec![http::header::LOCATION];
    for name in &cors_config.exposed_headers {
        exposed.push(name.parse::<http::HeaderName>()?);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(exposed);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// Everything lives under `/api/v1`, except `/healthz` and the OpenAPI document. The public
/// write routes (login, registration, applications, help requests, support tickets) are
/// rate limited per client.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let rate_limited = from_fn_with_state(state.clone(), limits::rate_limit);

    // Leave some room for multipart framing so oversized files reach the handler's own check
    let upload_limit = usize::try_from(state.config.limits.max_document_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(2)
        .saturating_add(64 * 1024);

    let auth_routes = Router::new()
        .route("/register", get(handlers::auth::get_registration_info))
        .route("/register", post(handlers::auth::register).layer(rate_limited.clone()))
        .route("/login", get(handlers::auth::get_login_info))
        .route("/login", post(handlers::auth::login).layer(rate_limited.clone()))
        .route("/logout", post(handlers::auth::logout))
        .route("/password-change", post(handlers::auth::change_password))
        .route("/password-resets", post(handlers::auth::request_password_reset))
        .route("/password-resets/{token_id}/confirm", post(handlers::auth::confirm_password_reset));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        // Users
        .route("/users/current", get(handlers::users::get_current_user))
        .route("/admin/users", get(handlers::users::list_users))
        .route("/admin/users/{id}", get(handlers::users::get_user))
        .route("/admin/users/{id}", patch(handlers::users::update_user))
        .route("/admin/users/{id}", delete(handlers::users::delete_user))
        // Volunteer onboarding
        .route(
            "/volunteer/applications",
            post(handlers::applications::submit_application).layer(rate_limited.clone()),
        )
        .route("/admin/volunteer/applications", get(handlers::applications::list_applications))
        .route("/admin/volunteer/applications/{id}", get(handlers::applications::get_application))
        .route(
            "/admin/volunteer/applications/{id}/approve",
            post(handlers::applications::approve_application),
        )
        .route(
            "/admin/volunteer/applications/{id}/reject",
            post(handlers::applications::reject_application),
        )
        .route("/admin/volunteer/bulk", post(handlers::applications::bulk_action))
        .route("/volunteer/profile", get(handlers::profiles::get_profile))
        .route("/volunteer/profile", patch(handlers::profiles::update_profile))
        // Scheduling
        .route("/shifts", get(handlers::shifts::list_shifts))
        .route("/shifts/{id}", get(handlers::shifts::get_shift))
        .route("/admin/shifts", post(handlers::shifts::create_shift))
        .route("/admin/shifts/{id}", patch(handlers::shifts::update_shift))
        .route("/admin/shifts/{id}", delete(handlers::shifts::delete_shift))
        .route("/volunteer/shifts/recommended", get(handlers::shifts::recommended_shifts))
        .route("/volunteer/shifts/{id}/signup", post(handlers::shifts::signup))
        .route("/volunteer/shifts/{id}/validation", get(handlers::shifts::validate_signup))
        .route("/volunteer/assignments", get(handlers::assignments::list_my_assignments))
        .route("/volunteer/assignments/{id}/cancel", post(handlers::assignments::cancel_assignment))
        .route("/admin/assignments", get(handlers::assignments::list_assignments))
        .route("/admin/assignments/{id}/complete", post(handlers::assignments::complete_assignment))
        .route("/admin/assignments/{id}/no-show", post(handlers::assignments::mark_no_show))
        // Dashboards
        .route("/volunteer/dashboard/stats", get(handlers::dashboard::volunteer_dashboard))
        .route("/admin/dashboard/stats", get(handlers::dashboard::admin_dashboard))
        // Operations
        .route("/tasks", get(handlers::tasks::list_tasks))
        .route("/tasks", post(handlers::tasks::create_task))
        .route("/tasks/{id}", patch(handlers::tasks::update_task))
        .route("/tasks/{id}", delete(handlers::tasks::delete_task))
        .route(
            "/help-requests",
            post(handlers::help_requests::create_help_request).layer(rate_limited.clone()),
        )
        .route("/admin/help-requests", get(handlers::help_requests::list_help_requests))
        .route("/admin/help-requests/{id}", patch(handlers::help_requests::update_help_request))
        .route("/support-tickets", get(handlers::support_tickets::list_tickets))
        .route(
            "/support-tickets",
            post(handlers::support_tickets::create_ticket).layer(rate_limited),
        )
        .route("/support-tickets/{id}", get(handlers::support_tickets::get_ticket))
        .route("/admin/support-tickets/{id}", patch(handlers::support_tickets::update_ticket))
        // Documents
        .route(
            "/documents",
            post(handlers::documents::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/documents", get(handlers::documents::list_documents))
        .route("/documents/{id}", get(handlers::documents::get_document))
        .route("/documents/{id}", delete(handlers::documents::delete_document))
        .route("/documents/{id}/content", get(handlers::documents::get_document_content))
        // Messaging and notifications
        .route("/messages", post(handlers::messages::send_message))
        .route("/messages", get(handlers::messages::list_messages))
        .route("/messages/unread-count", get(handlers::messages::unread_count))
        .route("/messages/{id}", get(handlers::messages::get_message))
        .route("/notifications", get(handlers::notifications::list_notifications))
        .route("/notifications/read-all", post(handlers::notifications::mark_all_read))
        .route("/notifications/{id}/read", post(handlers::notifications::mark_read))
        .route("/admin/notifications/outbox", get(handlers::notifications::list_outbox))
        .route("/admin/notifications/outbox/stats", get(handlers::notifications::outbox_stats))
        .route(
            "/admin/notifications/outbox/{id}/retry",
            post(handlers::notifications::retry_outbox_entry),
        )
        // Compliance
        .route("/admin/audit-logs", get(handlers::audit_logs::list_audit_logs))
        .route("/privacy/export-request", post(handlers::privacy::request_export))
        .route("/privacy/deletion-request", post(handlers::privacy::request_deletion))
        .route("/privacy/requests", get(handlers::privacy::list_my_requests))
        .route("/privacy/requests/{id}/export", get(handlers::privacy::get_export))
        .route("/admin/privacy/requests", get(handlers::privacy::list_requests))
        .route("/admin/privacy/requests/{id}/process", post(handlers::privacy::process_request))
        .route("/admin/privacy/requests/{id}/reject", post(handlers::privacy::reject_request));

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", api_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()));

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks running alongside the HTTP server.
///
/// Dropping this cancels the shutdown token through `drop_guard`, so tasks never outlive a
/// test server.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

async fn purge_revoked_tokens(pool: PgPool, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(REVOKED_TOKEN_PURGE_INTERVAL) => {}
            _ = shutdown.cancelled() => return,
        }

        let result = match pool.acquire().await {
            Ok(mut conn) => RevokedTokens::new(&mut conn).purge_expired().await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired revoked tokens"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge revoked tokens"),
        }
    }
}

fn setup_background_services(pool: PgPool, config: Config, shutdown_token: CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    if config.notifications.enabled {
        let worker_shutdown = shutdown_token.clone();
        let handle = tokio::spawn(notifications::run_outbox_worker(
            config.notifications.clone(),
            config.clone(),
            pool.clone(),
            worker_shutdown,
        ));
        background_tasks.push(handle);
    } else {
        info!("Notification outbox worker disabled by configuration");
    }

    background_tasks.push(tokio::spawn(purge_revoked_tokens(pool, shutdown_token.clone())));

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Top-level container owning the router, the pool and the background services.
///
/// 1. [`Application::new`] connects, migrates, ensures the admin account and starts workers
/// 2. [`Application::serve`] binds and serves until the shutdown future resolves
/// 3. Background services stop and the pool closes
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`], reusing `pool` when given (tests hand in a fresh database).
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting volunteer-hub with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => pool,
            None => setup_database(&config).await?,
        };
        MIGRATOR.run(&pool).await?;

        create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool).await?;

        tokio::fs::create_dir_all(&config.documents.storage_path).await?;
        let document_store = Arc::new(LocalDocumentStore::new(config.documents.storage_path.clone()));

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .document_store(document_store)
            .limiters(Limiters::new(&config.limits))
            .build();
        let router = build_router(&app_state)?;

        let shutdown_token = CancellationToken::new();
        let bg_services = setup_background_services(pool.clone(), config.clone(), shutdown_token);

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        // The mock transport has no peer address, so the rate limiter keys on X-Forwarded-For
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "volunteer-hub listening on http://{}, API docs at http://localhost:{}/api/docs",
            bind_addr, self.config.port
        );

        // Peer addresses feed the rate limiter when there is no X-Forwarded-For
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
