use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::{
        auth::{
            AuthResponse, AuthSuccessResponse, ChangePasswordRequest, LoginInfo, LoginRequest, LoginResponse, LogoutResponse,
            PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetResponse, RegisterRequest, RegisterResponse, RegistrationInfo,
        },
        users::{CurrentUser, UserResponse},
    },
    auth::{
        password::{self, Argon2Params},
        session,
        utils::{clear_session_cookie, create_session_cookie},
    },
    db::{
        handlers::{PasswordResetTokens, Repository, RevokedTokens, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    email::EmailService,
    errors::Error,
    notifications::{self, Notice, NotificationKind, Recipient},
};

fn require_native_auth(state: &AppState) -> Result<(), Error> {
    if state.config.auth.native.enabled {
        Ok(())
    } else {
        Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        })
    }
}

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

/// Get registration information
#[utoipa::path(
    get,
    path = "/auth/register",
    tag = "authentication",
    responses(
        (status = 200, description = "Registration info", body = RegistrationInfo),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_registration_info(State(state): State<AppState>) -> Result<Json<RegistrationInfo>, Error> {
    let enabled = state.config.auth.native.enabled && state.config.auth.native.allow_registration;
    Ok(Json(RegistrationInfo {
        enabled,
        message: if enabled {
            "Registration is enabled".to_string()
        } else {
            "Registration is disabled".to_string()
        },
    }))
}

/// Register a new user account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "User already exists"),
        (status = 429, description = "Too many requests"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    require_native_auth(&state)?;
    if !state.config.auth.native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let email = request.email.trim().to_string();
    if !email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }
    if request.username.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Username cannot be empty".to_string(),
        });
    }

    let password_config = &state.config.auth.native.password;
    password::validate_password(&request.password, password_config)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut tx);
    if user_repo.get_user_by_email(&email).await?.is_some() {
        return Err(Error::BadRequest {
            message: "An account with this email address already exists".to_string(),
        });
    }

    let password_hash = password::hash_password_blocking(request.password, Argon2Params::from(password_config)).await?;

    let create_request = UserCreateDBRequest {
        username: request.username.trim().to_string(),
        email,
        display_name: request.display_name,
        phone: None,
        is_admin: false,
        roles: state.config.auth.default_user_roles.clone(),
        password_hash: Some(password_hash),
    };

    let created_user = user_repo.create(&create_request).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let user_response = UserResponse::from(created_user);
    let token = session::create_session_token(&user_response.clone().into(), &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);

    let auth_response = AuthResponse {
        user: user_response,
        message: "Registration successful".to_string(),
        token,
    };

    Ok(RegisterResponse { auth_response, cookie })
}

/// Get login information
#[utoipa::path(
    get,
    path = "/auth/login",
    tag = "authentication",
    responses(
        (status = 200, description = "Login info", body = LoginInfo),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_login_info(State(state): State<AppState>) -> Result<Json<LoginInfo>, Error> {
    Ok(Json(LoginInfo {
        enabled: state.config.auth.native.enabled,
        message: if state.config.auth.native.enabled {
            "Native login is enabled".to_string()
        } else {
            "Native login is disabled".to_string()
        },
    }))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many requests"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    require_native_auth(&state)?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    let user = user_repo
        .get_user_by_email(request.email.trim())
        .await?
        .ok_or_else(invalid_credentials)?;
    let password_hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;

    if !password::verify_password_blocking(request.password, password_hash).await? {
        return Err(invalid_credentials());
    }

    user_repo.record_login(user.id).await?;

    let user_response = UserResponse::from(user);
    let token = session::create_session_token(&user_response.clone().into(), &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);

    let auth_response = AuthResponse {
        user: user_response,
        message: "Login successful".to_string(),
        token,
    };

    Ok(LoginResponse { auth_response, cookie })
}

/// Logout: revoke the presented session and clear the cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, current_user: Option<CurrentUser>) -> Result<LogoutResponse, Error> {
    if let Some(user) = current_user
        && let Some(jti) = user.session_id
    {
        // No token outlives its expiry, so that bounds how long the entry is needed
        let expires_at = Utc::now() + state.config.auth.security.jwt_expiry;
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        RevokedTokens::new(&mut conn).revoke(jti, user.id, expires_at).await?;
    }

    let auth_response = AuthSuccessResponse {
        message: "Logout successful".to_string(),
    };

    Ok(LogoutResponse {
        auth_response,
        cookie: clear_session_cookie(&state.config),
    })
}

/// Request password reset (send email)
#[utoipa::path(
    post,
    path = "/auth/password-resets",
    request_body = PasswordResetRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password reset email sent", body = PasswordResetResponse),
        (status = 400, description = "Invalid request"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    require_native_auth(&state)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    // Same answer whether or not the account exists, to avoid email enumeration
    let user = Users::new(&mut tx).get_user_by_email(request.email.trim()).await?;

    if let Some(user) = user
        && user.password_hash.is_some()
    {
        let (raw_token, token) = PasswordResetTokens::new(&mut tx).create_for_user(user.id, &state.config).await?;

        let email_service = EmailService::new(&state.config)?;
        email_service
            .send_password_reset_email(&user.email, user.display_name.as_deref(), &token.id, &raw_token)
            .await?;
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(PasswordResetResponse {
        message: "If an account with that email exists, a password reset link has been sent.".to_string(),
    }))
}

/// Confirm password reset with token
#[utoipa::path(
    post,
    path = "/auth/password-resets/{token_id}/confirm",
    request_body = PasswordResetConfirmRequest,
    tag = "authentication",
    params(
        ("token_id" = uuid::Uuid, Path, description = "Reset token ID from the email link"),
    ),
    responses(
        (status = 200, description = "Password reset successful", body = PasswordResetResponse),
        (status = 400, description = "Invalid or expired token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Path(token_id): Path<Uuid>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    require_native_auth(&state)?;

    let password_config = &state.config.auth.native.password;
    password::validate_password(&request.new_password, password_config)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let token = PasswordResetTokens::new(&mut tx)
        .find_valid_token_by_id(token_id, &request.token)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "Invalid or expired reset token".to_string(),
        })?;

    let new_password_hash = password::hash_password_blocking(request.new_password, Argon2Params::from(password_config)).await?;

    let update_request = UserUpdateDBRequest {
        password_hash: Some(new_password_hash),
        ..Default::default()
    };
    Users::new(&mut tx).update(token.user_id, &update_request).await?;

    // Every outstanding link for this user dies with the one just used
    PasswordResetTokens::new(&mut tx).invalidate_for_user(token.user_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(PasswordResetResponse {
        message: "Password has been reset successfully".to_string(),
    }))
}

/// Change password for authenticated user
#[utoipa::path(
    post,
    path = "/auth/password-change",
    request_body = ChangePasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password changed successfully", body = AuthSuccessResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Current password is incorrect"),
    ),
    security(
        ("session_token" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    require_native_auth(&state)?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    let user = user_repo.get_by_id(current_user.id).await?.ok_or(Error::Unauthenticated {
        message: Some("User not found".to_string()),
    })?;
    let password_hash = user.password_hash.clone().ok_or_else(|| Error::BadRequest {
        message: "This account has no password set. Use a password reset instead.".to_string(),
    })?;

    if !password::verify_password_blocking(request.current_password, password_hash).await? {
        return Err(Error::Unauthenticated {
            message: Some("Current password is incorrect".to_string()),
        });
    }

    let password_config = &state.config.auth.native.password;
    password::validate_password(&request.new_password, password_config)?;
    let new_password_hash = password::hash_password_blocking(request.new_password, Argon2Params::from(password_config)).await?;

    let update_request = UserUpdateDBRequest {
        password_hash: Some(new_password_hash),
        ..Default::default()
    };
    user_repo.update(current_user.id, &update_request).await?;
    drop(pool_conn);

    notifications::notify(
        &state.db,
        Recipient::user(user.id, user.email.clone(), user.display_name.clone()),
        Notice::new(
            NotificationKind::PasswordChanged,
            "Your password was changed",
            "The password on your account was just changed. If this wasn't you, reset it straight away.",
        ),
    )
    .await;

    Ok(Json(AuthSuccessResponse {
        message: "Password changed successfully".to_string(),
    }))
}
