use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::Config,
    db::handlers::{Repository, RevokedTokens, Users},
    errors::{Error, Result},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Find the raw session token on a request.
///
/// A `Bearer` authorization header wins over the session cookie.
fn raw_token<'a>(parts: &'a Parts, config: &Config) -> Result<Option<&'a str>> {
    if let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|e| Error::BadRequest {
            message: format!("Invalid authorization header: {e}"),
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(Some(token.trim()));
        }
    }

    let Some(cookie_header) = parts.headers.get(header::COOKIE) else {
        return Ok(None);
    };
    let cookie_str = cookie_header.to_str().map_err(|e| Error::BadRequest {
        message: format!("Invalid cookie header: {e}"),
    })?;

    let cookie_name = &config.auth.native.session.cookie_name;
    Ok(cookie_str
        .split(';')
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| name == cookie_name && !value.is_empty())
        .map(|(_, value)| value))
}

/// Resolve the caller from their session token.
/// Returns:
/// - Ok(None): no credentials on the request
/// - Ok(Some(user)): token verified, not revoked, account still active
/// - Err(_): credentials present but unusable
#[instrument(skip(parts, state))]
async fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<CurrentUser>> {
    let Some(token) = raw_token(parts, &state.config)? else {
        trace!("No session credentials found in request");
        return Ok(None);
    };

    let claims = session::verify_session_token(token, &state.config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if RevokedTokens::new(&mut conn).is_revoked(claims.jti).await? {
        debug!("Rejected revoked session {}", claims.jti);
        return Err(Error::Unauthenticated {
            message: Some("Session has been revoked".to_string()),
        });
    }

    // Roles come from the database so changes apply without re-login
    let user = Users::new(&mut conn)
        .get_by_id(claims.sub)
        .await?
        .filter(|user| user.deleted_at.is_none())
        .ok_or(Error::Unauthenticated { message: None })?;

    let mut current = CurrentUser::from(user);
    current.session_id = Some(claims.jti);
    debug!("Authenticated user {}", current.id);
    Ok(Some(current))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        authenticate(parts, state).await?.ok_or(Error::Unauthenticated { message: None })
    }
}

/// `Option<CurrentUser>` for endpoints open to anonymous callers. Bad or
/// revoked credentials degrade to anonymous instead of failing the request.
impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        match authenticate(parts, state).await {
            Ok(user) => Ok(user),
            Err(Error::Unauthenticated { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::users::{CurrentUser, Role},
        auth::session::verify_session_token,
        db::handlers::{RevokedTokens, Users},
        test_utils::{create_test_state, create_test_user, session_token},
    };
    use axum::{
        extract::{FromRequestParts, OptionalFromRequestParts},
        http::{StatusCode, request::Parts},
    };
    use sqlx::PgPool;

    fn parts_with_header(name: &str, value: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header(name, value)
            .body(())
            .unwrap();
        request.into_parts().0
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_bearer_token_authenticates(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, Role::Volunteer).await;
        let token = session_token(&user);

        let mut parts = parts_with_header("authorization", &format!("Bearer {token}"));
        let current = <CurrentUser as FromRequestParts<_>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap();

        assert_eq!(current.id, user.id);
        assert!(current.has_role(Role::Volunteer));
        assert!(current.session_id.is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_session_cookie_authenticates(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, Role::Donor).await;
        let token = session_token(&user);
        let cookie = format!("theme=dark; {}={token}", state.config.auth.native.session.cookie_name);

        let mut parts = parts_with_header("cookie", &cookie);
        let current = <CurrentUser as FromRequestParts<_>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(current.id, user.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_revoked_token_is_rejected(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, Role::Volunteer).await;
        let token = session_token(&user);
        let claims = verify_session_token(&token, &state.config).unwrap();

        let mut conn = pool.acquire().await.unwrap();
        RevokedTokens::new(&mut conn)
            .revoke(claims.jti, user.id, claims.expires_at())
            .await
            .unwrap();

        let mut parts = parts_with_header("authorization", &format!("Bearer {token}"));
        let err = <CurrentUser as FromRequestParts<_>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_deleted_user_is_rejected(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = create_test_user(&pool, Role::Volunteer).await;
        let token = session_token(&user);

        let mut conn = pool.acquire().await.unwrap();
        Users::new(&mut conn).anonymize(user.id).await.unwrap();

        let mut parts = parts_with_header("authorization", &format!("Bearer {token}"));
        let err = <CurrentUser as FromRequestParts<_>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_credentials(pool: PgPool) {
        let state = create_test_state(pool);
        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (mut parts, _) = request.into_parts();

        let err = <CurrentUser as FromRequestParts<_>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let anonymous = <CurrentUser as OptionalFromRequestParts<_>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(anonymous.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_optional_user_ignores_garbage_token(pool: PgPool) {
        let state = create_test_state(pool);
        let mut parts = parts_with_header("authorization", "Bearer not-a-jwt");

        let anonymous = <CurrentUser as OptionalFromRequestParts<_>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(anonymous.is_none());
    }
}
