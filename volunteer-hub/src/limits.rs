//! Per-client rate limiting for the public write endpoints.
//!
//! Each client key (the first `X-Forwarded-For` hop, else the peer address) holds a sliding
//! window of recent request instants. Keys live in a bounded `moka` cache: once
//! `max_tracked_clients` keys exist the least useful are evicted, and a key idle for a whole
//! window is dropped, since its window would be empty anyway.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use moka::future::Cache;

use crate::{
    AppState,
    config::{LimitsConfig, RateLimitConfig},
    errors::{Error, Result},
};

/// Container for all resource limiters.
#[derive(Debug, Default, Clone)]
pub struct Limiters {
    /// Limiter for public write endpoints. None means unlimited.
    pub rate_limit: Option<Arc<RateLimiter>>,
}

impl Limiters {
    pub fn new(config: &LimitsConfig) -> Self {
        Self {
            rate_limit: RateLimiter::new(&config.rate_limit).map(Arc::new),
        }
    }
}

type Window = Arc<Mutex<VecDeque<Instant>>>;

/// Sliding-window request counter keyed by client.
pub struct RateLimiter {
    clients: Cache<String, Window>,
    requests: usize,
    window: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests", &self.requests)
            .field("window", &self.window)
            .field("tracked_clients", &self.clients.entry_count())
            .finish()
    }
}

impl RateLimiter {
    /// Returns `None` when rate limiting is disabled.
    pub fn new(config: &RateLimitConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        Some(Self {
            clients: Cache::builder()
                .max_capacity(config.max_tracked_clients)
                .time_to_idle(config.window)
                .build(),
            requests: config.requests as usize,
            window: config.window,
        })
    }

    /// Record a request from `client` at `now`.
    ///
    /// Returns `Err(TooManyRequests)` without recording it when the client already used its
    /// budget for the current window.
    pub async fn check_at(&self, client: &str, now: Instant) -> Result<()> {
        let window = self
            .clients
            .get_with(client.to_string(), async { Arc::new(Mutex::new(VecDeque::new())) })
            .await;

        let mut hits = window.lock().map_err(|_| Error::Internal {
            operation: "lock rate limit window".to_string(),
        })?;

        while let Some(oldest) = hits.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }

        if hits.len() >= self.requests {
            let retry_after = hits
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(Error::TooManyRequests {
                message: format!("Too many requests. Please retry in {} seconds.", retry_after.as_secs().max(1)),
            });
        }

        hits.push_back(now);
        Ok(())
    }

    pub async fn check(&self, client: &str) -> Result<()> {
        self.check_at(client, Instant::now()).await
    }
}

/// Identify the caller. Proxies put the original client first in `X-Forwarded-For`.
fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applied to the public write routes.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    if let Some(limiter) = &state.limiters.rate_limit {
        let client = client_key(&request);
        if let Err(e) = limiter.check(&client).await {
            tracing::debug!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
            return Err(e);
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn limiter(requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests,
            window: Duration::from_secs(window_secs),
            max_tracked_clients: 100,
        })
        .unwrap()
    }

    #[test]
    fn test_disabled_returns_none() {
        let config = RateLimitConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(RateLimiter::new(&config).is_none());
        assert!(Limiters::new(&LimitsConfig {
            rate_limit: config,
            ..Default::default()
        })
        .rate_limit
        .is_none());
    }

    #[tokio::test]
    async fn test_budget_is_per_client() {
        let limiter = limiter(2, 60);
        let now = Instant::now();

        assert!(limiter.check_at("10.0.0.1", now).await.is_ok());
        assert!(limiter.check_at("10.0.0.1", now).await.is_ok());

        let err = limiter.check_at("10.0.0.1", now).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert!(err.user_message().contains("retry in 60 seconds"));

        assert!(limiter.check_at("10.0.0.2", now).await.is_ok());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = limiter(2, 10);
        let start = Instant::now();

        limiter.check_at("client", start).await.unwrap();
        limiter.check_at("client", start + Duration::from_secs(6)).await.unwrap();
        assert!(limiter.check_at("client", start + Duration::from_secs(8)).await.is_err());

        // The first hit has left the window, the second has not
        assert!(limiter.check_at("client", start + Duration::from_secs(10)).await.is_ok());
        assert!(limiter.check_at("client", start + Duration::from_secs(11)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_requests_do_not_extend_the_window() {
        let limiter = limiter(1, 10);
        let start = Instant::now();

        limiter.check_at("client", start).await.unwrap();
        for s in 1..10 {
            assert!(limiter.check_at("client", start + Duration::from_secs(s)).await.is_err());
        }
        assert!(limiter.check_at("client", start + Duration::from_secs(10)).await.is_ok());
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let request = axum::http::Request::builder()
            .uri("/api/v1/auth/login")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.7");

        let mut request = axum::http::Request::builder()
            .uri("/api/v1/auth/login")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "unknown");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 40000))));
        assert_eq!(client_key(&request), "192.0.2.10");
    }
}
