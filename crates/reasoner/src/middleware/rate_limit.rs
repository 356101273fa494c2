//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use polikg_common::errors::{AppError, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Shared limiter plus the configured rate, for error reporting
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

/// Create a new rate limiter; zero rates are a configuration error
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Result<RateLimit> {
    let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| AppError::Configuration {
        message: "server.requests_per_second must be greater than zero".to_string(),
    })?;
    let burst = NonZeroU32::new(burst).ok_or_else(|| AppError::Configuration {
        message: "server.burst must be greater than zero".to_string(),
    })?;

    let quota = Quota::per_second(rate).allow_burst(burst);

    Ok(RateLimit {
        limiter: Arc::new(RateLimiter::direct(quota)),
        requests_per_second,
    })
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<RateLimit>,
    request: Request,
    next: Next,
) -> Result<Response> {
    match limit.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited {
                limit: limit.requests_per_second,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limit = create_rate_limiter(100, 200).unwrap();
        assert!(limit.limiter.check().is_ok());
    }

    #[test]
    fn test_burst_is_enforced() {
        let limit = create_rate_limiter(1, 2).unwrap();
        assert!(limit.limiter.check().is_ok());
        assert!(limit.limiter.check().is_ok());
        assert!(limit.limiter.check().is_err());
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(
            create_rate_limiter(0, 10),
            Err(AppError::Configuration { .. })
        ));
        assert!(create_rate_limiter(10, 0).is_err());
    }
}
