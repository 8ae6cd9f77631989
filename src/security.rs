use crate::errors::AppError;
use axum::http::HeaderMap;
use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

pub fn require_bearer(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let token = extract_bearer(headers).ok_or(AppError::Unauthorized)?;
    if token != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub fn check_origin(headers: &HeaderMap, allowed: &[String]) -> Result<(), AppError> {
    let origin = headers
        .get("Origin")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::OriginDenied)?;
    if allowed.iter().any(|o| o == origin) {
        Ok(())
    } else {
        Err(AppError::OriginDenied)
    }
}

pub fn content_length_ok(headers: &HeaderMap, max_kb: usize) -> Result<(), AppError> {
    if let Some(len) = headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if len > max_kb * 1024 {
            return Err(AppError::RequestTooLarge);
        }
    }
    Ok(())
}

/// Per-token and process-wide request budgets.
#[derive(Clone)]
pub struct RateLimiters {
    per_token: Arc<DefaultKeyedRateLimiter<String>>,
    global: Arc<DefaultDirectRateLimiter>,
}

fn quota(per_second: u32, burst: u32) -> Quota {
    let rate = NonZeroU32::new(per_second).unwrap_or(nonzero!(1u32));
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    Quota::per_second(rate).allow_burst(burst)
}

impl RateLimiters {
    pub fn new(token_per_s: u32, token_burst: u32, global_per_s: u32, global_burst: u32) -> Self {
        Self {
            per_token: Arc::new(RateLimiter::keyed(quota(token_per_s, token_burst))),
            global: Arc::new(RateLimiter::direct(quota(global_per_s, global_burst))),
        }
    }

    pub fn from_limits(limits: &crate::config::Limits) -> Self {
        Self::new(limits.rate_per_token_s, limits.burst_per_token, limits.rate_global_s, limits.burst_global)
    }

    pub fn check(&self, token: Option<&str>) -> Result<(), AppError> {
        if let Some(token) = token {
            self.per_token.check_key(&token.to_string()).map_err(|_| AppError::RateLimited)?;
        }
        self.global.check().map_err(|_| AppError::RateLimited)
    }
}
