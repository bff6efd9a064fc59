use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::{
    collections::VecDeque,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

/// Length of the rolling window every quota is measured over.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-log limiter: at most `limit` admitted requests per key within
/// any `window`-long interval.
///
/// Each key keeps the instants of its admitted requests, oldest first.
/// Rejected requests are not recorded, so hammering a blocked key does not
/// push its reopening further out.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    logs: DashMap<IpAddr, VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1) as usize,
            window,
            logs: DashMap::new(),
        }
    }

    /// Admit a request for `key` now, or return how long until a slot frees up.
    pub fn check_key(&self, key: &IpAddr) -> Result<(), Duration> {
        self.check_key_at(key, Instant::now())
    }

    /// Same as [`check_key`](Self::check_key) with an explicit clock reading.
    pub fn check_key_at(&self, key: &IpAddr, now: Instant) -> Result<(), Duration> {
        let mut log = self.logs.entry(*key).or_default();
        evict_expired(&mut log, now, self.window);

        if log.len() >= self.limit {
            let wait = log
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or_default();
            return Err(wait);
        }

        log.push_back(now);
        Ok(())
    }

    /// Drop keys with no request inside the current window.
    pub fn retain_recent(&self) {
        let now = Instant::now();
        self.logs.retain(|_, log| {
            evict_expired(log, now, self.window);
            !log.is_empty()
        });
    }

    pub fn shrink_to_fit(&self) {
        self.logs.shrink_to_fit();
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

fn evict_expired(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if now.saturating_duration_since(*oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<SlidingWindowLimiter>;

/// Create a limiter allowing `per_minute` requests per IP in any rolling minute.
///
/// A quota of zero is clamped to one.
pub fn create_ip_rate_limiter(per_minute: u32) -> IpRateLimiter {
    Arc::new(SlidingWindowLimiter::new(per_minute, RATE_LIMIT_WINDOW))
}

/// Middleware state: one limiter per protected endpoint.
#[derive(Clone)]
pub struct IpRateLimit {
    limiter: IpRateLimiter,
    trust_forwarded_for: bool,
}

impl IpRateLimit {
    pub fn new(limiter: IpRateLimiter, trust_forwarded_for: bool) -> Self {
        Self {
            limiter,
            trust_forwarded_for,
        }
    }

    pub fn limiter(&self) -> &IpRateLimiter {
        &self.limiter
    }

    /// Record one request for `ip`, or report how long until the window admits another.
    pub fn check(&self, ip: IpAddr) -> Result<(), AppError> {
        self.limiter.check_key(&ip).map_err(too_many_requests)
    }
}

fn too_many_requests(wait: Duration) -> AppError {
    // Round up so clients retrying after the header never arrive early.
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    AppError::TooManyRequests("Rate limit exceeded".to_string(), Some(secs.max(1)))
}

/// Resolve the client address for rate limiting.
///
/// `X-Forwarded-For` is only consulted when the service sits behind a trusted proxy.
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded_ip = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok());

        if forwarded_ip.is_some() {
            return forwarded_ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match client_ip(&request, limit.trust_forwarded_for) {
        Some(ip) => {
            if let Err(e) = limit.check(ip) {
                tracing::warn!(
                    client_ip = %ip,
                    path = %request.uri().path(),
                    "Rate limit exceeded"
                );
                return Err(e);
            }
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}
