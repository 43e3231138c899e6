use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{parse_session_cookie_value, session_cookie_name};
use crate::config::RateLimitConfig;
use crate::middleware::RequestId;
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tokio::sync::Mutex;
use tracing::warn;

/// Independent budgets. Referral covers golden-ticket and waitlist submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    Read,
    Mutation,
    Referral,
}

impl Bucket {
    fn for_method(method: Method) -> Self {
        match method {
            Method::Get | Method::Head | Method::Options => Bucket::Read,
            _ => Bucket::Mutation,
        }
    }
}

/// Who a request is counted against. A request carrying a session cookie is
/// counted against both its address and its session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Caller {
    Ip(String),
    Session(String),
}

#[derive(Debug, Clone)]
struct Window {
    opened_at: Instant,
    hits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Allow,
    Limited { retry_after: Duration },
}

#[derive(Debug)]
pub(crate) struct RateLimiter {
    config: RateLimitConfig,
    window: Duration,
    windows: Mutex<HashMap<(Caller, Bucket), Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Periodically drops windows that have already closed.
    pub fn spawn_cleanup_task(self: Arc<Self>) {
        let every = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.prune(Instant::now()).await;
            }
        });
    }

    async fn prune(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.opened_at) < self.window);
        before - windows.len()
    }

    fn limit(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Read => self.config.read_limit,
            Bucket::Mutation => self.config.mutation_limit,
            Bucket::Referral => self.config.referral_limit,
        }
    }

    /// Counts one hit against every caller, unless any of them is already over
    /// its limit, in which case nothing is counted.
    async fn hit(&self, callers: &[Caller], bucket: Bucket) -> Verdict {
        let limit = self.limit(bucket);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        let mut retry_after: Option<Duration> = None;
        for caller in callers {
            let window = windows
                .entry((caller.clone(), bucket))
                .or_insert_with(|| Window { opened_at: now, hits: 0 });
            if now.duration_since(window.opened_at) >= self.window {
                *window = Window { opened_at: now, hits: 0 };
            }
            if window.hits >= limit {
                let remaining = self.window.saturating_sub(now.duration_since(window.opened_at));
                retry_after = Some(retry_after.map_or(remaining, |r| r.max(remaining)));
            }
        }
        if let Some(retry_after) = retry_after {
            return Verdict::Limited { retry_after };
        }

        for caller in callers {
            if let Some(window) = windows.get_mut(&(caller.clone(), bucket)) {
                window.hits += 1;
            }
        }
        Verdict::Allow
    }
}

/// Seconds until the caller may retry; read by the 429 catcher.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetryAfter(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RateLimitError {
    TooManyRequests,
    MissingClientIp,
}

impl RateLimitError {
    fn status(self) -> Status {
        match self {
            RateLimitError::TooManyRequests => Status::TooManyRequests,
            RateLimitError::MissingClientIp => Status::BadRequest,
        }
    }
}

/// Guard applying the read or mutation budget depending on the HTTP method.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimit;

/// Guard applying the referral budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReferralRateLimit;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        enforce(request, Bucket::for_method(request.method())).await.map(|_| RateLimit)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ReferralRateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        enforce(request, Bucket::Referral).await.map(|_| ReferralRateLimit)
    }
}

impl<'a> OpenApiFromRequest<'a> for RateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        too_many_requests_response()
    }
}

impl<'a> OpenApiFromRequest<'a> for ReferralRateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        too_many_requests_response()
    }
}

fn callers_of(request: &Request<'_>) -> Vec<Caller> {
    let mut callers = Vec::with_capacity(2);
    if let Some(ip) = request.client_ip() {
        callers.push(Caller::Ip(ip.to_string()));
    }
    let session = request
        .cookies()
        .get_private(&session_cookie_name(request))
        .and_then(|cookie| parse_session_cookie_value(cookie.value()));
    if let Some((session_id, _)) = session {
        callers.push(Caller::Session(session_id.to_string()));
    }
    callers
}

async fn enforce(request: &Request<'_>, bucket: Bucket) -> Outcome<(), RateLimitError> {
    let Some(limiter) = request.rocket().state::<Arc<RateLimiter>>() else {
        return Outcome::Success(());
    };
    let request_id = request
        .local_cache(|| None::<RequestId>)
        .as_ref()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let mut callers = callers_of(request);
    if callers.is_empty() {
        warn!(request_id = %request_id, uri = %request.uri(), "client ip unavailable for rate limiting");
        if limiter.config.require_client_ip {
            return Outcome::Error((RateLimitError::MissingClientIp.status(), RateLimitError::MissingClientIp));
        }
        callers.push(Caller::Ip("unknown".to_string()));
    }

    match limiter.hit(&callers, bucket).await {
        Verdict::Allow => Outcome::Success(()),
        Verdict::Limited { retry_after } => {
            let secs = retry_after.as_secs().max(1);
            request.local_cache(|| Some(RateLimitRetryAfter(secs)));
            warn!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                bucket = ?bucket,
                retry_after_secs = secs,
                "rate limit exceeded"
            );
            Outcome::Error((RateLimitError::TooManyRequests.status(), RateLimitError::TooManyRequests))
        }
    }
}

fn too_many_requests_response() -> rocket_okapi::Result<Responses> {
    let mut responses = Responses::default();
    responses.responses.insert(
        "429".to_string(),
        RefOr::Object(OpenApiResponse {
            description: "Too Many Requests".to_string(),
            ..Default::default()
        }),
    );
    Ok(responses)
}
