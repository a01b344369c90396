/*!
 * 速率限制中间件
 *
 * 固定窗口计数：已认证请求按用户计数，其余按客户端 IP 计数。
 * 超出限制返回 429 和 `Retry-After`（窗口剩余秒数）。
 *
 * 预设：
 * - `login`：5 次/分钟
 * - `class_ensure`：60 次/分钟（批量排课）
 * - `ws_handshake`：20 次/分钟（客户端断线重连最多 5 次）
 */

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use moka::future::Cache;
use once_cell::sync::Lazy;
use std::net::IpAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::models::users::entities::User;
use crate::models::{ApiResponse, ErrorCode};

/// 键: `scope:user:<id>` 或 `scope:ip:<addr>`
static WINDOWS: Lazy<Cache<String, Window>> = Lazy::new(|| {
    Cache::builder()
        .time_to_idle(Duration::from_secs(10 * 60))
        .max_capacity(100_000)
        .build()
});

#[derive(Clone)]
pub struct RateLimit {
    max_requests: u32,
    window: Duration,
    scope: &'static str,
}

impl RateLimit {
    fn preset(scope: &'static str, max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
            scope,
        }
    }

    pub fn login() -> Self {
        Self::preset("login", 5, 60)
    }

    pub fn class_ensure() -> Self {
        Self::preset("class_ensure", 60, 60)
    }

    pub fn ws_handshake() -> Self {
        Self::preset("ws", 20, 60)
    }
}

/// 单个键的计数窗口
#[derive(Debug, Clone, Copy, PartialEq)]
struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    /// 计入一次请求；超出限制时返回窗口剩余时间
    fn hit(
        previous: Option<Window>,
        now: Instant,
        max_requests: u32,
        length: Duration,
    ) -> (Window, Option<Duration>) {
        let window = match previous {
            Some(window) if now.duration_since(window.started) < length => window,
            _ => Window {
                started: now,
                count: 0,
            },
        };
        if window.count >= max_requests {
            let retry_after = length.saturating_sub(now.duration_since(window.started));
            return (window, Some(retry_after));
        }
        (
            Window {
                count: window.count + 1,
                ..window
            },
            None,
        )
    }
}

/// 客户端 IP：优先取连接信息，其次是代理头（仅接受合法 IP）
fn client_ip(req: &ServiceRequest) -> String {
    let connection_ip = req
        .connection_info()
        .realip_remote_addr()
        .map(str::to_string);
    if let Some(ip) = connection_ip.as_deref()
        && ip.parse::<IpAddr>().is_ok()
    {
        return ip.to_string();
    }

    let forwarded = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next());
    let real_ip = req
        .headers()
        .get("X-Real-IP")
        .and_then(|value| value.to_str().ok());
    [forwarded, real_ip]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|ip| ip.parse::<IpAddr>().is_ok())
        .map(str::to_string)
        .or(connection_ip)
        .unwrap_or_else(|| "unknown".to_string())
}

fn limit_key(scope: &str, user_id: Option<i64>, ip: impl FnOnce() -> String) -> String {
    match user_id {
        Some(id) => format!("{scope}:user:{id}"),
        None => format!("{scope}:ip:{}", ip()),
    }
}

fn too_many_requests(retry_after: Duration) -> HttpResponse {
    // 向上取整，至少 1 秒
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    HttpResponse::build(StatusCode::TOO_MANY_REQUESTS)
        .insert_header(("Retry-After", secs.max(1).to_string()))
        .json(ApiResponse::<()>::error_empty(
            ErrorCode::RateLimitExceeded,
            "请求过于频繁，请稍后再试",
        ))
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limit: self.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limit: RateLimit,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        let limit = self.limit.clone();

        Box::pin(async move {
            let user_id = req.extensions().get::<User>().map(|user| user.id);
            let key = limit_key(limit.scope, user_id, || client_ip(&req));

            let previous = WINDOWS.get(&key).await;
            let (window, rejected) =
                Window::hit(previous, Instant::now(), limit.max_requests, limit.window);
            WINDOWS.insert(key.clone(), window).await;

            if let Some(retry_after) = rejected {
                warn!(
                    "Rate limit exceeded for {} ({}/{})",
                    key, window.count, limit.max_requests
                );
                return Ok(req.into_response(too_many_requests(retry_after).map_into_right_body()));
            }

            Ok(srv.call(req).await?.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let login = RateLimit::login();
        assert_eq!(login.max_requests, 5);
        assert_eq!(login.window, Duration::from_secs(60));
        assert_eq!(RateLimit::class_ensure().max_requests, 60);
        assert_eq!(RateLimit::ws_handshake().scope, "ws");
    }

    #[test]
    fn test_window_rejects_after_limit_and_resets() {
        let start = Instant::now();
        let length = Duration::from_secs(60);

        let mut window = None;
        for _ in 0..5 {
            let (next, rejected) = Window::hit(window, start, 5, length);
            assert!(rejected.is_none());
            window = Some(next);
        }

        let later = start + Duration::from_secs(20);
        let (full, rejected) = Window::hit(window, later, 5, length);
        assert_eq!(full.count, 5);
        assert_eq!(rejected, Some(Duration::from_secs(40)));

        let (fresh, rejected) = Window::hit(Some(full), start + length, 5, length);
        assert!(rejected.is_none());
        assert_eq!(fresh.count, 1);
    }

    #[test]
    fn test_key_prefers_user_over_ip() {
        assert_eq!(limit_key("ws", Some(7), || unreachable!()), "ws:user:7");
        assert_eq!(limit_key("login", None, || "10.0.0.1".to_string()), "login:ip:10.0.0.1");
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let response = too_many_requests(Duration::from_millis(1500));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("Retry-After").unwrap().to_str().unwrap(),
            "2"
        );
    }
}
