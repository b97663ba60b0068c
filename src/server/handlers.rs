use crate::error::RelayGateError;
use crate::metrics;
use crate::server::AppState;
use crate::types::{CompletionPayload, ErrorBody, ErrorCategory};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type BoxBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// 补全入口的路径
const COMPLETION_PATHS: [&str; 2] = ["/", "/ai-completion"];

/// 请求体大小上限
const MAX_BODY_BYTES: usize = 1024 * 1024;

const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// 处理 HTTP 请求的主路由
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, BoxError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if COMPLETION_PATHS.contains(&path.as_str()) {
        return match method {
            Method::OPTIONS => Ok(preflight()),
            Method::POST => Ok(ai_completion(req, state).await),
            _ => Ok(json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorBody::new("Method not allowed"),
            )),
        };
    }

    match (method, path.as_str()) {
        (Method::GET, "/health") => Ok(health_check(&state)),
        (Method::GET, "/metrics") => Ok(metrics_endpoint()),
        _ => Ok(not_found()),
    }
}

/// 预检请求：成功且无响应体
fn preflight() -> Response<BoxBody> {
    build_response(StatusCode::OK, Bytes::new(), None)
}

/// 健康检查端点
fn health_check(state: &AppState) -> Response<BoxBody> {
    let providers: Vec<_> = state
        .router
        .key_pool()
        .configured()
        .into_iter()
        .map(|p| p.as_str())
        .collect();

    let body = json!({
        "status": "ok",
        "service": "relaygate",
        "providers": providers
    });
    json_response(StatusCode::OK, &body)
}

/// 指标端点
fn metrics_endpoint() -> Response<BoxBody> {
    let body = metrics::global_metrics().export_prometheus();
    build_response(StatusCode::OK, Bytes::from(body), Some("text/plain"))
}

/// 补全端点
async fn ai_completion<B>(req: Request<B>, state: Arc<AppState>) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let whole_body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &ErrorBody::new("Invalid request body").with_details(e.to_string()),
            )
        }
    };

    let request_id = uuid::Uuid::new_v4();
    complete(&state, &whole_body)
        .instrument(info_span!("ai_completion", %request_id))
        .await
}

/// 校验请求体、调用路由并映射结果
pub async fn complete(state: &AppState, body: &[u8]) -> Response<BoxBody> {
    let payload: CompletionPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &ErrorBody::new("Invalid JSON body").with_details(e.to_string()),
            )
        }
    };

    // 校验失败时不会调用任何后端
    let request = match payload.validate() {
        Ok(request) => request,
        Err(msg) => {
            warn!("请求参数无效: {}", msg);
            return json_response(StatusCode::BAD_REQUEST, &ErrorBody::new(msg));
        }
    };

    info!(provider = %request.provider, "收到补全请求");

    let metrics = metrics::global_metrics();
    match state.router.route(&request).await {
        Ok(result) => {
            metrics.record_success();
            json_response(StatusCode::OK, &result)
        }
        Err(e) => {
            metrics.record_failure();
            error!(error = %e, "补全请求失败");
            let (status, body) = error_to_response(e);
            json_response(status, &body)
        }
    }
}

/// 将路由错误映射为状态码和稳定的错误文本，分类只反映最后一次尝试
fn error_to_response(err: RelayGateError) -> (StatusCode, ErrorBody) {
    match err {
        RelayGateError::Exhausted {
            category,
            last_error,
        } => {
            let (status, message) = match category {
                ErrorCategory::RateLimited => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Rate limit exceeded. Please try again later.",
                ),
                ErrorCategory::Unauthorized => (
                    StatusCode::UNAUTHORIZED,
                    "Authentication failed with AI provider",
                ),
                ErrorCategory::Unknown => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to get AI response")
                }
            };
            let details =
                last_error.unwrap_or_else(|| "No AI provider has an API key configured".to_string());
            (status, ErrorBody::new(message).with_details(details))
        }
        RelayGateError::DeadlineExceeded { secs, last_error } => {
            let details = last_error
                .unwrap_or_else(|| format!("No provider responded within {} seconds", secs));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("AI request timed out").with_details(details),
            )
        }
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("Failed to get AI response").with_details(other.to_string()),
        ),
    }
}

/// 404 响应
fn not_found() -> Response<BoxBody> {
    build_response(StatusCode::NOT_FOUND, Bytes::from("Not Found"), Some("text/plain"))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    match serde_json::to_vec(body) {
        Ok(bytes) => build_response(status, Bytes::from(bytes), Some("application/json")),
        Err(e) => {
            error!("响应序列化失败: {}", e);
            build_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from(r#"{"error":"Internal server error"}"#),
                Some("application/json"),
            )
        }
    }
}

fn build_response(
    status: StatusCode,
    body: Bytes,
    content_type: Option<&'static str>,
) -> Response<BoxBody> {
    let mut response = Response::new(
        Full::new(body)
            .map_err(|e| Box::new(e) as BoxError)
            .boxed(),
    );
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    apply_cors(headers);
    response
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("POST, OPTIONS"),
    );
}
