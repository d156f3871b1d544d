//! Route table, request adapters and middleware.

use crate::gateway::{CacheDirectives, Gateway};
use crate::DNS_MESSAGE_CONTENT_TYPE;
use axum::body::{Body, Bytes};
use axum::extract::{RawQuery, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use data_encoding::BASE64URL_NOPAD;
use dohd_telemetry::Event;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Upper bound on a POSTed DNS message.
const MAX_REQUEST_SIZE: usize = 65535;

/// Builds the gateway route table.
///
/// Every route runs through the tracking middleware, which logs the
/// request, emits the HTTP-method telemetry event and records elapsed
/// time.
pub fn router(gateway: Arc<Gateway>) -> Router {
    for (method, path) in [
        ("GET", "/"),
        ("GET", "/status"),
        ("GET", "/dns-query"),
        ("POST", "/dns-query"),
    ] {
        info!(method, path, "registered HTTP handler");
    }

    Router::new()
        .route("/", get(root_index))
        .route("/status", get(status))
        .route("/dns-query", get(dns_query_get).post(dns_query_post))
        .layer(middleware::from_fn_with_state(
            gateway.clone(),
            track_request,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Generic banner on the document root.
async fn root_index() -> &'static str {
    "DoH Server"
}

/// Public liveness probe.
async fn status() -> &'static str {
    "Server is running"
}

/// GET adapter: the DNS message travels base64url-encoded (RFC 4648 §5,
/// no padding) in the mandatory `dns` query parameter.
async fn dns_query_get(
    State(gateway): State<Arc<Gateway>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let values: Vec<String> = query
        .as_deref()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .filter(|(key, _)| key == "dns")
                .map(|(_, value)| value.into_owned())
                .collect()
        })
        .unwrap_or_default();

    // exactly one, non-empty
    let encoded = match values.as_slice() {
        [single] if !single.is_empty() => single,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Mandatory 'dns' request parameter is either not set, empty, \
                 or defined multiple times"
                    .to_string(),
            )
        }
    };

    let request = match BASE64URL_NOPAD.decode(encoded.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Error decoding DNS request data from Base64: {}", e),
            )
        }
    };

    resolve(gateway, cache_directives(&headers), request.into()).await
}

/// POST adapter: the DNS message is the raw request body.
async fn dns_query_post(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    // reject before touching the body
    if !content_type.starts_with(DNS_MESSAGE_CONTENT_TYPE) {
        return error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported or missing Content-Type".to_string(),
        );
    }

    let directives = cache_directives(request.headers());

    let body = match axum::body::to_bytes(request.into_body(), MAX_REQUEST_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Failed to read request body: {}", e),
            )
        }
    };

    if body.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing dns message payload".to_string(),
        );
    }

    resolve(gateway, directives, body).await
}

/// Hands the unwrapped DNS bytes to the pipeline and renders the result.
async fn resolve(gateway: Arc<Gateway>, directives: CacheDirectives, request: Bytes) -> Response {
    match gateway.handle_query(&request, directives).await {
        Ok(payload) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
            .header(
                header::CACHE_CONTROL,
                format!("max-age={}", payload.max_age),
            )
            .body(Body::from(payload.body))
            .unwrap_or_else(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to build response",
                )
                    .into_response()
            }),
        Err(e) => error_response(e.status(), e.to_string()),
    }
}

/// Extracts `no-cache` / `no-store` from the request `Cache-Control`
/// headers; directive lists may be split across header lines.
fn cache_directives(headers: &HeaderMap) -> CacheDirectives {
    let mut directives = CacheDirectives::default();

    for value in headers.get_all(header::CACHE_CONTROL) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for directive in value.split(',') {
            let directive = directive.trim();
            if directive.eq_ignore_ascii_case("no-cache") {
                directives.no_cache = true;
            }
            if directive.eq_ignore_ascii_case("no-store") {
                directives.no_store = true;
            }
        }
    }

    directives
}

/// Plain-text error body with the chosen status code.
fn error_response(status: StatusCode, message: String) -> Response {
    (status, message).into_response()
}

/// Logs each request and emits the HTTP-method telemetry event.
async fn track_request(
    State(gateway): State<Arc<Gateway>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    debug!(%uri, headers = ?request.headers(), "client request");

    let response = next.run(request).await;

    if method == Method::GET {
        gateway.telemetry().emit(Event::HttpGet);
    } else if method == Method::POST {
        gateway.telemetry().emit(Event::HttpPost);
    }

    info!(
        %method,
        %uri,
        status = %response.status(),
        elapsed = ?started.elapsed(),
        "request served"
    );

    response
}
