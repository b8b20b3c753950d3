//! HTTP request metrics middleware.

use std::time::Instant;

use {
    archiver_metrics::{counter, histogram, http as http_metrics, labels},
    axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response},
};

/// Records `git_archiver_http_requests_total` and
/// `git_archiver_http_request_duration_seconds` per route.
///
/// Duration covers the time until response headers are ready; archive bodies
/// keep streaming after that.
pub async fn http_metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    // Route template rather than raw path, so unknown paths share one label.
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let response = next.run(request).await;
    let status = response.status().as_u16().to_string();

    counter!(
        http_metrics::REQUESTS_TOTAL,
        labels::ENDPOINT => endpoint.clone(),
        labels::METHOD => method.clone(),
        labels::STATUS => status.clone()
    )
    .increment(1);

    histogram!(
        http_metrics::REQUEST_DURATION_SECONDS,
        labels::ENDPOINT => endpoint,
        labels::METHOD => method,
        labels::STATUS => status
    )
    .record(start.elapsed().as_secs_f64());

    response
}
