use {
    axum::{
        body::Body,
        extract::State,
        http::{Request, header},
        middleware::Next,
        response::{IntoResponse, Response},
    },
    secrecy::ExposeSecret,
    tracing::debug,
};

use crate::{error::ArchiveError, server::AppState};

/// Middleware guarding `/archive` with a static bearer token.
///
/// When no access key is configured every request passes. Otherwise the
/// `Authorization` header must equal `Bearer <key>` exactly.
pub async fn require_access_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(ref key) = state.access_key else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if bearer_matches(presented, key.expose_secret()) {
        next.run(request).await
    } else {
        debug!(present = presented.is_some(), "rejected archive request without valid access key");
        ArchiveError::Auth.into_response()
    }
}

fn bearer_matches(header: Option<&str>, key: &str) -> bool {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == key)
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(Some("Bearer s3cret"), true)]
    #[case(Some("Bearer s3cret "), false)]
    #[case(Some("bearer s3cret"), false)]
    #[case(Some("Bearer  s3cret"), false)]
    #[case(Some("s3cret"), false)]
    #[case(None, false)]
    fn exact_bearer_match(#[case] header: Option<&str>, #[case] ok: bool) {
        assert_eq!(bearer_matches(header, "s3cret"), ok);
    }
}
