//! `GET /archive`: query parsing and hand-off to the job runner.

use {
    axum::{
        extract::{Query, State, rejection::QueryRejection},
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    tracing::{Instrument, info, info_span},
    uuid::Uuid,
};

use crate::{error::ArchiveError, job::ArchiveRequest, server::AppState};

const PARSE_ERROR: &str = "Failed to parse all required parameters";
const INVALID_QUOTA: &str = "Invalid `disk_quota` parameter";
const INVALID_REPO: &str = "Invalid `repo` parameter";

/// Raw query string. `disk_quota` is kept as text so a malformed number is
/// reported as a parameter error rather than a generic rejection.
#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    repo: Option<String>,
    clone_options: Option<String>,
    disk_quota: Option<String>,
}

impl ArchiveQuery {
    /// Trim and validate against the configured quota ceiling.
    pub fn into_request(self, max_disk_quota: u64) -> Result<ArchiveRequest, ArchiveError> {
        let repo = self
            .repo
            .ok_or(ArchiveError::Parameter(PARSE_ERROR))?
            .trim()
            .to_string();
        if repo.is_empty() {
            return Err(ArchiveError::Parameter(INVALID_REPO));
        }
        let clone_options = self
            .clone_options
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let disk_quota = match self.disk_quota {
            None => max_disk_quota,
            Some(raw) => {
                let quota: i128 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ArchiveError::Parameter(PARSE_ERROR))?;
                if quota <= 0 || quota > i128::from(max_disk_quota) {
                    return Err(ArchiveError::Parameter(INVALID_QUOTA));
                }
                u64::try_from(quota).map_err(|_| ArchiveError::Parameter(INVALID_QUOTA))?
            },
        };

        Ok(ArchiveRequest {
            repo,
            clone_options,
            disk_quota,
        })
    }
}

pub async fn archive_handler(
    State(state): State<AppState>,
    query: Result<Query<ArchiveQuery>, QueryRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("archive", %request_id);

    async move {
        let request = match query {
            Ok(Query(query)) => query.into_request(state.max_disk_quota),
            Err(rejection) => {
                info!(error = %rejection, "rejected query string");
                Err(ArchiveError::Parameter(PARSE_ERROR))
            },
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => return e.into_response(),
        };

        info!(repo = %request.repo, quota = request.disk_quota, "archive requested");
        match state.jobs.run(request).await {
            Ok(delivery) => delivery.into_response(),
            Err(e) => {
                info!(kind = e.kind(), status = e.status().as_u16(), "archive failed");
                e.into_response()
            },
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    const MAX: u64 = 50 * 1024 * 1024;

    fn query(repo: Option<&str>, opts: Option<&str>, quota: Option<&str>) -> ArchiveQuery {
        ArchiveQuery {
            repo: repo.map(str::to_string),
            clone_options: opts.map(str::to_string),
            disk_quota: quota.map(str::to_string),
        }
    }

    #[test]
    fn defaults_and_trimming() {
        let req = query(Some("  https://h/r.git\n"), Some(" --depth 1 "), None)
            .into_request(MAX)
            .unwrap();
        assert_eq!(req, ArchiveRequest {
            repo: "https://h/r.git".into(),
            clone_options: "--depth 1".into(),
            disk_quota: MAX,
        });
    }

    #[rstest]
    #[case(None, None, PARSE_ERROR)]
    #[case(Some("r"), Some("abc"), PARSE_ERROR)]
    #[case(Some("r"), Some("1.5"), PARSE_ERROR)]
    #[case(Some("r"), Some("0"), INVALID_QUOTA)]
    #[case(Some("r"), Some("-5"), INVALID_QUOTA)]
    #[case(Some("r"), Some("52428801"), INVALID_QUOTA)]
    #[case(Some("r"), Some("99999999999999999999999"), INVALID_QUOTA)]
    #[case(Some("   "), None, INVALID_REPO)]
    fn rejects(#[case] repo: Option<&str>, #[case] quota: Option<&str>, #[case] message: &str) {
        let err = query(repo, None, quota).into_request(MAX).unwrap_err();
        assert_eq!(err.to_string(), message);
        assert_eq!(err.status().as_u16(), 400);
    }

    #[rstest]
    #[case("1", 1)]
    #[case(" 52428800 ", MAX)]
    #[case("+1024", 1024)]
    fn accepts_quota_in_range(#[case] raw: &str, #[case] expected: u64) {
        let req = query(Some("r"), None, Some(raw)).into_request(MAX).unwrap();
        assert_eq!(req.disk_quota, expected);
    }
}
