//! Streaming a finished archive back to the client.
//!
//! The artifact is deleted once the body stream ends or is dropped, whichever
//! comes first, so an aborted download still releases it.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use {
    axum::{
        body::Body,
        http::{HeaderValue, header},
        response::{IntoResponse, Response},
    },
    bytes::Bytes,
    futures::Stream,
    tokio::fs::File,
    tokio_util::io::ReaderStream,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use archiver_metrics::{counter, jobs as job_metrics};

use crate::cleanup::ArtifactGuard;

/// An opened artifact ready to be sent exactly once.
#[derive(Debug)]
pub struct ArchiveDelivery {
    archive_name: String,
    file: File,
    len: u64,
    artifact: ArtifactGuard,
}

impl ArchiveDelivery {
    /// Open the artifact. Fails with `NotFound` if the worker never wrote it.
    pub async fn open(archive_name: String, artifact: ArtifactGuard) -> std::io::Result<Self> {
        let file = File::open(artifact.path()).await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            archive_name,
            file,
            len,
            artifact,
        })
    }

    #[must_use]
    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl IntoResponse for ArchiveDelivery {
    fn into_response(self) -> Response {
        let content_type = match self.archive_name.rsplit('.').next() {
            Some("zip") => "application/zip",
            _ => "application/octet-stream",
        };
        let disposition = format!("attachment; filename=\"{}\"", self.archive_name);

        let body = Body::from_stream(GuardedStream {
            inner: ReaderStream::new(self.file),
            artifact: Some(self.artifact),
            archive_name: self.archive_name,
            expected: self.len,
            sent: 0,
        });

        let mut response = body.into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.len));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        response
    }
}

/// File stream that owns the artifact guard for the lifetime of the body.
struct GuardedStream {
    inner: ReaderStream<File>,
    artifact: Option<ArtifactGuard>,
    archive_name: String,
    expected: u64,
    sent: u64,
}

impl Stream for GuardedStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => self.sent += chunk.len() as u64,
            Poll::Ready(Some(Err(e))) => {
                warn!(archive = %self.archive_name, error = %e, "failed to read archive");
            },
            Poll::Ready(None) => {
                debug!(archive = %self.archive_name, bytes = self.sent, "archive sent");
                self.artifact = None;
            },
            Poll::Pending => {},
        }
        polled
    }
}

impl Drop for GuardedStream {
    fn drop(&mut self) {
        if self.sent < self.expected {
            warn!(
                archive = %self.archive_name,
                sent = self.sent,
                expected = self.expected,
                "archive transfer did not complete"
            );
        }
        #[cfg(feature = "metrics")]
        counter!(job_metrics::ARCHIVE_BYTES_TOTAL).increment(self.sent);
    }
}
