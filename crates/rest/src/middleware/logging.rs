//! Request logging middleware.
//!
//! Logs method, path, status, response size and latency for every request.
//! The response body is wrapped in a [`CountingBody`] that counts bytes as
//! they are streamed, so nothing is buffered and the body's size hint (and
//! therefore `Content-Length`) is preserved. The log line is emitted when
//! the body reaches its end, or when it is dropped early.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use http_body::{Body as _, Frame, SizeHint};
use tracing::info;

struct RequestLog {
    method: Method,
    path: String,
    status: StatusCode,
    started: Instant,
}

impl RequestLog {
    fn emit(self, bytes: u64, complete: bool) {
        info!(
            method = %self.method,
            path = %self.path,
            status = self.status.as_u16(),
            bytes = bytes,
            latency_ms = self.started.elapsed().as_millis() as u64,
            complete = complete,
            "Request completed"
        );
    }
}

/// A response body decorator that counts the bytes it yields.
pub struct CountingBody {
    inner: Body,
    bytes: u64,
    log: Option<RequestLog>,
}

impl CountingBody {
    fn new(inner: Body, log: RequestLog) -> Self {
        Self {
            inner,
            bytes: 0,
            log: Some(log),
        }
    }

    /// Returns the number of body bytes yielded so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes
    }

    fn finish(&mut self, complete: bool) {
        if let Some(log) = self.log.take() {
            log.emit(self.bytes, complete);
        }
    }
}

impl http_body::Body for CountingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_frame(cx);

        match &poll {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                if this.inner.is_end_stream() {
                    this.finish(true);
                }
            }
            Poll::Ready(Some(Err(_))) => this.finish(false),
            Poll::Ready(None) => this.finish(true),
            Poll::Pending => {}
        }

        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CountingBody {
    fn drop(&mut self) {
        let complete = self.inner.is_end_stream();
        self.finish(complete);
    }
}

/// Middleware function for request logging.
///
/// This can be used with `axum::middleware::from_fn`.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    let log = RequestLog {
        method,
        path,
        status: response.status(),
        started,
    };

    response.map(|body| Body::new(CountingBody::new(body, log)))
}
