//! Per-request context.
//!
//! Every backend call receives a [`RequestContext`] carrying the request id
//! and a cancellation token. The token is cancelled once the last clone of
//! the context is dropped, i.e. when the request scope ends or the request
//! is aborted by the timeout layer.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Header used to propagate request ids.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request id and cancellation scope passed to backends.
#[derive(Clone)]
pub struct RequestContext {
    request_id: Arc<str>,
    token: CancellationToken,
    _guard: Option<Arc<DropGuard>>,
}

impl RequestContext {
    /// Creates a request-scoped context; its token is cancelled when the
    /// last clone is dropped.
    pub fn new(request_id: impl Into<String>) -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        Self {
            request_id: Arc::from(request_id.into()),
            token,
            _guard: Some(Arc::new(guard)),
        }
    }

    /// A context that is never cancelled implicitly, for calls made outside
    /// of an HTTP request.
    pub fn background() -> Self {
        Self {
            request_id: Arc::from("background"),
            token: CancellationToken::new(),
            _guard: None,
        }
    }

    /// Returns the request id.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns a clone of the cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns true once the request scope has ended.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the request scope ends.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(RequestContext::new(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_cancelled_when_last_clone_dropped() {
        let ctx = RequestContext::new("req-1");
        let token = ctx.cancellation_token();
        let clone = ctx.clone();

        drop(ctx);
        assert!(!token.is_cancelled());
        assert!(!clone.is_cancelled());

        drop(clone);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_background_is_never_cancelled_by_drop() {
        let ctx = RequestContext::background();
        let token = ctx.cancellation_token();
        drop(ctx);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_extracts_request_id_header() {
        let (mut parts, _) = Request::builder()
            .header(X_REQUEST_ID, "abc-123")
            .body(())
            .unwrap()
            .into_parts();

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.request_id(), "abc-123");
    }

    #[tokio::test]
    async fn test_generates_request_id() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.request_id().len(), 36);
    }
}
