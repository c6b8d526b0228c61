//! Authorization-header handling (spec §4.9 Non-goal): every client-facing route accepts an
//! `Authorization` header, but nothing here ever rejects a request over it — unlike the
//! teacher's `RequireKeyAuth` guard, there is no API key to check against.

use axum::{extract::Request, middleware::Next, response::Response};
use reqwest::header::AUTHORIZATION;
use tracing::debug;

/// Passes every request through unconditionally; only logs whether the header was present, so
/// the shape of the middleware stack matches the rest of this lineage without enforcing
/// anything this proxy was told not to enforce.
pub async fn accept_any(req: Request, next: Next) -> Response {
    if req.headers().contains_key(AUTHORIZATION) {
        debug!("request carried an Authorization header (ignored)");
    }
    next.run(req).await
}
