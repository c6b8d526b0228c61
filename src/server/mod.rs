//! HTTP composition root (spec §4.9): one `AppState`, one `axum::Router` merging the three
//! protocol routers plus the operator-facing health endpoint.

mod auth;
mod outcome;
mod router;
mod routes;

pub use router::{AppState, build_router};
