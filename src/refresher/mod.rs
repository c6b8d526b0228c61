//! Token Refresher (spec §4.2): refreshes a credential's access token against the endpoint its
//! `auth_kind` names, with at most one refresh in flight per account and concurrent callers
//! sharing the result.

mod actor;
mod endpoints;

pub use actor::{RefresherHandle, spawn};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct RefreshSuccess {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Error classification the spec names for a failed refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshErrorKind {
    TransientNetwork,
    InvalidRefreshToken,
    RateLimited,
    ServerError,
}

pub type RefreshResult = Result<RefreshSuccess, RefreshErrorKind>;
