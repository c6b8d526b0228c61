//! Per-`auth_kind` refresh endpoints (spec §6, §9 "Dynamic dispatch on auth kind"). A tagged
//! variant with a small per-variant handler, not open-ended polymorphism — the set of kinds is
//! fixed at four.

use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

use super::{RefreshErrorKind, RefreshSuccess};
use crate::credential::{AuthKind, Credential};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_CLIENT_ID: &str = "kiro-proxy.apps.googleusercontent.com";

const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

const AWS_BUILDER_ID_TOKEN_URL: &str = "https://oidc.us-east-1.amazonaws.com/token";

/// A generic `{access_token, expires_in}`-shaped OAuth token response. Every Social kind and
/// the upstream's own `/refresh-token` endpoint return something in this family.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Refreshes `credential` against the endpoint its `auth_kind` names. `base_url` is the
/// configured upstream base, used only for `IdentityCenter`.
pub async fn refresh(
    client: &reqwest::Client,
    base_url: &str,
    credential: &Credential,
) -> Result<RefreshSuccess, RefreshErrorKind> {
    let response = match credential.auth_kind {
        AuthKind::Google => {
            post_form(
                client,
                GOOGLE_TOKEN_URL,
                &[
                    ("client_id", GOOGLE_CLIENT_ID),
                    ("refresh_token", credential.refresh_token.as_str()),
                    ("grant_type", "refresh_token"),
                ],
            )
            .await
        }
        AuthKind::GitHub => {
            post_form(
                client,
                GITHUB_TOKEN_URL,
                &[
                    ("refresh_token", credential.refresh_token.as_str()),
                    ("grant_type", "refresh_token"),
                ],
            )
            .await
        }
        AuthKind::AwsBuilderId => {
            post_form(
                client,
                AWS_BUILDER_ID_TOKEN_URL,
                &[
                    ("refreshToken", credential.refresh_token.as_str()),
                    ("grantType", "refresh_token"),
                ],
            )
            .await
        }
        AuthKind::IdentityCenter => {
            let url = format!("{}/refresh-token", base_url.trim_end_matches('/'));
            post_form(
                client,
                &url,
                &[("refreshToken", credential.refresh_token.as_str())],
            )
            .await
        }
    }?;

    let expires_at = response
        .expires_in
        .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
        .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));

    Ok(RefreshSuccess {
        access_token: response.access_token,
        expires_at,
    })
}

async fn post_form(
    client: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, RefreshErrorKind> {
    let response = client
        .post(url)
        .timeout(Duration::from_secs(10))
        .form(form)
        .send()
        .await
        .map_err(|_| RefreshErrorKind::TransientNetwork)?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(RefreshErrorKind::RateLimited);
    }
    if status.is_server_error() {
        return Err(RefreshErrorKind::ServerError);
    }
    if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED {
        let body = response.text().await.unwrap_or_default();
        if body.contains("invalid_grant") {
            return Err(RefreshErrorKind::InvalidRefreshToken);
        }
        return Err(RefreshErrorKind::ServerError);
    }
    if !status.is_success() {
        return Err(RefreshErrorKind::ServerError);
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|_| RefreshErrorKind::ServerError)
}
