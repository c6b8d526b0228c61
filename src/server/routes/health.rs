//! `GET /healthz`: not named by the client-facing protocol table, but carried anyway as the
//! ambient operator-visibility endpoint every proxy in this lineage exposes.

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use crate::credential::AccountStatus;
use crate::error::KiroError;
use crate::server::router::AppState;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
    accounts_total: usize,
    accounts_active: usize,
    accounts_cooldown: usize,
    accounts_unhealthy: usize,
    accounts_disabled: usize,
}

pub async fn healthz(State(state): State<AppState>) -> Result<impl IntoResponse, KiroError> {
    let accounts = state.pool.list_accounts().await?;
    let mut body = HealthBody {
        status: "ok",
        accounts_total: accounts.len(),
        accounts_active: 0,
        accounts_cooldown: 0,
        accounts_unhealthy: 0,
        accounts_disabled: 0,
    };
    for account in &accounts {
        match account.status {
            AccountStatus::Active => body.accounts_active += 1,
            AccountStatus::Cooldown => body.accounts_cooldown += 1,
            AccountStatus::Unhealthy => body.accounts_unhealthy += 1,
            AccountStatus::Disabled => body.accounts_disabled += 1,
        }
    }
    Ok(Json(body))
}
