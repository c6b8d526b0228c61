//! The data model shared by the Account Pool, Token Refresher and Persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which upstream issued a credential, and therefore which refresh endpoint applies.
///
/// Modelled as a tagged variant rather than open-ended polymorphism: the set of kinds is fixed,
/// and the Token Refresher dispatches on this tag directly (see [`crate::refresher`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Google,
    GitHub,
    AwsBuilderId,
    IdentityCenter,
}

/// An upstream identity. `id` is a stable hash of issuer + subject and never changes across
/// refreshes; `refresh_token` must remain non-empty for the credential's whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub auth_kind: AuthKind,
    pub client_id_hash: String,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_expiring_within(&self, horizon: chrono::Duration) -> bool {
        self.expires_at - Utc::now() < horizon
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Cooldown,
    Unhealthy,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub used: u64,
    pub limit: u64,
    pub refreshed_at: DateTime<Utc>,
}

/// A credential plus the runtime state the Account Pool tracks.
///
/// `status` and `cooldown_until`/`enabled` are kept consistent by the pool itself: `status =
/// Cooldown` iff `cooldown_until` is in the future, and `status = Disabled` iff `!enabled`. Only
/// the pool and the credential refresh path mutate an account after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub credential: Credential,
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Runtime-only; not meaningful to persist (see the persistence round-trip law).
    #[serde(skip)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    /// Runtime-only cached quota snapshot.
    #[serde(skip)]
    pub usage: Option<UsageSnapshot>,
    pub enabled: bool,
    /// Consecutive health-check probe failures; resets to 0 on any success. Runtime-only.
    #[serde(skip)]
    pub health_strikes: u8,
}

impl Account {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            status: AccountStatus::Active,
            cooldown_until: None,
            last_used_at: None,
            last_error: None,
            usage: None,
            enabled: true,
            health_strikes: 0,
        }
    }

    pub fn is_selectable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AccountStatus::Active => true,
            AccountStatus::Cooldown => self.cooldown_until.is_some_and(|until| until <= now),
            AccountStatus::Unhealthy | AccountStatus::Disabled => false,
        }
    }

    pub fn cool_down(&mut self, duration: chrono::Duration, now: DateTime<Utc>) {
        self.status = AccountStatus::Cooldown;
        self.cooldown_until = Some(now + duration);
    }

    pub fn mark_unhealthy(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = AccountStatus::Unhealthy;
        self.cooldown_until = None;
        self.last_error = Some(LastError {
            kind: "Unhealthy".to_string(),
            message: reason.into(),
            at: now,
        });
    }

    pub fn reactivate(&mut self) {
        if self.enabled {
            self.status = AccountStatus::Active;
            self.cooldown_until = None;
            self.health_strikes = 0;
        }
    }
}
