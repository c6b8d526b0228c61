//! The Account Pool actor: a `ractor` mailbox wrapping [`AccountScheduler`] and
//! [`SessionAffinity`], so every mutation to account state happens on a single task and callers
//! never need their own locking.

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::sync::Arc;
use tracing::{info, warn};

use super::scheduler::AccountScheduler;
use crate::affinity::{SessionAffinity, SessionKey};
use crate::credential::Account;
use crate::error::KiroError;
use crate::persistence::Persistence;
use crate::refresher::{RefreshErrorKind, RefresherHandle};

#[derive(Debug)]
pub enum AccountPoolMessage {
    /// Select an account for a request, preferring the session's sticky account if still active.
    Select(Option<SessionKey>, RpcReplyPort<Option<Account>>),
    ReportQuotaExceeded(String),
    ReportUnhealthy {
        id: String,
        reason: String,
    },
    ReportSuccess(String),
    ReportHealthCheckResult {
        id: String,
        success: bool,
    },
    ApplyRefresh {
        id: String,
        access_token: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    },
    AddAccount(Account),
    RemoveAccount(String),
    Restore(String),
    SetEnabled {
        id: String,
        enabled: bool,
    },
    PromoteExpiredCooldowns,
    ListAccounts(RpcReplyPort<Vec<Account>>),
}

#[derive(Clone)]
pub struct AccountPoolHandle {
    actor: ActorRef<AccountPoolMessage>,
}

impl AccountPoolHandle {
    /// Selects an account, binding the session to it on first pick. Returns `None` if the pool
    /// has no selectable account (the caller maps this to [`crate::error::KiroError::NoAccountAvailable`]).
    pub async fn select(&self, session_key: Option<SessionKey>) -> Result<Option<Account>, KiroError> {
        ractor::call!(self.actor, AccountPoolMessage::Select, session_key)
            .map_err(|err| KiroError::ActorError(format!("account pool select failed: {err}")))
    }

    pub fn report_quota_exceeded(&self, id: impl Into<String>) {
        let _ = self.actor.cast(AccountPoolMessage::ReportQuotaExceeded(id.into()));
    }

    pub fn report_unhealthy(&self, id: impl Into<String>, reason: impl Into<String>) {
        let _ = self.actor.cast(AccountPoolMessage::ReportUnhealthy {
            id: id.into(),
            reason: reason.into(),
        });
    }

    pub fn report_success(&self, id: impl Into<String>) {
        let _ = self.actor.cast(AccountPoolMessage::ReportSuccess(id.into()));
    }

    pub fn report_health_check_result(&self, id: impl Into<String>, success: bool) {
        let _ = self.actor.cast(AccountPoolMessage::ReportHealthCheckResult {
            id: id.into(),
            success,
        });
    }

    pub fn apply_refresh(
        &self,
        id: impl Into<String>,
        access_token: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) {
        let _ = self.actor.cast(AccountPoolMessage::ApplyRefresh {
            id: id.into(),
            access_token,
            expires_at,
        });
    }

    pub fn add_account(&self, account: Account) {
        let _ = self.actor.cast(AccountPoolMessage::AddAccount(account));
    }

    pub fn remove_account(&self, id: impl Into<String>) {
        let _ = self.actor.cast(AccountPoolMessage::RemoveAccount(id.into()));
    }

    pub fn restore(&self, id: impl Into<String>) {
        let _ = self.actor.cast(AccountPoolMessage::Restore(id.into()));
    }

    pub fn set_enabled(&self, id: impl Into<String>, enabled: bool) {
        let _ = self.actor.cast(AccountPoolMessage::SetEnabled {
            id: id.into(),
            enabled,
        });
    }

    pub fn promote_expired_cooldowns(&self) {
        let _ = self.actor.cast(AccountPoolMessage::PromoteExpiredCooldowns);
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, KiroError> {
        ractor::call!(self.actor, AccountPoolMessage::ListAccounts)
            .map_err(|err| KiroError::ActorError(format!("account pool list failed: {err}")))
    }
}

struct PoolState {
    scheduler: AccountScheduler,
    affinity: SessionAffinity,
    persistence: Arc<Persistence>,
    refresher: RefresherHandle,
}

impl PoolState {
    fn persist(&self) {
        let snapshot: Vec<Account> = self.scheduler.all().cloned().collect();
        if let Err(err) = self.persistence.save(&snapshot) {
            warn!(error = %err, "failed to persist account snapshot");
        }
    }
}

pub struct AccountPool;

#[ractor::async_trait]
impl Actor for AccountPool {
    type Msg = AccountPoolMessage;
    type State = PoolState;
    type Arguments = (Vec<Account>, Arc<Persistence>, RefresherHandle);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (initial_accounts, persistence, refresher): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let mut scheduler = AccountScheduler::new();
        for account in initial_accounts {
            scheduler.add_account(account);
        }
        info!(count = scheduler.len(), "account pool started");

        Ok(PoolState {
            scheduler,
            affinity: SessionAffinity::new(),
            persistence,
            refresher,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            AccountPoolMessage::Select(session_key, reply) => {
                let now = chrono::Utc::now();
                let selected = self.select(state, session_key, now);
                let _ = reply.send(selected);
            }
            AccountPoolMessage::ReportQuotaExceeded(id) => {
                state.scheduler.report_quota_exceeded(&id, chrono::Utc::now());
                info!(account_id = %id, "account entering cooldown after quota exceeded");
                state.persist();
            }
            AccountPoolMessage::ReportUnhealthy { id, reason } => {
                state
                    .scheduler
                    .report_unhealthy(&id, reason.clone(), chrono::Utc::now());
                warn!(account_id = %id, reason = %reason, "account marked unhealthy");
                state.persist();
            }
            AccountPoolMessage::ReportSuccess(id) => {
                if let Some(account) = state.scheduler.get(&id) {
                    if account.health_strikes > 0 {
                        state.scheduler.restore(&id);
                    }
                }
            }
            AccountPoolMessage::ReportHealthCheckResult { id, success } => {
                state.scheduler.record_health_check(&id, success, chrono::Utc::now());
                state.persist();
            }
            AccountPoolMessage::ApplyRefresh {
                id,
                access_token,
                expires_at,
            } => {
                state.scheduler.refresh_account_credential(&id, access_token, expires_at);
                state.persist();
            }
            AccountPoolMessage::AddAccount(account) => {
                info!(account_id = %account.credential.id, "account added to pool");
                state.scheduler.add_account(account);
                state.persist();
            }
            AccountPoolMessage::RemoveAccount(id) => {
                if state.scheduler.remove_account(&id).is_some() {
                    info!(account_id = %id, "account removed from pool");
                    state.persist();
                }
            }
            AccountPoolMessage::Restore(id) => {
                // Reactivating straight away would just hand the next request a credential
                // that's about to fail with AuthExpired again, so a manual restore has to prove
                // the refresh token still works first (spec §8 scenario 4).
                let Some(credential) = state.scheduler.get(&id).map(|account| account.credential.clone()) else {
                    return Ok(());
                };
                match state.refresher.refresh(id.clone(), credential).await {
                    Ok(Ok(success)) => {
                        state.scheduler.refresh_account_credential(&id, success.access_token, success.expires_at);
                        state.scheduler.restore(&id);
                        info!(account_id = %id, "account manually restored after a successful refresh");
                        state.persist();
                    }
                    Ok(Err(RefreshErrorKind::InvalidRefreshToken)) => {
                        state.scheduler.report_unhealthy(&id, "invalid_grant while restoring", chrono::Utc::now());
                        warn!(account_id = %id, "manual restore rejected: refresh token is invalid");
                        state.persist();
                    }
                    Ok(Err(kind)) => {
                        warn!(account_id = %id, ?kind, "manual restore failed, account stays unhealthy");
                    }
                    Err(err) => {
                        warn!(account_id = %id, error = %err, "manual restore: refresher call failed");
                    }
                }
            }
            AccountPoolMessage::SetEnabled { id, enabled } => {
                state.scheduler.set_enabled(&id, enabled);
                state.persist();
            }
            AccountPoolMessage::PromoteExpiredCooldowns => {
                state.scheduler.promote_expired_cooldowns(chrono::Utc::now());
            }
            AccountPoolMessage::ListAccounts(reply) => {
                let accounts: Vec<Account> = state.scheduler.all().cloned().collect();
                let _ = reply.send(accounts);
            }
        }
        Ok(())
    }
}

impl AccountPool {
    /// Implements the spec's selection order: sticky session hit first (if the bound account is
    /// still selectable), then round-robin over the remaining pool.
    fn select(
        &self,
        state: &mut PoolState,
        session_key: Option<SessionKey>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Account> {
        if let Some(key) = session_key {
            if let Some(account_id) = state.affinity.get(key) {
                if let Some(account) = state.scheduler.get(&account_id) {
                    if account.status == crate::credential::AccountStatus::Active {
                        state.scheduler.touch_last_used(&account_id, now);
                        return state.scheduler.get(&account_id).cloned();
                    }
                }
            }
        }

        let id = state.scheduler.select_round_robin(now)?;
        state.scheduler.touch_last_used(&id, now);
        if let Some(key) = session_key {
            state.affinity.bind(key, id.clone());
        }
        state.scheduler.get(&id).cloned()
    }
}

/// Spawns the actor and returns a cloneable handle. Takes a `RefresherHandle` so a manual
/// restore (see `AccountPoolMessage::Restore`) can confirm the refresh token still works before
/// reactivating the account.
pub async fn spawn(initial_accounts: Vec<Account>, persistence: Arc<Persistence>, refresher: RefresherHandle) -> AccountPoolHandle {
    let (actor, _jh) = Actor::spawn(
        Some("AccountPool".to_string()),
        AccountPool,
        (initial_accounts, persistence, refresher),
    )
    .await
    .expect("failed to spawn AccountPool actor");

    AccountPoolHandle { actor }
}
