//! Background Scheduler (spec §4.5): two independent periodic tasks — pre-refresh and health
//! check — each ticking on its own timer, neither overlapping with itself, both cancellable on
//! shutdown.

use chrono::Duration as ChronoDuration;
use kiro_schema::kiro::{ConversationRequest, HistoryEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::credential::AuthKind;
use crate::fingerprint::machine_fingerprint;
use crate::pool::AccountPoolHandle;
use crate::refresher::RefresherHandle;
use crate::upstream::UpstreamClient;

const PRE_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
const PRE_REFRESH_HORIZON: ChronoDuration = ChronoDuration::minutes(15);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub struct BackgroundScheduler {
    shutdown_tx: watch::Sender<bool>,
    pre_refresh: JoinHandle<()>,
    health_check: JoinHandle<()>,
}

impl BackgroundScheduler {
    pub fn spawn(
        pool: AccountPoolHandle,
        refresher: RefresherHandle,
        upstream: Arc<UpstreamClient>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pre_refresh = tokio::spawn(pre_refresh_loop(
            pool.clone(),
            refresher,
            shutdown_rx.clone(),
        ));
        let health_check = tokio::spawn(health_check_loop(pool, upstream, shutdown_rx));

        Self {
            shutdown_tx,
            pre_refresh,
            health_check,
        }
    }

    /// Signals both tasks to stop after their current iteration, and awaits them.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.pre_refresh.await;
        let _ = self.health_check.await;
    }
}

async fn pre_refresh_loop(
    pool: AccountPoolHandle,
    refresher: RefresherHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(PRE_REFRESH_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                pool.promote_expired_cooldowns();
                run_pre_refresh(&pool, &refresher).await;
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn run_pre_refresh(pool: &AccountPoolHandle, refresher: &RefresherHandle) {
    let accounts = match pool.list_accounts().await {
        Ok(accounts) => accounts,
        Err(err) => {
            warn!(error = %err, "pre-refresh: failed to list accounts");
            return;
        }
    };

    for account in accounts {
        if !account.credential.is_expiring_within(PRE_REFRESH_HORIZON) {
            continue;
        }
        let id = account.credential.id.clone();
        match refresher.refresh(id.clone(), account.credential.clone()).await {
            Ok(Ok(success)) => {
                info!(account_id = %id, "pre-refresh succeeded");
                pool.apply_refresh(id, success.access_token, success.expires_at);
            }
            Ok(Err(crate::refresher::RefreshErrorKind::InvalidRefreshToken)) => {
                pool.report_unhealthy(id, "invalid_grant during pre-refresh");
            }
            Ok(Err(kind)) => {
                warn!(account_id = %id, ?kind, "pre-refresh failed, will retry next tick");
            }
            Err(err) => warn!(account_id = %id, error = %err, "pre-refresh actor call failed"),
        }
    }
}

async fn health_check_loop(
    pool: AccountPoolHandle,
    upstream: Arc<UpstreamClient>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_health_check(&pool, &upstream).await;
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn run_health_check(pool: &AccountPoolHandle, upstream: &UpstreamClient) {
    let accounts = match pool.list_accounts().await {
        Ok(accounts) => accounts,
        Err(err) => {
            warn!(error = %err, "health check: failed to list accounts");
            return;
        }
    };

    for account in accounts {
        if account.status == crate::credential::AccountStatus::Disabled {
            continue;
        }

        let probe = probe_request(&account.credential.auth_kind);
        let now = chrono::Utc::now();
        let fingerprint = machine_fingerprint(&account.credential.id, now);

        let outcome = upstream
            .send_conversation(&account.credential, &fingerprint, &probe)
            .await;

        pool.report_health_check_result(account.credential.id.clone(), outcome.is_ok());
    }
}

fn probe_request(_auth_kind: &AuthKind) -> ConversationRequest {
    ConversationRequest {
        conversation_id: uuid::Uuid::new_v4().to_string(),
        model: "claude-haiku-4.5".to_string(),
        history: vec![HistoryEntry::User {
            content: "count tokens".to_string(),
        }],
        system: None,
        tools: None,
    }
}
