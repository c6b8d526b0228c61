use governor::{Quota, RateLimiter};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::endpoints;
use super::{RefreshErrorKind, RefreshResult};
use crate::credential::Credential;
use crate::error::KiroError;

type Limiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug)]
pub enum RefresherMessage {
    Refresh {
        account_id: String,
        credential: Credential,
        reply: RpcReplyPort<RefreshResult>,
    },
    Completed {
        account_id: String,
        result: RefreshResult,
    },
}

#[derive(Clone)]
pub struct RefresherHandle {
    actor: ActorRef<RefresherMessage>,
}

impl RefresherHandle {
    /// Refreshes `credential`. If a refresh for this account is already in flight, piggybacks on
    /// it instead of issuing a second upstream request (spec §4.2 concurrency contract).
    pub async fn refresh(
        &self,
        account_id: impl Into<String>,
        credential: Credential,
    ) -> Result<RefreshResult, KiroError> {
        ractor::call!(self.actor, RefresherMessage::Refresh, account_id.into(), credential)
            .map_err(|err| KiroError::ActorError(format!("refresher call failed: {err}")))
    }
}

struct RefresherState {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<Limiter>,
    pending: HashMap<String, Vec<RpcReplyPort<RefreshResult>>>,
}

pub struct RefresherActor;

#[ractor::async_trait]
impl Actor for RefresherActor {
    type Msg = RefresherMessage;
    type State = RefresherState;
    type Arguments = (reqwest::Client, String);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (http, base_url): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let limiter = Arc::new(RateLimiter::direct(
            Quota::per_second(NonZeroU32::new(5).expect("nonzero")).allow_burst(NonZeroU32::new(10).expect("nonzero")),
        ));

        Ok(RefresherState {
            http,
            base_url,
            limiter,
            pending: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RefresherMessage::Refresh {
                account_id,
                credential,
                reply,
            } => {
                if let Some(waiters) = state.pending.get_mut(&account_id) {
                    waiters.push(reply);
                    return Ok(());
                }

                state.pending.insert(account_id.clone(), vec![reply]);

                let http = state.http.clone();
                let base_url = state.base_url.clone();
                let limiter = state.limiter.clone();
                let myself = myself.clone();
                let task_account_id = account_id.clone();

                tokio::spawn(async move {
                    limiter.until_ready().await;
                    let result = endpoints::refresh(&http, &base_url, &credential).await;
                    let _ = myself.cast(RefresherMessage::Completed {
                        account_id: task_account_id,
                        result,
                    });
                });
            }
            RefresherMessage::Completed { account_id, result } => {
                if let Some(waiters) = state.pending.remove(&account_id) {
                    match &result {
                        Ok(_) => info!(account_id = %account_id, "refresh succeeded"),
                        Err(RefreshErrorKind::InvalidRefreshToken) => {
                            warn!(account_id = %account_id, "refresh token rejected by upstream");
                        }
                        Err(kind) => warn!(account_id = %account_id, ?kind, "refresh failed"),
                    }
                    for waiter in waiters {
                        let _ = waiter.send(result.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

pub async fn spawn(http: reqwest::Client, base_url: String) -> RefresherHandle {
    let (actor, _jh) = Actor::spawn(
        Some("Refresher".to_string()),
        RefresherActor,
        (http, base_url),
    )
    .await
    .expect("failed to spawn Refresher actor");

    RefresherHandle { actor }
}
