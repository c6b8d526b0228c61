//! Core scheduling logic for the Account Pool (spec §4.4): round-robin selection, cooldown
//! promotion, status transitions. No IO, no locks — this is the part unit-tested in isolation,
//! the actor in [`super::actor`] only adds the message-passing shell around it.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::credential::{Account, AccountStatus};

const COOLDOWN_DURATION_SECS: i64 = 300;

pub struct AccountScheduler {
    accounts: HashMap<String, Account>,
    /// Insertion order — the tie-break for round-robin (spec §4.4).
    order: Vec<String>,
    last_selected_index: Option<usize>,
}

impl AccountScheduler {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            order: Vec::new(),
            last_selected_index: None,
        }
    }

    pub fn add_account(&mut self, account: Account) {
        let id = account.credential.id.clone();
        if !self.accounts.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.accounts.insert(id, account);
    }

    pub fn remove_account(&mut self, id: &str) -> Option<Account> {
        self.order.retain(|existing| existing != id);
        self.accounts.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Account> {
        self.order.iter().filter_map(|id| self.accounts.get(id))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Promotes any `Cooldown` account whose timer has expired back to `Active` (spec §4.3
    /// recovery rule, also driven independently by the Background Scheduler).
    pub fn promote_expired_cooldowns(&mut self, now: DateTime<Utc>) {
        for id in &self.order {
            if let Some(account) = self.accounts.get_mut(id) {
                if account.status == AccountStatus::Cooldown
                    && account.cooldown_until.is_some_and(|until| until <= now)
                {
                    account.reactivate();
                }
            }
        }
    }

    /// Step 2-4 of the selection algorithm: round-robin over `Active` accounts starting after
    /// `last_selected_index`, promoting expired cooldowns first if nothing is immediately
    /// selectable. Affinity (step 1) is handled by the caller, which owns the affinity cache.
    pub fn select_round_robin(&mut self, now: DateTime<Utc>) -> Option<String> {
        if let Some(id) = self.try_round_robin() {
            return Some(id);
        }

        self.promote_expired_cooldowns(now);
        self.try_round_robin()
    }

    fn try_round_robin(&mut self) -> Option<String> {
        let n = self.order.len();
        if n == 0 {
            return None;
        }

        let start = self.last_selected_index.map(|idx| idx + 1).unwrap_or(0);
        for offset in 0..n {
            let idx = (start + offset) % n;
            let id = &self.order[idx];
            if self
                .accounts
                .get(id)
                .is_some_and(|account| account.status == AccountStatus::Active)
            {
                self.last_selected_index = Some(idx);
                return Some(id.clone());
            }
        }
        None
    }

    pub fn report_quota_exceeded(&mut self, id: &str, now: DateTime<Utc>) {
        if let Some(account) = self.accounts.get_mut(id) {
            account.cool_down(Duration::seconds(COOLDOWN_DURATION_SECS), now);
        }
    }

    pub fn report_unhealthy(&mut self, id: &str, reason: impl Into<String>, now: DateTime<Utc>) {
        if let Some(account) = self.accounts.get_mut(id) {
            account.mark_unhealthy(reason, now);
        }
    }

    pub fn restore(&mut self, id: &str) {
        if let Some(account) = self.accounts.get_mut(id) {
            account.reactivate();
        }
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) {
        if let Some(account) = self.accounts.get_mut(id) {
            account.enabled = enabled;
            if !enabled {
                account.status = AccountStatus::Disabled;
            } else if account.status == AccountStatus::Disabled {
                account.reactivate();
            }
        }
    }

    pub fn touch_last_used(&mut self, id: &str, now: DateTime<Utc>) {
        if let Some(account) = self.accounts.get_mut(id) {
            account.last_used_at = Some(now);
        }
    }

    /// Applies the health-check two-strike rule (spec §4.5): one success clears the strike
    /// counter, two consecutive failures mark the account `Unhealthy`.
    pub fn record_health_check(&mut self, id: &str, success: bool, now: DateTime<Utc>) {
        const HEALTH_CHECK_STRIKES: u8 = 2;
        let Some(account) = self.accounts.get_mut(id) else {
            return;
        };
        if success {
            account.health_strikes = 0;
            if account.status == AccountStatus::Unhealthy {
                account.reactivate();
            }
            return;
        }
        account.health_strikes = account.health_strikes.saturating_add(1);
        if account.health_strikes >= HEALTH_CHECK_STRIKES {
            account.mark_unhealthy("two consecutive health-check probe failures", now);
        }
    }

    pub fn refresh_account_credential(
        &mut self,
        id: &str,
        access_token: String,
        expires_at: DateTime<Utc>,
    ) {
        if let Some(account) = self.accounts.get_mut(id) {
            account.credential.access_token = access_token;
            account.credential.expires_at = expires_at;
        }
    }
}

impl Default for AccountScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{AuthKind, Credential};

    fn account(id: &str) -> Account {
        Account::new(Credential {
            id: id.to_string(),
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            auth_kind: AuthKind::Google,
            client_id_hash: "hash".to_string(),
            issued_at: Utc::now(),
        })
    }

    #[test]
    fn round_robin_visits_accounts_in_insertion_order() {
        let mut scheduler = AccountScheduler::new();
        scheduler.add_account(account("a"));
        scheduler.add_account(account("b"));
        scheduler.add_account(account("c"));

        let now = Utc::now();
        assert_eq!(scheduler.select_round_robin(now), Some("a".to_string()));
        assert_eq!(scheduler.select_round_robin(now), Some("b".to_string()));
        assert_eq!(scheduler.select_round_robin(now), Some("c".to_string()));
        assert_eq!(scheduler.select_round_robin(now), Some("a".to_string()));
    }

    #[test]
    fn cooling_an_account_skips_it_until_it_recovers() {
        let mut scheduler = AccountScheduler::new();
        scheduler.add_account(account("a"));
        scheduler.add_account(account("b"));
        let now = Utc::now();

        scheduler.report_quota_exceeded("a", now);
        assert_eq!(scheduler.select_round_robin(now), Some("b".to_string()));
        assert_eq!(scheduler.select_round_robin(now), Some("b".to_string()));
    }

    #[test]
    fn cooldown_expiry_boundary_is_selectable_exactly_at_instant() {
        let mut scheduler = AccountScheduler::new();
        scheduler.add_account(account("a"));
        let now = Utc::now();
        scheduler.report_quota_exceeded("a", now);

        let expiry = now + Duration::seconds(COOLDOWN_DURATION_SECS);
        assert_eq!(scheduler.select_round_robin(expiry), Some("a".to_string()));
    }

    #[test]
    fn unhealthy_accounts_are_never_selected() {
        let mut scheduler = AccountScheduler::new();
        scheduler.add_account(account("a"));
        let now = Utc::now();
        scheduler.report_unhealthy("a", "invalid_grant", now);
        assert_eq!(scheduler.select_round_robin(now), None);
    }

    #[test]
    fn disabling_an_account_removes_it_from_selection_and_restores_on_enable() {
        let mut scheduler = AccountScheduler::new();
        scheduler.add_account(account("a"));
        let now = Utc::now();

        scheduler.set_enabled("a", false);
        assert_eq!(scheduler.get("a").unwrap().status, AccountStatus::Disabled);
        assert_eq!(scheduler.select_round_robin(now), None);

        scheduler.set_enabled("a", true);
        assert_eq!(scheduler.get("a").unwrap().status, AccountStatus::Active);
        assert_eq!(scheduler.select_round_robin(now), Some("a".to_string()));
    }

    #[test]
    fn empty_pool_returns_none() {
        let mut scheduler = AccountScheduler::new();
        assert_eq!(scheduler.select_round_robin(Utc::now()), None);
    }

    #[test]
    fn two_consecutive_health_check_failures_mark_unhealthy() {
        let mut scheduler = AccountScheduler::new();
        scheduler.add_account(account("a"));
        let now = Utc::now();

        scheduler.record_health_check("a", false, now);
        assert_eq!(scheduler.get("a").unwrap().status, AccountStatus::Active);

        scheduler.record_health_check("a", false, now);
        assert_eq!(scheduler.get("a").unwrap().status, AccountStatus::Unhealthy);
    }

    #[test]
    fn a_single_success_clears_the_strike_counter() {
        let mut scheduler = AccountScheduler::new();
        scheduler.add_account(account("a"));
        let now = Utc::now();

        scheduler.record_health_check("a", false, now);
        scheduler.record_health_check("a", true, now);
        assert_eq!(scheduler.get("a").unwrap().health_strikes, 0);
        assert_eq!(scheduler.get("a").unwrap().status, AccountStatus::Active);
    }
}
