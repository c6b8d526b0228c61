//! Atomic snapshot of the account list (spec §4.5 "Persistence", §6).
//!
//! `~/.kiro-proxy/config.json` holds `{accounts: [Account...], version: 1}`. Writes go to a
//! sibling temp file first and are renamed into place, the same write-temp-then-rename
//! discipline this codebase's database layer uses for its own writes — `rename` is atomic on
//! the same filesystem, so a reader never observes a half-written file.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use crate::credential::Account;

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub accounts: Vec<Account>,
    pub version: u32,
}

pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> io::Result<Vec<Account>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let state: PersistedState = serde_json::from_slice(&bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(state.accounts)
    }

    pub fn save(&self, accounts: &[Account]) -> io::Result<()> {
        let state = PersistedState {
            accounts: accounts.to_vec(),
            version: CURRENT_VERSION,
        };
        let payload = serde_json::to_vec_pretty(&state)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, payload)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{AuthKind, Credential};
    use chrono::Utc;

    fn sample_account(id: &str) -> Account {
        Account::new(Credential {
            id: id.to_string(),
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            auth_kind: AuthKind::Google,
            client_id_hash: "hash".to_string(),
            issued_at: Utc::now(),
        })
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let dir = std::env::temp_dir().join(format!("kiro-proxy-test-{}", uuid::Uuid::new_v4()));
        let persistence = Persistence::new(dir.join("config.json"));
        assert!(persistence.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trips_persisted_fields() {
        let dir = std::env::temp_dir().join(format!("kiro-proxy-test-{}", uuid::Uuid::new_v4()));
        let persistence = Persistence::new(dir.join("config.json"));

        let mut account = sample_account("acct-1");
        account.last_used_at = Some(Utc::now()); // runtime-only; must not round-trip

        persistence.save(std::slice::from_ref(&account)).unwrap();
        let loaded = persistence.load().unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].credential.id, "acct-1");
        assert!(loaded[0].last_used_at.is_none());

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn no_temp_file_left_behind_after_save() {
        let dir = std::env::temp_dir().join(format!("kiro-proxy-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let persistence = Persistence::new(path.clone());
        persistence.save(&[sample_account("acct-1")]).unwrap();

        assert!(!tmp_path_for(&path).exists());
        std::fs::remove_dir_all(dir).ok();
    }
}
