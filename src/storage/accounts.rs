use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{AUTH_KEY, KeyValueStore, StoreError};
use crate::domain::{Account, AuthState, GitHubUser, UserId};

/// Single-account shape written by older releases.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyAuthState {
    access_token: Option<String>,
    user: Option<GitHubUser>,
}

impl AuthState {
    /// Re-authenticating an existing identity refreshes it in place.
    fn upsert(&mut self, access_token: &str, user: GitHubUser) {
        let user_id = user.id;
        let account = Account {
            access_token: access_token.to_owned(),
            user,
        };
        if let Some(existing) = self.accounts.iter_mut().find(|entry| entry.id() == user_id) {
            *existing = account;
        } else {
            self.accounts.push(account);
        }
        self.active_account_id = Some(user_id);
    }

    fn remove(&mut self, user_id: UserId) {
        self.accounts.retain(|entry| entry.id() != user_id);
        if self.active_account_id == Some(user_id) {
            self.active_account_id = self.accounts.first().map(Account::id);
        }
    }

    fn activate(&mut self, user_id: UserId) -> bool {
        if !self.accounts.iter().any(|entry| entry.id() == user_id) {
            return false;
        }
        self.active_account_id = Some(user_id);
        true
    }

    /// Without an explicit active id the first account drives the UI, so a
    /// freshly migrated state still resolves.
    pub fn active_account(&self) -> Option<&Account> {
        match self.active_account_id {
            None => self.accounts.first(),
            Some(id) => self.accounts.iter().find(|entry| entry.id() == id),
        }
    }
}

#[derive(Clone)]
pub struct AccountStore {
    kv: Arc<dyn KeyValueStore>,
}

impl AccountStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Never fails: unreadable or malformed state degrades to the empty state.
    pub fn get_auth_state(&self) -> AuthState {
        self.load_auth_state().unwrap_or_else(|err| {
            warn!(error = %err, "failed to read stored accounts; treating as signed out");
            AuthState::default()
        })
    }

    /// Like [`get_auth_state`](Self::get_auth_state) but surfaces read
    /// failures. Every mutation starts here so a failed read is never
    /// written back as an empty state.
    pub fn load_auth_state(&self) -> Result<AuthState, StoreError> {
        Ok(self
            .kv
            .get(AUTH_KEY)?
            .map(decode_auth_state)
            .unwrap_or_default())
    }

    pub fn add_account(&self, access_token: &str, user: GitHubUser) -> Result<(), StoreError> {
        let mut state = self.load_auth_state()?;
        debug!(user_id = user.id, login = %user.login, "storing account");
        state.upsert(access_token, user);
        self.save_auth_state(&state)
    }

    /// Cached pull requests for the account are left alone; see
    /// `AggregationEngine::logout`.
    pub fn remove_account(&self, user_id: UserId) -> Result<(), StoreError> {
        let mut state = self.load_auth_state()?;
        state.remove(user_id);
        self.save_auth_state(&state)
    }

    /// Returns `false` and leaves the state untouched for unknown ids.
    pub fn set_active_account(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut state = self.load_auth_state()?;
        if !state.activate(user_id) {
            debug!(user_id, "ignoring switch to unknown account");
            return Ok(false);
        }
        self.save_auth_state(&state)?;
        Ok(true)
    }

    pub fn get_active_account(&self) -> Option<Account> {
        self.get_auth_state().active_account().cloned()
    }

    pub fn clear_auth_state(&self) -> Result<(), StoreError> {
        self.kv.remove(AUTH_KEY)
    }

    /// Fields this release does not know about are carried over untouched;
    /// legacy single-account keys are dropped once the new shape is written.
    fn save_auth_state(&self, state: &AuthState) -> Result<(), StoreError> {
        let mut blob = match self.kv.get(AUTH_KEY)? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if !blob.contains_key("accounts") {
            blob.remove("accessToken");
            blob.remove("user");
        }
        if let Value::Object(fresh) = serde_json::to_value(state)? {
            blob.extend(fresh);
        }
        self.kv.set(AUTH_KEY, &Value::Object(blob))
    }
}

fn decode_auth_state(value: Value) -> AuthState {
    let is_legacy = match &value {
        Value::Object(map) => map.contains_key("accessToken") && !map.contains_key("accounts"),
        _ => {
            warn!("stored accounts blob is not an object; treating as signed out");
            return AuthState::default();
        }
    };

    if is_legacy {
        return match serde_json::from_value::<LegacyAuthState>(value) {
            Ok(LegacyAuthState {
                access_token: Some(access_token),
                user: Some(user),
            }) => {
                debug!(user_id = user.id, "upgrading legacy single-account state");
                AuthState {
                    active_account_id: Some(user.id),
                    accounts: vec![Account { access_token, user }],
                }
            }
            Ok(_) => AuthState::default(),
            Err(err) => {
                warn!(error = %err, "malformed legacy account state; treating as signed out");
                AuthState::default()
            }
        };
    }

    serde_json::from_value(value).unwrap_or_else(|err| {
        warn!(error = %err, "malformed account state; treating as signed out");
        AuthState::default()
    })
}
