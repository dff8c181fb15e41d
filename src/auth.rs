//! Sign-in: the authorization redirect handshake, the code-for-token
//! exchange through the relay, and registering the resulting identity.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    domain::GitHubUser,
    github::{FetchError, GitHubClient, Transport},
    storage::{AccountStore, StoreError},
};

pub const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const SCOPES: &str = "read:user repo";
pub const GENERIC_FAILURE: &str = "Authentication failed. Please try again.";

/// One login attempt. The CSRF `state` lives only as long as the session;
/// completing it consumes the session whatever the outcome.
#[derive(Debug)]
pub struct AuthorizationSession {
    state: String,
    authorize_url: Url,
}

impl AuthorizationSession {
    pub fn begin(client_id: &str, redirect_uri: &str) -> Result<Self, AuthError> {
        let state = Uuid::new_v4().to_string();
        let mut authorize_url =
            Url::parse(AUTHORIZE_URL).map_err(|_| AuthError::MalformedCallback)?;
        authorize_url
            .query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", &state);
        Ok(Self {
            state,
            authorize_url,
        })
    }

    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    #[cfg(test)]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Validates the redirect the provider sent back and returns the
    /// authorization code.
    pub fn complete(self, callback_url: &str) -> Result<String, AuthError> {
        let callback = Url::parse(callback_url.trim()).map_err(|_| AuthError::MalformedCallback)?;

        let mut code = None;
        let mut error = None;
        let mut returned_state = None;
        for (key, value) in callback.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "state" => returned_state = Some(value.into_owned()),
                _ => {}
            }
        }

        if returned_state.as_deref() != Some(self.state.as_str()) {
            warn!("authorization callback state mismatch");
            return Err(AuthError::StateMismatch);
        }
        if let Some(error) = error {
            return Err(AuthError::Provider(error));
        }
        code.filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingCode)
    }
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
}

/// The relay only accepts non-empty alphanumeric codes; mirror that before
/// spending a request.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn exchange_code(client: &Client, relay_url: &str, code: &str) -> Result<String, AuthError> {
    if !is_valid_code(code) {
        return Err(AuthError::InvalidCode);
    }

    let response = client
        .post(relay_url)
        .json(&ExchangeRequest { code })
        .send()
        .map_err(|err| {
            warn!(error = %err, "token exchange request failed");
            AuthError::Transport(err)
        })?;

    let status = response.status();
    if status.as_u16() == 429 {
        warn!("token exchange rate limited by relay");
        return Err(AuthError::RateLimited);
    }
    if !status.is_success() {
        warn!(status = status.as_u16(), "token exchange rejected");
        return Err(AuthError::ExchangeFailed {
            status: Some(status.as_u16()),
        });
    }

    let body: ExchangeResponse = response.json().map_err(|err| {
        warn!(error = %err, "token exchange returned an unreadable body");
        AuthError::ExchangeFailed { status: None }
    })?;
    body.access_token
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::ExchangeFailed { status: None })
}

/// Confirms who the token belongs to and stores it as the active account.
pub fn register_account<T: Transport>(
    client: &GitHubClient<T>,
    access_token: &str,
    accounts: &AccountStore,
) -> Result<GitHubUser, AuthError> {
    let user = client.get_current_user().map_err(AuthError::Identity)?;
    accounts.add_account(access_token, user.clone())?;
    info!(user_id = user.id, login = %user.login, "signed in");
    Ok(user)
}

/// Variants keep the detail for logs; users only ever see
/// [`AuthError::user_message`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization callback could not be parsed")]
    MalformedCallback,
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("provider returned error: {0}")]
    Provider(String),
    #[error("no authorization code received")]
    MissingCode,
    #[error("authorization code has an invalid format")]
    InvalidCode,
    #[error("token exchange rate limited")]
    RateLimited,
    #[error("token exchange failed (status {status:?})")]
    ExchangeFailed { status: Option<u16> },
    #[error("token exchange request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("could not confirm identity: {0}")]
    Identity(#[source] FetchError),
    #[error("could not store account: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE
    }
}
