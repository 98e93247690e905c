//! Keycloak password-grant token acquisition
//!
//! Tokens are short-lived, so every flow invocation fetches a fresh one
//! rather than caching across runs.

use crate::config::RemoteCredentials;
use crate::error::SyncError;
use reqwest::blocking::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchange the configured credentials for a bearer token
pub fn fetch_access_token(client: &Client, creds: &RemoteCredentials) -> Result<String, SyncError> {
    let form = [
        ("grant_type", "password"),
        ("client_id", creds.client_id.as_str()),
        ("username", creds.username.as_str()),
        ("password", creds.password.as_str()),
    ];
    let response = client.post(&creds.auth_url).form(&form).send()?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        return Err(SyncError::RemoteAuth(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token: TokenResponse = response
        .json()
        .map_err(|e| SyncError::RemoteAuth(format!("malformed token response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(SyncError::RemoteAuth(
            "token endpoint returned an empty access_token".to_string(),
        ));
    }
    Ok(token.access_token)
}
