//! Vault secret-store client.
//!
//! Fetches per-endpoint BMC credentials from a single keypath. The secret
//! body is either the bare `{username, password}` object or the same object
//! under a `data` wrapper, depending on the secrets engine fronting it.

use crate::pair::HttpClientPair;
use reqwest::Method;
use riverwatch_core::{CollectorError, Credentials};
use serde::Deserialize;

#[derive(Deserialize)]
struct Secret {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct WrappedSecret {
    data: Secret,
}

/// Client for the Vault KV surface holding BMC credentials.
#[derive(Debug, Clone)]
pub struct VaultClient {
    addr: String,
    keypath: String,
    token: String,
}

impl VaultClient {
    /// Create a client for one Vault address and keypath.
    #[must_use]
    pub fn new(addr: impl Into<String>, keypath: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            addr: addr.into().trim_end_matches('/').to_string(),
            keypath: keypath.into().trim_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// URL of the secret for one endpoint.
    #[must_use]
    pub fn secret_url(&self, endpoint_id: &str) -> String {
        format!("{}/v1/{}/{}", self.addr, self.keypath, endpoint_id)
    }

    /// Fetch credentials for an endpoint.
    ///
    /// # Errors
    ///
    /// [`CollectorError::Transport`] on network failure or non-2xx status,
    /// [`CollectorError::Auth`] when the token is rejected,
    /// [`CollectorError::Parse`] when the secret body has an unexpected
    /// shape.
    pub async fn credentials(
        &self,
        http: &HttpClientPair,
        endpoint_id: &str,
    ) -> Result<Credentials, CollectorError> {
        let url = self.secret_url(endpoint_id);
        let response = http
            .request(
                Method::GET,
                &url,
                None,
                None,
                &[("X-Vault-Token", self.token.as_str())],
            )
            .await?;

        if !response.is_success() {
            return Err(CollectorError::Transport(format!(
                "secret store returned status {} for {endpoint_id}",
                response.status
            )));
        }

        let secret = response.json::<Secret>().or_else(|_| {
            response
                .json::<WrappedSecret>()
                .map(|wrapped| wrapped.data)
        })?;

        Ok(Credentials::new(secret.username, secret.password))
    }
}
