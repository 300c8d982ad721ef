//! The permissive/validated HTTP client pair.
//!
//! All outbound HTTPS in the collector goes through one of two
//! [`reqwest::Client`]s: a **permissive** client with TLS verification
//! disabled (bootstrap, endpoints without a trusted chain) and a
//! **validated** client built from the current CA bundle. The validated
//! client sits behind an [`ArcSwapOption`]: requests load the pointer once,
//! and a trust reload publishes a replacement client atomically — requests
//! started after [`HttpClientPair::reload_trust`] returns observe the new
//! trust store, requests already in flight finish on the client they loaded.

use crate::retry::{RetryPolicy, retry_with_predicate};
use arc_swap::ArcSwapOption;
use reqwest::{Client, Method};
use riverwatch_core::{CollectorError, Credentials};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// A completed HTTP exchange.
///
/// Auth rejections (401/403) and server errors surface as
/// [`CollectorError`]s instead; any other status lands here so callers can
/// inspect it (a 404 on a subscription delete is information, not a failure).
#[derive(Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True for any 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Parse`] when the body is not valid JSON of
    /// the expected shape.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CollectorError> {
        serde_json::from_slice(&self.body).map_err(|e| CollectorError::Parse(e.to_string()))
    }
}

/// The permissive + validated client pair.
pub struct HttpClientPair {
    permissive: Client,
    validated: ArcSwapOption<Client>,
    timeout: Duration,
    retry: RetryPolicy,
    log_insecure_failover: bool,
}

impl HttpClientPair {
    /// Build the pair. Only the permissive client is constructed up front;
    /// the validated client appears on the first successful
    /// [`reload_trust`](Self::reload_trust).
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Transport`] when the permissive client
    /// cannot be constructed — with no client at all the collector cannot
    /// function.
    pub fn new(
        timeout: Duration,
        retry: RetryPolicy,
        log_insecure_failover: bool,
    ) -> Result<Self, CollectorError> {
        let permissive = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::Transport(format!("permissive client: {e}")))?;

        Ok(Self {
            permissive,
            validated: ArcSwapOption::const_empty(),
            timeout,
            retry,
            log_insecure_failover,
        })
    }

    /// Whether a validated client is currently installed.
    #[must_use]
    pub fn has_validated(&self) -> bool {
        self.validated.load().is_some()
    }

    /// Build a validated client from a PEM CA bundle and swap it in.
    ///
    /// The swap is atomic: no request started after this returns observes the
    /// old trust store, and requests in flight at the moment of the swap
    /// continue on their old client.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Transport`] when the bundle does not parse
    /// or the client cannot be built; the previously installed client (if
    /// any) stays in place.
    pub fn reload_trust(&self, bundle: &[u8]) -> Result<(), CollectorError> {
        let certs = reqwest::Certificate::from_pem_bundle(bundle)
            .map_err(|e| CollectorError::Transport(format!("CA bundle: {e}")))?;

        let mut builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .timeout(self.timeout);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| CollectorError::Transport(format!("validated client: {e}")))?;

        self.validated.store(Some(Arc::new(client)));
        tracing::info!("validated HTTP client rebuilt from new trust bundle");
        Ok(())
    }

    /// Repeatedly try to install a validated client from a bundle loader.
    ///
    /// Used at startup: the loader is invoked up to `attempts` times at
    /// `interval` spacing. On overall failure the collector proceeds
    /// permissive-only; the caller owns logging that warning.
    ///
    /// # Errors
    ///
    /// Returns the last build error when every attempt fails.
    pub async fn reload_trust_with_retry<F>(
        &self,
        mut load_bundle: F,
        attempts: usize,
        interval: Duration,
    ) -> Result<(), CollectorError>
    where
        F: FnMut() -> Result<Vec<u8>, CollectorError>,
    {
        let mut last_err = CollectorError::Transport("no attempts made".to_string());
        for attempt in 1..=attempts {
            match load_bundle().and_then(|bundle| self.reload_trust(&bundle)) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        error = %err,
                        "validated client build failed"
                    );
                    last_err = err;
                }
            }
            if attempt < attempts {
                sleep(interval).await;
            }
        }
        Err(last_err)
    }

    /// GET a URL with optional basic-auth credentials.
    ///
    /// # Errors
    ///
    /// [`CollectorError::Transport`] after retries are exhausted,
    /// [`CollectorError::Auth`] on 401/403.
    pub async fn get(
        &self,
        url: &str,
        creds: Option<&Credentials>,
    ) -> Result<HttpResponse, CollectorError> {
        self.request(Method::GET, url, creds, None, &[]).await
    }

    /// GET a URL on the permissive client regardless of trust state.
    ///
    /// For trusted infrastructure (HSM) where chain validation is not
    /// required.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    pub async fn get_permissive(
        &self,
        url: &str,
        creds: Option<&Credentials>,
    ) -> Result<HttpResponse, CollectorError> {
        let permissive = self.permissive.clone();
        retry_with_predicate(
            &self.retry,
            || Self::attempt(&permissive, Method::GET, url, creds, None, &[]),
            CollectorError::is_transient,
        )
        .await
    }

    /// POST a JSON body.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    pub async fn post(
        &self,
        url: &str,
        creds: Option<&Credentials>,
        body: Vec<u8>,
    ) -> Result<HttpResponse, CollectorError> {
        self.request(Method::POST, url, creds, Some(body), &[]).await
    }

    /// DELETE a resource.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    pub async fn delete(
        &self,
        url: &str,
        creds: Option<&Credentials>,
    ) -> Result<HttpResponse, CollectorError> {
        self.request(Method::DELETE, url, creds, None, &[]).await
    }

    /// One logical request: pick a client, retry transient failures, fail
    /// over to the permissive client when the validated chain cannot reach
    /// the endpoint.
    pub(crate) async fn request(
        &self,
        method: Method,
        url: &str,
        creds: Option<&Credentials>,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, CollectorError> {
        // One pointer load per request: a concurrent reload_trust never
        // switches a request mid-flight.
        let validated = self.validated.load_full();

        retry_with_predicate(
            &self.retry,
            || {
                let method = method.clone();
                let body = body.clone();
                let validated = validated.clone();
                async move {
                    match &validated {
                        Some(client) => {
                            let first = Self::attempt(
                                client,
                                method.clone(),
                                url,
                                creds,
                                body.clone(),
                                headers,
                            )
                            .await;
                            match first {
                                Err(err) if err.is_transient() => {
                                    if self.log_insecure_failover {
                                        tracing::warn!(
                                            url,
                                            error = %err,
                                            "validated request failed, retrying on permissive client"
                                        );
                                    }
                                    Self::attempt(
                                        &self.permissive,
                                        method,
                                        url,
                                        creds,
                                        body,
                                        headers,
                                    )
                                    .await
                                }
                                other => other,
                            }
                        }
                        None => {
                            Self::attempt(&self.permissive, method, url, creds, body, headers)
                                .await
                        }
                    }
                }
            },
            CollectorError::is_transient,
        )
        .await
    }

    async fn attempt(
        client: &Client,
        method: Method,
        url: &str,
        creds: Option<&Credentials>,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, CollectorError> {
        let mut request = client.request(method, url);
        if let Some(creds) = creds {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(body) = body {
            request = request.header("content-type", "application/json").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollectorError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(CollectorError::Auth {
                status: status.as_u16(),
            });
        }
        if status.is_server_error() {
            return Err(CollectorError::Transport(format!(
                "{url}: server returned {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CollectorError::Transport(format!("{url}: {e}")))?
            .to_vec();

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn pair() -> HttpClientPair {
        HttpClientPair::new(Duration::from_secs(1), RetryPolicy::none(), false).unwrap()
    }

    #[test]
    fn starts_without_a_validated_client() {
        assert!(!pair().has_validated());
    }

    #[test]
    fn garbage_bundle_leaves_trust_state_unchanged() {
        let pair = pair();
        let result = pair.reload_trust(b"not a pem bundle");
        assert!(matches!(result, Err(CollectorError::Transport(_))));
        assert!(!pair.has_validated());
    }

    #[tokio::test]
    async fn reload_retry_reports_last_error_after_exhaustion() {
        let pair = pair();
        let result = pair
            .reload_trust_with_retry(
                || Err(CollectorError::Transport("bundle unavailable".into())),
                3,
                Duration::from_millis(1),
            )
            .await;
        assert!(matches!(result, Err(CollectorError::Transport(_))));
        assert!(!pair.has_validated());
    }

    #[test]
    fn response_success_classification() {
        let ok = HttpResponse {
            status: 201,
            body: Vec::new(),
        };
        let not_found = HttpResponse {
            status: 404,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!not_found.is_success());
    }

    #[test]
    fn response_json_decode_errors_are_parse_class() {
        let response = HttpResponse {
            status: 200,
            body: b"not-json".to_vec(),
        };
        let decoded: Result<serde_json::Value, _> = response.json();
        assert!(matches!(decoded, Err(CollectorError::Parse(_))));
    }
}
