//! The pinned-DNS fetch algorithm (spec §4.E). Each hop resolves its own
//! hostname, classifies every resolved address before a socket is ever
//! opened, then builds a client whose resolver is pinned to exactly
//! those addresses — closing the TOCTOU window between resolution and
//! connection.

use crate::allowlist::{AllowDecision, Allowlist};
use crate::classify::{hostname_is_metadata_alias, is_non_overridable_blocked};
use reqwest::{Method, Url};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("scheme-denied: only http/https are permitted")]
    SchemeDenied,
    #[error("metadata-blocked: {0} is a non-overridable metadata/link-local address")]
    MetadataBlocked(String),
    #[error("private-ip-blocked: {0} is not covered by the configured allowlist")]
    PrivateIpBlocked(String),
    #[error("port-denied: port {0} is not permitted for this destination")]
    PortDenied(u16),
    #[error("dns-failed: could not resolve {0}")]
    DnsFailed(String),
    #[error("redirect-loop: {0} was already visited in this request chain")]
    RedirectLoop(String),
    #[error("too-many-redirects: exceeded the configured maximum")]
    TooManyRedirects,
    #[error("request aborted: {0}")]
    Aborted(&'static str),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl EgressError {
    pub fn code(&self) -> &'static str {
        match self {
            EgressError::SchemeDenied => "scheme-denied",
            EgressError::MetadataBlocked(_) => "metadata-blocked",
            EgressError::PrivateIpBlocked(_) => "private-ip-blocked",
            EgressError::PortDenied(_) => "port-denied",
            EgressError::DnsFailed(_) => "dns-failed",
            EgressError::RedirectLoop(_) => "redirect-loop",
            EgressError::TooManyRedirects => "too-many-redirects",
            EgressError::Aborted(_) => "aborted",
            EgressError::Transport(_) => "transport-error",
            EgressError::InvalidUrl(_) => "invalid-url",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EgressConfig {
    pub allowlist: Allowlist,
    pub max_redirects: u8,
    pub timeout: Duration,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { allowlist: Allowlist::default(), max_redirects: 3, timeout: Duration::from_secs(30) }
    }
}

pub struct FetchOutcome {
    pub response: reqwest::Response,
    pub final_url: String,
}

impl FetchOutcome {
    /// Idempotent cleanup hook (spec §4.E's `release()`): closes the
    /// pinned client's connection. Calling this is optional — dropping
    /// `FetchOutcome` without calling it closes the same connection via
    /// `Drop` — but callers that are done with the response body before
    /// it falls out of scope can call it to free the socket early.
    pub fn release(self) {
        drop(self.response);
    }
}

/// Resolves `host:port`, classifying every address before returning it.
async fn resolve_and_classify(
    host: &str,
    port: u16,
    allowlist: &Allowlist,
) -> Result<Vec<SocketAddr>, EgressError> {
    if hostname_is_metadata_alias(host) {
        return Err(EgressError::MetadataBlocked(host.to_string()));
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| EgressError::DnsFailed(host.to_string()))?
        .collect();

    if addrs.is_empty() {
        return Err(EgressError::DnsFailed(host.to_string()));
    }

    for addr in &addrs {
        if is_non_overridable_blocked(addr.ip()) {
            return Err(EgressError::MetadataBlocked(addr.ip().to_string()));
        }
        match allowlist.classify(host, addr.ip(), port) {
            AllowDecision::Permitted => {}
            AllowDecision::PrivateIpBlocked => return Err(EgressError::PrivateIpBlocked(addr.ip().to_string())),
            AllowDecision::PortDenied => return Err(EgressError::PortDenied(port)),
        }
    }

    Ok(addrs)
}

fn pinned_client(host: &str, addrs: &[SocketAddr], timeout: Duration) -> Result<reqwest::Client, EgressError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .resolve_to_addrs(host, addrs)
        .timeout(timeout)
        .build()
        .map_err(EgressError::Transport)
}

fn target_port(url: &Url) -> u16 {
    url.port_or_known_default().unwrap_or(if url.scheme() == "https" { 443 } else { 80 })
}

/// Fetches `url`, following same-algorithm redirects up to
/// `config.max_redirects` hops, each hop independently pinned and
/// classified. Composes `config.timeout` with `cancel` into one abort
/// signal per spec §4.E step 6.
pub async fn fetch(
    method: Method,
    url: &str,
    body: Option<Vec<u8>>,
    config: &EgressConfig,
    cancel: CancellationToken,
) -> Result<FetchOutcome, EgressError> {
    let mut current = Url::parse(url)?;
    let mut visited = std::collections::HashSet::new();
    let mut hop = 0u8;

    loop {
        if current.scheme() != "http" && current.scheme() != "https" {
            return Err(EgressError::SchemeDenied);
        }

        let key = current.as_str().to_string();
        if !visited.insert(key.clone()) {
            return Err(EgressError::RedirectLoop(key));
        }

        let host = current.host_str().ok_or(EgressError::DnsFailed("no host".to_string()))?.to_string();
        let port = target_port(&current);
        let addrs = resolve_and_classify(&host, port, &config.allowlist).await?;
        let client = pinned_client(&host, &addrs, config.timeout)?;

        let mut builder = client.request(method.clone(), current.clone());
        if let Some(b) = &body {
            builder = builder.body(b.clone());
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EgressError::Aborted("cancelled")),
            res = builder.send() => res?,
        };

        if response.status().is_redirection() {
            hop += 1;
            if hop > config.max_redirects {
                return Err(EgressError::TooManyRedirects);
            }
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(EgressError::DnsFailed("redirect with no Location".to_string()))?
                .to_string();
            // Draining the body and dropping `response` closes this hop's
            // connection before the next hop's client is built.
            let _ = response.bytes().await;
            current = current.join(&location)?;
            continue;
        }

        return Ok(FetchOutcome { response, final_url: current.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::PrivateEndpoint;

    #[tokio::test]
    async fn metadata_hostname_is_blocked_before_dns() {
        let config = EgressConfig::default();
        let err = fetch(
            Method::GET,
            "http://metadata.google.internal/",
            None,
            &config,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "metadata-blocked");
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let config = EgressConfig::default();
        let err = fetch(Method::GET, "file:///etc/passwd", None, &config, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "scheme-denied");
    }

    #[tokio::test]
    async fn allowlisted_private_address_without_matching_port_is_denied() {
        let allowlist =
            Allowlist::new(vec![PrivateEndpoint::new_host("internal", "192.168.1.100", vec![8123])]);
        let config = EgressConfig { allowlist, max_redirects: 3, timeout: Duration::from_secs(5) };
        let err = fetch(Method::GET, "http://192.168.1.100:22/", None, &config, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "port-denied");
    }

    #[tokio::test]
    async fn non_allowlisted_address_is_private_ip_blocked() {
        let allowlist =
            Allowlist::new(vec![PrivateEndpoint::new_host("internal", "192.168.1.100", vec![8123])]);
        let config = EgressConfig { allowlist, max_redirects: 3, timeout: Duration::from_secs(5) };
        let err =
            fetch(Method::GET, "http://192.168.1.101:8123/", None, &config, CancellationToken::new())
                .await
                .unwrap_err();
        assert_eq!(err.code(), "private-ip-blocked");
    }
}
