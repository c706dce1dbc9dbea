//! The capability that actually moves bytes over the network.
//!
//! # Design
//! `Transaction` only ever sees the `Transport` trait. `UreqTransport` is the
//! default implementation; it reports every status code as data so status
//! interpretation stays with the transaction. Tests and callers can swap in
//! their own transport through `Transaction::client`.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::content_type::USER_AGENT;
use crate::error::BoxError;
use crate::http::{HttpRequest, HttpResponse};

/// Sends one request and returns the response, or fails before a response
/// arrives (DNS, connect, timeout).
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, BoxError>;
}

/// Settings for the default transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_secs: u64,
    /// Sent when the request has no `User-Agent` of its own.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `REMOTE_TIMEOUT_SECS` and `REMOTE_USER_AGENT`.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`. Unparseable
    /// timeouts keep the default.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(secs) = lookup("REMOTE_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            config.timeout_secs = secs;
        }
        if let Some(agent) = lookup("REMOTE_USER_AGENT") {
            config.user_agent = Some(agent);
        }
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    user_agent: Option<String>,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout()))
            .build()
            .new_agent();
        Self {
            agent,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, BoxError> {
        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(agent) = &self.user_agent {
            if request.header(USER_AGENT).is_none() {
                builder = builder.header(USER_AGENT, agent.as_str());
            }
        }

        let response = match &request.body {
            Some(body) => self.agent.run(builder.body(body.as_slice())?)?,
            None => self.agent.run(builder.body(())?)?,
        };

        let status = response.status().as_u16();
        debug!(method = %request.method, url = %request.url, status, "received response");

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                (name.as_str().to_string(), value)
            })
            .collect();
        // The body is read later by the transaction, so a failure there still
        // knows the status. No size cap beyond the global timeout.
        let body = response.into_body().into_reader();

        Ok(HttpResponse {
            status,
            headers,
            body: crate::http::ResponseBody::Stream(Box::new(body)),
        })
    }
}

/// Shared default transport, configured from the environment on first use.
pub fn default_client() -> Arc<dyn Transport> {
    static CLIENT: OnceLock<Arc<UreqTransport>> = OnceLock::new();
    let client = CLIENT.get_or_init(|| Arc::new(UreqTransport::new(&ClientConfig::from_env())));
    Arc::clone(client) as Arc<dyn Transport>
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_ten_seconds() {
        assert_eq!(ClientConfig::default().timeout(), Duration::from_secs(10));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"user_agent":"remote/0.1"}"#).unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.user_agent.as_deref(), Some("remote/0.1"));
    }

    #[test]
    fn environment_overrides_defaults() {
        let vars = std::collections::HashMap::from([
            ("REMOTE_TIMEOUT_SECS", " 30 "),
            ("REMOTE_USER_AGENT", "remote/0.2"),
        ]);
        let config = ClientConfig::from_vars(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.user_agent.as_deref(), Some("remote/0.2"));

        let config = ClientConfig::from_vars(|name| (name == "REMOTE_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let transport = UreqTransport::new(&ClientConfig {
            timeout_secs: 2,
            user_agent: None,
        });
        let request = HttpRequest {
            method: crate::http::HttpMethod::Get,
            url: "http://127.0.0.1:1/".to_string(),
            headers: Vec::new(),
            body: None,
        };
        assert!(transport.send(&request).is_err());
    }
}
