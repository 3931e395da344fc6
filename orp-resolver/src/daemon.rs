//! Client for the local resolution daemon.
//!
//! The daemon is an external collaborator. Its answers are treated as
//! untrusted input: every unexpected shape becomes a [`DaemonFailure`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use orp_core::config::DaemonSettings;
use orp_core::ScopedUri;

use crate::error::DaemonFailure;

/// Source tag sent with every resolve request.
pub const SOURCE_TAG: &str = "browser_extension";

/// Body of `POST /resolve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResolveRequest {
    pub orp_url: String,
    pub source: String,
}

/// Body returned by `POST /resolve`. Missing fields decode as failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonResolveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub resolved_url: Option<String>,
}

impl DaemonResolveResponse {
    /// `Ok(url)` only for `success=true` with a non-empty `resolved_url`.
    pub fn into_result(self) -> Result<String, DaemonFailure> {
        if !self.success {
            return Err(DaemonFailure::Rejected {
                reason: "daemon reported success=false".to_string(),
            });
        }
        match self.resolved_url {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(DaemonFailure::Rejected {
                reason: "daemon response has no resolved_url".to_string(),
            }),
        }
    }
}

/// Blocking daemon operations. Callers run these on the blocking pool.
pub trait DaemonApi: Send + Sync {
    fn resolve(&self, uri: &ScopedUri) -> Result<String, DaemonFailure>;

    /// Best-effort presence probe; informational only.
    fn status(&self) -> bool;
}

/// `ureq`-backed daemon client.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    base_url: String,
    agent: ureq::Agent,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(0)
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn from_settings(settings: &DaemonSettings) -> Self {
        Self::new(settings.base_url(), settings.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl DaemonApi for DaemonClient {
    fn resolve(&self, uri: &ScopedUri) -> Result<String, DaemonFailure> {
        let endpoint = format!("{}/resolve", self.base_url);
        let body = DaemonResolveRequest {
            orp_url: uri.as_str().to_string(),
            source: SOURCE_TAG.to_string(),
        };

        let response = match self.agent.post(&endpoint).send_json(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(DaemonFailure::Rejected {
                    reason: format!("daemon answered HTTP {code}"),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(DaemonFailure::Unreachable {
                    reason: transport.to_string(),
                });
            }
        };

        if !(200..300).contains(&response.status()) {
            return Err(DaemonFailure::Rejected {
                reason: format!("daemon answered HTTP {}", response.status()),
            });
        }

        let decoded: DaemonResolveResponse =
            response
                .into_json()
                .map_err(|err| DaemonFailure::Rejected {
                    reason: format!("malformed daemon response: {err}"),
                })?;
        decoded.into_result()
    }

    fn status(&self) -> bool {
        let endpoint = format!("{}/status", self.base_url);
        match self.agent.get(&endpoint).call() {
            Ok(response) => match response.into_json::<serde_json::Value>() {
                Ok(status) => {
                    tracing::info!(%status, "local resolution daemon detected");
                    true
                }
                Err(err) => {
                    tracing::warn!(error = %err, "daemon /status returned a non-JSON body");
                    false
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "local resolution daemon not detected; resolution limited to fallback probing");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_with_url_is_ok() {
        let response = DaemonResolveResponse {
            success: true,
            resolved_url: Some("http://localhost:9001/profile".to_string()),
        };
        assert_eq!(
            response.into_result().expect("ok"),
            "http://localhost:9001/profile"
        );
    }

    #[test]
    fn missing_or_empty_url_is_rejected() {
        let missing: DaemonResolveResponse =
            serde_json::from_str(r#"{"success": true}"#).expect("decode");
        assert!(matches!(
            missing.into_result(),
            Err(DaemonFailure::Rejected { .. })
        ));

        let empty = DaemonResolveResponse {
            success: true,
            resolved_url: Some("  ".to_string()),
        };
        assert!(empty.into_result().is_err());
    }

    #[test]
    fn explicit_failure_flag_is_rejected() {
        let response: DaemonResolveResponse =
            serde_json::from_str(r#"{"success": false, "resolved_url": "http://x/"}"#)
                .expect("decode");
        assert!(matches!(
            response.into_result(),
            Err(DaemonFailure::Rejected { .. })
        ));
    }

    #[test]
    fn request_body_uses_orp_url_field() {
        let body = DaemonResolveRequest {
            orp_url: "orp://node-1/profile".to_string(),
            source: SOURCE_TAG.to_string(),
        };
        let value = serde_json::to_value(body).expect("encode");
        assert_eq!(value["orp_url"], "orp://node-1/profile");
        assert_eq!(value["source"], "browser_extension");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = DaemonClient::new("http://localhost:7888/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:7888");
    }
}
