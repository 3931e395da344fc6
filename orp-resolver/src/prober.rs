//! Fallback discovery by sequential local port probing.
//!
//! Used only after the daemon fails. Candidates are tried strictly in order
//! and the first port whose `HEAD` answers 2xx wins; later ports are never
//! touched. A probe run is bounded by `timeout × candidates`.

use std::sync::Arc;
use std::time::Duration;

use orp_core::config::FallbackSettings;
use orp_core::ScopedUri;

/// Existence check for one candidate URL. Blocking.
pub trait PortProbe: Send + Sync {
    fn head_ok(&self, url: &str) -> bool;
}

/// `ureq`-backed `HEAD` probe with a short timeout.
#[derive(Debug, Clone)]
pub struct HttpHeadProbe {
    agent: ureq::Agent,
}

impl HttpHeadProbe {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(0)
            .build();
        Self { agent }
    }
}

impl PortProbe for HttpHeadProbe {
    fn head_ok(&self, url: &str) -> bool {
        match self.agent.head(url).call() {
            Ok(response) => (200..300).contains(&response.status()),
            Err(err) => {
                tracing::debug!(%url, error = %err, "fallback candidate did not answer");
                false
            }
        }
    }
}

/// Ordered list of candidate ports plus the probe used to test them.
#[derive(Clone)]
pub struct FallbackProber {
    host: String,
    ports: Vec<u16>,
    probe: Arc<dyn PortProbe>,
}

impl std::fmt::Debug for FallbackProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackProber")
            .field("host", &self.host)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

impl FallbackProber {
    pub fn new(host: impl Into<String>, ports: Vec<u16>, probe: Arc<dyn PortProbe>) -> Self {
        Self {
            host: host.into(),
            ports,
            probe,
        }
    }

    pub fn from_settings(settings: &FallbackSettings) -> Self {
        Self::new(
            settings.host.clone(),
            settings.ports.clone(),
            Arc::new(HttpHeadProbe::new(settings.timeout())),
        )
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// First candidate URL that answers, or `None`. Fails closed when `uri`
    /// does not re-parse.
    pub fn probe(&self, uri: &str) -> Option<String> {
        let parsed = match ScopedUri::parse(uri) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(%uri, error = %err, "fallback skipped for malformed address");
                return None;
            }
        };

        for &port in &self.ports {
            let candidate = parsed.local_http_url(&self.host, port);
            if self.probe.head_ok(&candidate) {
                tracing::info!(%uri, port, url = %candidate, "fallback candidate answered");
                return Some(candidate);
            }
        }

        tracing::debug!(%uri, candidates = self.ports.len(), "fallback exhausted");
        None
    }
}
