//! Message Bus payloads exchanged between the Page Integrator and the
//! Interceptor.
//!
//! Requests are tagged by `type`. Responses are plain objects; the caller
//! knows which shape to expect from the request it sent.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request sent over the Message Bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusRequest {
    /// Resolve one scheme-qualified address.
    ResolveOrpUrl { url: String },
    /// Snapshot of the resolution cache.
    GetCacheStats,
    /// Drop every cache entry.
    ClearCache,
    /// Resolver counters and uptime.
    GetStats,
    /// Stop the Interceptor. Only honoured on the socket transport.
    Shutdown,
}

impl BusRequest {
    pub fn resolve(url: impl Into<String>) -> Self {
        Self::ResolveOrpUrl { url: url.into() }
    }

    /// Wire name of the request type, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BusRequest::ResolveOrpUrl { .. } => "RESOLVE_ORP_URL",
            BusRequest::GetCacheStats => "GET_CACHE_STATS",
            BusRequest::ClearCache => "CLEAR_CACHE",
            BusRequest::GetStats => "GET_STATS",
            BusRequest::Shutdown => "SHUTDOWN",
        }
    }
}

/// Answer to `RESOLVE_ORP_URL`.
///
/// `resolved_url` is set iff `success` is true; `error` iff it is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolutionResponse {
    pub fn resolved(url: impl Into<String>) -> Self {
        Self {
            success: true,
            resolved_url: Some(url.into()),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            resolved_url: None,
            error: Some(message.into()),
        }
    }

    /// The resolved URL when the response reports a usable success.
    pub fn url(&self) -> Option<&str> {
        if self.success {
            self.resolved_url.as_deref().filter(|url| !url.is_empty())
        } else {
            None
        }
    }
}

/// One cache entry as reported by `GET_CACHE_STATS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryReport {
    pub url: String,
    pub resolved_url: String,
    /// Insertion time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Age at snapshot time, milliseconds.
    pub age: u64,
}

/// Answer to `GET_CACHE_STATS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    pub cache_size: usize,
    pub entries: Vec<CacheEntryReport>,
}

/// Answer to `CLEAR_CACHE` and `SHUTDOWN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

/// Answer to `GET_STATS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStatsResponse {
    pub requests: u64,
    pub cache_hits: u64,
    pub daemon_hits: u64,
    pub fallback_hits: u64,
    /// Requests answered by joining a resolution already in flight.
    pub shared_hits: u64,
    pub failures: u64,
    pub cache_size: usize,
    pub uptime_secs: u64,
}

/// Any response the Interceptor can send back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BusResponse {
    Resolution(ResolutionResponse),
    CacheStats(CacheStatsResponse),
    Stats(ResolverStatsResponse),
    Ack(AckResponse),
    /// The request could not be served at all (bad JSON, unsupported type).
    Rejected { success: bool, error: String },
}

impl BusResponse {
    pub fn ack() -> Self {
        Self::Ack(AckResponse { success: true })
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            success: false,
            error: message.into(),
        }
    }
}

/// The Message Bus round trip itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// Nobody is listening on the other end any more.
    #[error("message channel closed: {0}")]
    Closed(String),

    /// The request was accepted but no response came back.
    #[error("no response received for {0}")]
    NoResponse(&'static str),

    /// A response arrived with an unexpected shape.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// The resolution contract the Page Integrator depends on.
///
/// Implementations must answer every call exactly once and must not block the
/// caller's executor while waiting.
pub trait ResolveChannel {
    fn resolve(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<ResolutionResponse, TransportFailure>> + Send;
}
