//! orp core library: addresses, Message Bus payloads, settings, errors.
//!
//! - [`uri`]: [`ScopedUri`] parsing
//! - [`message`]: bus requests/responses and the [`ResolveChannel`] contract
//! - [`config`]: `~/.orp/config.yaml`
//! - [`error`]: [`UriError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod message;
pub mod uri;

pub use config::Settings;
pub use error::{ConfigError, UriError};
pub use message::{
    AckResponse, BusRequest, BusResponse, CacheEntryReport, CacheStatsResponse, ResolutionResponse,
    ResolveChannel, ResolverStatsResponse, TransportFailure,
};
pub use uri::{ScopedUri, SCHEME_PREFIX};
