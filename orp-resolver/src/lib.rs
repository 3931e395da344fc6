//! # orp-resolver
//!
//! Turns `orp://` addresses into reachable HTTP URLs.
//!
//! [`Resolver`] composes the [`ResolutionCache`], the daemon client
//! ([`DaemonApi`]) and the [`FallbackProber`] into the single resolution
//! entry point used by the Interceptor.

pub mod cache;
pub mod daemon;
pub mod error;
pub mod pipeline;
pub mod prober;

pub use cache::{CacheEntry, CacheEntrySnapshot, CacheStats, ResolutionCache};
pub use daemon::{DaemonApi, DaemonClient, DaemonResolveRequest, DaemonResolveResponse};
pub use error::{DaemonFailure, ResolveError};
pub use pipeline::{Resolution, ResolutionSource, ResolveOutcome, Resolver};
pub use prober::{FallbackProber, HttpHeadProbe, PortProbe};
