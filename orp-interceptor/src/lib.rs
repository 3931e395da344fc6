//! Interceptor runtime: network-layer gateway, Message Bus, control socket
//! and cache sweep around one shared [`orp_resolver::Resolver`].

pub mod bus;
mod error;
pub mod first_run;
pub mod gateway;
pub mod paths;
pub mod protocol;
mod runtime;

pub use bus::{BusEnvelope, BusHandle};
pub use error::InterceptorError;
pub use gateway::{Gateway, NavigationOutcome, NavigationState};
pub use protocol::{
    request_cache_stats, request_clear_cache, request_resolve, request_shutdown, request_stats,
    send_request,
};
pub use runtime::{init_tracing, run, run_with, start_blocking};
