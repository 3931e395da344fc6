use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the Interceptor runtime, its gateway and the control
/// socket protocol.
#[derive(Debug, Error)]
pub enum InterceptorError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] orp_core::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("interceptor protocol error: {0}")]
    Protocol(String),

    #[error("interceptor is not running (socket missing: {socket})")]
    NotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> InterceptorError {
    InterceptorError::Io {
        path: path.into(),
        source,
    }
}
