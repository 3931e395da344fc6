//! Blocking client for the control socket.
//!
//! One newline-terminated JSON [`BusRequest`] per line; one JSON response line
//! back. Used by the CLI, which has no runtime of its own.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use orp_core::{
    AckResponse, BusRequest, CacheStatsResponse, ResolutionResponse, ResolverStatsResponse,
};

use crate::error::{io_err, InterceptorError};
use crate::paths::socket_path;

/// Send one request to the control socket and return the raw response.
pub fn send_request(home: &Path, request: &BusRequest) -> Result<Value, InterceptorError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(InterceptorError::NotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            InterceptorError::NotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(InterceptorError::Protocol(
            "interceptor closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

/// Resolution answers carry their own failure shape, so they are returned
/// as-is rather than turned into an error.
pub fn request_resolve(home: &Path, uri: &str) -> Result<ResolutionResponse, InterceptorError> {
    let response = send_request(home, &BusRequest::resolve(uri))?;
    Ok(serde_json::from_value(response)?)
}

pub fn request_cache_stats(home: &Path) -> Result<CacheStatsResponse, InterceptorError> {
    expect(send_request(home, &BusRequest::GetCacheStats)?)
}

pub fn request_clear_cache(home: &Path) -> Result<AckResponse, InterceptorError> {
    expect(send_request(home, &BusRequest::ClearCache)?)
}

/// Counters, retried briefly while the socket is still coming up.
pub fn request_stats(home: &Path) -> Result<ResolverStatsResponse, InterceptorError> {
    let mut last_not_running: Option<InterceptorError> = None;
    for attempt in 0..5 {
        match send_request(home, &BusRequest::GetStats) {
            Ok(response) => return expect(response),
            Err(err @ InterceptorError::NotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        InterceptorError::Protocol("stats retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_shutdown(home: &Path) -> Result<AckResponse, InterceptorError> {
    expect(send_request(home, &BusRequest::Shutdown)?)
}

fn expect<T: DeserializeOwned>(response: Value) -> Result<T, InterceptorError> {
    if response.get("success") == Some(&Value::Bool(false)) {
        let error = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown interceptor error")
            .to_string();
        return Err(InterceptorError::Protocol(error));
    }
    Ok(serde_json::from_value(response)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_socket_means_not_running() {
        let home = TempDir::new().expect("home");
        let err = send_request(home.path(), &BusRequest::GetCacheStats).unwrap_err();
        assert!(matches!(err, InterceptorError::NotRunning { .. }), "got: {err}");
    }

    #[test]
    fn rejections_become_protocol_errors() {
        let err = expect::<AckResponse>(json!({"success": false, "error": "nope"})).unwrap_err();
        match err {
            InterceptorError::Protocol(message) => assert_eq!(message, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn typed_responses_decode() {
        let stats: CacheStatsResponse = expect(json!({
            "cacheSize": 1,
            "entries": [{"url": "orp://a", "resolvedUrl": "http://x/", "timestamp": 1, "age": 2}]
        }))
        .expect("stats");
        assert_eq!(stats.cache_size, 1);
        assert_eq!(stats.entries[0].resolved_url, "http://x/");
    }
}
