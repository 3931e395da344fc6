//! Network-layer interception: a local HTTP gateway that turns navigations to
//! `orp://` addresses into redirects.
//!
//! Each navigation walks `Intercepted → Resolving → {Redirected | ErrorPage}`.
//! The HTTP request is held open until the outcome is known. The resolution
//! runs on its own task, so a browser that gives up does not cancel it; the
//! result is simply discarded.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use url::form_urlencoded;

use orp_core::ScopedUri;
use orp_resolver::Resolver;

use crate::error::{io_err, InterceptorError};

const ERROR_PAGE: &str = include_str!("../pages/error.html");
const WELCOME_PAGE: &str = include_str!("../pages/welcome.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Intercepted,
    Resolving,
    Redirected,
    ErrorPage,
}

/// Where the browser is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Redirected(String),
    ErrorPage(String),
}

impl NavigationOutcome {
    pub fn location(&self) -> &str {
        match self {
            NavigationOutcome::Redirected(url) | NavigationOutcome::ErrorPage(url) => url,
        }
    }

    pub fn state(&self) -> NavigationState {
        match self {
            NavigationOutcome::Redirected(_) => NavigationState::Redirected,
            NavigationOutcome::ErrorPage(_) => NavigationState::ErrorPage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gateway {
    resolver: Arc<Resolver>,
    base_url: Arc<str>,
}

impl Gateway {
    /// `base_url` is the gateway's own origin, e.g. `http://127.0.0.1:7889`.
    pub fn new(resolver: Arc<Resolver>, base_url: impl AsRef<str>) -> Self {
        Self {
            resolver,
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
        }
    }

    pub fn for_addr(resolver: Arc<Resolver>, addr: SocketAddr) -> Self {
        Self::new(resolver, format!("http://{addr}"))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn welcome_url(&self) -> String {
        format!("{}/welcome.html", self.base_url)
    }

    /// Decide where a navigation to `uri` goes.
    pub async fn intercept(&self, uri: &str) -> NavigationOutcome {
        tracing::debug!(%uri, state = ?NavigationState::Intercepted, "navigation intercepted");
        tracing::debug!(%uri, state = ?NavigationState::Resolving, "navigation resolving");

        let outcome = match self.resolver.resolve_detailed(uri).await {
            Ok(resolution) => NavigationOutcome::Redirected(resolution.url),
            Err(err) if err.is_unresolved() => {
                NavigationOutcome::ErrorPage(self.error_page_url("url", uri))
            }
            Err(err) => NavigationOutcome::ErrorPage(self.error_page_url("error", &err.to_string())),
        };

        tracing::info!(
            %uri,
            state = ?outcome.state(),
            location = %outcome.location(),
            "navigation decided"
        );
        outcome
    }

    fn error_page_url(&self, key: &str, value: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(key, value)
            .finish();
        format!("{}/error.html?{query}", self.base_url)
    }

    /// Route one HTTP request.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let uri = req.into_parts().0.uri;

        // `http::Uri` gives an authority-only target the root path, so a proxied
        // `orp://node-1` is resolved and cached as `orp://node-1/`. Use
        // `/navigate?uri=` when the exact string matters.
        if uri.scheme_str() == Some("orp") {
            let target = uri.to_string();
            return self.navigate(target).await;
        }

        let query = uri.query().unwrap_or_default();
        match uri.path() {
            "/navigate" => match query_param(query, "uri") {
                Some(target) if ScopedUri::is_scoped(&target) => self.navigate(target).await,
                Some(target) => text_response(
                    StatusCode::BAD_REQUEST,
                    format!("not an orp:// address: {target}"),
                ),
                None => text_response(StatusCode::BAD_REQUEST, "missing uri parameter".to_string()),
            },
            "/error.html" => {
                let detail = query_param(query, "url")
                    .map(|url| format!("Could not resolve {url}"))
                    .or_else(|| query_param(query, "error"))
                    .unwrap_or_else(|| "Unknown error".to_string());
                html_response(ERROR_PAGE.replace("{{detail}}", &escape_html(&detail)))
            }
            "/welcome.html" => {
                html_response(WELCOME_PAGE.replace("{{gateway}}", &escape_html(&self.base_url)))
            }
            "/status" => {
                let stats = self.resolver.stats().await;
                let body = json!({
                    "status": "active",
                    "service": "orp-interceptor",
                    "version": env!("CARGO_PKG_VERSION"),
                    "stats": stats,
                });
                json_response(&body)
            }
            other => {
                tracing::debug!(path = %other, "gateway path not found");
                text_response(StatusCode::NOT_FOUND, "not found".to_string())
            }
        }
    }

    async fn navigate(&self, target: String) -> Response<Full<Bytes>> {
        let gateway = self.clone();
        let task_target = target.clone();
        let decided = tokio::spawn(async move { gateway.intercept(&task_target).await }).await;

        let outcome = decided.unwrap_or_else(|err| {
            tracing::error!(uri = %target, error = %err, "navigation task failed");
            NavigationOutcome::ErrorPage(self.error_page_url("error", &err.to_string()))
        });
        redirect_response(outcome.location())
    }
}

/// Accept connections until shutdown.
pub async fn serve(
    gateway: Gateway,
    listener: TcpListener,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), InterceptorError> {
    let local = listener
        .local_addr()
        .map_err(|e| io_err("gateway listener", e))?;
    tracing::info!(addr = %local, "gateway listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(error = %err, "gateway accept failed");
                        continue;
                    }
                };
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let gateway = gateway.clone();
                        async move { Ok::<_, std::convert::Infallible>(gateway.handle(req).await) }
                    });
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        tracing::debug!(%peer, error = %err, "gateway connection ended with error");
                    }
                });
            }
        }
    }

    Ok(())
}

fn query_param(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn redirect_response(location: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn html_response(body: String) -> Response<Full<Bytes>> {
    with_content_type(StatusCode::OK, Bytes::from(body), "text/html; charset=utf-8")
}

fn json_response(body: &serde_json::Value) -> Response<Full<Bytes>> {
    with_content_type(
        StatusCode::OK,
        Bytes::from(body.to_string()),
        "application/json",
    )
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    with_content_type(status, Bytes::from(body), "text/plain; charset=utf-8")
}

fn with_content_type(
    status: StatusCode,
    body: Bytes,
    content_type: &'static str,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
