//! In-process Message Bus.
//!
//! Every request travels as a [`BusEnvelope`] carrying its own `oneshot`
//! reply sender, so each caller gets exactly the response to its request.
//! The serving loop answers envelopes concurrently; a slow resolution does not
//! hold up cache queries behind it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use orp_core::{
    AckResponse, BusRequest, BusResponse, CacheStatsResponse, ResolutionResponse, ResolveChannel,
    ResolverStatsResponse, TransportFailure,
};
use orp_resolver::Resolver;

pub const BUS_CAPACITY: usize = 64;

pub struct BusEnvelope {
    pub request: BusRequest,
    pub respond_to: oneshot::Sender<BusResponse>,
}

/// Sending side of the bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusEnvelope>,
}

impl BusHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BusEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Send one request and wait for its response.
    pub async fn call(&self, request: BusRequest) -> Result<BusResponse, TransportFailure> {
        let kind = request.kind();
        let (respond_to, reply) = oneshot::channel();
        self.tx
            .send(BusEnvelope {
                request,
                respond_to,
            })
            .await
            .map_err(|_| TransportFailure::Closed(format!("bus queue closed before {kind}")))?;
        reply.await.map_err(|_| TransportFailure::NoResponse(kind))
    }

    pub async fn cache_stats(&self) -> Result<CacheStatsResponse, TransportFailure> {
        match self.call(BusRequest::GetCacheStats).await? {
            BusResponse::CacheStats(stats) => Ok(stats),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn clear_cache(&self) -> Result<AckResponse, TransportFailure> {
        match self.call(BusRequest::ClearCache).await? {
            BusResponse::Ack(ack) => Ok(ack),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn stats(&self) -> Result<ResolverStatsResponse, TransportFailure> {
        match self.call(BusRequest::GetStats).await? {
            BusResponse::Stats(stats) => Ok(stats),
            other => Err(unexpected(&other)),
        }
    }
}

impl ResolveChannel for BusHandle {
    fn resolve(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<ResolutionResponse, TransportFailure>> + Send {
        let handle = self.clone();
        let request = BusRequest::resolve(url);
        async move {
            match handle.call(request).await? {
                BusResponse::Resolution(answer) => Ok(answer),
                BusResponse::Rejected { error, .. } => Ok(ResolutionResponse::failed(error)),
                other => Err(unexpected(&other)),
            }
        }
    }
}

fn unexpected(response: &BusResponse) -> TransportFailure {
    TransportFailure::Unexpected(
        serde_json::to_string(response).unwrap_or_else(|_| format!("{response:?}")),
    )
}

/// Answer one request against the resolver. `SHUTDOWN` is refused here; only
/// the control socket may stop the Interceptor.
pub async fn answer(resolver: &Resolver, request: BusRequest) -> BusResponse {
    match request {
        BusRequest::ResolveOrpUrl { url } => match resolver.resolve_detailed(&url).await {
            Ok(resolution) => BusResponse::Resolution(ResolutionResponse::resolved(resolution.url)),
            Err(err) => BusResponse::Resolution(ResolutionResponse::failed(err.to_string())),
        },
        BusRequest::GetCacheStats => BusResponse::CacheStats(resolver.cache_stats().await.to_report()),
        BusRequest::ClearCache => {
            resolver.clear_cache().await;
            tracing::info!("resolution cache cleared");
            BusResponse::ack()
        }
        BusRequest::GetStats => BusResponse::Stats(resolver.stats().await),
        BusRequest::Shutdown => {
            BusResponse::rejected("SHUTDOWN is only accepted on the control socket")
        }
    }
}

/// Serve envelopes until shutdown or until every [`BusHandle`] is dropped.
pub async fn serve(
    resolver: Arc<Resolver>,
    mut rx: mpsc::Receiver<BusEnvelope>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    let kind = envelope.request.kind();
                    let response = answer(&resolver, envelope.request).await;
                    if envelope.respond_to.send(response).is_err() {
                        tracing::debug!(kind, "bus caller went away before its response");
                    }
                });
            }
        }
    }
    tracing::debug!("message bus stopped");
}
