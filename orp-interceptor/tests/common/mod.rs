#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orp_core::ScopedUri;
use orp_resolver::{DaemonApi, DaemonFailure, FallbackProber, PortProbe, Resolver};

/// Answers every address under `known` authorities; refuses the rest.
pub struct FakeDaemon {
    known: Vec<&'static str>,
    calls: AtomicUsize,
}

impl FakeDaemon {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DaemonApi for FakeDaemon {
    fn resolve(&self, uri: &ScopedUri) -> Result<String, DaemonFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.known.contains(&uri.authority()) {
            Ok(format!("http://localhost:9001{}", uri.path()))
        } else {
            Err(DaemonFailure::Rejected {
                reason: format!("unknown node {}", uri.authority()),
            })
        }
    }

    fn status(&self) -> bool {
        true
    }
}

/// Dies inside the blocking pool, so the resolver aborts instead of failing over.
pub struct PanickingDaemon;

impl DaemonApi for PanickingDaemon {
    fn resolve(&self, uri: &ScopedUri) -> Result<String, DaemonFailure> {
        panic!("daemon client crashed while resolving {uri}");
    }

    fn status(&self) -> bool {
        false
    }
}

pub struct NoPorts;

impl PortProbe for NoPorts {
    fn head_ok(&self, _url: &str) -> bool {
        false
    }
}

pub fn resolver(known: &[&'static str]) -> (Arc<Resolver>, Arc<FakeDaemon>) {
    let daemon = Arc::new(FakeDaemon {
        known: known.to_vec(),
        calls: AtomicUsize::new(0),
    });
    (resolver_over(daemon.clone()), daemon)
}

pub fn resolver_over(daemon: Arc<dyn DaemonApi>) -> Arc<Resolver> {
    Arc::new(Resolver::with_parts(
        Duration::from_secs(300),
        daemon,
        FallbackProber::new("localhost", vec![8080], Arc::new(NoPorts)),
    ))
}
