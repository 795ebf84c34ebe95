use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::template::ResolvedRequest;
use super::transport::{HttpTransport, TransportResponse};
use crate::metrics::TransportErrorKind;

#[derive(Debug, Clone, Copy)]
pub(crate) enum MockBehavior {
    Status(u16),
    Fail(TransportErrorKind),
    Slow { status: u16, delay: Duration },
    /// The send future unwinds instead of returning.
    Panic,
}

/// In-process transport that records every call it receives.
#[derive(Debug)]
pub(crate) struct MockTransport {
    behavior: MockBehavior,
    calls: AtomicU64,
    log: Mutex<Vec<(Instant, Arc<str>)>>,
}

impl MockTransport {
    pub(crate) fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicU64::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn ok() -> Arc<Self> {
        Self::new(MockBehavior::Status(200))
    }

    pub(crate) fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_at(&self) -> Vec<Instant> {
        self.log
            .lock()
            .map(|log| log.iter().map(|(at, _)| *at).collect())
            .unwrap_or_default()
    }

    pub(crate) fn targets(&self) -> Vec<Arc<str>> {
        self.log
            .lock()
            .map(|log| log.iter().map(|(_, url)| Arc::clone(url)).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportErrorKind> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.log.lock() {
            log.push((Instant::now(), Arc::clone(&request.url)));
        }
        match self.behavior {
            MockBehavior::Status(status) => Ok(TransportResponse {
                status,
                body_bytes: 2,
            }),
            MockBehavior::Fail(kind) => Err(kind),
            MockBehavior::Panic => std::panic::resume_unwind(Box::new("mock transport failure")),
            MockBehavior::Slow { status, delay } => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse {
                    status,
                    body_bytes: 2,
                })
            }
        }
    }
}
