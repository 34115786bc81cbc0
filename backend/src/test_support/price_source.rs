//! Scripted price source double.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::domain::PricePoint;
use crate::domain::ports::{PriceSource, PriceSourceError, PriceSourceRequest};

/// Price source replaying scripted responses.
///
/// Once the script is exhausted every call returns the fallback points. An
/// optional barrier holds each call until the expected number of callers
/// have arrived, which lets tests overlap concurrent jobs deterministically.
pub struct ScriptedPriceSource {
    scripted: Mutex<VecDeque<Result<Vec<PricePoint>, PriceSourceError>>>,
    fallback: Vec<PricePoint>,
    requests: Mutex<Vec<PriceSourceRequest>>,
    calls: AtomicUsize,
    barrier: Option<Arc<Barrier>>,
}

impl ScriptedPriceSource {
    /// Return `points` for every call.
    pub fn repeating(points: Vec<PricePoint>) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback: points,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            barrier: None,
        }
    }

    /// Replay `scripted` in order, then return no points.
    pub fn scripted(scripted: Vec<Result<Vec<PricePoint>, PriceSourceError>>) -> Self {
        Self {
            scripted: Mutex::new(scripted.into()),
            ..Self::repeating(Vec::new())
        }
    }

    /// Hold each call until `callers` calls are in flight.
    #[must_use]
    pub fn with_barrier(mut self, callers: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(callers)));
        self
    }

    /// Number of fetches made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in call order.
    pub fn requests(&self) -> Vec<PriceSourceRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PriceSource for ScriptedPriceSource {
    async fn fetch_prices(
        &self,
        request: &PriceSourceRequest,
    ) -> Result<Vec<PricePoint>, PriceSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        let next = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
