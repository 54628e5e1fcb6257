use super::BlobStore;
use crate::BlobError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use veil_ledger::BlobLocator;

/// What the next read does instead of answering.
#[derive(Debug, Clone)]
enum Fault {
    Fail(BlobError),
    Stall,
}

#[derive(Default)]
struct State {
    blobs: HashMap<BlobLocator, Bytes>,
    faults: VecDeque<Fault>,
}

/// In-memory blob store for tests and demos. Faults can be scripted for
/// upcoming reads so retry behaviour is observable.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    state: Arc<Mutex<State>>,
    reads: Arc<AtomicUsize>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` under `locator`
    pub fn put(&self, locator: BlobLocator, bytes: impl Into<Bytes>) {
        self.state.lock().blobs.insert(locator, bytes.into());
    }

    /// Make each of the next `count` reads fail with `error`
    pub fn fail_next(&self, count: usize, error: BlobError) {
        let mut state = self.state.lock();
        state
            .faults
            .extend(std::iter::repeat_n(Fault::Fail(error), count));
    }

    /// Make each of the next `count` reads hang forever
    pub fn stall_next(&self, count: usize) {
        let mut state = self.state.lock();
        state.faults.extend(std::iter::repeat_n(Fault::Stall, count));
    }

    /// Number of reads served so far, including failed ones
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, locator: &BlobLocator) -> Result<Bytes, BlobError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let outcome = {
            let mut state = self.state.lock();
            match state.faults.pop_front() {
                Some(fault) => Err(fault),
                None => state
                    .blobs
                    .get(locator)
                    .cloned()
                    .ok_or_else(|| BlobError::NotFound(locator.to_string()))
                    .map_err(Fault::Fail),
            }
        };

        match outcome {
            Ok(bytes) => Ok(bytes),
            Err(Fault::Fail(error)) => Err(error),
            Err(Fault::Stall) => std::future::pending().await,
        }
    }
}
