// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Future based pull protocol over a [`BatchSource`].
//!
//! Every call to [`BatchGenerator::next_batch`] enqueues a request carrying a
//! completion handle and returns a [`BatchFuture`] waiting on it. Whichever
//! future gets hold of the scan state first answers all queued requests in
//! the order they were issued and then prepares up to `batch_readahead`
//! batches for requests that have not arrived yet. Nothing is spawned: the
//! work happens inside `poll`. A future that finds the state taken parks its
//! waker, and the holder wakes it after letting go of the state.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use log::trace;
use snafu::location;
use tokio::sync::oneshot;

use super::assembler::BatchSource;
use super::options::MAX_BATCH_READAHEAD;
use crate::{Error, Result};

/// Outcome of one async request.
///
/// `record_batch` is `None` once the scan is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScannedBatch {
    pub record_batch: Option<RecordBatch>,
}

impl ScannedBatch {
    pub fn new(record_batch: RecordBatch) -> Self {
        Self {
            record_batch: Some(record_batch),
        }
    }

    /// The end of stream marker.
    pub fn end() -> Self {
        Self { record_batch: None }
    }

    pub fn is_end(&self) -> bool {
        self.record_batch.is_none()
    }
}

type Completion = oneshot::Sender<Result<ScannedBatch>>;

struct GeneratorState {
    source: Box<dyn BatchSource>,
    prefetched: VecDeque<Result<ScannedBatch>>,
    finished: bool,
}

impl GeneratorState {
    fn produce(&mut self) -> Result<ScannedBatch> {
        if self.finished {
            return Ok(ScannedBatch::end());
        }
        match self.source.next_batch() {
            Ok(Some(batch)) => Ok(ScannedBatch::new(batch)),
            Ok(None) => {
                self.finished = true;
                Ok(ScannedBatch::end())
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }
}

struct Shared {
    requests: Mutex<VecDeque<Completion>>,
    state: Mutex<GeneratorState>,
    waiters: Mutex<Vec<Waker>>,
    readahead: usize,
}

impl Shared {
    fn poisoned() -> Error {
        Error::internal("Async scan state lock poisoned", location!())
    }

    fn next_request(&self) -> Result<Option<Completion>> {
        let mut requests = self.requests.lock().map_err(|_| Self::poisoned())?;
        Ok(requests.pop_front())
    }

    /// Answer every queued request, then fill the readahead buffer.
    fn pump(&self, state: &mut GeneratorState) -> Result<()> {
        while let Some(completion) = self.next_request()? {
            let result = match state.prefetched.pop_front() {
                Some(result) => result,
                None => state.produce(),
            };
            if completion.send(result).is_err() {
                // The request was dropped, its batch goes with it.
                trace!("Dropping batch for a cancelled request");
            }
        }
        while !state.finished && state.prefetched.len() < self.readahead {
            let result = state.produce();
            state.prefetched.push_back(result);
        }
        Ok(())
    }

    /// Park `waker` until the current holder of the state lets go of it.
    fn register_waiter(&self, waker: &Waker) -> Result<()> {
        let mut waiters = self.waiters.lock().map_err(|_| Self::poisoned())?;
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
        Ok(())
    }

    /// Release the state, then wake everyone who found it taken.
    fn unlock(&self, state: MutexGuard<'_, GeneratorState>) {
        drop(state);
        let waiters = match self.waiters.lock() {
            Ok(mut waiters) => std::mem::take(&mut *waiters),
            Err(_) => return,
        };
        if !waiters.is_empty() {
            trace!("Waking {} parked batch requests", waiters.len());
        }
        waiters.into_iter().for_each(Waker::wake);
    }

    /// Pump if nobody else is, otherwise park `waker` with the holder.
    fn try_pump(&self, waker: &Waker) -> Result<()> {
        let mut registered = false;
        loop {
            match self.state.try_lock() {
                Ok(mut state) => {
                    let pumped = self.pump(&mut state);
                    self.unlock(state);
                    return pumped;
                }
                Err(TryLockError::WouldBlock) if registered => return Ok(()),
                Err(TryLockError::WouldBlock) => {
                    // Retry once so a holder that let go meanwhile is not missed.
                    self.register_waiter(waker)?;
                    registered = true;
                }
                Err(TryLockError::Poisoned(_)) => return Err(Self::poisoned()),
            }
        }
    }
}

/// Hands out one [`BatchFuture`] per requested batch.
///
/// Futures resolve to batches in the order they were requested, whatever
/// order they are polled in. Once the scan has ended, or failed, every new
/// request resolves to the end marker. `readahead` is capped at
/// [`MAX_BATCH_READAHEAD`].
#[derive(Clone)]
pub struct BatchGenerator {
    shared: Arc<Shared>,
    schema: SchemaRef,
}

impl BatchGenerator {
    pub fn new(source: Box<dyn BatchSource>, readahead: usize) -> Self {
        let schema = source.schema();
        Self {
            shared: Arc::new(Shared {
                requests: Mutex::new(VecDeque::new()),
                state: Mutex::new(GeneratorState {
                    source,
                    prefetched: VecDeque::new(),
                    finished: false,
                }),
                waiters: Mutex::new(Vec::new()),
                readahead: readahead.min(MAX_BATCH_READAHEAD),
            }),
            schema,
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Request the next batch.
    pub fn next_batch(&self) -> BatchFuture {
        let (tx, rx) = oneshot::channel();
        match self.shared.requests.lock() {
            Ok(mut requests) => requests.push_back(tx),
            Err(_) => {
                let _ = tx.send(Err(Shared::poisoned()));
            }
        }
        BatchFuture {
            rx,
            shared: self.shared.clone(),
            completed: false,
        }
    }
}

impl std::fmt::Debug for BatchGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchGenerator")
            .field("schema", &self.schema)
            .field("readahead", &self.shared.readahead)
            .finish()
    }
}

/// Completion handle of one [`BatchGenerator::next_batch`] request.
pub struct BatchFuture {
    rx: oneshot::Receiver<Result<ScannedBatch>>,
    shared: Arc<Shared>,
    completed: bool,
}

impl BatchFuture {
    /// Wait at most `timeout` for the batch.
    ///
    /// An elapsed wait returns [`Error::Timeout`]; the request stays queued
    /// and may be waited on again.
    pub async fn wait(&mut self, timeout: Duration) -> Result<ScannedBatch> {
        match tokio::time::timeout(timeout, &mut *self).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                waited: timeout,
                location: location!(),
            }),
        }
    }

    fn poll_completion(&mut self, cx: &mut Context<'_>) -> Poll<Result<ScannedBatch>> {
        let received = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(received) => received,
            Poll::Pending => return Poll::Pending,
        };
        self.completed = true;
        Poll::Ready(received.unwrap_or_else(|_| {
            Err(Error::internal(
                "Batch request was dropped without an answer",
                location!(),
            ))
        }))
    }
}

impl Future for BatchFuture {
    type Output = Result<ScannedBatch>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.completed {
            return Poll::Ready(Err(Error::internal(
                "BatchFuture polled after completion",
                location!(),
            )));
        }
        if let Poll::Ready(result) = this.poll_completion(cx) {
            return Poll::Ready(result);
        }

        if let Err(e) = this.shared.try_pump(cx.waker()) {
            this.completed = true;
            return Poll::Ready(Err(e));
        }
        // Woken by the channel once answered, or by the holder via the parked waker.
        this.poll_completion(cx)
    }
}
