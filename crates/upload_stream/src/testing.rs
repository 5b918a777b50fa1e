// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A scripted provider for driving upload streams from tests.
//!
//! [`TestDrivenProvider`] never completes an operation on its own. Every `read()` and
//! `rewind()` waits until the test resolves it through the [`ProviderControl`] returned
//! alongside the provider, which makes it possible to interleave transport calls with
//! provider completions in any order.
//!
//! ```rust,ignore
//! let (provider, mut control) = TestDrivenProvider::new(["hello"]);
//! let mut stream = UploadStream::new(provider, Spawner::new_tokio());
//!
//! stream.init().ready().await?;
//! let read = stream.read(100)?;
//!
//! control.wait_for_read_request().await;
//! control.complete_read();
//!
//! assert_eq!(read.await?.data().as_ref(), b"hello");
//! ```

use std::sync::Arc;

use bytes::Bytes;
use futures_channel::{mpsc, oneshot};
use futures_util::StreamExt;
use parking_lot::Mutex;

use crate::{Chunk, UploadDataProvider};

/// An error reported by [`TestDrivenProvider`] when the test fails an operation.
#[ohno::error]
#[display("test provider failure: {message}")]
pub struct ProviderFailure {
    message: String,
}

impl ProviderFailure {
    /// The message the test failed the operation with.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An operation the provider was asked to perform, as observed by [`ProviderControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// `read()` was called with the given maximum length.
    Read {
        /// The largest chunk the caller accepts.
        max_len: usize,
    },
    /// `rewind()` was called.
    Rewind,
    /// The provider was dropped.
    Dropped,
}

#[derive(Debug)]
enum Outcome {
    Succeed,
    Fail(String),
}

#[derive(Debug, Default)]
struct State {
    read_calls: usize,
    rewind_calls: usize,
    pending_read: Option<oneshot::Sender<Outcome>>,
    pending_rewind: Option<oneshot::Sender<Outcome>>,
    outstanding: usize,
    max_outstanding: usize,
    dropped: bool,
}

impl State {
    fn started(&mut self) {
        self.outstanding += 1;
        self.max_outstanding = self.max_outstanding.max(self.outstanding);
    }
}

/// A provider whose operations complete only when the test says so.
///
/// The body is given as a list of chunks. A read returns the next chunk, split if it is
/// longer than the requested maximum. A rewind starts over with the first chunk.
#[derive(Debug)]
pub struct TestDrivenProvider {
    chunks: Vec<Bytes>,
    index: usize,
    offset: usize,
    chunked: bool,
    length: Option<u64>,
    honor_max_len: bool,
    state: Arc<Mutex<State>>,
    requests: mpsc::UnboundedSender<Request>,
}

impl TestDrivenProvider {
    /// Creates a provider for a fixed-length body made of `chunks`.
    #[must_use]
    pub fn new<I>(chunks: I) -> (Self, ProviderControl)
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        Self::create(chunks, false)
    }

    /// Creates a provider for a chunked body made of `chunks`. The last chunk is flagged
    /// as final; an empty list produces a single empty final chunk.
    #[must_use]
    pub fn chunked<I>(chunks: I) -> (Self, ProviderControl)
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        Self::create(chunks, true)
    }

    fn create<I>(chunks: I, chunked: bool) -> (Self, ProviderControl)
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        let chunks: Vec<Bytes> = chunks.into_iter().map(Into::into).collect();
        let length = if chunked {
            None
        } else {
            Some(chunks.iter().map(|c| c.len() as u64).sum())
        };

        let state = Arc::new(Mutex::new(State::default()));
        let (requests, events) = mpsc::unbounded();

        let provider = Self {
            chunks,
            index: 0,
            offset: 0,
            chunked,
            length,
            honor_max_len: true,
            state: Arc::clone(&state),
            requests,
        };

        (provider, ProviderControl { state, events })
    }

    /// Overrides the length the provider reports, to simulate a provider that breaks
    /// its own declaration.
    #[must_use]
    pub fn with_declared_length(mut self, length: Option<u64>) -> Self {
        self.length = length;
        self
    }

    /// Makes reads return whole chunks even if they exceed the requested maximum.
    #[must_use]
    pub fn ignoring_max_len(mut self) -> Self {
        self.honor_max_len = false;
        self
    }

    fn next_chunk(&mut self, max_len: usize) -> Chunk {
        let Some(current) = self.chunks.get(self.index) else {
            return if self.chunked { Chunk::empty_final() } else { Chunk::default() };
        };

        let remaining = current.slice(self.offset..);
        let take = if self.honor_max_len {
            remaining.len().min(max_len)
        } else {
            remaining.len()
        };

        self.offset += take;
        if self.offset >= current.len() {
            self.index += 1;
            self.offset = 0;
        }

        let data = remaining.slice(..take);
        if self.chunked && self.index >= self.chunks.len() {
            Chunk::final_chunk(data)
        } else {
            Chunk::new(data)
        }
    }

    /// Registers `request` and returns the receiver of the test's decision.
    fn begin(&self, request: Request) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            state.started();
            if matches!(request, Request::Read { .. }) {
                state.read_calls += 1;
                state.pending_read = Some(tx);
            } else {
                state.rewind_calls += 1;
                state.pending_rewind = Some(tx);
            }
        }

        // The control may be gone already, nobody to notify then.
        let _ = self.requests.unbounded_send(request);
        rx
    }

    fn end(&self, outcome: Result<Outcome, oneshot::Canceled>) -> Result<(), ProviderFailure> {
        self.state.lock().outstanding -= 1;

        match outcome {
            Ok(Outcome::Succeed) => Ok(()),
            Ok(Outcome::Fail(message)) => Err(ProviderFailure::new(message)),
            Err(_) => Err(ProviderFailure::new("pending operation was abandoned")),
        }
    }
}

impl UploadDataProvider for TestDrivenProvider {
    type Error = ProviderFailure;

    fn length(&self) -> Option<u64> {
        self.length
    }

    async fn read(&mut self, max_len: usize) -> Result<Chunk, Self::Error> {
        let outcome = self.begin(Request::Read { max_len }).await;
        self.end(outcome)?;
        Ok(self.next_chunk(max_len))
    }

    async fn rewind(&mut self) -> Result<(), Self::Error> {
        let outcome = self.begin(Request::Rewind).await;
        self.end(outcome)?;
        self.index = 0;
        self.offset = 0;
        Ok(())
    }
}

impl Drop for TestDrivenProvider {
    fn drop(&mut self) {
        self.state.lock().dropped = true;
        let _ = self.requests.unbounded_send(Request::Dropped);
    }
}

/// Drives a [`TestDrivenProvider`] and observes how it is used.
#[derive(Debug)]
pub struct ProviderControl {
    state: Arc<Mutex<State>>,
    events: mpsc::UnboundedReceiver<Request>,
}

impl ProviderControl {
    /// Waits for the next request and returns it.
    ///
    /// # Panics
    ///
    /// Panics if the provider is gone and no more requests can arrive.
    pub async fn next_request(&mut self) -> Request {
        self.events.next().await.expect("provider is gone")
    }

    /// Waits until the provider is asked to read and returns the requested maximum length.
    ///
    /// # Panics
    ///
    /// Panics if the next request is not a read.
    pub async fn wait_for_read_request(&mut self) -> usize {
        match self.next_request().await {
            Request::Read { max_len } => max_len,
            other => panic!("expected a read request, got {other:?}"),
        }
    }

    /// Waits until the provider is asked to rewind.
    ///
    /// # Panics
    ///
    /// Panics if the next request is not a rewind.
    pub async fn wait_for_rewind_request(&mut self) {
        match self.next_request().await {
            Request::Rewind => {}
            other => panic!("expected a rewind request, got {other:?}"),
        }
    }

    /// Waits until the provider has been dropped, ignoring any requests before that.
    pub async fn wait_for_provider_dropped(&mut self) {
        while let Some(request) = self.events.next().await {
            if request == Request::Dropped {
                return;
            }
        }
    }

    /// Completes the pending read with the next piece of the body.
    ///
    /// # Panics
    ///
    /// Panics if no read is pending.
    pub fn complete_read(&self) {
        self.resolve_read(Outcome::Succeed);
    }

    /// Fails the pending read with `message`.
    ///
    /// # Panics
    ///
    /// Panics if no read is pending.
    pub fn fail_read(&self, message: impl Into<String>) {
        self.resolve_read(Outcome::Fail(message.into()));
    }

    /// Completes the pending rewind.
    ///
    /// # Panics
    ///
    /// Panics if no rewind is pending.
    pub fn complete_rewind(&self) {
        self.resolve_rewind(Outcome::Succeed);
    }

    /// Fails the pending rewind with `message`.
    ///
    /// # Panics
    ///
    /// Panics if no rewind is pending.
    pub fn fail_rewind(&self, message: impl Into<String>) {
        self.resolve_rewind(Outcome::Fail(message.into()));
    }

    fn resolve_read(&self, outcome: Outcome) {
        let tx = self.state.lock().pending_read.take().expect("no read is pending");
        let _ = tx.send(outcome);
    }

    fn resolve_rewind(&self, outcome: Outcome) {
        let tx = self.state.lock().pending_rewind.take().expect("no rewind is pending");
        let _ = tx.send(outcome);
    }

    /// Number of times `read()` was called.
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }

    /// Number of times `rewind()` was called.
    #[must_use]
    pub fn rewind_calls(&self) -> usize {
        self.state.lock().rewind_calls
    }

    /// Whether a read is waiting to be completed.
    #[must_use]
    pub fn is_read_pending(&self) -> bool {
        self.state.lock().pending_read.is_some()
    }

    /// Whether a rewind is waiting to be completed.
    #[must_use]
    pub fn is_rewind_pending(&self) -> bool {
        self.state.lock().pending_rewind.is_some()
    }

    /// The largest number of operations that were running on the provider at the same time.
    #[must_use]
    pub fn max_outstanding(&self) -> usize {
        self.state.lock().max_outstanding
    }

    /// Whether the provider has been dropped.
    #[must_use]
    pub fn is_provider_dropped(&self) -> bool {
        self.state.lock().dropped
    }
}
