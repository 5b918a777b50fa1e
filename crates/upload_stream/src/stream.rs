// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use anyspawn::Spawner;
use parking_lot::Mutex;

use crate::builder::UploadStreamBuilder;
use crate::completion::{Completion, Init, InitWaiter, ReadWaiter};
use crate::controller::{Controller, InitStep};
use crate::dispatch::dispatch;
use crate::provider::UploadDataProvider;
use crate::telemetry::{StreamActivity, StreamOperation, StreamTelemetry};
use crate::{Chunk, Result};

/// Presents an [`UploadDataProvider`] to an HTTP transport as a rewindable body.
///
/// The transport drives the stream with [`init()`][Self::init], [`read()`][Self::read] and
/// [`reset()`][Self::reset]. The stream makes sure the provider only ever has one
/// operation running, rewinds it when a body has to be sent again (for example after a
/// redirect or an authentication challenge), and coalesces repeated `init()` calls into a
/// single rewind.
///
/// Provider operations run on the [`Spawner`] given at construction and may complete on
/// any thread. Tearing the stream down while an operation is running is always safe: the
/// completion is ignored and the provider is dropped once it returns.
///
/// # Examples
///
/// ```rust,ignore
/// use anyspawn::Spawner;
/// use upload_stream::{Init, UploadStream};
///
/// let mut stream = UploadStream::new(provider, Spawner::new_tokio());
///
/// stream.init().ready().await?;
/// loop {
///     let chunk = stream.read(16 * 1024)?.await?;
///     send(chunk.data()).await;
///     if chunk.is_last() {
///         break;
///     }
/// }
///
/// // The server asked for the body again.
/// stream.reset();
/// stream.init().ready().await?;
/// ```
#[derive(Debug)]
pub struct UploadStream<P: UploadDataProvider> {
    shared: Arc<Shared<P>>,
}

/// State shared between the stream and the provider operations it spawned.
#[derive(Debug)]
pub(crate) struct Shared<P> {
    pub(crate) inner: Mutex<Inner<P>>,
    pub(crate) spawner: Spawner,
    pub(crate) telemetry: StreamTelemetry,
}

#[derive(Debug)]
pub(crate) struct Inner<P> {
    pub(crate) controller: Controller<P>,
    pub(crate) init_waiter: Option<InitWaiter>,
    pub(crate) read_waiter: Option<ReadWaiter>,
}

impl<P> Shared<P> {
    pub(crate) fn position(&self) -> u64 {
        self.inner.lock().controller.position()
    }
}

impl<P: UploadDataProvider> UploadStream<P> {
    /// Creates a stream with default settings.
    ///
    /// Logging is disabled. Use [`builder()`][Self::builder] to configure the stream.
    #[must_use]
    pub fn new(provider: P, spawner: Spawner) -> Self {
        Self::builder(provider, spawner).build()
    }

    /// Creates a builder for configuring a stream.
    #[must_use]
    pub fn builder(provider: P, spawner: Spawner) -> UploadStreamBuilder<P> {
        UploadStreamBuilder::new(provider, spawner)
    }

    pub(crate) fn from_parts(provider: P, spawner: Spawner, telemetry: StreamTelemetry) -> Self {
        let length = provider.length();

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    controller: Controller::new(provider, length),
                    init_waiter: None,
                    read_waiter: None,
                }),
                spawner,
                telemetry,
            }),
        }
    }

    /// Prepares the stream to be read from the first byte.
    ///
    /// If nothing has been read since the stream was created or last rewound, the stream
    /// is ready immediately and the provider is not contacted. Otherwise the provider is
    /// rewound first, after any read still in flight completes, and the returned
    /// [`Init::Pending`] resolves once that rewind is done.
    ///
    /// Calling `init()` again while a previous one is pending never starts a second
    /// rewind; the previous completion resolves as [aborted][crate::ErrorKind::Aborted]
    /// and the new one takes over. A result of a read that is still pending is abandoned.
    pub fn init(&mut self) -> Init {
        let (init, start, superseded) = {
            let mut inner = self.shared.inner.lock();
            let superseded = (inner.init_waiter.take(), inner.read_waiter.take());

            match inner.controller.init() {
                Ok(InitStep::Ready) => (Ok(None), None, superseded),
                Ok(InitStep::Rewind(start)) => {
                    let (waiter, completion) = Completion::channel();
                    inner.init_waiter = Some(waiter);
                    (Ok(Some(completion)), Some(start), superseded)
                }
                Ok(InitStep::Coalesced) => {
                    let (waiter, completion) = Completion::channel();
                    inner.init_waiter = Some(waiter);
                    (Ok(Some(completion)), None, superseded)
                }
                Err(e) => (Err(e), None, superseded),
            }
        };
        drop(superseded);

        let telemetry = self.shared.telemetry;
        let position = self.position();

        match init {
            Ok(None) => {
                telemetry.record(StreamOperation::Init, StreamActivity::Ready, position);
                Init::Ready
            }
            Ok(Some(completion)) => {
                match start {
                    Some(start) => {
                        telemetry.record(StreamOperation::Init, StreamActivity::Pending, position);
                        dispatch(&self.shared, start);
                    }
                    None => telemetry.record(StreamOperation::Init, StreamActivity::Coalesced, position),
                }
                Init::Pending(completion)
            }
            Err(e) => {
                telemetry.record(StreamOperation::Init, StreamActivity::Failed, position);
                let (waiter, completion) = Completion::channel();
                waiter.resolve(Err(e));
                Init::Pending(completion)
            }
        }
    }

    /// Requests the next chunk of the body, at most `max_len` bytes long.
    ///
    /// For fixed-length bodies the chunk that completes the body is flagged as
    /// [last][Chunk::is_last]; chunked bodies end with the provider's final chunk.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Misuse`][crate::ErrorKind::Misuse] error, without changing
    /// the stream, if another operation is in flight, if the stream was not initialized
    /// since it was created or reset, if the whole body was already read, or if `max_len`
    /// is zero.
    pub fn read(&mut self, max_len: usize) -> Result<Completion<Chunk>> {
        let (start, completion) = {
            let mut inner = self.shared.inner.lock();
            let start = inner.controller.read(max_len)?;
            let (waiter, completion) = Completion::channel();
            inner.read_waiter = Some(waiter);
            (start, completion)
        };

        self.shared
            .telemetry
            .record(StreamOperation::Read, StreamActivity::Started, self.position());
        dispatch(&self.shared, start);

        Ok(completion)
    }

    /// Abandons any pending `init()` or `read()` result.
    ///
    /// The abandoned completions resolve as [aborted][crate::ErrorKind::Aborted]. An
    /// operation that is already running on the provider is not interrupted, its outcome
    /// is still taken into account, so the next `init()` rewinds if data was consumed.
    /// The stream has to be initialized again before it can be read.
    pub fn reset(&mut self) {
        let abandoned = {
            let mut inner = self.shared.inner.lock();
            inner.controller.reset();
            (inner.init_waiter.take(), inner.read_waiter.take())
        };
        drop(abandoned);

        self.shared
            .telemetry
            .record(StreamOperation::Reset, StreamActivity::Succeeded, self.position());
    }

    /// Tears the stream down. Equivalent to dropping it.
    ///
    /// Pending completions resolve as [aborted][crate::ErrorKind::Aborted] and the provider
    /// is dropped, right away if it is idle, or else as soon as its running operation
    /// returns.
    pub fn teardown(self) {
        drop(self);
    }

    /// The total length of the body, or `None` for a chunked body.
    #[must_use]
    pub fn length(&self) -> Option<u64> {
        self.shared.inner.lock().controller.length()
    }

    /// Whether the body is sent in chunks of unknown total length.
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.length().is_none()
    }

    /// Number of bytes read from the provider since the last rewind.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.shared.position()
    }

    /// Whether the whole body was read in the current pass.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.shared.inner.lock().controller.is_at_end()
    }

    /// Whether the stream has been initialized and can be read.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.inner.lock().controller.is_ready()
    }

    /// The name of the stream used in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.shared.telemetry.name()
    }
}

impl<P: UploadDataProvider> Drop for UploadStream<P> {
    fn drop(&mut self) {
        let (provider, abandoned, position) = {
            let mut inner = self.shared.inner.lock();
            let provider = inner.controller.destroy();
            let abandoned = (inner.init_waiter.take(), inner.read_waiter.take());
            (provider, abandoned, inner.controller.position())
        };
        drop(abandoned);
        drop(provider);

        self.shared
            .telemetry
            .record(StreamOperation::Teardown, StreamActivity::Succeeded, position);
    }
}
