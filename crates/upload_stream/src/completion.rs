// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`Completion`] for awaiting the result of a pending stream operation.

use std::fmt::Debug;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_channel::oneshot;

use crate::{Chunk, Error, Result};

/// The eventual result of an [`init()`][crate::UploadStream::init] or
/// [`read()`][crate::UploadStream::read] that could not complete immediately.
///
/// Resolves exactly once. If the stream abandons the result, because of
/// [`reset()`][crate::UploadStream::reset], a later `init()` or teardown, the completion
/// resolves with [`ErrorKind::Aborted`][crate::ErrorKind::Aborted] instead of hanging.
///
/// Dropping a `Completion` does not cancel the provider operation behind it.
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion<T>(oneshot::Receiver<Result<T>>);

impl<T> Completion<T> {
    pub(crate) fn channel() -> (Waiter<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Waiter(tx), Self(rx))
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_canceled| Err(Error::aborted())))
    }
}

impl<T> Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// The sending half of a [`Completion`]. Dropping it resolves the completion as aborted.
pub(crate) struct Waiter<T>(oneshot::Sender<Result<T>>);

impl<T> Waiter<T> {
    pub(crate) fn resolve(self, result: Result<T>) {
        // The transport may have dropped its completion already, nobody to tell then.
        let _ = self.0.send(result);
    }
}

impl<T> Debug for Waiter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter").finish_non_exhaustive()
    }
}

/// The outcome of [`UploadStream::init()`][crate::UploadStream::init].
#[derive(Debug)]
#[must_use = "a pending init must be awaited before the stream can be read"]
pub enum Init {
    /// The stream is ready to be read from the start, no provider call was needed.
    Ready,

    /// The provider has to rewind first. The stream is ready once the completion resolves
    /// successfully.
    Pending(Completion<()>),
}

impl Init {
    /// Returns `true` if the stream was ready immediately.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Waits until the stream is ready, no matter whether that happened immediately.
    ///
    /// # Errors
    ///
    /// Returns the error the pending init resolved with.
    pub async fn ready(self) -> Result<()> {
        match self {
            Self::Ready => Ok(()),
            Self::Pending(completion) => completion.await,
        }
    }
}

pub(crate) type ReadWaiter = Waiter<Chunk>;
pub(crate) type InitWaiter = Waiter<()>;
