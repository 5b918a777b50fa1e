// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The upload stream state machine.
//!
//! [`Controller`] is single-threaded and knows nothing about executors or waiters: every
//! transport call and every provider completion is turned into a step that tells the caller
//! which provider operation to start next (if any) and what to hand back to the transport.
//! The caller serializes access, see `stream.rs`.

use std::mem;

use crate::provider::Chunk;
use crate::slot::{Operation, OperationSlot, Ticket};
use crate::{Error, Result};

/// An `init()` that could not be resolved immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingInit {
    None,
    /// Resolves when the running rewind completes.
    AfterRewind,
    /// The running read must be followed by a rewind before the init can resolve.
    AfterRead,
}

/// A provider operation that the caller must start.
#[derive(Debug)]
pub(crate) struct Start<P> {
    pub(crate) ticket: Ticket,
    pub(crate) provider: P,
}

#[derive(Debug)]
pub(crate) enum InitStep<P> {
    /// Nothing was consumed, the stream is ready without contacting the provider.
    Ready,
    /// A rewind must run first.
    Rewind(Start<P>),
    /// An operation is already running; the init resolves once it is done.
    Coalesced,
}

#[derive(Debug)]
pub(crate) enum ReadStep<P> {
    /// Hand the result to the transport read, if one is still waiting.
    Deliver(Result<Chunk>),
    /// An init arrived while the read was running; the read result is dropped and the
    /// rewind must start.
    Rewind { start: Start<P>, superseded: Result<Chunk> },
    Discard(Discard<P>),
}

#[derive(Debug)]
pub(crate) enum RewindStep<P> {
    /// Resolve the waiting init.
    ResolveInit(Result<()>),
    /// No init was waiting, e.g. because of a reset.
    Unclaimed(Result<()>),
    Discard(Discard<P>),
}

/// A completion that must not touch the stream.
#[derive(Debug)]
pub(crate) struct Discard<P> {
    pub(crate) provider: P,
    pub(crate) reason: DiscardReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiscardReason {
    /// The stream was torn down while the operation was running.
    Late,
    /// The completion does not belong to the running operation.
    Stale,
}

#[derive(Debug)]
pub(crate) struct Controller<P> {
    slot: OperationSlot<P>,
    length: Option<u64>,
    position: u64,
    has_read_since_rewind: bool,
    pending_init: PendingInit,
    ready: bool,
    at_end: bool,
    destroyed: bool,
}

impl<P> Controller<P> {
    pub(crate) fn new(provider: P, length: Option<u64>) -> Self {
        Self {
            slot: OperationSlot::new(provider),
            length,
            position: 0,
            has_read_since_rewind: false,
            pending_init: PendingInit::None,
            ready: false,
            at_end: length == Some(0),
            destroyed: false,
        }
    }

    pub(crate) fn length(&self) -> Option<u64> {
        self.length
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.at_end
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> Option<Operation> {
        self.slot.in_flight()
    }

    #[cfg(test)]
    pub(crate) fn pending_init(&self) -> PendingInit {
        self.pending_init
    }

    pub(crate) fn init(&mut self) -> Result<InitStep<P>> {
        if self.destroyed {
            return Err(Error::misuse("init() called on a torn down stream"));
        }

        self.ready = false;

        match self.slot.in_flight() {
            None if !self.has_read_since_rewind => {
                self.pending_init = PendingInit::None;
                self.ready = true;
                Ok(InitStep::Ready)
            }
            None => {
                let (ticket, provider) = self
                    .slot
                    .begin(Operation::Rewind)
                    .ok_or_else(|| Error::misuse("provider is no longer available"))?;
                self.pending_init = PendingInit::AfterRewind;
                Ok(InitStep::Rewind(Start { ticket, provider }))
            }
            Some(Operation::Read { .. }) => {
                self.pending_init = PendingInit::AfterRead;
                Ok(InitStep::Coalesced)
            }
            Some(Operation::Rewind) => {
                self.pending_init = PendingInit::AfterRewind;
                Ok(InitStep::Coalesced)
            }
        }
    }

    pub(crate) fn read(&mut self, max_len: usize) -> Result<Start<P>> {
        if self.destroyed {
            return Err(Error::misuse("read() called on a torn down stream"));
        }
        if max_len == 0 {
            return Err(Error::misuse("read() requires room for at least one byte"));
        }
        if self.slot.in_flight().is_some() {
            return Err(Error::misuse("read() called while another operation is in flight"));
        }
        if !self.ready {
            return Err(Error::misuse("read() called before init() completed"));
        }
        if self.at_end {
            return Err(Error::misuse("read() called after the whole body was read"));
        }

        let (ticket, provider) = self
            .slot
            .begin(Operation::Read { max_len })
            .ok_or_else(|| Error::misuse("provider is no longer available"))?;

        Ok(Start { ticket, provider })
    }

    pub(crate) fn reset(&mut self) {
        self.ready = false;
        self.pending_init = PendingInit::None;
    }

    /// Marks the stream as torn down and hands out the provider if it is idle.
    pub(crate) fn destroy(&mut self) -> Option<P> {
        self.destroyed = true;
        self.ready = false;
        self.pending_init = PendingInit::None;
        self.slot.release()
    }

    pub(crate) fn read_completed(&mut self, ticket: Ticket, provider: P, result: Result<Chunk>) -> ReadStep<P> {
        if self.destroyed {
            return ReadStep::Discard(Discard {
                provider,
                reason: DiscardReason::Late,
            });
        }

        let Operation::Read { max_len } = ticket.operation() else {
            return ReadStep::Discard(Discard {
                provider,
                reason: DiscardReason::Stale,
            });
        };

        if !self.slot.is_current(ticket) {
            return ReadStep::Discard(Discard {
                provider,
                reason: DiscardReason::Stale,
            });
        }

        self.has_read_since_rewind = true;
        let result = result.and_then(|chunk| self.accept(max_len, chunk));

        if self.pending_init == PendingInit::AfterRead {
            if let Some(ticket) = self.slot.chain(ticket, Operation::Rewind) {
                self.pending_init = PendingInit::AfterRewind;
                return ReadStep::Rewind {
                    start: Start { ticket, provider },
                    superseded: result,
                };
            }
        }

        match self.slot.finish(ticket, provider) {
            Ok(()) => ReadStep::Deliver(result),
            Err(provider) => ReadStep::Discard(Discard {
                provider,
                reason: DiscardReason::Stale,
            }),
        }
    }

    pub(crate) fn rewind_completed(&mut self, ticket: Ticket, provider: P, result: Result<()>) -> RewindStep<P> {
        if self.destroyed {
            return RewindStep::Discard(Discard {
                provider,
                reason: DiscardReason::Late,
            });
        }

        if ticket.operation().is_read() {
            return RewindStep::Discard(Discard {
                provider,
                reason: DiscardReason::Stale,
            });
        }

        if let Err(provider) = self.slot.finish(ticket, provider) {
            return RewindStep::Discard(Discard {
                provider,
                reason: DiscardReason::Stale,
            });
        }

        if result.is_ok() {
            self.position = 0;
            self.has_read_since_rewind = false;
            self.at_end = self.length == Some(0);
        }

        match mem::replace(&mut self.pending_init, PendingInit::None) {
            PendingInit::AfterRewind => {
                self.ready = result.is_ok();
                RewindStep::ResolveInit(result)
            }
            PendingInit::None | PendingInit::AfterRead => RewindStep::Unclaimed(result),
        }
    }

    /// Validates a chunk against the body length and advances the position.
    fn accept(&mut self, max_len: usize, chunk: Chunk) -> Result<Chunk> {
        if chunk.len() > max_len {
            return Err(Error::protocol(format!(
                "provider returned {} bytes for a read of at most {max_len} bytes",
                chunk.len()
            )));
        }

        let position = self.position.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));

        match self.length {
            Some(_) if chunk.is_last() => Err(Error::protocol("a fixed-length body cannot signal a final chunk")),
            Some(length) if position > length => Err(Error::protocol(format!(
                "read upload data length {position} exceeds expected length {length}"
            ))),
            Some(length) => {
                self.position = position;
                self.at_end = position == length;
                Ok(if self.at_end { chunk.into_last() } else { chunk })
            }
            None => {
                self.position = position;
                self.at_end = chunk.is_last();
                Ok(chunk)
            }
        }
    }
}
