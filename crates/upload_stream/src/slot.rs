// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The single provider-operation slot.
//!
//! While no operation is running the slot holds the provider. Starting an operation checks
//! the provider out together with a [`Ticket`]; the provider can only be checked back in by
//! presenting the same ticket. A provider that is checked out cannot be handed to a second
//! operation, which is what keeps provider calls single-flight.

/// The kind of provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Read { max_len: usize },
    Rewind,
}

impl Operation {
    pub(crate) fn is_read(self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

/// Identifies one provider call from start to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    id: u64,
    operation: Operation,
}

impl Ticket {
    pub(crate) fn operation(self) -> Operation {
        self.operation
    }
}

#[derive(Debug)]
pub(crate) struct OperationSlot<P> {
    idle: Option<P>,
    in_flight: Option<Ticket>,
    next_id: u64,
}

impl<P> OperationSlot<P> {
    pub(crate) fn new(provider: P) -> Self {
        Self {
            idle: Some(provider),
            in_flight: None,
            next_id: 0,
        }
    }

    /// The operation currently running, if any.
    pub(crate) fn in_flight(&self) -> Option<Operation> {
        self.in_flight.map(Ticket::operation)
    }

    /// Checks the provider out for `operation`.
    ///
    /// Returns `None` if an operation is already running or the provider has been released.
    pub(crate) fn begin(&mut self, operation: Operation) -> Option<(Ticket, P)> {
        if self.in_flight.is_some() {
            return None;
        }

        let provider = self.idle.take()?;
        let ticket = self.issue(operation);
        self.in_flight = Some(ticket);

        Some((ticket, provider))
    }

    fn issue(&mut self, operation: Operation) -> Ticket {
        let ticket = Ticket {
            id: self.next_id,
            operation,
        };
        self.next_id = self.next_id.wrapping_add(1);
        ticket
    }

    /// Whether `ticket` identifies the running operation.
    pub(crate) fn is_current(&self, ticket: Ticket) -> bool {
        self.in_flight == Some(ticket)
    }

    /// Replaces the running operation identified by `ticket` with `next` without checking
    /// the provider in, so that nothing else can start in between.
    pub(crate) fn chain(&mut self, ticket: Ticket, next: Operation) -> Option<Ticket> {
        if !self.is_current(ticket) {
            return None;
        }

        let ticket = self.issue(next);
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// Checks the provider back in after the operation identified by `ticket` completed.
    ///
    /// A ticket that does not match the running operation is rejected and the provider
    /// is handed back to the caller untouched.
    pub(crate) fn finish(&mut self, ticket: Ticket, provider: P) -> Result<(), P> {
        if self.in_flight != Some(ticket) {
            return Err(provider);
        }

        self.in_flight = None;
        self.idle = Some(provider);
        Ok(())
    }

    /// Takes the idle provider out for good. Later operations can no longer begin.
    pub(crate) fn release(&mut self) -> Option<P> {
        self.idle.take()
    }
}
