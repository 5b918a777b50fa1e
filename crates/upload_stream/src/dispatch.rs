// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Runs provider operations on the stream's spawner and routes their completions back
//! into the stream.
//!
//! Spawned operations only hold a [`Weak`] reference to the stream. An operation that
//! starts running after the stream was torn down never reaches the provider, and a
//! completion that arrives after teardown is dropped together with the provider it
//! carries.

use std::sync::{Arc, Weak};

use crate::controller::{Discard, DiscardReason, ReadStep, RewindStep, Start};
use crate::provider::UploadDataProvider;
use crate::slot::{Operation, Ticket};
use crate::stream::Shared;
use crate::telemetry::{StreamActivity, StreamOperation, StreamTelemetry};
use crate::{Chunk, Error, ErrorKind, Result};

/// Starts the provider operation described by `start`. Must be called without holding the
/// stream lock; the spawner may run the operation to completion before returning.
pub(crate) fn dispatch<P: UploadDataProvider>(shared: &Arc<Shared<P>>, start: Start<P>) {
    let weak = Arc::downgrade(shared);
    let telemetry = shared.telemetry;
    let Start { ticket, mut provider } = start;

    match ticket.operation() {
        Operation::Read { max_len } => {
            drop(shared.spawner.spawn(async move {
                if !is_live(&weak) {
                    telemetry.record(StreamOperation::Read, StreamActivity::Late, 0);
                    return;
                }
                let result = provider.read(max_len).await.map_err(|e| Error::caused_by(ErrorKind::Read, e));
                read_completed(&weak, telemetry, ticket, provider, result);
            }));
        }
        Operation::Rewind => {
            telemetry.record(StreamOperation::Rewind, StreamActivity::Started, shared.position());

            drop(shared.spawner.spawn(async move {
                if !is_live(&weak) {
                    telemetry.record(StreamOperation::Rewind, StreamActivity::Late, 0);
                    return;
                }
                let result = provider.rewind().await.map_err(|e| Error::caused_by(ErrorKind::Rewind, e));
                rewind_completed(&weak, telemetry, ticket, provider, result);
            }));
        }
    }
}

/// Whether the stream still exists and was not torn down. The spawner may run an
/// operation long after it was dispatched.
fn is_live<P>(weak: &Weak<Shared<P>>) -> bool {
    let Some(shared) = weak.upgrade() else {
        return false;
    };
    let destroyed = shared.inner.lock().controller.is_destroyed();
    !destroyed
}

fn read_completed<P: UploadDataProvider>(
    weak: &Weak<Shared<P>>,
    telemetry: StreamTelemetry,
    ticket: Ticket,
    provider: P,
    result: Result<Chunk>,
) {
    let Some(shared) = weak.upgrade() else {
        telemetry.record(StreamOperation::Read, StreamActivity::Late, 0);
        return;
    };

    let (step, waiter, position) = {
        let mut inner = shared.inner.lock();
        let step = inner.controller.read_completed(ticket, provider, result);
        let waiter = match &step {
            ReadStep::Deliver(_) => inner.read_waiter.take(),
            ReadStep::Rewind { .. } | ReadStep::Discard(_) => None,
        };
        (step, waiter, inner.controller.position())
    };

    match step {
        ReadStep::Deliver(result) => {
            telemetry.record(StreamOperation::Read, outcome(&result), position);
            match waiter {
                Some(waiter) => waiter.resolve(result),
                None => telemetry.record(StreamOperation::Read, StreamActivity::Discarded, position),
            }
        }
        ReadStep::Rewind { start, superseded } => {
            telemetry.record(StreamOperation::Read, outcome(&superseded), position);
            telemetry.record(StreamOperation::Read, StreamActivity::Discarded, position);
            dispatch(&shared, start);
        }
        ReadStep::Discard(discard) => discarded(telemetry, StreamOperation::Read, discard, position),
    }
}

fn rewind_completed<P: UploadDataProvider>(
    weak: &Weak<Shared<P>>,
    telemetry: StreamTelemetry,
    ticket: Ticket,
    provider: P,
    result: Result<()>,
) {
    let Some(shared) = weak.upgrade() else {
        telemetry.record(StreamOperation::Rewind, StreamActivity::Late, 0);
        return;
    };

    let (step, waiter, position) = {
        let mut inner = shared.inner.lock();
        let step = inner.controller.rewind_completed(ticket, provider, result);
        let waiter = match &step {
            RewindStep::ResolveInit(_) => inner.init_waiter.take(),
            RewindStep::Unclaimed(_) | RewindStep::Discard(_) => None,
        };
        (step, waiter, inner.controller.position())
    };

    match step {
        RewindStep::ResolveInit(result) => {
            telemetry.record(StreamOperation::Rewind, outcome(&result), position);
            match waiter {
                Some(waiter) => waiter.resolve(result),
                None => telemetry.record(StreamOperation::Init, StreamActivity::Discarded, position),
            }
        }
        RewindStep::Unclaimed(result) => {
            telemetry.record(StreamOperation::Rewind, outcome(&result), position);
            telemetry.record(StreamOperation::Init, StreamActivity::Discarded, position);
        }
        RewindStep::Discard(discard) => discarded(telemetry, StreamOperation::Rewind, discard, position),
    }
}

fn discarded<P>(telemetry: StreamTelemetry, operation: StreamOperation, discard: Discard<P>, position: u64) {
    let activity = match discard.reason {
        DiscardReason::Late => StreamActivity::Late,
        DiscardReason::Stale => StreamActivity::Stale,
    };
    telemetry.record(operation, activity, position);

    // Releases the provider if the stream was torn down while it was lent out.
    drop(discard.provider);
}

fn outcome<T>(result: &Result<T>) -> StreamActivity {
    if result.is_ok() {
        StreamActivity::Succeeded
    } else {
        StreamActivity::Failed
    }
}
