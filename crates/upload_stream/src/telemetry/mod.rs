// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured logging of upload stream activity.
//!
//! Every notable step of a stream is reported as an `upload.event` through `tracing` when
//! logging was enabled on the builder. Nothing is emitted otherwise.

use tracing::Level;

pub(crate) mod attributes;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamOperation {
    Init,
    Read,
    Rewind,
    Reset,
    Teardown,
}

impl StreamOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "upload.init",
            Self::Read => "upload.read",
            Self::Rewind => "upload.rewind",
            Self::Reset => "upload.reset",
            Self::Teardown => "upload.teardown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamActivity {
    /// Init completed without contacting the provider.
    Ready,
    /// The result will be delivered later.
    Pending,
    /// An init joined an operation that was already running.
    Coalesced,
    Started,
    Succeeded,
    Failed,
    /// A result was dropped because nobody waits for it anymore.
    Discarded,
    /// A completion that does not belong to the running operation.
    Stale,
    /// A completion that arrived after teardown.
    Late,
}

impl StreamActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "upload.ready",
            Self::Pending => "upload.pending",
            Self::Coalesced => "upload.coalesced",
            Self::Started => "upload.started",
            Self::Succeeded => "upload.succeeded",
            Self::Failed => "upload.failed",
            Self::Discarded => "upload.discarded",
            Self::Stale => "upload.stale",
            Self::Late => "upload.late",
        }
    }
}

/// Picks the level of an event. Rewinds and teardown are rare enough to be reported at `INFO`.
fn level(operation: StreamOperation, activity: StreamActivity) -> Level {
    match (operation, activity) {
        (_, StreamActivity::Failed) => Level::ERROR,
        (_, StreamActivity::Stale) => Level::WARN,
        (StreamOperation::Rewind | StreamOperation::Teardown, _) => Level::INFO,
        _ => Level::DEBUG,
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamTelemetry {
    name: &'static str,
    logging_enabled: bool,
}

impl StreamTelemetry {
    pub(crate) fn new(name: &'static str, logging_enabled: bool) -> Self {
        Self { name, logging_enabled }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub(crate) fn record(&self, operation: StreamOperation, activity: StreamActivity, position: u64) {
        if self.logging_enabled {
            Self::emit(self.name, operation, activity, position);
        }
    }

    fn emit(name: &'static str, operation: StreamOperation, activity: StreamActivity, position: u64) {
        let op = operation.as_str();
        let ev = activity.as_str();

        // Tracing level must be constant, so we use a macro to select the appropriate level.
        // Field names must match constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    upload.name = name,
                    upload.operation = op,
                    upload.activity = ev,
                    upload.position = position,
                    "upload.event"
                )
            };
        }

        let level = level(operation, activity);
        if level == Level::ERROR {
            emit_event!(error);
        } else if level == Level::WARN {
            emit_event!(warn);
        } else if level == Level::INFO {
            emit_event!(info);
        } else {
            emit_event!(debug);
        }
    }
}
