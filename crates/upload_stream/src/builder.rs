// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyspawn::Spawner;

use crate::provider::UploadDataProvider;
use crate::stream::UploadStream;
use crate::telemetry::StreamTelemetry;

const DEFAULT_NAME: &str = "upload_stream";

/// Builder for an [`UploadStream`].
///
/// Created by calling [`UploadStream::builder()`].
///
/// # Examples
///
/// ```rust,ignore
/// use anyspawn::Spawner;
/// use upload_stream::UploadStream;
///
/// let stream = UploadStream::builder(provider, Spawner::new_tokio())
///     .name("photo_upload")
///     .logs(true)
///     .build();
/// ```
#[derive(Debug)]
pub struct UploadStreamBuilder<P> {
    provider: P,
    spawner: Spawner,
    name: &'static str,
    logs: bool,
}

impl<P: UploadDataProvider> UploadStreamBuilder<P> {
    pub(crate) fn new(provider: P, spawner: Spawner) -> Self {
        Self {
            provider,
            spawner,
            name: DEFAULT_NAME,
            logs: false,
        }
    }

    /// Sets the name reported in log events. Defaults to `upload_stream`.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Enables or disables `tracing` events for stream activity. Disabled by default.
    #[must_use]
    pub fn logs(mut self, enabled: bool) -> Self {
        self.logs = enabled;
        self
    }

    /// Builds the stream.
    #[must_use]
    pub fn build(self) -> UploadStream<P> {
        UploadStream::from_parts(self.provider, self.spawner, StreamTelemetry::new(self.name, self.logs))
    }
}
