// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Field names of the structured `upload.event` log record.

#[cfg(test)]
pub(crate) const UPLOAD_NAME: &str = "upload.name";

#[cfg(test)]
pub(crate) const UPLOAD_EVENT_NAME: &str = "upload.event";

#[cfg(test)]
pub(crate) const UPLOAD_OPERATION_NAME: &str = "upload.operation";

#[cfg(test)]
pub(crate) const UPLOAD_ACTIVITY_NAME: &str = "upload.activity";

#[cfg(test)]
pub(crate) const UPLOAD_POSITION_NAME: &str = "upload.position";
