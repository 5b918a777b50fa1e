// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use bytes::Bytes;

/// A piece of upload body data produced by a single provider read.
///
/// A chunk may be empty. Chunked bodies (whose provider reports no length) end with a
/// chunk flagged as last; fixed-length bodies must never flag a chunk as last themselves,
/// the stream does that once the declared length has been delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    data: Bytes,
    last: bool,
}

impl Chunk {
    /// Creates a chunk that is followed by more data.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: false,
        }
    }

    /// Creates the final chunk of a chunked upload body.
    #[must_use]
    pub fn final_chunk(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: true,
        }
    }

    /// Creates an empty final chunk, terminating a chunked upload body.
    #[must_use]
    pub fn empty_final() -> Self {
        Self::final_chunk(Bytes::new())
    }

    /// The bytes carried by this chunk.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consumes the chunk, returning its bytes.
    #[must_use]
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Number of bytes in the chunk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether no more data follows this chunk.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.last
    }

    pub(crate) fn into_last(self) -> Self {
        Self { last: true, ..self }
    }
}

/// An asynchronous source of upload body data.
///
/// The stream lends the provider to exactly one operation at a time: `read` and `rewind`
/// are never called concurrently and never while another call on the same provider is
/// still running. Each call may take arbitrarily long and may complete on any thread of
/// the executor that drives the stream.
///
/// The provider is dropped when the stream is torn down, or, if an operation was still
/// running at that time, when that operation completes.
///
/// # Thread safety
///
/// This trait requires `Send` from both the implementation and any returned futures.
#[trait_variant::make(Send)]
pub trait UploadDataProvider: Debug + Send + 'static {
    /// Type used to signal errors by the implementation of this trait.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The total length of the body in bytes, or `None` if the body is sent in chunks
    /// of unknown total length.
    ///
    /// The value is sampled once, when the stream is created.
    fn length(&self) -> Option<u64>;

    /// Produces the next chunk of at most `max_len` bytes.
    ///
    /// Returning more than `max_len` bytes, more bytes in total than [`length()`][Self::length],
    /// or a last chunk from a fixed-length body are contract violations that fail the read.
    async fn read(&mut self, max_len: usize) -> Result<Chunk, Self::Error>;

    /// Restarts the body so that the next read produces the first byte again.
    async fn rewind(&mut self) -> Result<(), Self::Error>;
}
