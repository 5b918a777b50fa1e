// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Rewindable, single-flight coordination of asynchronous upload body providers.
//!
//! An HTTP client sends a request body by pulling chunks from an application supplied
//! source. The same body may have to be sent more than once, for example after a redirect
//! or an authentication challenge, so the source must be able to start over. This crate
//! sits between the two:
//!
//! - the application implements [`UploadDataProvider`], an asynchronous source with
//!   `read` and `rewind` operations;
//! - the transport drives an [`UploadStream`] through [`init()`][UploadStream::init],
//!   [`read()`][UploadStream::read] and [`reset()`][UploadStream::reset].
//!
//! The stream guarantees that the provider never has more than one operation running,
//! rewinds it only when data was consumed since the last rewind, coalesces repeated
//! `init()` calls into a single rewind and defers a rewind requested during a read until
//! that read completes. Provider operations run on an [`anyspawn::Spawner`], so they may
//! complete on any thread, and a stream can be torn down at any time: operations that
//! complete afterwards are ignored.
//!
//! # Examples
//!
//! ```rust
//! use std::convert::Infallible;
//!
//! use anyspawn::Spawner;
//! use upload_stream::{Chunk, UploadDataProvider, UploadStream};
//!
//! const BODY: &[u8] = b"hello";
//!
//! #[derive(Debug)]
//! struct Greeting {
//!     offset: usize,
//! }
//!
//! impl UploadDataProvider for Greeting {
//!     type Error = Infallible;
//!
//!     fn length(&self) -> Option<u64> {
//!         Some(BODY.len() as u64)
//!     }
//!
//!     async fn read(&mut self, max_len: usize) -> Result<Chunk, Self::Error> {
//!         let end = BODY.len().min(self.offset + max_len);
//!         let chunk = Chunk::new(&BODY[self.offset..end]);
//!         self.offset = end;
//!         Ok(chunk)
//!     }
//!
//!     async fn rewind(&mut self) -> Result<(), Self::Error> {
//!         self.offset = 0;
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), upload_stream::Error> {
//! let mut stream = UploadStream::new(Greeting { offset: 0 }, Spawner::new_tokio());
//!
//! // Nothing was read yet, so this is ready without asking the provider to rewind.
//! assert!(stream.init().is_ready());
//!
//! let chunk = stream.read(64 * 1024)?.await?;
//! assert_eq!(chunk.data().as_ref(), b"hello");
//! assert!(chunk.is_last());
//!
//! // Start over, the provider is rewound before the init resolves.
//! stream.reset();
//! stream.init().ready().await?;
//! assert_eq!(stream.position(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Failures are reported as [`Error`], classified by [`ErrorKind`]: provider failures
//! ([`ErrorKind::Read`], [`ErrorKind::Rewind`], [`ErrorKind::Protocol`]) are kept apart
//! from incorrect use of the stream by the transport ([`ErrorKind::Misuse`]) and from
//! results that were abandoned ([`ErrorKind::Aborted`]).
//!
//! # Logging
//!
//! Streams built with [`logs(true)`][UploadStreamBuilder::logs] report their activity as
//! `tracing` events named `upload.event`.
//!
//! The `test-util` feature enables a scripted provider for driving streams from tests.
//! It is in the `testing` module.

mod builder;
mod completion;
mod controller;
mod dispatch;
mod error;
mod provider;
mod slot;
mod stream;
mod telemetry;

#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;

pub use builder::UploadStreamBuilder;
pub use completion::{Completion, Init};
pub use error::{Error, ErrorKind, Result};
pub use provider::{Chunk, UploadDataProvider};
pub use stream::UploadStream;
