// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "test code")]
#![cfg(feature = "test-util")]

//! Tests for provider failures, contract violations and misuse of the stream.

use std::error::Error as _;

use anyspawn::Spawner;
use ohno::ErrorExt;
use upload_stream::testing::{ProviderFailure, TestDrivenProvider};
use upload_stream::{Chunk, ErrorKind, Init, UploadStream};

fn stream(provider: TestDrivenProvider) -> UploadStream<TestDrivenProvider> {
    UploadStream::new(provider, Spawner::new_tokio())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_read_is_reported_with_cause() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());
    let read = stream.read(100).unwrap();
    control.wait_for_read_request().await;
    control.fail_read("disk unplugged");

    let error = read.await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Read);
    assert!(error.kind().is_provider_failure());
    assert!(error.to_string().contains("disk unplugged"), "got: {error}");
    let cause = error.find_source::<ProviderFailure>().expect("provider error is the cause");
    assert_eq!(cause.message(), "disk unplugged");

    // The failed read consumed nothing, but the provider was read from, so init rewinds.
    stream.reset();
    let Init::Pending(init) = stream.init() else {
        panic!("a failed read still requires a rewind");
    };
    control.wait_for_rewind_request().await;
    control.complete_rewind();
    init.await.unwrap();

    assert_eq!(control.read_calls(), 1);
    assert_eq!(control.rewind_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_rewind_is_reported_and_retried_by_next_init() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());
    let read = stream.read(100).unwrap();
    control.wait_for_read_request().await;
    control.complete_read();
    read.await.unwrap();

    stream.reset();
    let init = stream.init();
    control.wait_for_rewind_request().await;
    control.fail_rewind("seek failed");

    let error = init.ready().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Rewind);
    assert!(error.source().is_some());
    assert!(!stream.is_ready());
    assert_eq!(stream.read(100).unwrap_err().kind(), ErrorKind::Misuse);

    // No automatic retry, but the next init rewinds again.
    assert_eq!(control.rewind_calls(), 1);
    let init = stream.init();
    control.wait_for_rewind_request().await;
    control.complete_rewind();
    init.ready().await.unwrap();

    assert_eq!(control.rewind_calls(), 2);
    assert_eq!(stream.position(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_read_followed_by_init_still_rewinds() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());
    let _read = stream.read(100).unwrap();
    control.wait_for_read_request().await;

    let init = stream.init();
    control.fail_read("timeout");
    control.wait_for_rewind_request().await;
    control.complete_rewind();

    init.ready().await.unwrap();
    assert_eq!(control.rewind_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn misuse_is_reported_without_provider_calls() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider);

    let error = stream.read(100).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Misuse);
    assert!(!error.kind().is_provider_failure());

    assert!(stream.init().is_ready());
    assert_eq!(stream.read(0).unwrap_err().kind(), ErrorKind::Misuse);

    let read = stream.read(100).unwrap();
    assert_eq!(stream.read(100).unwrap_err().kind(), ErrorKind::Misuse);
    control.wait_for_read_request().await;
    control.complete_read();
    read.await.unwrap();

    // The whole body was delivered.
    assert!(stream.is_at_end());
    assert_eq!(stream.read(100).unwrap_err().kind(), ErrorKind::Misuse);

    // A reset requires another init before reading.
    stream.reset();
    assert_eq!(stream.read(100).unwrap_err().kind(), ErrorKind::Misuse);

    assert_eq!(control.read_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn length_overrun_is_a_protocol_error() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider.with_declared_length(Some(3)));

    assert!(stream.init().is_ready());
    let read = stream.read(100).unwrap();
    control.wait_for_read_request().await;
    control.complete_read();

    let error = read.await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Protocol);
    assert!(
        error.to_string().contains("read upload data length 5 exceeds expected length 3"),
        "got: {error}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn final_chunk_on_fixed_length_body_is_a_protocol_error() {
    let (provider, mut control) = TestDrivenProvider::chunked(["hello"]);
    let mut stream = stream(provider.with_declared_length(Some(10)));

    assert!(stream.init().is_ready());
    let read = stream.read(100).unwrap();
    control.wait_for_read_request().await;
    control.complete_read();

    assert_eq!(read.await.unwrap_err().kind(), ErrorKind::Protocol);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_chunk_is_a_protocol_error() {
    let (provider, mut control) = TestDrivenProvider::chunked(["hello"]);
    let mut stream = stream(provider.ignoring_max_len());

    assert!(stream.init().is_ready());
    let read = stream.read(2).unwrap();
    assert_eq!(control.wait_for_read_request().await, 2);
    control.complete_read();

    assert_eq!(read.await.unwrap_err().kind(), ErrorKind::Protocol);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_chunk_is_not_the_end_of_a_fixed_length_body() {
    let (provider, mut control) = TestDrivenProvider::new(["", "ab"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());

    let read = stream.read(8).unwrap();
    control.wait_for_read_request().await;
    control.complete_read();
    assert_eq!(read.await.unwrap(), Chunk::new(""));
    assert!(!stream.is_at_end());

    let read = stream.read(8).unwrap();
    control.wait_for_read_request().await;
    control.complete_read();
    assert_eq!(read.await.unwrap(), Chunk::final_chunk("ab"));
}
