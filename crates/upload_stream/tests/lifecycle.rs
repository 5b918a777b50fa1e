// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "test code")]
#![cfg(feature = "test-util")]

//! Tests for tearing streams down while provider operations are running.

use anyspawn::Spawner;
use futures::StreamExt;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use upload_stream::testing::TestDrivenProvider;
use upload_stream::{ErrorKind, Init, UploadStream};

fn stream(provider: TestDrivenProvider) -> UploadStream<TestDrivenProvider> {
    UploadStream::new(provider, Spawner::new_tokio())
}

/// A spawner that only queues tasks, so the test decides when each one starts.
fn queueing_spawner() -> (Spawner, mpsc::UnboundedReceiver<BoxFuture<'static, ()>>) {
    let (tx, rx) = mpsc::unbounded();
    let spawner = Spawner::new_custom(move |fut| {
        let _ = tx.unbounded_send(fut);
    });
    (spawner, rx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_before_read_completes() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());
    let read = stream.read(100).unwrap();
    control.wait_for_read_request().await;

    stream.teardown();

    // The pending read is abandoned and the provider stays alive until its read returns.
    assert_eq!(read.await.unwrap_err().kind(), ErrorKind::Aborted);
    assert!(!control.is_provider_dropped());

    control.complete_read();
    control.wait_for_provider_dropped().await;

    assert_eq!(control.rewind_calls(), 0);
    assert_eq!(control.read_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_before_rewind_completes() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());
    let read = stream.read(100).unwrap();
    control.wait_for_read_request().await;
    control.complete_read();
    assert_eq!(read.await.unwrap().data().as_ref(), b"hello");

    stream.reset();
    let Init::Pending(init) = stream.init() else {
        panic!("init after a read has to rewind");
    };
    control.wait_for_rewind_request().await;

    drop(stream);
    assert_eq!(init.await.unwrap_err().kind(), ErrorKind::Aborted);

    control.complete_rewind();
    control.wait_for_provider_dropped().await;

    assert_eq!(control.rewind_calls(), 1);
    assert_eq!(control.read_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_before_failed_read_completes() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());
    let _read = stream.read(100).unwrap();
    control.wait_for_read_request().await;

    stream.teardown();
    control.fail_read("connection reset");
    control.wait_for_provider_dropped().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_when_idle_drops_provider() {
    let (provider, control) = TestDrivenProvider::chunked(["hello"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());
    stream.teardown();

    assert!(control.is_provider_dropped());
    assert_eq!(control.read_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_during_read_chained_to_rewind() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let mut stream = stream(provider);

    assert!(stream.init().is_ready());
    let _read = stream.read(100).unwrap();
    control.wait_for_read_request().await;
    let init = stream.init();
    assert!(!init.is_ready());

    stream.teardown();
    control.complete_read();

    // The stream is gone, so the rewind queued behind the read never starts.
    control.wait_for_provider_dropped().await;
    assert_eq!(control.rewind_calls(), 0);
    assert_eq!(init.ready().await.unwrap_err().kind(), ErrorKind::Aborted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_queued_before_teardown_never_reaches_provider() {
    let (provider, control) = TestDrivenProvider::new(["hello"]);
    let (spawner, mut queue) = queueing_spawner();
    let mut stream = UploadStream::new(provider, spawner);

    assert!(stream.init().is_ready());
    let read = stream.read(100).unwrap();
    let task = queue.next().await.unwrap();

    stream.teardown();
    assert_eq!(read.await.unwrap_err().kind(), ErrorKind::Aborted);

    task.await;
    assert_eq!(control.read_calls(), 0);
    assert!(control.is_provider_dropped());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chained_rewind_queued_before_teardown_never_reaches_provider() {
    let (provider, mut control) = TestDrivenProvider::new(["hello"]);
    let (spawner, mut queue) = queueing_spawner();
    let mut stream = UploadStream::new(provider, spawner);

    assert!(stream.init().is_ready());
    let _read = stream.read(100).unwrap();
    tokio::spawn(queue.next().await.unwrap());
    control.wait_for_read_request().await;

    let init = stream.init();
    assert!(!init.is_ready());

    // Completing the read queues the rewind the init is waiting for.
    control.complete_read();
    let rewind = queue.next().await.unwrap();

    stream.teardown();
    assert_eq!(init.ready().await.unwrap_err().kind(), ErrorKind::Aborted);

    rewind.await;
    assert_eq!(control.read_calls(), 1);
    assert_eq!(control.rewind_calls(), 0);
    assert!(control.is_provider_dropped());
}
