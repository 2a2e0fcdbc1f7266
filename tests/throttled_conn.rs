//! End-to-end behavior of throttled connections over real sockets.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

use throttled_link::net::DeadlineStream;
use throttled_link::{Connection, ThrottledConn};

mod common;

#[tokio::test]
async fn echo_round_trip_respects_rate() {
    let upstream = common::start_echo_upstream().await;
    let conn = common::dialer(1024, 100).connect(upstream).await.unwrap();
    let payload = common::random_payload(5000);

    let start = Instant::now();
    let (mut reader, mut writer) = tokio::io::split(conn);
    let sent = payload.clone();
    let write_task = tokio::spawn(async move {
        writer.write_all(&sent).await.unwrap();
        writer
    });

    let mut echoed = vec![0u8; payload.len()];
    reader.read_exact(&mut echoed).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(echoed, payload);
    assert!(elapsed >= Duration::from_millis(500), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(30), "took {elapsed:?}");

    let writer = write_task.await.unwrap();
    let mut conn = reader.unsplit(writer);
    assert_eq!(conn.bytes_sent(), 5000);
    conn.close().await.unwrap();
    assert!(!conn.is_pacing());
}

#[tokio::test]
async fn upstream_close_reads_as_eof() {
    let payload = common::random_payload(300);
    let upstream = common::start_sending_upstream(payload.clone()).await;
    let mut conn = common::dialer(128, 20).connect(upstream).await.unwrap();

    let received = common::read_up_to(&mut conn, usize::MAX).await;
    assert_eq!(received, payload);

    let mut buf = [0u8; 8];
    assert_eq!(conn.read(&mut buf).await.unwrap(), 0);

    tokio::time::timeout(Duration::from_secs(10), conn.close())
        .await
        .expect("close hung")
        .unwrap();
    assert!(!conn.is_pacing());
}

#[tokio::test]
async fn both_directions_run_concurrently() {
    let (client, server) = common::tcp_pair().await;
    let conn = ThrottledConn::with_rate(
        1024,
        Duration::from_millis(50),
        DeadlineStream::new(client),
    )
    .unwrap();

    let upload = common::random_payload(3000);
    let download = common::random_payload(3000);

    let (mut server_reader, mut server_writer) = server.into_split();
    let server_download = download.clone();
    let server_task = tokio::spawn(async move {
        let send = async {
            server_writer.write_all(&server_download).await.unwrap();
            server_writer.shutdown().await.unwrap();
        };
        let recv = common::read_up_to(&mut server_reader, usize::MAX);
        let ((), received) = tokio::join!(send, recv);
        received
    });

    let (mut reader, mut writer) = tokio::io::split(conn);
    let client_upload = upload.clone();
    let start = Instant::now();
    let send = async {
        writer.write_all(&client_upload).await.unwrap();
        writer.shutdown().await.unwrap();
    };
    let recv = common::read_up_to(&mut reader, usize::MAX);
    let ((), received) = tokio::join!(send, recv);
    let elapsed = start.elapsed();

    assert_eq!(received, download);
    assert_eq!(server_task.await.unwrap(), upload);
    assert!(elapsed >= Duration::from_millis(150), "took {elapsed:?}");

    let mut conn = reader.unsplit(writer);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn read_deadline_fails_pending_read() {
    let (client, _server) = common::tcp_pair().await;
    let mut conn = ThrottledConn::with_rate(
        64,
        Duration::from_millis(10),
        DeadlineStream::new(client),
    )
    .unwrap();

    conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(100)))
        .unwrap();

    let mut buf = [0u8; 16];
    let err = conn.read(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
}

#[tokio::test]
async fn throttled_connections_stack() {
    let upstream = common::start_echo_upstream().await;
    let inner = common::dialer(4096, 20).connect(upstream).await.unwrap();
    let local = inner.local_addr().unwrap();

    let mut outer = ThrottledConn::with_rate(512, Duration::from_millis(20), inner).unwrap();
    assert_eq!(outer.local_addr().unwrap(), local);
    assert_eq!(outer.peer_addr().unwrap(), upstream);

    let payload = common::random_payload(1024);
    let start = Instant::now();
    outer.write_all(&payload).await.unwrap();
    let mut echoed = vec![0u8; payload.len()];
    outer.read_exact(&mut echoed).await.unwrap();

    assert_eq!(echoed, payload);
    // The outer 512-byte budget dominates.
    assert!(start.elapsed() >= Duration::from_millis(40));
    outer.close().await.unwrap();
}

#[tokio::test]
async fn io_after_close_fails() {
    let upstream = common::start_echo_upstream().await;
    let mut conn = common::dialer(1024, 10).connect(upstream).await.unwrap();
    conn.close().await.unwrap();

    let mut buf = [0u8; 4];
    assert!(conn.read(&mut buf).await.is_err());
    assert!(conn.write_all(b"late").await.is_err());
    assert!(conn.peer_addr().is_err());
}
