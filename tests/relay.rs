//! Relay server end to end.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use throttled_link::net::Listener;
use throttled_link::{RelayServer, Shutdown};

mod common;

struct RunningRelay {
    server: Arc<RelayServer>,
    addr: std::net::SocketAddr,
    shutdown: Shutdown,
    updates: mpsc::UnboundedSender<throttled_link::LinkConfig>,
    task: tokio::task::JoinHandle<Result<(), throttled_link::proxy::RelayError>>,
}

async fn start_relay(config: throttled_link::LinkConfig) -> RunningRelay {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(RelayServer::new(config).with_drain_timeout(Duration::from_secs(5)));
    let shutdown = Shutdown::new();
    let (updates, update_rx) = mpsc::unbounded_channel();

    let running = Arc::clone(&server);
    let signal = shutdown.subscribe();
    let task = tokio::spawn(async move { running.run(listener, update_rx, signal).await });

    RunningRelay {
        server,
        addr,
        shutdown,
        updates,
        task,
    }
}

#[tokio::test]
async fn relays_through_throttled_upstream() {
    let upstream = common::start_echo_upstream().await;
    let relay = start_relay(common::relay_config(upstream, 2048, 50)).await;

    let mut client = TcpStream::connect(relay.addr).await.unwrap();
    let payload = common::random_payload(4096);

    let start = Instant::now();
    client.write_all(&payload).await.unwrap();
    let mut echoed = vec![0u8; payload.len()];
    client.read_exact(&mut echoed).await.unwrap();

    assert_eq!(echoed, payload);
    assert!(start.elapsed() >= Duration::from_millis(100));

    client.shutdown().await.unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);

    relay.shutdown.trigger();
    relay.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_closes_open_relays() {
    let upstream = common::start_echo_upstream().await;
    let relay = start_relay(common::relay_config(upstream, 1024, 20)).await;

    let mut client = TcpStream::connect(relay.addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(relay.server.active_connections(), 1);

    relay.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), relay.task)
        .await
        .expect("relay did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(relay.server.active_connections(), 0);
    let rest = common::read_up_to(&mut client, usize::MAX).await;
    assert!(rest.is_empty());
}

#[tokio::test]
async fn unreachable_upstream_drops_client() {
    let upstream = common::unused_addr().await;
    let relay = start_relay(common::relay_config(upstream, 1024, 20)).await;

    let mut client = TcpStream::connect(relay.addr).await.unwrap();
    let received = tokio::time::timeout(
        Duration::from_secs(10),
        common::read_up_to(&mut client, usize::MAX),
    )
    .await
    .expect("client was not dropped");
    assert!(received.is_empty());

    relay.shutdown.trigger();
    relay.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn config_updates_apply_to_new_connections() {
    let upstream = common::start_echo_upstream().await;
    let relay = start_relay(common::relay_config(upstream, 1024, 20)).await;

    let mut updated = common::relay_config(upstream, 4096, 20);
    updated.listener = relay.server.current_config().listener.clone();
    relay.updates.send(updated).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while relay.server.current_config().throttle.rate_budget != 4096 {
        assert!(Instant::now() < deadline, "update never applied");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    relay.shutdown.trigger();
    relay.task.await.unwrap().unwrap();
}
