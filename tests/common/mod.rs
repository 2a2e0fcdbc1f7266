//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use throttled_link::config::LinkConfig;
use throttled_link::{ThrottleSettings, ThrottledDialer};

/// Start an upstream that echoes every byte back until the client half-closes.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });

    addr
}

/// Start an upstream that sends `payload` to each client and closes.
pub async fn start_sending_upstream(payload: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let payload = payload.clone();
            tokio::spawn(async move {
                let _ = socket.write_all(&payload).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A connected loopback pair: (client, server).
pub async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

pub fn dialer(rate_budget: u64, quantum_ms: u64) -> ThrottledDialer {
    ThrottledDialer::new(ThrottleSettings::symmetric(
        rate_budget,
        Duration::from_millis(quantum_ms),
    ))
    .unwrap()
}

/// Relay config listening on an ephemeral port.
pub fn relay_config(upstream: SocketAddr, rate_budget: u64, quantum_ms: u64) -> LinkConfig {
    let mut config = LinkConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.max_connections = 16;
    config.upstream.address = upstream.to_string();
    config.upstream.connect_timeout_secs = 5;
    config.throttle.rate_budget = rate_budget;
    config.throttle.quantum_ms = quantum_ms;
    config
}

/// Read until EOF or `limit` bytes, whichever comes first.
pub async fn read_up_to<R: AsyncReadExt + Unpin>(reader: &mut R, limit: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    while out.len() < limit {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
    out
}

pub fn random_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill(&mut data[..]);
    data
}
