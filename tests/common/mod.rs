//! Shared helpers for balancer integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A mock backend on an ephemeral port. `/health` answers immediately with
/// a switchable status; every other path waits `latency`, then echoes
/// `name` with a 200.
pub struct MockBackend {
    pub addr: SocketAddr,
    healthy: Arc<AtomicBool>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start(name: &'static str, latency: Duration) -> MockBackend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let healthy = Arc::new(AtomicBool::new(true));
        let flag = healthy.clone();

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let flag = flag.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let is_health = request
                        .lines()
                        .next()
                        .map(|line| line.contains("/health"))
                        .unwrap_or(false);

                    let response = if is_health {
                        if flag.load(Ordering::SeqCst) {
                            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                                .to_string()
                        } else {
                            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndead"
                                .to_string()
                        }
                    } else {
                        tokio::time::sleep(latency).await;
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            name.len(),
                            name
                        )
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        MockBackend {
            addr,
            healthy,
            accept_task,
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Closes the listener: further connections are refused.
    pub fn stop(&self) {
        self.accept_task.abort();
    }
}
