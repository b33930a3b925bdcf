//! End-to-end balancer behavior over live TCP sockets.

mod common;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::MockBackend;
use shoal::balancer::{proxy, BackendPool, HealthProber, ProxyState};
use shoal::config::BalancerConfig;
use shoal::server::Server;

/// Probes the pool once, then serves the balancer on an ephemeral port.
async fn start_balancer(
    mut config: BalancerConfig,
    backends: &[&MockBackend],
) -> (SocketAddr, Arc<BackendPool>) {
    config.backends = backends.iter().map(|b| b.addr.to_string()).collect();
    let pool = Arc::new(BackendPool::new(config.backends.clone()));
    let client = reqwest::Client::new();

    let prober = HealthProber::new(pool.clone(), client.clone(), &config);
    prober.initial_pass().await;

    let state = ProxyState::new(pool.clone(), client, &config);
    let server = Server::bind(0).await.unwrap();
    let addr = server.local_addr().unwrap();
    prober.spawn();
    tokio::spawn(server.run(proxy::router(state)));

    (addr, pool)
}

fn url(addr: SocketAddr) -> String {
    format!("http://127.0.0.1:{}/", addr.port())
}

fn routed_to(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("lb-from")
        .expect("lb-from header missing")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn least_connections_sequencing() {
    let b0 = MockBackend::start("b0", Duration::from_millis(1750)).await;
    let b1 = MockBackend::start("b1", Duration::from_millis(750)).await;
    let b2 = MockBackend::start("b2", Duration::ZERO).await;

    let mut config = BalancerConfig::default();
    config.trace = true;
    let (addr, _pool) = start_balancer(config, &[&b0, &b1, &b2]).await;

    // five requests 500ms apart: each lands on the backend with the fewest
    // outstanding requests at that instant
    let client = reqwest::Client::new();
    let mut handles = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        let target = url(addr);
        handles.push(tokio::spawn(async move {
            let response = client.get(&target).send().await.unwrap();
            routed_to(&response)
        }));
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let mut routed = Vec::new();
    for handle in handles {
        routed.push(handle.await.unwrap());
    }
    let expected: Vec<String> = [&b0, &b1, &b2, &b1, &b0]
        .iter()
        .map(|b| b.addr.to_string())
        .collect();
    assert_eq!(routed, expected);
}

#[tokio::test]
async fn responses_carry_backend_body_and_trace_header() {
    let b0 = MockBackend::start("hello-backend", Duration::ZERO).await;

    let mut config = BalancerConfig::default();
    config.trace = true;
    let (addr, _pool) = start_balancer(config, &[&b0]).await;

    let response = reqwest::get(url(addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(routed_to(&response), b0.addr.to_string());
    assert_eq!(response.text().await.unwrap(), "hello-backend");
}

#[tokio::test]
async fn no_live_backends_yields_502() {
    let b0 = MockBackend::start("b0", Duration::ZERO).await;
    b0.set_healthy(false);

    let (addr, _pool) = start_balancer(BalancerConfig::default(), &[&b0]).await;

    let response = reqwest::get(url(addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn failing_forward_yields_503() {
    let b0 = MockBackend::start("b0", Duration::ZERO).await;

    let (addr, _pool) = start_balancer(BalancerConfig::default(), &[&b0]).await;

    // the backend dies between its health probe and the dispatch
    b0.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = reqwest::get(url(addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unhealthy_backend_excluded_until_recovery() {
    let b0 = MockBackend::start("b0", Duration::ZERO).await;
    let b1 = MockBackend::start("b1", Duration::ZERO).await;
    b1.set_healthy(false);

    let mut config = BalancerConfig::default();
    config.trace = true;
    config.probe_interval = Duration::from_millis(300);
    let (addr, _pool) = start_balancer(config, &[&b0, &b1]).await;

    let client = reqwest::Client::new();
    for _ in 0..10 {
        let response = client.get(url(addr)).send().await.unwrap();
        assert_eq!(routed_to(&response), b0.addr.to_string());
    }

    // once the backend recovers, the next probe readmits it
    b1.set_healthy(true);
    tokio::time::sleep(Duration::from_millis(800)).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let client = client.clone();
        let target = url(addr);
        handles.push(tokio::spawn(async move {
            routed_to(&client.get(&target).send().await.unwrap())
        }));
    }
    let mut hit: HashSet<String> = HashSet::new();
    for handle in handles {
        hit.insert(handle.await.unwrap());
    }
    assert!(hit.contains(&b1.addr.to_string()));
}

#[tokio::test]
async fn in_flight_counts_return_to_zero() {
    let b0 = MockBackend::start("b0", Duration::from_millis(100)).await;

    let (addr, pool) = start_balancer(BalancerConfig::default(), &[&b0]).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let target = url(addr);
        handles.push(tokio::spawn(async move {
            reqwest::get(&target).await.unwrap().text().await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "b0");
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.backends()[0].in_flight(), 0);
}
