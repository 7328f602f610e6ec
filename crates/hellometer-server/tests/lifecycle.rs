#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use hellometer_server::config::ServiceConfig;
use hellometer_server::http::hello::HelloResponse;
use hellometer_server::lifecycle::{self, Phase};

async fn http_get(addr: std::net::SocketAddr, path: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    (head.lines().next().unwrap().to_string(), body.to_string())
}

fn test_config(statsd_addr: String) -> ServiceConfig {
    let mut cfg = ServiceConfig::default();
    cfg.server.port = 0;
    cfg.statsd.addr = statsd_addr;
    // nothing listens here; exports fail and are retried in the background
    cfg.otlp.endpoint = "127.0.0.1:1".into();
    cfg.otlp.timeout_ms = 200;
    cfg.shutdown.otlp_deadline_ms = 500;
    cfg.shutdown.statsd_deadline_ms = 500;
    cfg
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_then_drains_statsd_on_shutdown() {
    let statsd = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let cfg = test_config(statsd.local_addr().unwrap().to_string());

    let service = lifecycle::start(cfg).await.unwrap();
    assert_eq!(service.phase(), Phase::Serving);
    let addr = service.local_addr();

    for _ in 0..2 {
        let (status, body) = http_get(([127, 0, 0, 1], addr.port()).into(), "/hello").await;
        assert!(status.contains("200"), "status line: {status}");
        let resp: HelloResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(resp.message, "Hello, OpenTelemetry!");
    }

    // flush interval is 1s; shutdown must not wait for it
    tokio::time::timeout(Duration::from_secs(5), service.shutdown())
        .await
        .expect("shutdown bounded by sink deadlines")
        .unwrap();

    // a timer flush may have split the two increments across datagrams
    let mut total = 0;
    let mut buf = [0u8; 1500];
    while total < 2 {
        let n = tokio::time::timeout(Duration::from_secs(1), statsd.recv(&mut buf))
            .await
            .expect("statsd datagram")
            .unwrap();
        let line = std::str::from_utf8(&buf[..n]).unwrap();
        let value = line
            .strip_prefix("gin-app.endpoint.hello.requests:")
            .and_then(|v| v.strip_suffix("|c"))
            .unwrap_or_else(|| panic!("unexpected line {line:?}"));
        total += value.parse::<i64>().unwrap();
    }
    assert_eq!(total, 2);
}

#[tokio::test]
async fn bind_failure_is_fatal() {
    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let statsd = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut cfg = test_config(statsd.local_addr().unwrap().to_string());
    cfg.server.port = taken.local_addr().unwrap().port();

    let err = lifecycle::start(cfg).await.err().expect("port already in use");
    assert_eq!(err.disposition().as_str(), "FATAL");
}

#[tokio::test]
async fn malformed_otlp_endpoint_is_fatal() {
    let statsd = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = test_config(statsd.local_addr().unwrap().to_string());
    cfg.otlp.endpoint = "http://not a host".into();

    let err = lifecycle::start(cfg).await.err().expect("bad endpoint");
    assert_eq!(err.disposition().as_str(), "FATAL");
}
