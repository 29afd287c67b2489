/// Exchange tests against an in-process telemetry endpoint on 127.0.0.1.
use chrono::NaiveTime;
use energy_poller::config::{EndpointConfig, FramingConfig, PollConfig};
use energy_poller::telemetry::encode_response;
use energy_poller::{FailureKind, Poller, Query, ReadingSet, TelemetryClient};
use pretty_assertions::assert_eq;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

/// How the mock endpoint delivers its reply.
enum Reply {
    /// Write everything, then close
    Whole(Vec<u8>),
    /// Write each chunk with a pause in between, then close
    Chunked(Vec<Vec<u8>>, Duration),
    /// Write everything, then keep the socket open
    HoldOpen(Vec<u8>, Duration),
    /// Never write anything
    Silent(Duration),
    /// Write one digit per pause for the given span, then finish the response and close
    Trickle(Duration, Duration),
    /// Write a partial response, then abort the connection with RST
    Reset(Vec<u8>),
}

/// Accept one connection, capture the request and answer with `reply`.
async fn serve_once(reply: Reply) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).await.unwrap();
        let request = buf[..n].to_vec();

        match reply {
            Reply::Whole(bytes) => {
                let _ = stream.write_all(&bytes).await;
                let _ = stream.shutdown().await;
            }
            Reply::Chunked(chunks, pause) => {
                for chunk in chunks {
                    let _ = stream.write_all(&chunk).await;
                    let _ = stream.flush().await;
                    tokio::time::sleep(pause).await;
                }
                let _ = stream.shutdown().await;
            }
            Reply::HoldOpen(bytes, hold) => {
                let _ = stream.write_all(&bytes).await;
                tokio::time::sleep(hold).await;
            }
            Reply::Silent(hold) => {
                tokio::time::sleep(hold).await;
            }
            Reply::Trickle(pause, span) => {
                let started = Instant::now();
                while started.elapsed() < span {
                    if stream.write_all(b"0").await.is_err() {
                        return request;
                    }
                    tokio::time::sleep(pause).await;
                }
                let _ = stream.write_all(b";total:1").await;
                let _ = stream.shutdown().await;
            }
            Reply::Reset(partial) => {
                let _ = stream.write_all(&partial).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                #[allow(deprecated)]
                let _ = stream.set_linger(Some(Duration::ZERO));
                drop(stream);
            }
        }

        request
    });

    (addr, handle)
}

fn endpoint(addr: SocketAddr) -> EndpointConfig {
    EndpointConfig {
        connect_timeout_ms: 1000,
        io_timeout_ms: 2000,
        ..EndpointConfig::new("127.0.0.1", addr.port())
    }
}

/// A port nothing is listening on.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Many source segments followed by a total, at least `min_len` bytes before the total.
fn large_response(min_len: usize) -> String {
    let mut body = String::new();
    let mut i = 0;
    while body.len() < min_len {
        body.push_str(&format!("source{i:04}:1.5,0.25;"));
        i += 1;
    }
    body.push_str("total:42");
    body
}

#[tokio::test]
async fn test_fetch_decodes_response() {
    let (addr, server) = serve_once(Reply::Whole(
        b"solar:120.5,0.21;eolica:80.0,0.65;total:200.5".to_vec(),
    ))
    .await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::default());

    let set = assert_ok!(client.fetch(&Query::new(14, 42)).await);

    assert_eq!(server.await.unwrap(), b"hora:14,segundo:42".to_vec());
    let expected = ReadingSet::new(200.5)
        .with_reading("solar", 120.5, 0.21)
        .with_reading("eolica", 80.0, 0.65);
    assert_eq!(set, expected);
}

#[tokio::test]
async fn test_fetch_refused_is_connect_failure() {
    let port = closed_port().await;
    let client = TelemetryClient::new(
        EndpointConfig::new("127.0.0.1", port),
        FramingConfig::default(),
    );

    let failure = assert_err!(client.fetch(&Query::new(0, 0)).await);

    assert_eq!(failure.kind(), FailureKind::Connect);
    assert!(failure.detail().is_some());
}

#[tokio::test]
async fn test_fetch_malformed_is_decode_failure() {
    let (addr, _server) = serve_once(Reply::Whole(b"solar:120.5;total:500".to_vec())).await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::default());

    let failure = assert_err!(client.fetch(&Query::new(10, 0)).await);

    assert_eq!(failure.kind(), FailureKind::Decode);
}

#[tokio::test]
async fn test_fetch_assembles_fragmented_response() {
    let chunks = vec![
        b"solar:120".to_vec(),
        b".5,0.21;eolica:80.0,0.".to_vec(),
        b"65;total:200.5".to_vec(),
    ];
    let (addr, _server) = serve_once(Reply::Chunked(chunks, Duration::from_millis(50))).await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::default());

    let set = assert_ok!(client.fetch(&Query::new(12, 30)).await);

    assert_eq!(set.len(), 2);
    assert_eq!(set.get("eolica").unwrap().factor, 0.65);
    assert_eq!(set.total(), 200.5);
}

#[tokio::test]
async fn test_fetch_ends_response_when_peer_goes_idle() {
    let (addr, _server) = serve_once(Reply::HoldOpen(
        b"hidro:300,0.8;total:300".to_vec(),
        Duration::from_secs(3),
    ))
    .await;
    let framing = FramingConfig {
        idle_timeout_ms: 100,
        ..FramingConfig::default()
    };
    let client = TelemetryClient::new(endpoint(addr), framing);

    let started = Instant::now();
    let set = assert_ok!(client.fetch(&Query::new(6, 15)).await);

    assert!(started.elapsed() < Duration::from_millis(1500));
    assert_eq!(set.total(), 300.0);
}

#[tokio::test]
async fn test_fetch_silent_peer_is_transport_failure() {
    let (addr, _server) = serve_once(Reply::Silent(Duration::from_secs(3))).await;
    let mut config = endpoint(addr);
    config.io_timeout_ms = 100;
    let client = TelemetryClient::new(config, FramingConfig::default());

    let failure = assert_err!(client.fetch(&Query::new(1, 1)).await);

    assert_eq!(failure.kind(), FailureKind::Transport);
    assert!(failure.detail().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_fetch_trickling_peer_hits_response_deadline() {
    let (addr, _server) = serve_once(Reply::Trickle(
        Duration::from_millis(50),
        Duration::from_secs(4),
    ))
    .await;
    let mut config = endpoint(addr);
    config.response_timeout_ms = 300;
    let client = TelemetryClient::new(config, FramingConfig::default());

    let started = Instant::now();
    let failure = assert_err!(client.fetch(&Query::new(3, 3)).await);

    assert!(started.elapsed() < Duration::from_millis(1500));
    assert_eq!(failure.kind(), FailureKind::Transport);
    assert!(failure.detail().unwrap().contains("timed out after 300ms"));
}

#[tokio::test]
async fn test_fetch_reset_mid_read_is_transport_failure() {
    let (addr, _server) = serve_once(Reply::Reset(b"solar:120.5,0.2".to_vec())).await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::default());

    let failure = assert_err!(client.fetch(&Query::new(4, 4)).await);

    assert_eq!(failure.kind(), FailureKind::Transport);
    assert!(failure.to_string().contains("reading from"));
}

#[tokio::test]
async fn test_single_read_decodes_response_filling_buffer() {
    let prefix = "solar:10.0,0.2;eolica:5.5,0.4;total:";
    let payload = format!("{prefix}{}15.5", "0".repeat(4096 - prefix.len() - 4));
    assert_eq!(payload.len(), 4096);

    let (addr, _server) = serve_once(Reply::Whole(payload.into_bytes())).await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::single_read());

    let set = assert_ok!(client.fetch(&Query::new(9, 9)).await);

    assert_eq!(set.len(), 2);
    assert_eq!(set.total(), 15.5);
}

/// The legacy one-shot read cuts anything past 4096 bytes, so the total is lost
/// and the exchange fails instead of returning partial readings.
#[tokio::test]
async fn test_single_read_truncates_response_over_buffer() {
    let payload = large_response(5000);
    let (addr, _server) = serve_once(Reply::Whole(payload.into_bytes())).await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::single_read());

    let failure = assert_err!(client.fetch(&Query::new(9, 9)).await);

    assert_eq!(failure.kind(), FailureKind::Decode);
}

#[tokio::test]
async fn test_until_close_reads_response_over_buffer() {
    let payload = large_response(5000);
    let (addr, _server) = serve_once(Reply::Whole(payload.clone().into_bytes())).await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::default());

    let set = assert_ok!(client.fetch(&Query::new(9, 9)).await);

    assert_eq!(set.total(), 42.0);
    assert_eq!(encode_response(&set), payload);
}

#[tokio::test]
async fn test_until_close_rejects_oversized_response() {
    let payload = large_response(10_000);
    let (addr, _server) = serve_once(Reply::Whole(payload.into_bytes())).await;
    let framing = FramingConfig {
        max_response_bytes: 4096,
        ..FramingConfig::default()
    };
    let client = TelemetryClient::new(endpoint(addr), framing);

    let failure = assert_err!(client.fetch(&Query::new(9, 9)).await);

    assert_eq!(failure.kind(), FailureKind::Transport);
    assert!(failure.detail().unwrap().contains("exceeds 4096 bytes"));
}

#[tokio::test]
async fn test_poller_renders_readings() {
    let (addr, server) =
        serve_once(Reply::Whole(b"solar:1500.25,0.3;total:1500.25".to_vec())).await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::default());
    let poller = Poller::new(client, PollConfig::default());
    let at = NaiveTime::from_hms_opt(7, 45, 3).unwrap();

    let screen = poller.poll_once(at).await;

    assert_eq!(server.await.unwrap(), b"hora:7,segundo:3".to_vec());
    assert!(screen.contains("=== INSTANTANEOUS PRODUCTION - 07:45:03 ==="));
    assert!(screen.contains("Solar"));
    assert!(screen.contains("1,500.25 kW"));
}

#[tokio::test]
async fn test_poller_renders_unavailable_on_failure() {
    let port = closed_port().await;
    let client = TelemetryClient::new(
        EndpointConfig::new("127.0.0.1", port),
        FramingConfig::default(),
    );
    let poller = Poller::new(client, PollConfig::default());
    let at = NaiveTime::from_hms_opt(23, 59, 59).unwrap();

    let screen = poller.poll_once(at).await;

    assert!(screen.contains("Could not get data from the telemetry source at 23:59:59."));
    assert!(screen.contains("Connect"));
    assert!(!screen.contains("Total power"));
}

#[tokio::test]
async fn test_poller_run_stops_during_exchange() {
    let (addr, _server) = serve_once(Reply::Trickle(
        Duration::from_millis(50),
        Duration::from_secs(4),
    ))
    .await;
    let client = TelemetryClient::new(endpoint(addr), FramingConfig::default());
    let poller = Poller::new(
        client,
        PollConfig {
            interval_secs: 30,
            clear_screen: false,
        },
    );

    let started = Instant::now();
    let result = poller
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert_ok!(result);
    assert!(started.elapsed() < Duration::from_millis(1500));
}
