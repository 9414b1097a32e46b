use crate::*;

use bytes::Bytes;
use tokio::sync::broadcast;

use loragate_core::Packet;
use loragate_services::{
    handoff, BufferPolicy, DuplicateFilter, ResponseAccumulator, SendOutcome, Transport,
};
use loragated::egress::{EgressLoop, RetryPolicy};
use loragated::http::HttpCollector;
use loragated::ingest::IngestLoop;
use loragated::radio::UdpRadio;
use loragated::stats::{EgressStats, IngestStats};

fn accumulator() -> ResponseAccumulator {
    ResponseAccumulator::new(BufferPolicy::ContentLength { max: 1024 })
}

#[tokio::test]
async fn post_carries_packet_and_headers() {
    let (addr, collected) = spawn_collector().await;
    let mut collector = HttpCollector::new(&collector_config(addr, "/api/data")).unwrap();
    let mut response = accumulator();
    let body = Bytes::from(frame(1, 7, b"temp=21.5"));

    let outcome = collector.perform(&body, &mut response).await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Complete {
            status: 200,
            content_length: Some(ACCEPTED.len() as u64),
        }
    );
    assert_eq!(response.take_response().unwrap().body.as_ref(), ACCEPTED.as_bytes());

    let requests = collected.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, body.as_ref());
    assert_eq!(requests[0].authorization.as_deref(), Some("Basic test-token"));
    assert_eq!(
        requests[0].content_type.as_deref(),
        Some("application/octet-stream")
    );
}

#[tokio::test]
async fn busy_collector_means_retry() {
    let (addr, collected) = spawn_collector().await;
    collected.set_busy(1);
    let mut collector = HttpCollector::new(&collector_config(addr, "/busy")).unwrap();
    let mut response = accumulator();
    let body = Bytes::from(frame(1, 1, b""));

    assert_eq!(
        collector.perform(&body, &mut response).await.unwrap(),
        SendOutcome::Retry
    );
    assert!(matches!(
        collector.perform(&body, &mut response).await.unwrap(),
        SendOutcome::Complete { status: 200, .. }
    ));
}

#[tokio::test]
async fn egress_retries_through_busy_collector() {
    let (addr, collected) = spawn_collector().await;
    collected.set_busy(3);
    let collector = HttpCollector::new(&collector_config(addr, "/busy")).unwrap();
    let (_tx, rx) = handoff(1);
    let mut egress = EgressLoop::new(
        collector,
        rx,
        accumulator(),
        RetryPolicy::default(),
        EgressStats::new(),
    );

    let packet = Packet::from_frame(&frame(4, 2, b"payload")).unwrap();
    let delivery = egress.deliver(&packet).await.unwrap();
    assert_eq!(delivery.status, 200);
    assert_eq!(delivery.retries, 3);
    assert_eq!(delivery.response_len, ACCEPTED.len() as u64);
    assert_eq!(collected.requests().len(), 4);
}

#[tokio::test]
async fn redirect_reissues_post_to_new_location() {
    let (addr, collected) = spawn_collector().await;
    let mut collector = HttpCollector::new(&collector_config(addr, "/moved")).unwrap();
    let mut response = accumulator();
    let body = Bytes::from(frame(3, 9, b"moved"));

    let outcome = collector.perform(&body, &mut response).await.unwrap();
    assert!(matches!(outcome, SendOutcome::Complete { status: 200, .. }));
    assert_eq!(response.take_response().unwrap().body.as_ref(), ACCEPTED.as_bytes());

    let requests = collected.requests();
    let paths: Vec<_> = requests.iter().map(|r| r.path).collect();
    assert_eq!(paths, ["/moved", "/api/data"]);
    assert_eq!(requests[1].body, body.as_ref());
    // Same host, so the credential follows the redirect.
    assert_eq!(requests[1].authorization.as_deref(), Some("Basic test-token"));
}

#[tokio::test]
async fn redirect_loop_is_cut_off() {
    let (addr, collected) = spawn_collector().await;
    let mut collector = HttpCollector::new(&collector_config(addr, "/loop")).unwrap();
    let mut response = accumulator();

    let err = collector
        .perform(&Bytes::from(frame(1, 1, b"")), &mut response)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "redirect");
    // The first request plus max_redirects re-issues.
    assert_eq!(collected.requests().len(), 4);
}

#[tokio::test]
async fn rejection_status_is_reported_not_failed() {
    let (addr, _collected) = spawn_collector().await;
    let mut collector = HttpCollector::new(&collector_config(addr, "/reject")).unwrap();
    let mut response = accumulator();

    let outcome = collector
        .perform(&Bytes::from(frame(1, 1, b"")), &mut response)
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Complete { status: 401, .. }));
    assert_eq!(response.take_response().unwrap().body.as_ref(), b"bad token");
}

#[tokio::test]
async fn unreachable_collector_is_a_connect_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut collector = HttpCollector::new(&collector_config(addr, "/api/data")).unwrap();
    let mut response = accumulator();
    let err = collector
        .perform(&Bytes::from(frame(1, 1, b"")), &mut response)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "connect");
    assert!(!response.is_active());
}

#[tokio::test]
async fn fixed_buffer_truncates_large_response() {
    let (addr, _collected) = spawn_collector().await;
    let mut collector = HttpCollector::new(&collector_config(addr, "/api/data")).unwrap();
    let mut response = ResponseAccumulator::new(BufferPolicy::Fixed(3));

    collector
        .perform(&Bytes::from(frame(1, 1, b"")), &mut response)
        .await
        .unwrap();
    let assembled = response.take_response().unwrap();
    assert_eq!(assembled.body.as_ref(), b"acc");
    assert_eq!(assembled.truncated, ACCEPTED.len() - 3);
}

#[tokio::test]
async fn busy_collector_is_paced_by_default() {
    let (addr, collected) = spawn_collector().await;
    collected.set_busy(u32::MAX);
    let collector = HttpCollector::new(&collector_config(addr, "/busy")).unwrap();
    let (_tx, rx) = handoff(1);
    let mut egress = EgressLoop::new(
        collector,
        rx,
        accumulator(),
        RetryPolicy::default(),
        EgressStats::new(),
    );

    let packet = Packet::from_frame(&frame(4, 3, b"payload")).unwrap();
    let delivered = tokio::time::timeout(Duration::from_secs(1), egress.deliver(&packet)).await;
    assert!(delivered.is_err(), "collector never stopped being busy");

    // 250 ms apart: the first attempt plus at most four re-issues.
    let attempts = collected.requests().len();
    assert!((2..=5).contains(&attempts), "{attempts} requests in 1s");
}

#[tokio::test]
async fn chunked_response_is_observed_not_accumulated() {
    let (addr, collected) = spawn_collector().await;
    let mut collector = HttpCollector::new(&collector_config(addr, "/stream")).unwrap();
    let body = Bytes::from(frame(6, 1, b"stream"));

    for policy in [
        BufferPolicy::ContentLength { max: 1024 },
        BufferPolicy::Fixed(1024),
    ] {
        let mut response = ResponseAccumulator::new(policy);
        let outcome = collector.perform(&body, &mut response).await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Complete {
                status: 200,
                content_length: None,
            },
            "{policy:?}"
        );
        assert!(response.take_response().is_none(), "{policy:?}");
        assert!(!response.is_active());
    }
    assert_eq!(collected.requests().len(), 2);
}

#[tokio::test]
async fn body_cut_mid_stream_is_a_body_error() {
    let (addr, _collected) = spawn_collector().await;
    let mut collector = HttpCollector::new(&collector_config(addr, "/abort")).unwrap();
    let mut response = ResponseAccumulator::new(BufferPolicy::Fixed(1024));

    let err = collector
        .perform(&Bytes::from(frame(6, 2, b"")), &mut response)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "body");
    assert!(!response.is_active());
    assert!(response.take_response().is_none());

    // The collector still takes the next packet.
    let mut next = ResponseAccumulator::new(BufferPolicy::ContentLength { max: 1024 });
    let mut collector = HttpCollector::new(&collector_config(addr, "/api/data")).unwrap();
    collector
        .perform(&Bytes::from(frame(6, 3, b"")), &mut next)
        .await
        .unwrap();
    assert_eq!(next.take_response().unwrap().body.as_ref(), ACCEPTED.as_bytes());
}

/// Radio frames arrive as UDP datagrams and reach the collector once each.
#[tokio::test]
async fn udp_radio_to_http_collector() {
    let (addr, collected) = spawn_collector().await;
    let radio = UdpRadio::bind("127.0.0.1:0").unwrap();
    let radio_addr = radio.local_addr().unwrap();

    let (tx, rx) = handoff(1);
    let egress_stats = EgressStats::new();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    tokio::spawn(
        IngestLoop::new(
            radio,
            DuplicateFilter::new(100),
            tx,
            256,
            Duration::from_millis(1),
            IngestStats::new(),
        )
        .run(shutdown_tx.subscribe()),
    );
    tokio::spawn(
        EgressLoop::new(
            HttpCollector::new(&collector_config(addr, "/api/data")).unwrap(),
            rx,
            accumulator(),
            RetryPolicy::default(),
            egress_stats.clone(),
        )
        .run(shutdown_tx.subscribe()),
    );

    let relay = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    for f in [frame(8, 1, b"one"), frame(8, 1, b"one"), frame(8, 2, b"two")] {
        relay.send_to(&f, radio_addr).unwrap();
    }

    wait_until(Duration::from_secs(5), || egress_stats.delivered() == 2)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();

    let bodies: Vec<_> = collected.requests().into_iter().map(|r| r.body).collect();
    assert_eq!(bodies, [frame(8, 1, b"one"), frame(8, 2, b"two")]);
}
