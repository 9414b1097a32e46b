use crate::*;

use bytes::Bytes;
use tokio::sync::broadcast;

use loragate_services::{
    handoff, BufferPolicy, DuplicateFilter, ResponseAccumulator, SendOutcome, Transport,
    TransportError, TransportEvent,
};
use loragated::egress::{EgressLoop, RetryPolicy};
use loragated::ingest::IngestLoop;
use loragated::stats::{EgressStats, IngestStats};

/// Transport that records every body and answers 200 with a fixed body.
#[derive(Clone, Default)]
struct RecordingTransport {
    bodies: Arc<Mutex<Vec<Bytes>>>,
}

impl RecordingTransport {
    fn bodies(&self) -> Vec<Bytes> {
        self.bodies.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    async fn perform(
        &mut self,
        body: &Bytes,
        response: &mut ResponseAccumulator,
    ) -> Result<SendOutcome, TransportError> {
        self.bodies.lock().unwrap().push(body.clone());
        response.on_event(TransportEvent::Data {
            bytes: b"ok",
            chunked: false,
            content_length: Some(2),
        })?;
        response.on_event(TransportEvent::Finished)?;
        Ok(SendOutcome::Complete {
            status: 200,
            content_length: Some(2),
        })
    }
}

/// Transport that drops the connection partway through every response
/// whose packet body starts with node id 0xdead.
struct FlakyTransport;

impl Transport for FlakyTransport {
    async fn perform(
        &mut self,
        body: &Bytes,
        response: &mut ResponseAccumulator,
    ) -> Result<SendOutcome, TransportError> {
        response.on_event(TransportEvent::Data {
            bytes: b"partial",
            chunked: false,
            content_length: Some(64),
        })?;
        if body.starts_with(&0xdeadu32.to_le_bytes()) {
            response.on_event(TransportEvent::Disconnected)?;
            return Err(TransportError::Body("connection reset".into()));
        }
        response.on_event(TransportEvent::Finished)?;
        Ok(SendOutcome::Complete {
            status: 200,
            content_length: Some(64),
        })
    }
}

fn ingest_loop(
    radio: ScriptedRadio,
    queue: loragate_services::HandoffSender,
    stats: IngestStats,
) -> IngestLoop<ScriptedRadio> {
    IngestLoop::new(
        radio,
        DuplicateFilter::new(100),
        queue,
        256,
        Duration::from_millis(1),
        stats,
    )
}

fn egress_loop<T: Transport>(
    transport: T,
    queue: loragate_services::HandoffReceiver,
    stats: EgressStats,
) -> EgressLoop<T> {
    EgressLoop::new(
        transport,
        queue,
        ResponseAccumulator::new(BufferPolicy::ContentLength { max: 1024 }),
        RetryPolicy::default(),
        stats,
    )
}

/// Three relays hear the same messages; the collector sees each once, in
/// arrival order.
#[tokio::test]
async fn relayed_duplicates_reach_collector_once_in_order() {
    let radio = ScriptedRadio::default();
    for f in [
        frame(1, 7, b"a"),
        frame(1, 7, b"a"),
        frame(2, 1, b"b"),
        frame(1, 7, b"a"),
        vec![0xff, 0xff],
        frame(2, 2, b"c"),
        frame(2, 1, b"b"),
    ] {
        radio.push(f);
    }

    let (tx, rx) = handoff(1);
    let transport = RecordingTransport::default();
    let ingest_stats = IngestStats::new();
    let egress_stats = EgressStats::new();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let ingest = tokio::spawn(
        ingest_loop(radio.clone(), tx, ingest_stats.clone()).run(shutdown_tx.subscribe()),
    );
    let egress = tokio::spawn(
        egress_loop(transport.clone(), rx, egress_stats.clone()).run(shutdown_tx.subscribe()),
    );

    wait_until(Duration::from_secs(5), || egress_stats.delivered() == 3)
        .await
        .unwrap();
    shutdown_tx.send(()).unwrap();
    ingest.await.unwrap().unwrap();
    egress.await.unwrap().unwrap();

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[0].as_ref(), frame(1, 7, b"a").as_slice());
    assert_eq!(bodies[1].as_ref(), frame(2, 1, b"b").as_slice());
    assert_eq!(bodies[2].as_ref(), frame(2, 2, b"c").as_slice());

    assert_eq!(ingest_stats.received(), 7);
    assert_eq!(ingest_stats.forwarded(), 3);
    assert_eq!(ingest_stats.duplicates(), 3);
    assert_eq!(ingest_stats.rejected(), 1);
    assert_eq!(egress_stats.failed(), 0);
}

/// Frames arriving while egress is busy are still picked up on later polls.
#[tokio::test]
async fn frames_arriving_later_are_polled() {
    let radio = ScriptedRadio::default();
    let (tx, rx) = handoff(1);
    let transport = RecordingTransport::default();
    let egress_stats = EgressStats::new();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    tokio::spawn(ingest_loop(radio.clone(), tx, IngestStats::new()).run(shutdown_tx.subscribe()));
    tokio::spawn(
        egress_loop(transport.clone(), rx, egress_stats.clone()).run(shutdown_tx.subscribe()),
    );

    radio.push(frame(5, 1, b"first"));
    wait_until(Duration::from_secs(5), || egress_stats.delivered() == 1)
        .await
        .unwrap();
    radio.push(frame(5, 1, b"first"));
    radio.push(frame(5, 2, b"second"));
    wait_until(Duration::from_secs(5), || egress_stats.delivered() == 2)
        .await
        .unwrap();
    shutdown_tx.send(()).unwrap();

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1].as_ref(), frame(5, 2, b"second").as_slice());
}

/// A disconnect mid-response fails that packet only; the next packet's
/// response is assembled from a clean buffer.
#[tokio::test]
async fn disconnect_mid_response_does_not_leak_into_next_packet() {
    let (tx, rx) = handoff(1);
    let mut egress = egress_loop(FlakyTransport, rx, EgressStats::new());
    drop(tx);

    let broken = loragate_core::Packet::from_frame(&frame(0xdead, 1, b"x")).unwrap();
    let err = egress.deliver(&broken).await.unwrap_err();
    assert_eq!(err.kind(), "body");

    let fine = loragate_core::Packet::from_frame(&frame(7, 1, b"y")).unwrap();
    let delivery = egress.deliver(&fine).await.unwrap();
    assert_eq!(delivery.status, 200);
    assert_eq!(delivery.response_len, 64);
    assert_eq!(delivery.response.unwrap().body.as_ref(), b"partial");
}

/// Egress exits once ingest is gone and the queue is drained.
#[tokio::test]
async fn egress_drains_then_exits_when_ingest_drops_queue() {
    let (tx, rx) = handoff(2);
    let transport = RecordingTransport::default();
    let egress_stats = EgressStats::new();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    tx.send(loragate_core::Packet::from_frame(&frame(9, 1, b"")).unwrap())
        .await
        .unwrap();
    tx.send(loragate_core::Packet::from_frame(&frame(9, 2, b"")).unwrap())
        .await
        .unwrap();
    drop(tx);

    egress_loop(transport.clone(), rx, egress_stats.clone())
        .run(shutdown_rx)
        .await
        .unwrap();
    assert_eq!(egress_stats.delivered(), 2);
    assert_eq!(transport.bodies().len(), 2);
}
