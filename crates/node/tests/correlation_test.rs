//! Tests for the request/response correlation protocol.
//!
//! # Test Strategy
//!
//! 1. **Success paths**: first and later attempts answered, wire shape
//! 2. **Failure paths**: timeouts, invalid arguments, transport errors
//! 3. **Isolation**: concurrent calls only see their own responses
//!
//! Timers run on a paused clock, so per-attempt timeouts elapse instantly
//! once every task is idle.

use bytes::Bytes;
use corelib::envelope::{Method, RequestEnvelope, ResponseEnvelope};
use corelib::{codec, topic};
use node::{CallError, CorrelationClient};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use transport::{MemoryBroker, MemoryTransport, PubSubClient, Transport, TransportError};

const REQUESTS: &str = "dev1/requests";

struct Harness {
    broker: MemoryBroker,
    transport: Arc<MemoryTransport>,
    client: Arc<PubSubClient>,
    correlation: CorrelationClient,
}

async fn harness() -> Harness {
    let broker = MemoryBroker::new();
    let transport = Arc::new(broker.transport());
    let client = Arc::new(PubSubClient::new(transport.clone()));
    client.start().await.unwrap();
    Harness {
        correlation: CorrelationClient::new(Arc::clone(&client)),
        broker,
        transport,
        client,
    }
}

/// Install a responder on `dev1/requests` that answers the `answer_on`-th
/// request (1-based) with `reply`, and every later one as well.
async fn respond_on(
    broker: &MemoryBroker,
    answer_on: usize,
    reply: fn(&RequestEnvelope) -> Bytes,
) -> Arc<AtomicUsize> {
    let responder = broker.transport();
    responder.connect().await.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let replies = broker.clone();
    responder
        .subscribe(
            REQUESTS,
            Arc::new(move |payload: Bytes| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let request: RequestEnvelope = codec::decode(&payload).unwrap();
                if n >= answer_on {
                    let response_topic = topic::response_topic("dev1", &request.id);
                    replies.deliver(&response_topic, reply(&request));
                }
            }),
        )
        .await
        .unwrap();
    seen
}

fn echo_temp(request: &RequestEnvelope) -> Bytes {
    codec::encode(&ResponseEnvelope::new(request.id.clone(), "21.5")).unwrap()
}

// ============================================================================
// Success Paths
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_attempt_answered() {
    let h = harness().await;
    let seen = respond_on(&h.broker, 1, echo_temp).await;

    let response = h
        .correlation
        .call("dev1/sensors/temp", Method::Get, "", 3, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(response.body, "21.5");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(h.transport.publish_count(REQUESTS), 1);
}

#[tokio::test(start_paused = true)]
async fn test_answer_on_second_attempt_stops_retrying() {
    let h = harness().await;
    respond_on(&h.broker, 2, echo_temp).await;

    let response = h
        .correlation
        .call("dev1/sensors/temp", Method::Get, "", 3, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(response.body, "21.5");
    assert_eq!(h.transport.publish_count(REQUESTS), 2);
    assert!(h.client.registry().is_empty());

    let log = h.transport.log();
    assert_eq!(log.subscribed.len(), 1);
    assert!(log.subscribed[0].starts_with("dev1/responses/"));
    assert_eq!(log.unsubscribed, log.subscribed);
}

#[tokio::test(start_paused = true)]
async fn test_request_envelope_on_the_wire() {
    let h = harness().await;
    respond_on(&h.broker, 1, echo_temp).await;

    h.correlation
        .call("dev1/sensors/temp", Method::Get, "", 1, Duration::from_secs(1))
        .await
        .unwrap();

    let log = h.transport.log();
    let (topic, payload) = &log.published[0];
    assert_eq!(topic, REQUESTS);
    let request: RequestEnvelope = codec::decode(payload).unwrap();
    assert_eq!(request.link, "dev1/sensors/temp");
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.body, "");
    assert_eq!(log.subscribed[0], format!("dev1/responses/{}", request.id));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_response_consumes_attempt() {
    let h = harness().await;
    let seen = respond_on(&h.broker, 1, |_| Bytes::from_static(b"{\"garbage\":")).await;

    let err = h
        .correlation
        .call("dev1/sensors/temp", Method::Get, "", 2, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert_eq!(err, CallError::Timeout { attempts: 2 });
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert!(h.client.registry().is_empty());
}

// ============================================================================
// Failure Paths
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_responder_times_out_after_every_attempt() {
    let h = harness().await;

    let err = h
        .correlation
        .call("dev1/sensors/temp", Method::Get, "", 3, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert_eq!(err, CallError::Timeout { attempts: 3 });
    assert_eq!(h.transport.publish_count(REQUESTS), 3);
    assert!(h.client.registry().is_empty());
    assert_eq!(h.transport.log().unsubscribed.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_still_publishes_each_attempt() {
    let h = harness().await;

    let err = h
        .correlation
        .call("dev1/x", Method::Get, "", 2, Duration::ZERO)
        .await
        .unwrap_err();

    assert_eq!(err, CallError::Timeout { attempts: 2 });
    assert_eq!(h.transport.publish_count(REQUESTS), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_arguments_do_no_network_activity() {
    let h = harness().await;

    let err = h
        .correlation
        .call("dev1/x", Method::Get, "", 0, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::InvalidArgument(_)));

    for link in ["", "dev1", "/x", "dev1/"] {
        let err = h
            .correlation
            .call(link, Method::Get, "", 1, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::InvalidArgument(_)), "link {link:?}");
    }

    let err = h
        .correlation
        .call("dev1/x", Method::Put, "1", 2, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CallError::NonIdempotentRetry {
            method: Method::Put,
            attempts: 2
        }
    );

    let log = h.transport.log();
    assert!(log.published.is_empty());
    assert!(log.subscribed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_failures_surface_transport_error() {
    let h = harness().await;
    h.transport.set_fail_publish(true);

    let err = h
        .correlation
        .call("dev1/x", Method::Get, "", 3, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Transport(TransportError::Publish { .. })));
    assert!(h.client.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_call_before_start_fails() {
    let broker = MemoryBroker::new();
    let client = Arc::new(PubSubClient::new(Arc::new(broker.transport())));
    let correlation = CorrelationClient::new(client);

    let err = correlation
        .call("dev1/x", Method::Get, "", 1, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err, CallError::Transport(TransportError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_call_closes_subscription() {
    let h = harness().await;
    let transport = Arc::clone(&h.transport);
    let correlation = h.correlation;

    let call = tokio::spawn(async move {
        correlation
            .call("dev1/x", Method::Get, "", 3, Duration::from_secs(10))
            .await
    });

    while transport.publish_count(REQUESTS) == 0 {
        tokio::task::yield_now().await;
    }
    h.client.stop().await;

    assert_eq!(call.await.unwrap(), Err(CallError::SubscriptionClosed));
    assert!(h.client.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_do_not_see_each_others_replies() {
    let h = harness().await;
    respond_on(&h.broker, 1, |request| {
        codec::encode(&ResponseEnvelope::new(request.id.clone(), request.id.as_str())).unwrap()
    })
    .await;

    let correlation = Arc::new(h.correlation);
    let calls: Vec<_> = (0..4)
        .map(|_| {
            let correlation = Arc::clone(&correlation);
            tokio::spawn(async move {
                correlation
                    .call("dev1/x", Method::Get, "", 1, Duration::from_secs(1))
                    .await
            })
        })
        .collect();

    let mut bodies = Vec::new();
    for call in calls {
        bodies.push(call.await.unwrap().unwrap().body);
    }
    bodies.sort();
    bodies.dedup();
    assert_eq!(bodies.len(), 4);

    let mut published_ids: Vec<String> = h
        .transport
        .log()
        .published
        .iter()
        .map(|(_, payload)| codec::decode::<RequestEnvelope>(payload).unwrap().id.to_string())
        .collect();
    published_ids.sort();
    assert_eq!(published_ids, bodies);
    assert!(h.client.registry().is_empty());
}
