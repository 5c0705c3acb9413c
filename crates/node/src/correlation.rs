//! Request/response correlation over publish/subscribe.
//!
//! # Protocol
//!
//! For a call on `<endpoint>/<rest>`:
//!
//! 1. Generate a fresh request id
//! 2. Subscribe to `<endpoint>/responses/<id>` *before* publishing, so a fast
//!    responder cannot answer into the void
//! 3. Up to `attempts` times: publish the request to `<endpoint>/requests`,
//!    then wait for a payload on the response topic or the per-attempt
//!    timeout, whichever comes first
//! 4. Unsubscribe the response topic, whatever the outcome
//!
//! The response topic is the correlation key; the `id` field of the
//! response is never inspected. A payload that fails to decode consumes its
//! attempt. Re-publishing on timeout assumes the method is idempotent, so
//! non-idempotent methods are limited to a single attempt.
//!
//! # Side Effects
//!
//! At most `attempts` publishes, exactly one subscribe and one unsubscribe.

use crate::error::CallError;
use corelib::envelope::{Method, RequestEnvelope, ResponseEnvelope};
use corelib::{codec, topic};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use transport::{PayloadStream, PubSubClient, TransportError};

pub struct CorrelationClient {
    pubsub: Arc<PubSubClient>,
}

impl CorrelationClient {
    pub fn new(pubsub: Arc<PubSubClient>) -> Self {
        Self { pubsub }
    }

    /// Issue a request and wait for its correlated response.
    ///
    /// # Arguments
    /// * `link` - Target link, `<endpoint>/<rest>`
    /// * `method` - Request method
    /// * `body` - Request body (empty for `GET`)
    /// * `attempts` - Total tries, at least 1
    /// * `timeout` - Wait after each publish
    ///
    /// # Returns
    /// The decoded response, or [`CallError::Timeout`] once every attempt
    /// went unanswered.
    pub async fn call(
        &self,
        link: &str,
        method: Method,
        body: &str,
        attempts: u32,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, CallError> {
        if attempts == 0 {
            return Err(CallError::InvalidArgument(
                "attempts must be at least 1".to_string(),
            ));
        }
        if attempts > 1 && !method.is_idempotent() {
            return Err(CallError::NonIdempotentRetry { method, attempts });
        }
        let (endpoint, _) =
            topic::split_endpoint(link).map_err(|e| CallError::InvalidArgument(e.to_string()))?;

        let request = RequestEnvelope::new(link, method, body);
        let payload =
            codec::encode(&request).map_err(|e| CallError::InvalidArgument(e.to_string()))?;
        let request_topic = topic::request_topic(endpoint);
        let response_topic = topic::response_topic(endpoint, &request.id);

        let mut responses = self.pubsub.subscribe(&response_topic).await?;

        let outcome = self
            .attempt(&request, &request_topic, payload, &mut responses, attempts, timeout)
            .await;

        if let Err(e) = self.pubsub.unsubscribe(&response_topic).await {
            warn!(topic = %response_topic, error = %e, "failed to unsubscribe response topic");
        }
        outcome
    }

    async fn attempt(
        &self,
        request: &RequestEnvelope,
        request_topic: &str,
        payload: bytes::Bytes,
        responses: &mut PayloadStream,
        attempts: u32,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, CallError> {
        let mut published = false;
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=attempts {
            debug!(request_id = %request.id, link = %request.link, attempt, "publishing request");
            match self.pubsub.publish(request_topic, payload.clone()).await {
                Ok(()) => {
                    published = true;
                    metrics::counter!("linkwire_requests_published_total").increment(1);
                }
                Err(e) => {
                    warn!(request_id = %request.id, attempt, error = %e, "publish failed");
                    last_error = Some(e);
                    continue;
                }
            }

            match tokio::time::timeout(timeout, responses.recv()).await {
                Err(_) => {
                    debug!(request_id = %request.id, attempt, "attempt timed out");
                }
                Ok(None) => return Err(CallError::SubscriptionClosed),
                Ok(Some(raw)) => match codec::decode::<ResponseEnvelope>(&raw) {
                    Ok(response) => {
                        debug!(request_id = %request.id, attempt, "response received");
                        return Ok(response);
                    }
                    Err(e) => {
                        metrics::counter!("linkwire_decode_failures_total").increment(1);
                        warn!(request_id = %request.id, attempt, error = %e, "discarding malformed response");
                    }
                },
            }
        }

        match last_error {
            Some(e) if !published => Err(CallError::Transport(e)),
            _ => {
                metrics::counter!("linkwire_call_timeouts_total").increment(1);
                Err(CallError::Timeout { attempts })
            }
        }
    }
}
