//! Serving side of the request/response protocol.
//!
//! Reads envelopes from `<end_point>/requests` and answers on
//! `<end_point>/responses/<id>`:
//!
//! - `GET` on a gettable link with a stored value returns the value
//! - `PUT` on a puttable link stores the body and returns it
//!
//! Anything else is logged and left unanswered, so the caller times out.

use corelib::envelope::{Method, RequestEnvelope, ResponseEnvelope};
use corelib::{codec, topic, CapabilityTables, Topic};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use transport::{PayloadStream, PubSubClient};

pub(crate) type ValueStore = Arc<RwLock<HashMap<Topic, String>>>;

pub(crate) struct Responder {
    pub end_point: String,
    pub capabilities: Arc<CapabilityTables>,
    pub values: ValueStore,
    pub pubsub: Arc<PubSubClient>,
}

impl Responder {
    /// Serve requests until cancelled or the stream closes.
    pub async fn run(self, mut requests: PayloadStream, cancel: CancellationToken) {
        debug!(end_point = %self.end_point, "responder running");
        loop {
            let raw = tokio::select! {
                _ = cancel.cancelled() => break,
                raw = requests.recv() => match raw {
                    Some(raw) => raw,
                    None => break,
                },
            };

            let request: RequestEnvelope = match codec::decode(&raw) {
                Ok(request) => request,
                Err(e) => {
                    warn!(end_point = %self.end_point, error = %e, "discarding malformed request");
                    continue;
                }
            };

            let Some(response) = self.handle(&request) else {
                continue;
            };
            let response_topic = topic::response_topic(&self.end_point, &request.id);
            match codec::encode(&response) {
                Ok(payload) => {
                    if let Err(e) = self.pubsub.publish(&response_topic, payload).await {
                        warn!(topic = %response_topic, error = %e, "failed to publish response");
                    }
                }
                Err(e) => warn!(request_id = %request.id, error = %e, "failed to encode response"),
            }
        }
        debug!(end_point = %self.end_point, "responder stopped");
    }

    /// Compute the response to a request, `None` if it goes unanswered.
    pub fn handle(&self, request: &RequestEnvelope) -> Option<ResponseEnvelope> {
        let link = &request.link;
        match request.method {
            Method::Get => {
                if !self.capabilities.is_gettable(link) {
                    debug!(link = %link, "GET on a link that is not gettable");
                    return None;
                }
                let value = self.values.read().get(link).cloned();
                match value {
                    Some(body) => Some(ResponseEnvelope::new(request.id.clone(), body)),
                    None => {
                        debug!(link = %link, "GET on a link without a value");
                        None
                    }
                }
            }
            Method::Put => {
                if !self.capabilities.is_puttable(link) {
                    debug!(link = %link, "PUT on a link that is not puttable");
                    return None;
                }
                self.values.write().insert(link.clone(), request.body.clone());
                Some(ResponseEnvelope::new(request.id.clone(), request.body.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::descriptor::Link;
    use corelib::RequestId;
    use std::collections::BTreeMap;
    use transport::MemoryBroker;

    fn responder() -> Responder {
        let mut links = BTreeMap::new();
        links.insert("dev1/temp".to_string(), Link::new("float"));
        links.insert("dev1/setpoint".to_string(), Link::new("mutable"));
        links.insert("dev1/events".to_string(), Link::new("stream"));

        let values: ValueStore = Arc::new(RwLock::new(HashMap::new()));
        values.write().insert("dev1/temp".to_string(), "21.5".to_string());

        Responder {
            end_point: "dev1".to_string(),
            capabilities: Arc::new(CapabilityTables::from_links(&links)),
            values,
            pubsub: Arc::new(PubSubClient::new(Arc::new(MemoryBroker::new().transport()))),
        }
    }

    fn request(link: &str, method: Method, body: &str) -> RequestEnvelope {
        RequestEnvelope {
            id: RequestId::from("r1"),
            link: link.to_string(),
            method,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_get_stored_value() {
        let response = responder().handle(&request("dev1/temp", Method::Get, "")).unwrap();
        assert_eq!(response.id.as_str(), "r1");
        assert_eq!(response.body, "21.5");
    }

    #[test]
    fn test_unanswered_requests() {
        let responder = responder();
        assert!(responder.handle(&request("dev1/setpoint", Method::Get, "")).is_none());
        assert!(responder.handle(&request("dev1/events", Method::Get, "")).is_none());
        assert!(responder.handle(&request("dev1/nope", Method::Get, "")).is_none());
        assert!(responder.handle(&request("dev1/temp", Method::Put, "1")).is_none());
    }

    #[test]
    fn test_put_stores_body() {
        let responder = responder();
        let response = responder
            .handle(&request("dev1/setpoint", Method::Put, "42"))
            .unwrap();
        assert_eq!(response.body, "42");

        let response = responder
            .handle(&request("dev1/setpoint", Method::Get, ""))
            .unwrap();
        assert_eq!(response.body, "42");
    }
}
