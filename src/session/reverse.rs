//! Reverse request manager
//!
//! Adapter-initiated requests (`runInTerminal`, `startDebugging`, ...) get
//! a session-scoped correlation ID. The callback registered under that ID
//! runs on the receive loop when the matching response arrives, and is
//! removed from the table in the same critical section that finds it, so it
//! can run at most once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::common::{Result, ReverseRequestError};
use crate::dap::{FrameWriter, RequestMessage};

/// Outcome handed to a reverse request callback
pub type ReverseOutcome = std::result::Result<Value, ReverseRequestError>;

/// Single-use continuation for one reverse request
pub type ResponseCallback = Box<dyn FnOnce(ReverseOutcome) + Send>;

/// Fallback message when a failed response carries none
const DEFAULT_FAILURE_MESSAGE: &str = "Unknown error, response failed";

#[derive(Default)]
struct Inflight {
    seq: i64,
    callbacks: HashMap<i64, ResponseCallback>,
}

/// Correlation table for adapter-to-client requests
#[derive(Clone)]
pub struct ReverseRequests {
    inflight: Arc<Mutex<Inflight>>,
    writer: FrameWriter,
}

impl ReverseRequests {
    pub fn new(writer: FrameWriter) -> Self {
        Self {
            inflight: Arc::new(Mutex::new(Inflight::default())),
            writer,
        }
    }

    // The table stays consistent even if a holder panicked: every critical
    // section is a single map operation.
    fn lock(&self) -> MutexGuard<'_, Inflight> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a request to the client and register `callback` for its response
    ///
    /// Returns the correlation ID. The callback never runs synchronously
    /// inside this call.
    pub async fn send<F>(&self, command: &str, arguments: Value, callback: F) -> Result<i64>
    where
        F: FnOnce(ReverseOutcome) + Send + 'static,
    {
        let id = {
            let mut inflight = self.lock();
            inflight.seq += 1;
            let id = inflight.seq;
            inflight.callbacks.insert(id, Box::new(callback));
            id
        };

        tracing::debug!(id, command, "Sending reverse request");

        let message = serde_json::to_value(RequestMessage::new(id, command, arguments))?;
        if let Err(e) = self.writer.send_json(&message).await {
            // Nothing will ever answer a request that never left
            self.lock().callbacks.remove(&id);
            return Err(e);
        }

        Ok(id)
    }

    /// Send a request and get a receiver for its outcome
    pub async fn request(
        &self,
        command: &str,
        arguments: Value,
    ) -> Result<oneshot::Receiver<ReverseOutcome>> {
        let (tx, rx) = oneshot::channel();
        self.send(command, arguments, move |outcome| {
            let _ = tx.send(outcome);
        })
        .await?;
        Ok(rx)
    }

    /// Deliver a response to the callback registered for `request_seq`
    ///
    /// Returns false when no request with that ID is outstanding; the
    /// response is then only logged.
    pub fn resolve(&self, request_seq: i64, outcome: ReverseOutcome) -> bool {
        let callback = self.lock().callbacks.remove(&request_seq);

        match callback {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => {
                tracing::warn!(request_seq, "Unhandled response");
                false
            }
        }
    }

    /// Fail every outstanding request with [`ReverseRequestError::SessionClosed`]
    pub fn cancel_all(&self) -> usize {
        let callbacks: Vec<ResponseCallback> =
            self.lock().callbacks.drain().map(|(_, cb)| cb).collect();

        let count = callbacks.len();
        for callback in callbacks {
            callback(Err(ReverseRequestError::SessionClosed));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.lock().callbacks.len()
    }

    pub fn is_pending(&self, id: i64) -> bool {
        self.lock().callbacks.contains_key(&id)
    }
}

/// Turn a `response` packet into the outcome for its callback
pub fn response_outcome(object: &Map<String, Value>) -> ReverseOutcome {
    let success = object
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if success {
        Ok(object.get("body").cloned().unwrap_or(Value::Null))
    } else {
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_FAILURE_MESSAGE);
        Err(ReverseRequestError::Failed(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dap::{Frame, FrameReader};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::BufReader;

    fn manager() -> (ReverseRequests, FrameReader<BufReader<tokio::io::DuplexStream>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (
            ReverseRequests::new(FrameWriter::new(server)),
            FrameReader::new(BufReader::new(client)),
        )
    }

    #[tokio::test]
    async fn test_send_writes_request_with_fresh_id() {
        let (requests, mut reader) = manager();

        let first = requests.send("runInTerminal", json!({"args": ["ls"]}), |_| {}).await.unwrap();
        let second = requests.send("startDebugging", json!({}), |_| {}).await.unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(requests.pending_count(), 2);

        let Frame::Payload(payload) = reader.read_frame().await.unwrap() else {
            panic!("expected a frame");
        };
        let message: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(
            message,
            json!({
                "seq": 1,
                "type": "request",
                "command": "runInTerminal",
                "arguments": {"args": ["ls"]}
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_invokes_callback_once() {
        let (requests, _reader) = manager();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let id = requests
            .send("runInTerminal", json!({}), move |outcome| {
                assert_eq!(outcome, Ok(json!({"ok": true})));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(requests.resolve(id, Ok(json!({"ok": true}))));
        assert!(!requests.resolve(id, Ok(json!({"ok": true}))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!requests.is_pending(id));
    }

    #[tokio::test]
    async fn test_non_matching_id_does_not_invoke() {
        let (requests, _reader) = manager();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let id = requests
            .send("runInTerminal", json!({}), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(!requests.resolve(id + 41, Ok(Value::Null)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(requests.is_pending(id));
    }

    #[tokio::test]
    async fn test_request_receiver_gets_failure() {
        let (requests, _reader) = manager();
        let rx = requests.request("startDebugging", json!({})).await.unwrap();

        requests.resolve(1, Err(ReverseRequestError::Failed("denied".into())));
        assert_eq!(
            rx.await.unwrap(),
            Err(ReverseRequestError::Failed("denied".into()))
        );
    }

    #[tokio::test]
    async fn test_cancel_all_reports_session_closed() {
        let (requests, _reader) = manager();
        let a = requests.request("a", Value::Null).await.unwrap();
        let b = requests.request("b", Value::Null).await.unwrap();

        assert_eq!(requests.cancel_all(), 2);
        assert_eq!(a.await.unwrap(), Err(ReverseRequestError::SessionClosed));
        assert_eq!(b.await.unwrap(), Err(ReverseRequestError::SessionClosed));
        assert_eq!(requests.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_callback_may_send_another_request() {
        let (requests, _reader) = manager();
        let inner = requests.clone();
        let (tx, rx) = oneshot::channel();

        requests
            .send("first", Value::Null, move |_| {
                // The table lock is released before callbacks run
                tx.send(inner.pending_count()).unwrap();
            })
            .await
            .unwrap();

        requests.resolve(1, Ok(Value::Null));
        assert_eq!(rx.await.unwrap(), 0);
    }

    #[test]
    fn test_response_outcome() {
        let ok = json!({"success": true, "body": {"ok": true}});
        assert_eq!(response_outcome(ok.as_object().unwrap()), Ok(json!({"ok": true})));

        let no_body = json!({"success": true});
        assert_eq!(response_outcome(no_body.as_object().unwrap()), Ok(Value::Null));

        let failed = json!({"success": false, "message": "cancelled"});
        assert_eq!(
            response_outcome(failed.as_object().unwrap()),
            Err(ReverseRequestError::Failed("cancelled".into()))
        );

        let bare = json!({"success": false});
        assert_eq!(
            response_outcome(bare.as_object().unwrap()),
            Err(ReverseRequestError::Failed(DEFAULT_FAILURE_MESSAGE.into()))
        );
    }
}
