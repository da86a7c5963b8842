//! Request/response correlation by `@extra.requestId`.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tdbridge_core::Envelope;
use tokio::sync::oneshot;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::errors::ClientError;

/// Outstanding requests keyed by correlation token.
pub struct RequestCorrelator {
    pending: Mutex<HashMap<String, oneshot::Sender<Envelope>>>,
    timeout: Duration,
}

/// Removes a pending entry when the waiting future finishes or is dropped.
struct PendingGuard<'a> {
    correlator: &'a RequestCorrelator,
    token: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let _ = self.correlator.pending.lock().remove(self.token);
    }
}

impl RequestCorrelator {
    /// Create a correlator whose requests wait at most `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Tag `request` with a fresh token, hand its JSON to `transmit` and
    /// wait for the response carrying the same token.
    ///
    /// The pending entry is registered before `transmit` runs, so a fast
    /// response cannot be missed.
    pub async fn issue<F>(&self, mut request: Envelope, transmit: F) -> Result<Envelope, ClientError>
    where
        F: FnOnce(String),
    {
        let token = Uuid::now_v7().to_string();
        request.set_request_id(&token);

        let (tx, rx) = oneshot::channel();
        let _ = self.pending.lock().insert(token.clone(), tx);
        let _guard = PendingGuard {
            correlator: self,
            token: &token,
        };

        trace!(token, request_type = request.type_name().unwrap_or_default(), "issuing request");
        transmit(request.to_json());

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::Stopped),
            Err(_) => {
                debug!(token, timeout = ?self.timeout, "request timed out");
                Err(ClientError::Timeout {
                    request,
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Hand `message` to the request waiting for its token.
    ///
    /// Returns the message back when no pending request claims it.
    pub fn dispatch(&self, message: Envelope) -> Option<Envelope> {
        let sender = match message.request_id() {
            Some(token) => self.pending.lock().remove(token),
            None => None,
        };
        let Some(sender) = sender else {
            return Some(message);
        };
        // The waiter may have timed out between lookup and send.
        sender.send(message).err()
    }

    /// Fail every outstanding request with [`ClientError::Stopped`].
    ///
    /// Returns the tokens of the failed requests.
    pub fn fail_all(&self) -> Vec<String> {
        // Dropping each sender wakes its waiter with `Stopped`.
        self.pending.lock().drain().map(|(token, _)| token).collect()
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Configured response timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> Envelope {
        Envelope::from_value(value).unwrap()
    }

    /// Issue `request` on a task and return the JSON that was transmitted.
    async fn issue_in_background(
        correlator: &Arc<RequestCorrelator>,
        request: Envelope,
    ) -> (tokio::task::JoinHandle<Result<Envelope, ClientError>>, Envelope) {
        let sent = Arc::new(PlMutex::new(None));
        let slot = sent.clone();
        let c = correlator.clone();
        let handle = tokio::spawn(async move {
            c.issue(request, move |text| *slot.lock() = Some(text)).await
        });
        while sent.lock().is_none() {
            tokio::task::yield_now().await;
        }
        let text = sent.lock().take().unwrap();
        (handle, Envelope::parse(&text).unwrap())
    }

    #[tokio::test]
    async fn matching_response_resolves() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(10)));
        let (handle, sent) =
            issue_in_background(&correlator, envelope(json!({"@type": "getMe", "@extra": {"keep": 1}}))).await;

        let token = sent.request_id().unwrap().to_owned();
        assert_eq!(sent.get("@extra").unwrap()["keep"], 1);
        assert_eq!(correlator.pending_count(), 1);

        let response = envelope(json!({"@type": "user", "@extra": {"requestId": token}}));
        assert!(correlator.dispatch(response.clone()).is_none());
        assert_eq!(handle.await.unwrap().unwrap(), response);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn other_tokens_leave_request_outstanding() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(10)));
        let (handle, sent) = issue_in_background(&correlator, envelope(json!({"@type": "getMe"}))).await;

        let stray = envelope(json!({"@type": "user", "@extra": {"requestId": "someone-else"}}));
        assert_eq!(correlator.dispatch(stray.clone()), Some(stray));
        let untagged = envelope(json!({"@type": "updateOption"}));
        assert_eq!(correlator.dispatch(untagged.clone()), Some(untagged));
        assert_eq!(correlator.pending_count(), 1);
        assert!(!handle.is_finished());

        let token = sent.request_id().unwrap().to_owned();
        let _ = correlator.dispatch(envelope(json!({"@type": "user", "@extra": {"requestId": token}})));
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn each_request_gets_a_distinct_token() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(10)));
        let (_h1, a) = issue_in_background(&correlator, envelope(json!({"@type": "a"}))).await;
        let (_h2, b) = issue_in_background(&correlator, envelope(json!({"@type": "b"}))).await;
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(correlator.pending_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_after_window() {
        let correlator = RequestCorrelator::new(Duration::from_millis(1000));
        let started = tokio::time::Instant::now();
        let err = correlator
            .issue(envelope(json!({"@type": "getMe"})), |_| {})
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1100));
        assert_matches!(err, ClientError::Timeout { ref request, timeout_ms: 1000 } => {
            assert_eq!(request.type_name(), Some("getMe"));
            assert!(request.request_id().is_some());
        });
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_all_reports_stopped() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(10)));
        let (handle, sent) = issue_in_background(&correlator, envelope(json!({"@type": "getMe"}))).await;
        assert_eq!(correlator.fail_all(), vec![sent.request_id().unwrap().to_owned()]);
        assert_matches!(handle.await.unwrap(), Err(ClientError::Stopped));
    }

    #[tokio::test]
    async fn dropped_request_removes_its_entry() {
        let correlator = Arc::new(RequestCorrelator::new(Duration::from_secs(10)));
        let (handle, _) = issue_in_background(&correlator, envelope(json!({"@type": "getMe"}))).await;
        assert_eq!(correlator.pending_count(), 1);
        handle.abort();
        let _ = handle.await;
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn response_for_unknown_token_is_returned() {
        let correlator = RequestCorrelator::new(Duration::from_secs(1));
        let msg = envelope(json!({"@type": "x", "@extra": {"requestId": "nope"}}));
        assert_eq!(correlator.dispatch(msg.clone()), Some(msg));
    }
}
