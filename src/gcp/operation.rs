//! Long-running operations
//!
//! Mutating Cloud Deploy calls return an operation resource
//! (`{name, done, error, response}`). [`OperationPoller::wait`] re-reads it
//! with backoff until it is done, optionally bounded by a timeout. Only a
//! not-yet-done operation is polled again; any other error ends the wait.

use super::http::{ApiRequest, Transport};
use super::retry::{retry_if, RetryPolicy};
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<Status>,
    #[serde(default)]
    pub response: Option<Value>,
}

impl Operation {
    /// Parse an operation from a response body. An empty body counts as an
    /// already finished operation.
    pub fn from_response(body: Value) -> Result<Self> {
        if body.is_null() {
            return Ok(Self {
                done: true,
                ..Self::default()
            });
        }
        Ok(serde_json::from_value(body)?)
    }

    /// Ok when done without error, `OperationNotDone` while running
    pub fn status(&self) -> Result<()> {
        if !self.done {
            return Err(Error::OperationNotDone(self.name.clone()));
        }
        match &self.error {
            Some(status) if status.code != 0 => Err(Error::OperationFailed {
                name: self.name.clone(),
                code: status.code,
                message: status.message.clone(),
            }),
            _ => Ok(()),
        }
    }
}

pub struct OperationPoller<'a> {
    transport: &'a dyn Transport,
    base_path: &'a str,
    policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl<'a> OperationPoller<'a> {
    pub fn new(transport: &'a dyn Transport, base_path: &'a str, policy: RetryPolicy) -> Self {
        Self {
            transport,
            base_path,
            policy,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for `operation` to reach a terminal state
    pub async fn wait(&self, operation: Operation) -> Result<Operation> {
        if operation.done {
            operation.status()?;
            return Ok(operation);
        }
        if operation.name.is_empty() {
            return Err(Error::Programming("unfinished operation without a name".to_string()));
        }

        let started = Instant::now();
        let name = operation.name.clone();
        let url = format!("{}/{}", self.base_path.trim_end_matches('/'), name);
        tracing::debug!(operation = %name, "waiting for operation");

        let poll = retry_if(&self.policy, Error::is_pending, |attempt| {
            let url = url.clone();
            async move {
                if attempt > 0 {
                    tracing::trace!(attempt, "polling operation");
                }
                let op = Operation::from_response(self.transport.send(ApiRequest::get(url)).await?)?;
                op.status()?;
                Ok(op)
            }
        });

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, poll).await.map_err(|_| Error::Timeout {
                what: format!("operation {}", name),
                elapsed: started.elapsed(),
            })?,
            None => poll.await,
        };

        match &result {
            Ok(_) => tracing::info!(operation = %name, elapsed_ms = started.elapsed().as_millis() as u64, "operation done"),
            Err(e) => tracing::warn!(operation = %name, error = %e, "operation did not succeed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers each poll with the next canned result
    struct Scripted {
        replies: Mutex<Vec<Result<Value>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Value>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for Scripted {
        fn send(&self, _request: ApiRequest) -> BoxFuture<'_, Result<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.is_empty() {
                Err(Error::Programming("unexpected poll".into()))
            } else {
                replies.remove(0)
            };
            Box::pin(async move { reply })
        }
    }

    fn running() -> Operation {
        Operation {
            name: "projects/p/locations/l/operations/1".into(),
            ..Operation::default()
        }
    }

    #[tokio::test]
    async fn test_wait_polls_until_done() {
        let transport = Scripted::new(vec![
            Ok(json!({"name": "operations/1", "done": false})),
            Ok(json!({"name": "operations/1", "done": true})),
        ]);
        let poller = OperationPoller::new(&transport, "https://example.test/v1", RetryPolicy::immediate(5));
        let op = poller.wait(running()).await.unwrap();
        assert!(op.done);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_server_error_while_polling_ends_the_wait() {
        let transport = Scripted::new(vec![
            Ok(json!({"name": "operations/1", "done": false})),
            Err(Error::Http {
                status: 500,
                method: "GET".into(),
                url: "operations/1".into(),
                message: "backend error".into(),
            }),
            Ok(json!({"name": "operations/1", "done": true})),
        ]);
        let poller = OperationPoller::new(&transport, "https://example.test/v1", RetryPolicy::immediate(5));
        let err = poller.wait(running()).await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 500, .. }), "{err}");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_status_of_running_operation() {
        let op = Operation::from_response(json!({"name": "operations/1", "done": false})).unwrap();
        assert!(matches!(op.status(), Err(Error::OperationNotDone(_))));
    }

    #[test]
    fn test_status_of_failed_operation() {
        let op = Operation::from_response(json!({
            "name": "operations/1",
            "done": true,
            "error": {"code": 9, "message": "target in use"}
        }))
        .unwrap();
        let err = op.status().unwrap_err();
        assert_eq!(err.to_string(), "operation operations/1 failed with code 9: target in use");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_body_is_done() {
        let op = Operation::from_response(Value::Null).unwrap();
        assert!(op.done);
        assert!(op.status().is_ok());
    }
}
