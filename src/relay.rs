//! Transport between contexts.
//!
//! A content script or UI surface never touches tab state directly; it sends a
//! `Request` through a `Relay` and waits, bounded by a timeout, for the answer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RelayError;
use crate::messages::{Request, Response};

pub trait Relay: Send + Sync {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, RelayError>> + Send;
}

impl<R: Relay> Relay for Arc<R> {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, RelayError>> + Send {
        self.as_ref().send(request)
    }
}

/// Sends and waits at most `timeout`. No answer and an explicit rejection both count as
/// failure.
pub async fn send_with_timeout<R: Relay>(
    relay: &R,
    request: Request,
    timeout: Duration,
) -> Result<Response, RelayError> {
    let kind = request.kind();
    let tab_id = request.tab_id();
    match tokio::time::timeout(timeout, relay.send(request)).await {
        Ok(Ok(response)) if response.is_success() => Ok(response),
        Ok(Ok(response)) => {
            let reason = response.error().unwrap_or("request failed").to_string();
            tracing::warn!(kind, tab_id, reason = %reason, "request rejected");
            Err(RelayError::Rejected(reason))
        }
        Ok(Err(e)) => {
            tracing::warn!(kind, tab_id, error = %e, "request not delivered");
            Err(e)
        }
        Err(_) => {
            tracing::warn!(kind, tab_id, "request timed out");
            Err(RelayError::Timeout)
        }
    }
}

/// Relay for a router running in another process, reached over its HTTP endpoint.
#[derive(Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    messages_url: String,
}

impl HttpRelay {
    pub fn new(base_url: &str) -> Self {
        HttpRelay {
            client: reqwest::Client::new(),
            messages_url: format!("{}/messages", base_url.trim_end_matches('/')),
        }
    }
}

impl Relay for HttpRelay {
    async fn send(&self, request: Request) -> Result<Response, RelayError> {
        let response = self
            .client
            .post(&self.messages_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::Unreachable(e.to_string()))?;

        response
            .json::<Response>()
            .await
            .map_err(|e| RelayError::Unreachable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl Relay for Silent {
        async fn send(&self, _request: Request) -> Result<Response, RelayError> {
            std::future::pending().await
        }
    }

    struct Refusing;

    impl Relay for Refusing {
        async fn send(&self, _request: Request) -> Result<Response, RelayError> {
            Ok(Response::failed("No tab ID found"))
        }
    }

    #[tokio::test]
    async fn test_no_answer_is_a_failure() {
        let res = send_with_timeout(&Silent, Request::GetState { tab_id: 1 }, Duration::from_millis(20)).await;
        assert!(matches!(res, Err(RelayError::Timeout)));
    }

    #[tokio::test]
    async fn test_rejection_is_a_failure() {
        let res = send_with_timeout(&Refusing, Request::ClearCards { tab_id: 1 }, Duration::from_secs(1)).await;
        assert!(matches!(res, Err(RelayError::Rejected(reason)) if reason == "No tab ID found"));
    }

    #[tokio::test]
    async fn test_unreachable_http_relay() {
        // port 9 is discard; nothing listens there in test environments
        let relay = HttpRelay::new("http://127.0.0.1:9/");
        let res = send_with_timeout(&relay, Request::GetState { tab_id: 1 }, Duration::from_secs(5)).await;
        assert!(res.is_err());
    }
}
