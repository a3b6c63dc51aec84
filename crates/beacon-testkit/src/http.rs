//! Scripted HTTP handler
//!
//! Responses are consumed in FIFO order; every request is recorded before
//! the script is consulted, so a hung request is still visible to the test.

use async_trait::async_trait;
use beacon_core::effects::{HttpEffects, HttpError, HttpRequest, HttpResponse};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this response
    Respond(HttpResponse),
    /// Fail with this error
    Fail(HttpError),
    /// Never complete; used to test cancellation
    Hang,
}

/// HTTP double replaying a queue of [`Scripted`] replies.
#[derive(Debug, Default)]
pub struct ScriptedHttpHandler {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpHandler {
    /// Empty script; unscripted requests fail with a transport error
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response
    pub fn push(&self, response: HttpResponse) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Respond(response));
    }

    /// Queue a JSON response; an empty body is sent as no body
    pub fn push_json(&self, status: u16, body: &str) {
        let mut response = HttpResponse::new(status);
        if !body.is_empty() {
            response = response
                .with_header("Content-Type", "application/json")
                .with_body(body.as_bytes().to_vec());
        }
        self.push(response);
    }

    /// Queue a transport failure
    pub fn push_error(&self, error: HttpError) {
        self.script.lock().unwrap().push_back(Scripted::Fail(error));
    }

    /// Queue a request that never completes
    pub fn push_hang(&self) {
        self.script.lock().unwrap().push_back(Scripted::Hang);
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests seen so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of unconsumed replies
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpEffects for ScriptedHttpHandler {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => futures::future::pending().await,
            None => Err(HttpError::transport("no scripted response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn replays_in_order_then_fails() {
        let http = ScriptedHttpHandler::new();
        http.push_json(201, "{}");
        http.push_error(HttpError::transport("down"));

        let first = http.send(HttpRequest::get("https://a/")).await.unwrap();
        assert_eq!(first.status, 201);
        assert_matches!(
            http.send(HttpRequest::get("https://a/")).await,
            Err(HttpError::Transport { .. })
        );
        assert_matches!(
            http.send(HttpRequest::get("https://a/")).await,
            Err(HttpError::Transport { .. })
        );
        assert_eq!(http.request_count(), 3);
        assert_eq!(http.remaining(), 0);
    }
}
