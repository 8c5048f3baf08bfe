//! Scripted gateway transport

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::inference::{GatewayError, HttpRequest, HttpResponse, Transport};

use super::next_reply;

/// What a scripted request produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportReply {
    Response(HttpResponse),
    Error(GatewayError),
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<String, VecDeque<TransportReply>>,
    requests: Vec<HttpRequest>,
}

/// Transport answering from a script keyed by the `Seldon-Model` header.
///
/// Models are keyed by name, pipelines by `<name>.pipeline`. Unscripted
/// requests get a 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an HTTP response for `key`
    pub fn respond(&self, key: &str, status: u16, body: &str) {
        self.push(
            key,
            TransportReply::Response(HttpResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    /// Append a transport error for `key`
    pub fn fail(&self, key: &str, error: GatewayError) {
        self.push(key, TransportReply::Error(error));
    }

    fn push(&self, key: &str, reply: TransportReply) {
        if let Ok(mut script) = self.script.lock() {
            script.replies.entry(key.to_string()).or_default().push_back(reply);
        }
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().map(|s| s.requests.clone()).unwrap_or_default()
    }

    /// Number of requests routed to `key`
    pub fn count(&self, key: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.header("Seldon-Model") == Some(key))
            .count()
    }
}

impl Transport for ScriptedTransport {
    fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, GatewayError> {
        let key = request.header("Seldon-Model").unwrap_or_default().to_string();
        let reply = match self.script.lock() {
            Ok(mut script) => {
                script.requests.push(request.clone());
                script.replies.get_mut(&key).and_then(next_reply)
            }
            Err(_) => None,
        };

        match reply {
            Some(TransportReply::Response(response)) => Ok(response),
            Some(TransportReply::Error(error)) => Err(error),
            None => Ok(HttpResponse {
                status: 404,
                body: format!("no route for {}", key),
            }),
        }
    }
}
