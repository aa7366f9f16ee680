use crate::transport::{ChatTransport, TurnRequest};
use async_trait::async_trait;
use bytes::Bytes;
use parley_core::ResponseError;
use parley_wire::{RawResponse, ResponseBody};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One canned outcome of a [`ScriptedTransport::send`] call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Reply delivered as the given chunks, in order.
    Chunks {
        status: u16,
        content_type: Option<String>,
        chunks: Vec<Bytes>,
    },
    /// Connection-level failure before any response exists.
    Fail(String),
}

impl ScriptedReply {
    pub fn chunks<I, B>(status: u16, content_type: &str, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        ScriptedReply::Chunks {
            status,
            content_type: Some(content_type.to_string()),
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn body(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::chunks(status, content_type, [body])
    }

    fn into_response(self) -> Result<RawResponse, ResponseError> {
        match self {
            ScriptedReply::Chunks {
                status,
                content_type,
                chunks,
            } => Ok(RawResponse::new(
                status,
                content_type.as_deref(),
                Some(ResponseBody::from_chunks(chunks)),
            )),
            ScriptedReply::Fail(detail) => Err(ResponseError::Transport(detail)),
        }
    }
}

/// In-memory transport that replays canned replies in order and records
/// every request it receives.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<TurnRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Delay every reply by `latency` before it is returned.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        lock(&self.replies).push_back(reply);
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        lock(&self.requests).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: &TurnRequest) -> Result<RawResponse, ResponseError> {
        lock(&self.requests).push(request.clone());
        let reply = lock(&self.replies).pop_front();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        tracing::trace!(turn_id = %request.turn_id, "scripted transport replying");
        reply
            .ok_or_else(|| ResponseError::Transport("no scripted reply left".to_string()))?
            .into_response()
    }
}
