use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use recon_core::RawReply;

use crate::{GqlRequest, Transport, TransportError};

type Scripted = Result<RawReply, TransportError>;

/// In-memory transport replaying canned replies keyed by request label.
/// Not a network client; used by tests and dry scenario runs.
///
/// Replies queued for a label are consumed in order; the last one sticks and
/// answers every further request with that label.
#[derive(Default)]
pub struct ScriptedTransport {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    replies: HashMap<String, VecDeque<Scripted>>,
    sent: Vec<GqlRequest>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, label: impl Into<String>, reply: RawReply) -> Self {
        self.push(label.into(), Ok(reply));
        self
    }

    pub fn fail(self, label: impl Into<String>, error: TransportError) -> Self {
        self.push(label.into(), Err(error));
        self
    }

    fn push(&self, label: String, item: Scripted) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.replies.entry(label).or_default().push_back(item);
    }

    /// Every request seen so far, in send order.
    pub fn sent(&self) -> Vec<GqlRequest> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).sent.clone()
    }

    pub fn sent_labels(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.label).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn endpoint(&self) -> &str {
        "scripted://local"
    }

    async fn send(&self, request: &GqlRequest) -> Result<RawReply, TransportError> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.sent.push(request.clone());
        let Some(queue) = inner.replies.get_mut(&request.label) else {
            return Err(TransportError::Network(format!("no scripted reply for `{}`", request.label)));
        };
        match queue.len() {
            0 => Err(TransportError::Network(format!("no scripted reply for `{}`", request.label))),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or_else(|| Err(TransportError::Network("exhausted".into()))),
        }
    }
}
