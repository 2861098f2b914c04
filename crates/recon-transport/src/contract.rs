use async_trait::async_trait;
use recon_core::RawReply;
use serde_json::{json, Value};

/// One query or mutation, ready to send.
#[derive(Clone, Debug, PartialEq)]
pub struct GqlRequest {
    /// Human label used in logs and run events. Not sent over the wire.
    pub label: String,
    pub query: String,
    pub variables: Value,
    /// Adds the privileged header overlay on top of the base credentials.
    pub privileged: bool,
}

impl GqlRequest {
    pub fn new(label: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            query: query.into(),
            variables: json!({}),
            privileged: false,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = if variables.is_null() { json!({}) } else { variables };
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Wire body: `{"query": ..., "variables": {...}}`.
    pub fn body(&self) -> Value {
        json!({ "query": self.query, "variables": self.variables })
    }
}

/// Transport-level failures. Application errors never show up here; they
/// arrive inside a 2xx [`RawReply`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("could not reach endpoint: {0}")]
    Network(String),
    #[error("reply is not a GraphQL response: {0}")]
    Decode(String),
    #[error("invalid credential header `{0}`")]
    InvalidHeader(String),
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Exactly one round trip per `send`. No retries, no backoff.
#[async_trait]
pub trait Transport: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn send(&self, request: &GqlRequest) -> Result<RawReply, TransportError>;
}
