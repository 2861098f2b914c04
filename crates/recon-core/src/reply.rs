use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a reply from the remote query endpoint: `{data?, errors?}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RawReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphqlError>>,
}

/// One entry of the application-level error list. Fields other than
/// `message` (locations, path, extensions) are kept verbatim.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphqlError {
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extra: Map::new(),
        }
    }
}

impl RawReply {
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    pub fn with_errors<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data: None,
            errors: Some(messages.into_iter().map(GraphqlError::new).collect()),
        }
    }

    /// Messages of the error list. An empty list counts as no list.
    pub fn error_messages(&self) -> Option<Vec<String>> {
        match &self.errors {
            Some(errs) if !errs.is_empty() => Some(errs.iter().map(|e| e.message.clone()).collect()),
            _ => None,
        }
    }
}

/// Result of inspecting a reply.
#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    Ok(Value),
    Denied(Vec<String>),
    Failed(Vec<String>),
    Empty,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Ok(_) => "ok",
            Classification::Denied(_) => "denied",
            Classification::Failed(_) => "failed",
            Classification::Empty => "empty",
        }
    }
}

/// Denial heuristic: a case-insensitive substring match on the error wording.
///
/// This is fragile. It depends on the remote service phrasing authorization
/// failures in English with one of these two words; a structured error code
/// would be preferable where the remote offers one. Keep every denial check
/// routed through here so the rule can be swapped in one place.
pub fn mentions_denial(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("permission") || lower.contains("unauthorized")
}

/// Denied if any message trips the denial heuristic, otherwise Failed.
pub fn classify_messages(messages: Vec<String>) -> Classification {
    if messages.iter().any(|m| mentions_denial(m)) {
        Classification::Denied(messages)
    } else {
        Classification::Failed(messages)
    }
}

/// Classify a reply against the data key the caller expects.
///
/// Rules, first match wins:
/// 1. error list with denial wording -> `Denied`
/// 2. any other error list -> `Failed`
/// 3. data key absent, null or empty -> `Empty`
/// 4. `Ok` with the value under the data key
pub fn classify(reply: &RawReply, data_key: &str) -> Classification {
    if let Some(messages) = reply.error_messages() {
        return classify_messages(messages);
    }
    match reply.data.as_ref().and_then(|d| d.get(data_key)) {
        Some(v) if !is_empty_value(v) => Classification::Ok(v.clone()),
        _ => Classification::Empty,
    }
}

/// Like [`classify`], but also inspects the `errors` list nested in a mutation
/// payload (`{data: {someMutation: {errors: [...]}}}`). An empty payload is a
/// failure for a mutation: the write did not report what it did.
pub fn classify_mutation(reply: &RawReply, data_key: &str) -> Classification {
    match classify(reply, data_key) {
        Classification::Ok(payload) => {
            let nested: Vec<String> = payload
                .get("errors")
                .and_then(Value::as_array)
                .map(|errs| errs.iter().map(user_error_text).collect())
                .unwrap_or_default();
            if nested.is_empty() {
                Classification::Ok(payload)
            } else {
                classify_messages(nested)
            }
        }
        Classification::Empty => Classification::Failed(vec![format!("mutation returned no `{data_key}` payload")]),
        other => other,
    }
}

fn user_error_text(err: &Value) -> String {
    let field = |k: &str| err.get(k).and_then(Value::as_str).filter(|s| !s.is_empty());
    match (field("message"), field("code"), field("field")) {
        (Some(msg), _, _) => msg.to_string(),
        (None, Some(code), Some(f)) => format!("{code} ({f})"),
        (None, Some(code), None) => code.to_string(),
        _ => err.to_string(),
    }
}

pub fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
