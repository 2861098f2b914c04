use recon_core::{classify, extract_records, identity_of, Classification, EntityRecord, Snapshot};
use recon_transport::{GqlRequest, Transport, TransportError};
use serde_json::Value;

use crate::task::{CatalogSpec, DiscoverSpec, ProbeSpec, QuerySpec};

/// What a probe saw. Non-`Snapshot` variants carry the classifier's detail unchanged.
#[derive(Clone, Debug, PartialEq)]
pub enum ProbeOutcome {
    Snapshot(Snapshot),
    Denied(Vec<String>),
    Failed(Vec<String>),
    Empty,
}

/// Send a read-only query and classify the reply under `data_key`.
pub async fn query(
    transport: &dyn Transport,
    label: &str,
    operation: &str,
    data_key: &str,
    privileged: bool,
) -> Result<Classification, TransportError> {
    let request = GqlRequest::new(label, operation).privileged(privileged);
    let reply = transport.send(&request).await?;
    Ok(classify(&reply, data_key))
}

pub async fn run_query(transport: &dyn Transport, spec: &QuerySpec) -> Result<Classification, TransportError> {
    query(transport, &spec.label, &spec.operation, &spec.data_key, spec.privileged).await
}

pub struct Probe<'a> {
    pub spec: &'a ProbeSpec,
}

impl<'a> Probe<'a> {
    pub fn new(spec: &'a ProbeSpec) -> Self {
        Self { spec }
    }

    /// One round trip, a fresh snapshot every call.
    pub async fn run(&self, transport: &dyn Transport) -> Result<ProbeOutcome, TransportError> {
        let s = self.spec;
        let outcome = match query(transport, &s.label, &s.operation, &s.data_key, s.privileged).await? {
            Classification::Ok(value) => {
                let path = s.records_path.as_deref().unwrap_or("");
                match extract_records(&value, path) {
                    Some(records) => ProbeOutcome::Snapshot(Snapshot::new().with_kind(s.entity_kind.clone(), records)),
                    None => ProbeOutcome::Failed(vec![format!("reply has no `{}` under `{}`", path, s.data_key)]),
                }
            }
            Classification::Denied(m) => ProbeOutcome::Denied(m),
            Classification::Failed(m) => ProbeOutcome::Failed(m),
            Classification::Empty => ProbeOutcome::Empty,
        };
        Ok(outcome)
    }
}

/// Identities the remote side offers, or the classification that prevented reading them.
pub async fn read_catalog(
    transport: &dyn Transport,
    spec: &CatalogSpec,
) -> Result<Result<Vec<String>, Classification>, TransportError> {
    let c = query(transport, &spec.label, &spec.operation, &spec.data_key, spec.privileged).await?;
    let Classification::Ok(value) = c else {
        return Ok(Err(c));
    };
    let records = extract_records(&value, spec.records_path.as_deref().unwrap_or("")).unwrap_or_default();
    Ok(Ok(records
        .iter()
        .filter_map(|r| identity_of(r, &spec.identity_field))
        .collect()))
}

/// What a discovery query turned up.
#[derive(Clone, Debug, PartialEq)]
pub enum Discovery {
    Found { value: Value, candidates: usize },
    NotFound { candidates: usize },
    Refused(Classification),
}

pub async fn discover(transport: &dyn Transport, spec: &DiscoverSpec) -> Result<Discovery, TransportError> {
    let c = query(transport, &spec.label, &spec.operation, &spec.data_key, spec.privileged).await?;
    let Classification::Ok(value) = c else {
        return Ok(Discovery::Refused(c));
    };
    let records = extract_records(&value, spec.records_path.as_deref().unwrap_or("")).unwrap_or_default();
    let candidates = records.len();
    Ok(match pick(&records, spec).and_then(|r| r.get(&spec.value_field)) {
        Some(v) if !v.is_null() => Discovery::Found { value: v.clone(), candidates },
        _ => Discovery::NotFound { candidates },
    })
}

fn pick<'r>(records: &'r [EntityRecord], spec: &DiscoverSpec) -> Option<&'r EntityRecord> {
    let Some(field) = spec.match_field.as_deref().filter(|_| !spec.match_any.is_empty()) else {
        return records.first();
    };
    records.iter().find(|r| {
        let hay = r.get(field).and_then(Value::as_str).unwrap_or("").to_lowercase();
        spec.match_any.iter().any(|needle| hay.contains(&needle.to_lowercase()))
    })
}
