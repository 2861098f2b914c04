use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name -> value, shaped by whichever probe produced it.
pub type EntityRecord = Map<String, Value>;

/// Read-only view of remote state: entity kind -> records in reply order.
/// Produced fresh by every probe call and never cached.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    kinds: BTreeMap<String, Vec<EntityRecord>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: impl Into<String>, records: Vec<EntityRecord>) -> Self {
        self.insert(kind, records);
        self
    }

    pub fn insert(&mut self, kind: impl Into<String>, records: Vec<EntityRecord>) {
        self.kinds.insert(kind.into(), records);
    }

    pub fn records(&self, kind: &str) -> &[EntityRecord] {
        self.kinds.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Identity of a record under `field`. Strings as-is, numbers and booleans
/// in their JSON form; anything else has no identity.
pub fn identity_of(record: &EntityRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
        _ => None,
    }
}

/// Pull entity records out of a reply value.
///
/// `path` is dot-separated (`"permissions"`, `"categories.edges"`); an empty
/// path means the value itself. Connection-style `{node: {...}}` wrappers are
/// unwrapped, a lone object counts as one record and scalar list elements
/// become `{"value": scalar}`. Returns `None` when the path does not resolve.
pub fn extract_records(value: &Value, path: &str) -> Option<Vec<EntityRecord>> {
    let mut cur = value;
    for seg in path.split('.').filter(|s| !s.is_empty()) {
        cur = cur.get(seg)?;
    }
    match cur {
        Value::Array(items) => Some(items.iter().map(to_record).collect()),
        Value::Object(_) => Some(vec![to_record(cur)]),
        Value::Null => None,
        scalar => Some(vec![to_record(scalar)]),
    }
}

fn to_record(v: &Value) -> EntityRecord {
    match v {
        Value::Object(obj) => match obj.get("node") {
            Some(Value::Object(node)) => node.clone(),
            _ => obj.clone(),
        },
        other => {
            let mut m = Map::new();
            m.insert("value".to_string(), other.clone());
            m
        }
    }
}

/// Ordered set of identifiers that must be present for one entity kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub kind: String,
    pub identity_field: String,
    items: Vec<String>,
}

impl Checklist {
    /// Duplicates are dropped, first occurrence keeps its position.
    pub fn new<I, S>(kind: impl Into<String>, identity_field: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let items = items
            .into_iter()
            .map(Into::into)
            .filter(|i: &String| seen.insert(i.clone()))
            .collect();
        Self {
            kind: kind.into(),
            identity_field: identity_field.into(),
            items,
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|i| i == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Snapshot vs checklist. `present` and `missing` partition the checklist;
/// `missing` keeps checklist order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapResult {
    pub present: BTreeSet<String>,
    pub missing: Vec<String>,
    pub extra: BTreeSet<String>,
}

impl GapResult {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Pure gap analysis. Identity match is exact and case-sensitive.
pub fn diff(snapshot: &Snapshot, checklist: &Checklist) -> GapResult {
    let have: BTreeSet<String> = snapshot
        .records(&checklist.kind)
        .iter()
        .filter_map(|r| identity_of(r, &checklist.identity_field))
        .collect();

    let mut gap = GapResult::default();
    for item in checklist.items() {
        if have.contains(item) {
            gap.present.insert(item.clone());
        } else {
            gap.missing.push(item.clone());
        }
    }
    gap.extra = have.into_iter().filter(|id| !checklist.contains(id)).collect();
    gap
}
