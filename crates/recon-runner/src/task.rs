//! Declarative task descriptions: what to read, what must exist, how to
//! write it and what to tell a human when the write is refused.

use std::collections::BTreeMap;

use recon_core::{Bindings, Checklist};
use recon_remediation::RemediationTemplate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A read-only query and the key its answer lives under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub label: String,
    pub operation: String,
    pub data_key: String,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub label: String,
    pub operation: String,
    pub data_key: String,
    /// Dotted path from the data key value to the record list (`permissions`, `edges`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_path: Option<String>,
    pub entity_kind: String,
    /// Shown next to each identity in the inventory log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_field: Option<String>,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChecklistSpec {
    pub identity_field: String,
    pub items: Vec<String>,
}

/// Mutation run once per missing item. `{{item}}` in `variables` is the
/// item identity; task context and discovered values are also bound.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub label: String,
    pub operation: String,
    pub data_key: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub variables: Value,
    #[serde(default)]
    pub privileged: bool,
}

/// Lists what the remote side can offer, e.g. the permission enum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogSpec {
    pub label: String,
    pub operation: String,
    pub data_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_path: Option<String>,
    pub identity_field: String,
    #[serde(default)]
    pub privileged: bool,
}

/// Resolves one named context value from a query, e.g. the app id a
/// remediation mutation needs. Picks the first record whose `match_field`
/// contains any of `match_any` (case-insensitive), or the first record when
/// no matcher is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoverSpec {
    pub name: String,
    pub label: String,
    pub operation: String,
    pub data_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_path: Option<String>,
    pub value_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_any: Vec<String>,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Fixed values available to every template of this task.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discover: Vec<DiscoverSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogSpec>,
    pub probe: ProbeSpec,
    pub checklist: ChecklistSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationTemplate>,
}

impl TaskSpec {
    pub fn checklist(&self) -> Checklist {
        Checklist::new(
            self.probe.entity_kind.clone(),
            self.checklist.identity_field.clone(),
            self.checklist.items.iter().cloned(),
        )
    }

    pub fn context_bindings(&self) -> Bindings {
        let mut b = Bindings::new();
        for (k, v) in &self.context {
            b.set(k.clone(), v.clone());
        }
        b
    }
}
