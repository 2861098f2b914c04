use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder pattern is valid")
});

static OPERATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:query|mutation|subscription)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("operation pattern is valid")
});

/// Name of a named GraphQL operation (`mutation UpdateAppPermissions(...)`).
pub fn operation_name(document: &str) -> Option<String> {
    OPERATION_NAME.captures(document).map(|c| c[1].to_string())
}

/// Values available to `{{name}}` placeholders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn extend(&mut self, other: &Bindings) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }
}

/// What to put where a placeholder has no binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unbound {
    /// Leave `{{name}}` in place.
    Keep,
    /// Replace with `<NAME>` so a human can spot and fill it.
    Marker,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rendered {
    pub value: Value,
    pub unresolved: BTreeSet<String>,
}

impl Rendered {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// `<APP_ID>` for `app_id`, `<ITEM_SLUG>` for `item.slug`.
pub fn marker_for(name: &str) -> String {
    format!("<{}>", name.replace('.', "_").to_uppercase())
}

/// Substitute placeholders inside every string of `template`. A string that
/// is exactly one placeholder takes the bound JSON value as-is (arrays and
/// objects included); embedded placeholders are spliced in as text. Object
/// keys are never rewritten.
pub fn render_value(template: &Value, bindings: &Bindings, unbound: Unbound) -> Rendered {
    let mut unresolved = BTreeSet::new();
    let value = walk(template, bindings, unbound, &mut unresolved);
    Rendered { value, unresolved }
}

pub fn render_text(template: &str, bindings: &Bindings, unbound: Unbound) -> (String, BTreeSet<String>) {
    let mut unresolved = BTreeSet::new();
    let text = splice(template, bindings, unbound, &mut unresolved);
    (text, unresolved)
}

fn walk(v: &Value, b: &Bindings, unbound: Unbound, unresolved: &mut BTreeSet<String>) -> Value {
    match v {
        Value::String(s) => render_string(s, b, unbound, unresolved),
        Value::Array(items) => Value::Array(items.iter().map(|i| walk(i, b, unbound, unresolved)).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), walk(v, b, unbound, unresolved)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_string(s: &str, b: &Bindings, unbound: Unbound, unresolved: &mut BTreeSet<String>) -> Value {
    if let Some(caps) = PLACEHOLDER.captures(s) {
        let whole = caps.get(0).map_or(false, |m| m.start() == 0 && m.end() == s.len());
        if whole {
            let name = &caps[1];
            return match b.get(name) {
                Some(v) => v.clone(),
                None => {
                    unresolved.insert(name.to_string());
                    Value::String(missing(name, s, unbound))
                }
            };
        }
    }
    Value::String(splice(s, b, unbound, unresolved))
}

fn splice(s: &str, b: &Bindings, unbound: Unbound, unresolved: &mut BTreeSet<String>) -> String {
    PLACEHOLDER
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match b.get(name) {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => {
                    unresolved.insert(name.to_string());
                    missing(name, &caps[0], unbound)
                }
            }
        })
        .into_owned()
}

fn missing(name: &str, original: &str, unbound: Unbound) -> String {
    match unbound {
        Unbound::Keep => original.to_string(),
        Unbound::Marker => marker_for(name),
    }
}
