//! Turns denied work into ordered manual steps plus a ready-to-send mutation.

mod render;

pub use render::*;

use recon_core::{marker_for, operation_name, render_text, render_value, Bindings, Unbound};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Caller-supplied remediation for one task. `{{name}}` placeholders are
/// filled from the planning context; anything unresolved becomes `<NAME>`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemediationTemplate {
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub variables: Value,
    #[serde(default)]
    pub privileged: bool,
}

/// Work the acting credential was not allowed to do.
#[derive(Clone, Debug, PartialEq)]
pub struct DeniedItem {
    pub task: String,
    pub action: String,
    pub items: Vec<String>,
    pub reasons: Vec<String>,
}

pub struct PlanContext<'a> {
    pub template: Option<&'a RemediationTemplate>,
    pub bindings: &'a Bindings,
    /// Mutation the task would have run, used when no template operation is given.
    pub action_operation: Option<&'a str>,
    pub action_variables: Option<&'a Value>,
    pub action_privileged: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationTemplate {
    pub operation_name: String,
    pub operation: String,
    pub variables: Value,
    pub privileged: bool,
    /// Markers a human must replace before sending, e.g. `<APP_ID>`.
    pub placeholders: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub task: String,
    pub action: String,
    pub denied_items: Vec<String>,
    pub reasons: Vec<String>,
    pub human_steps: Vec<String>,
    pub mutation: MutationTemplate,
}

/// Deterministic: the same item and context always give the same plan.
pub fn plan(denied: &DeniedItem, ctx: &PlanContext<'_>) -> RemediationPlan {
    let mut bindings = ctx.bindings.clone();
    bindings.set("task", denied.task.as_str());
    bindings.set("action", denied.action.as_str());
    bindings.set("items", json!(denied.items));
    bindings.set("items_list", denied.items.join(", "));
    if let [only] = denied.items.as_slice() {
        bindings.set("item", only.as_str());
    }

    let template_op = ctx.template.and_then(|t| t.operation.as_deref());
    let (operation, raw_vars, privileged) = match template_op {
        Some(op) => (
            op,
            ctx.template.map(|t| &t.variables).filter(|v| !v.is_null()),
            ctx.template.map_or(false, |t| t.privileged),
        ),
        None => (
            ctx.action_operation.unwrap_or(""),
            ctx.action_variables,
            ctx.action_privileged,
        ),
    };
    let empty = json!({});
    let rendered = render_value(raw_vars.unwrap_or(&empty), &bindings, Unbound::Marker);
    let mut placeholders: Vec<String> = rendered.unresolved.iter().map(|n| marker_for(n)).collect();

    let mut human_steps = Vec::new();
    let template_steps = ctx.template.map(|t| t.steps.as_slice()).unwrap_or(&[]);
    if template_steps.is_empty() {
        human_steps.extend(default_steps(denied));
    } else {
        for step in template_steps {
            let (text, missing) = render_text(step, &bindings, Unbound::Marker);
            for name in missing {
                let marker = marker_for(&name);
                if !placeholders.contains(&marker) {
                    placeholders.push(marker);
                }
            }
            human_steps.push(text);
        }
    }
    placeholders.sort();
    if !placeholders.is_empty() {
        human_steps.push(format!(
            "Replace {} with the real value(s) before sending the mutation.",
            placeholders.join(", ")
        ));
    }
    human_steps.push(format!(
        "Re-run the reconciliation and confirm task `{}` reports SATISFIED.",
        denied.task
    ));

    RemediationPlan {
        task: denied.task.clone(),
        action: denied.action.clone(),
        denied_items: denied.items.clone(),
        reasons: denied.reasons.clone(),
        human_steps,
        mutation: MutationTemplate {
            operation_name: operation_name(operation).unwrap_or_else(|| denied.action.clone()),
            operation: operation.trim().to_string(),
            variables: rendered.value,
            privileged,
            placeholders,
        },
    }
}

fn default_steps(denied: &DeniedItem) -> Vec<String> {
    let mut steps = vec![format!(
        "Grant the acting credential the authority required by `{}`.",
        denied.action
    )];
    if let Some(reason) = denied.reasons.first() {
        steps.push(format!("The remote service refused with: \"{reason}\"."));
    }
    steps.push(format!(
        "Apply the mutation below, or make the same change in the admin dashboard, for: {}.",
        denied.items.join(", ")
    ));
    steps
}
