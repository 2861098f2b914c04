use serde_json::json;

use crate::RemediationPlan;

/// How to reach the endpoint from a shell. Header values are the config
/// templates (`Bearer ${SALEOR_TOKEN}`), not expanded secrets.
#[derive(Clone, Debug, Default)]
pub struct CurlTarget {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub privileged_headers: Vec<(String, String)>,
}

/// Markdown remediation artifact for all plans of a run.
pub fn format_remediation(title: &str, plans: &[RemediationPlan], target: &CurlTarget) -> String {
    let mut s = String::new();
    s.push_str(&format!("# Remediation: {}\n\n", title));
    s.push_str(&format!(
        "{} task(s) need a human with more authority than the acting credential.\n\n",
        plans.len()
    ));
    for plan in plans {
        s.push_str(&format_plan(plan, target));
    }
    s
}

pub fn format_plan(plan: &RemediationPlan, target: &CurlTarget) -> String {
    let mut s = String::new();
    s.push_str(&format!("## Task: {}\n\n", plan.task));
    s.push_str(&format!("**Action:** {}\n\n", plan.action));
    s.push_str(&format!("**Denied items:** {}\n\n", plan.denied_items.join(", ")));
    if !plan.reasons.is_empty() {
        s.push_str("**Reasons:**\n");
        for r in &plan.reasons {
            s.push_str(&format!("- {}\n", r));
        }
        s.push('\n');
    }

    s.push_str("### Manual steps\n\n");
    for (i, step) in plan.human_steps.iter().enumerate() {
        s.push_str(&format!("{}. {}\n", i + 1, step));
    }
    s.push('\n');

    let m = &plan.mutation;
    if !m.operation.is_empty() {
        s.push_str(&format!("### Mutation `{}`\n\n", m.operation_name));
        s.push_str(&format!("```graphql\n{}\n```\n\n", m.operation));
        let vars = serde_json::to_string_pretty(&m.variables).unwrap_or_else(|_| m.variables.to_string());
        s.push_str(&format!("Variables:\n\n```json\n{}\n```\n\n", vars));
        s.push_str("Equivalent command:\n\n");
        s.push_str(&format!("```sh\n{}\n```\n\n", curl_command(plan, target)));
    }

    if !m.placeholders.is_empty() {
        s.push_str(&format!(
            "> Unresolved placeholders: {}. Fill these in before sending.\n\n",
            m.placeholders.join(", ")
        ));
    }
    s
}

/// `curl` invocation for the plan's mutation. Privileged headers are
/// included only when the mutation needs them.
pub fn curl_command(plan: &RemediationPlan, target: &CurlTarget) -> String {
    let body = json!({ "query": plan.mutation.operation, "variables": plan.mutation.variables });
    let mut lines = vec![format!("curl -sS -X POST {}", shell_quote(&target.endpoint))];
    lines.push(format!("  -H {}", shell_quote("Content-Type: application/json")));
    let mut headers: Vec<&(String, String)> = target.headers.iter().collect();
    if plan.mutation.privileged {
        headers.retain(|(n, _)| !target.privileged_headers.iter().any(|(p, _)| p.eq_ignore_ascii_case(n)));
        headers.extend(target.privileged_headers.iter());
    }
    for (name, value) in headers {
        // double quotes so the shell expands ${VAR} references
        lines.push(format!("  -H \"{}: {}\"", name, value.replace('"', "\\\"")));
    }
    lines.push(format!("  --data {}", shell_quote(&body.to_string())));
    lines.join(" \\\n")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
