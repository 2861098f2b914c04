use recon_core::{classify_mutation, operation_name, render_value, ActionOutcome, Bindings, PlannedEffect, Rendered, Unbound};
use recon_transport::{GqlRequest, Transport, TransportError};
use serde_json::json;

use crate::task::ActionSpec;

pub struct Action<'a> {
    pub spec: &'a ActionSpec,
}

impl<'a> Action<'a> {
    pub fn new(spec: &'a ActionSpec) -> Self {
        Self { spec }
    }

    /// Variables for `item`, with `{{item}}` bound on top of `bindings`.
    pub fn variables_for(&self, item: &str, bindings: &Bindings) -> Rendered {
        let mut b = bindings.clone();
        b.set("item", item);
        let template = if self.spec.variables.is_null() { json!({}) } else { self.spec.variables.clone() };
        render_value(&template, &b, Unbound::Keep)
    }

    /// One mutation for one item. Unbound placeholders fail the item
    /// without a round trip.
    pub async fn attempt(
        &self,
        transport: &dyn Transport,
        item: &str,
        bindings: &Bindings,
    ) -> Result<ActionOutcome, TransportError> {
        let vars = self.variables_for(item, bindings);
        if !vars.is_complete() {
            let names: Vec<String> = vars.unresolved.into_iter().collect();
            return Ok(ActionOutcome::Failed(vec![format!(
                "unresolved placeholder(s): {}",
                names.join(", ")
            )]));
        }
        let request = GqlRequest::new(&self.spec.label, &self.spec.operation)
            .with_variables(vars.value)
            .privileged(self.spec.privileged);
        let reply = transport.send(&request).await?;
        Ok(ActionOutcome::from_classification(classify_mutation(&reply, &self.spec.data_key)))
    }

    /// What `attempt` would send, without sending it.
    pub fn simulate(&self, item: &str, bindings: &Bindings) -> ActionOutcome {
        let vars = self.variables_for(item, bindings);
        let operation = operation_name(&self.spec.operation).unwrap_or_else(|| self.spec.data_key.clone());
        ActionOutcome::Simulated(PlannedEffect {
            description: format!("would run {operation} for `{item}`"),
            operation,
            variables: vars.value,
        })
    }
}
