use anyhow::{anyhow, Context, Result};
use recon_core::{classify, Classification};
use recon_transport::{GqlRequest, Transport};

use crate::Config;

/// Offline checks: config structure and credential environment.
pub fn doctor(cfg: &Config) -> Result<()> {
    cfg.validate()?;
    let bundle = cfg.credential_bundle()?;
    if bundle.header_names().is_empty() {
        return Err(anyhow!("no credential headers configured; add [credentials.headers]"));
    }
    Ok(())
}

/// One read against the endpoint using the preflight query, or `__typename`
/// when none is configured. Denied still proves the endpoint is reachable.
pub async fn doctor_connectivity(cfg: &Config, transport: &dyn Transport) -> Result<()> {
    let (label, operation, key) = match &cfg.preflight {
        Some(p) => (p.label.as_str(), p.operation.as_str(), p.data_key.as_str()),
        None => ("Doctor", "query { __typename }", "__typename"),
    };
    let reply = transport
        .send(&GqlRequest::new(label, operation))
        .await
        .with_context(|| format!("reach {}", transport.endpoint()))?;
    match classify(&reply, key) {
        Classification::Failed(m) => Err(anyhow!("endpoint answered with errors: {}", m.join("; "))),
        _ => Ok(()),
    }
}
