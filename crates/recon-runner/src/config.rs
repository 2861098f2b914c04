use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use recon_remediation::{CurlTarget, RemediationTemplate};
use recon_transport::CredentialBundle;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::task::{ActionSpec, CatalogSpec, ChecklistSpec, DiscoverSpec, ProbeSpec, QuerySpec, TaskSpec};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("credential header `{header}` references unset environment variable `{var}`")]
    MissingEnv { header: String, var: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight: Option<QuerySpec>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Header templates. Values are expanded from the environment at load time
/// (`"Bearer ${SALEOR_TOKEN}"`), so the file itself holds no secrets.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub privileged_headers: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_report_path")]
    pub report_path: String,
    #[serde(default = "default_remediation_path")]
    pub remediation_path: String,
    #[serde(default = "default_events_path")]
    pub events_path: String,
    #[serde(default = "default_delay_ms")]
    pub inter_action_delay_ms: u64,
    #[serde(default = "default_true")]
    pub simulate_on_denied: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            report_path: default_report_path(),
            remediation_path: default_remediation_path(),
            events_path: default_events_path(),
            inter_action_delay_ms: default_delay_ms(),
            simulate_on_denied: true,
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_title() -> String {
    "Reconciliation Run".to_string()
}
fn default_report_path() -> String {
    "recon_report.md".to_string()
}
fn default_remediation_path() -> String {
    "remediation.md".to_string()
}
fn default_events_path() -> String {
    "events.json".to_string()
}
fn default_delay_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).context("serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint.timeout_ms)
    }

    pub fn inter_action_delay(&self) -> Duration {
        Duration::from_millis(self.run.inter_action_delay_ms)
    }

    /// Structural checks that do not need the network or the environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.url is empty".into()));
        }
        if self.endpoint.timeout_ms == 0 {
            return Err(ConfigError::Invalid("endpoint.timeout_ms must be positive".into()));
        }
        let mut names = BTreeSet::new();
        for t in &self.tasks {
            if !names.insert(t.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate task name `{}`", t.name)));
            }
            if t.probe.operation.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("task `{}` has an empty probe operation", t.name)));
            }
            if t.checklist.items.is_empty() {
                return Err(ConfigError::Invalid(format!("task `{}` has an empty checklist", t.name)));
            }
        }
        Ok(())
    }

    /// Expand header templates from the environment.
    pub fn credential_bundle(&self) -> Result<CredentialBundle, ConfigError> {
        let mut bundle = CredentialBundle::new();
        for (name, template) in &self.credentials.headers {
            bundle = bundle.with_header(name.clone(), expand_env(name, template)?);
        }
        for (name, template) in &self.credentials.privileged_headers {
            bundle = bundle.with_privileged_header(name.clone(), expand_env(name, template)?);
        }
        Ok(bundle)
    }

    /// Shell-facing view of the endpoint, with header templates left unexpanded.
    pub fn curl_target(&self) -> CurlTarget {
        CurlTarget {
            endpoint: self.endpoint.url.clone(),
            headers: self.credentials.headers.clone().into_iter().collect(),
            privileged_headers: self.credentials.privileged_headers.clone().into_iter().collect(),
        }
    }

    /// Tasks named in `only`, in config order; every task when `only` is empty.
    pub fn select_tasks(&self, only: &[String]) -> Result<Vec<TaskSpec>, ConfigError> {
        if let Some(unknown) = only.iter().find(|n| !self.tasks.iter().any(|t| &t.name == *n)) {
            return Err(ConfigError::Invalid(format!("no task named `{unknown}`")));
        }
        Ok(self
            .tasks
            .iter()
            .filter(|t| only.is_empty() || only.contains(&t.name))
            .cloned()
            .collect())
    }

    pub fn report_path(&self) -> PathBuf {
        expand_path(&self.run.report_path)
    }

    pub fn remediation_path(&self) -> PathBuf {
        expand_path(&self.run.remediation_path)
    }

    pub fn events_path(&self) -> PathBuf {
        expand_path(&self.run.events_path)
    }

    pub fn default_example() -> Self {
        let app_query = "query {\n  app {\n    id\n    name\n    isActive\n    permissions { code name }\n  }\n}";
        let update_perms = "mutation UpdateAppPermissions($id: ID!, $permissions: [PermissionEnum!]!) {\n  appUpdate(id: $id, input: { permissions: $permissions }) {\n    app { id permissions { code } }\n    errors { field message code }\n  }\n}";
        let create_category = "mutation CreateCategory($input: CategoryInput!) {\n  categoryCreate(input: $input) {\n    category { id name slug }\n    errors { field message code }\n  }\n}";

        let permissions = TaskSpec {
            name: "app-permissions".into(),
            description: "App token holds the permissions the restaurant integration needs".into(),
            context: BTreeMap::new(),
            discover: vec![DiscoverSpec {
                name: "app_id".into(),
                label: "Find App ID".into(),
                operation: "query {\n  apps(first: 20) { edges { node { id name isActive } } }\n}".into(),
                data_key: "apps".into(),
                records_path: Some("edges".into()),
                value_field: "id".into(),
                match_field: Some("name".into()),
                match_any: vec!["restaurant".into(), "f&b".into()],
                privileged: false,
            }],
            catalog: Some(CatalogSpec {
                label: "Check Available Permissions".into(),
                operation: "query {\n  shop { permissions { code name } }\n}".into(),
                data_key: "shop".into(),
                records_path: Some("permissions".into()),
                identity_field: "code".into(),
                privileged: false,
            }),
            probe: ProbeSpec {
                label: "Check Current App Permissions".into(),
                operation: app_query.into(),
                data_key: "app".into(),
                records_path: Some("permissions".into()),
                entity_kind: "permission".into(),
                label_field: Some("name".into()),
                privileged: false,
            },
            checklist: ChecklistSpec {
                identity_field: "code".into(),
                items: [
                    "AUTHENTICATED_APP",
                    "MANAGE_PRODUCTS",
                    "MANAGE_ORDERS",
                    "MANAGE_CHANNELS",
                    "MANAGE_USERS",
                    "MANAGE_SHIPPING",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            action: None,
            remediation: Some(RemediationTemplate {
                steps: vec![
                    "Log in to the dashboard as a staff user with MANAGE_APPS.".into(),
                    "Open Apps and select the app {{app_id}}.".into(),
                    "Enable these permissions: {{items_list}}.".into(),
                    "Save, or send the mutation below with the privileged credentials.".into(),
                ],
                operation: Some(update_perms.into()),
                variables: json!({"id": "{{app_id}}", "permissions": "{{items}}"}),
                privileged: true,
            }),
        };

        let categories = TaskSpec {
            name: "menu-categories".into(),
            description: "Menu categories exist".into(),
            context: BTreeMap::new(),
            discover: vec![],
            catalog: None,
            probe: ProbeSpec {
                label: "Check Categories".into(),
                operation: "query {\n  categories(first: 100) { edges { node { id name slug } } }\n}".into(),
                data_key: "categories".into(),
                records_path: Some("edges".into()),
                entity_kind: "category".into(),
                label_field: Some("slug".into()),
                privileged: false,
            },
            checklist: ChecklistSpec {
                identity_field: "name".into(),
                items: vec!["Pizza".into(), "Pasta".into(), "Desserts".into()],
            },
            action: Some(ActionSpec {
                label: "Create Category".into(),
                operation: create_category.into(),
                data_key: "categoryCreate".into(),
                variables: json!({"input": {"name": "{{item}}", "description": "{{item}} menu"}}),
                privileged: false,
            }),
            remediation: None,
        };

        Self {
            endpoint: EndpointConfig {
                url: "https://shop.example.com/graphql/".into(),
                timeout_ms: default_timeout_ms(),
                user_agent: Some("recon/0.1".into()),
            },
            credentials: CredentialsConfig {
                headers: BTreeMap::from([("Authorization".to_string(), "Bearer ${SALEOR_APP_TOKEN}".to_string())]),
                privileged_headers: BTreeMap::from([(
                    "Authorization".to_string(),
                    "Bearer ${SALEOR_STAFF_TOKEN}".to_string(),
                )]),
            },
            run: RunConfig {
                title: "Restaurant Setup".into(),
                ..RunConfig::default()
            },
            preflight: Some(QuerySpec {
                label: "Test Connection".into(),
                operation: "query { shop { name } }".into(),
                data_key: "shop".into(),
                privileged: false,
            }),
            tasks: vec![permissions, categories],
        }
    }
}

fn expand_env(header: &str, template: &str) -> Result<String, ConfigError> {
    shellexpand::env(template)
        .map(|v| v.into_owned())
        .map_err(|e| ConfigError::MissingEnv {
            header: header.to_string(),
            var: e.var_name,
        })
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn example_survives_a_save_load_cycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recon.toml");
        let cfg = Config::default_example();
        cfg.save_to(&path).unwrap();
        let back = Config::load_from(&path).unwrap();
        assert_eq!(back.tasks, cfg.tasks);
        assert_eq!(back.preflight, cfg.preflight);
        assert_eq!(back.run.title, "Restaurant Setup");
        back.validate().unwrap();
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [endpoint]
            url = "http://localhost:8000/graphql/"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.endpoint.timeout_ms, 30_000);
        assert!(cfg.run.simulate_on_denied);
        assert_eq!(cfg.run.report_path, "recon_report.md");
        assert!(cfg.tasks.is_empty());
    }

    #[test]
    fn header_templates_expand_from_env() {
        std::env::set_var("RECON_TEST_TOKEN_A", "tok-123");
        let mut cfg = Config::default_example();
        cfg.credentials.headers = BTreeMap::from([("Authorization".into(), "Bearer ${RECON_TEST_TOKEN_A}".into())]);
        cfg.credentials.privileged_headers.clear();
        let bundle = cfg.credential_bundle().unwrap();
        assert_eq!(bundle.headers_for(false), vec![("Authorization", "Bearer tok-123")]);
        // the shell view keeps the reference, not the value
        assert_eq!(cfg.curl_target().headers[0].1, "Bearer ${RECON_TEST_TOKEN_A}");
    }

    #[test]
    fn unset_variable_is_a_config_error() {
        let mut cfg = Config::default_example();
        cfg.credentials.headers = BTreeMap::from([("X-Token".into(), "${RECON_TEST_SURELY_UNSET_VAR}".into())]);
        match cfg.credential_bundle() {
            Err(ConfigError::MissingEnv { header, var }) => {
                assert_eq!(header, "X-Token");
                assert_eq!(var, "RECON_TEST_SURELY_UNSET_VAR");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_duplicate_task_names() {
        let mut cfg = Config::default_example();
        let dup = cfg.tasks[0].clone();
        cfg.tasks.push(dup);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn select_tasks_keeps_config_order_and_rejects_unknown() {
        let cfg = Config::default_example();
        let picked = cfg.select_tasks(&["menu-categories".into()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(cfg.select_tasks(&[]).unwrap().len(), 2);
        assert!(cfg.select_tasks(&["nope".into()]).is_err());
    }
}
