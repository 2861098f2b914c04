use std::time::Duration;

use recon_artifacts::{ArtifactPaths, FsArtifactStore};
use recon_core::{AbortReason, EventStatus, RawReply, RunLog, RunSummary, TaskState};
use recon_remediation::RemediationTemplate;
use recon_runner::{
    http_transport, run_session, ActionSpec, CancelFlag, ChecklistSpec, Config, DiscoverSpec, ProbeSpec, QuerySpec,
    Reconciler, RunOptions, TaskSpec,
};
use recon_transport::{CredentialBundle, ScriptedTransport, TransportError};
use serde_json::json;
use std::collections::BTreeMap;

const DENIED: &str = "User does not have permission to perform this action";

fn perms_task() -> TaskSpec {
    TaskSpec {
        name: "app-permissions".into(),
        description: String::new(),
        context: BTreeMap::new(),
        discover: vec![],
        catalog: None,
        probe: ProbeSpec {
            label: "Check Permissions".into(),
            operation: "query { app { permissions { code name } } }".into(),
            data_key: "app".into(),
            records_path: Some("permissions".into()),
            entity_kind: "permission".into(),
            label_field: Some("name".into()),
            privileged: false,
        },
        checklist: ChecklistSpec {
            identity_field: "code".into(),
            items: vec!["AUTHENTICATED_APP".into(), "MANAGE_PRODUCTS".into(), "MANAGE_ORDERS".into()],
        },
        action: Some(ActionSpec {
            label: "Grant Permission".into(),
            operation: "mutation GrantPermission($code: PermissionEnum!) { grant(code: $code) { ok errors { message } } }"
                .into(),
            data_key: "grant".into(),
            variables: json!({"code": "{{item}}"}),
            privileged: true,
        }),
        remediation: None,
    }
}

fn permissions(codes: &[&str]) -> RawReply {
    let list: Vec<_> = codes.iter().map(|c| json!({"code": c, "name": c.to_lowercase()})).collect();
    RawReply::with_data(json!({"app": {"permissions": list}}))
}

fn granted() -> RawReply {
    RawReply::with_data(json!({"grant": {"ok": true, "errors": []}}))
}

fn config_for(tasks: Vec<TaskSpec>) -> Config {
    let mut cfg = Config::default_example();
    cfg.preflight = None;
    cfg.tasks = tasks;
    cfg
}

#[tokio::test]
async fn missing_items_are_attempted_in_checklist_order() {
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&["MANAGE_PRODUCTS"]))
        .reply("Grant Permission", granted());
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&perms_task(), &mut log).await;

    let gap = report.summary.gap.clone().unwrap();
    assert_eq!(gap.missing, vec!["AUTHENTICATED_APP", "MANAGE_ORDERS"]);
    let codes: Vec<_> = t
        .sent()
        .into_iter()
        .filter(|r| r.label == "Grant Permission")
        .map(|r| r.variables["code"].clone())
        .collect();
    assert_eq!(codes, vec![json!("AUTHENTICATED_APP"), json!("MANAGE_ORDERS")]);
    assert_eq!(report.summary.state, TaskState::Satisfied);
    assert!(report.plans.is_empty());
}

#[tokio::test]
async fn denied_action_leads_to_instructions() {
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&["MANAGE_PRODUCTS"]))
        .reply("Grant Permission", RawReply::with_errors([DENIED]));
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&perms_task(), &mut log).await;

    assert_eq!(report.summary.state, TaskState::Instructed);
    assert_eq!(report.summary.denied_items(), vec!["AUTHENTICATED_APP", "MANAGE_ORDERS"]);
    assert_eq!(report.plans.len(), 2);
    for plan in &report.plans {
        assert_eq!(plan.mutation.operation_name, "GrantPermission");
        assert!(!plan.human_steps.is_empty());
        assert_eq!(plan.reasons, vec![DENIED]);
    }
    assert_eq!(log.count(EventStatus::Warning), 2);
}

#[tokio::test]
async fn denied_run_writes_a_remediation_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(ArtifactPaths::in_dir(dir.path()));
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&["MANAGE_PRODUCTS"]))
        .reply("Grant Permission", RawReply::with_errors([DENIED]));
    let cfg = config_for(vec![perms_task()]);

    let res = run_session(&cfg, &t, &store, RunOptions::default(), &[], CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(res.outcome.exit_code(), 0);
    assert_eq!(res.written.len(), 3);
    let md = std::fs::read_to_string(dir.path().join("remediation.md")).unwrap();
    assert!(md.contains("GrantPermission"));
    assert!(md.contains("1. Grant the acting credential"));
    assert!(md.contains("${SALEOR_STAFF_TOKEN}"));
    let report = std::fs::read_to_string(dir.path().join("recon_report.md")).unwrap();
    assert!(report.contains("## Summary"));
    assert!(report.contains("**app-permissions:** INSTRUCTED"));
}

#[tokio::test]
async fn probe_timeout_aborts_with_one_error() {
    let t = ScriptedTransport::new().fail("Check Permissions", TransportError::Timeout { timeout_ms: 100 });
    let mut log = RunLog::new();
    let outcome = Reconciler::new(&t, RunOptions::default())
        .run(None, &[perms_task()], &mut log)
        .await;

    let summary = &outcome.tasks[0].summary;
    assert_eq!(summary.state, TaskState::Aborted);
    assert_eq!(summary.abort_reason, Some(AbortReason::Transport));
    assert_eq!(RunSummary::from_events(log.events()).errors(), 1);
    assert_ne!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn satisfied_checklist_makes_no_attempts() {
    let t = ScriptedTransport::new().reply(
        "Check Permissions",
        permissions(&["AUTHENTICATED_APP", "MANAGE_PRODUCTS", "MANAGE_ORDERS", "MANAGE_USERS"]),
    );
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&perms_task(), &mut log).await;

    assert_eq!(report.summary.state, TaskState::Satisfied);
    assert_eq!(t.sent_labels(), vec!["Check Permissions"]);
    assert!(log.events().iter().all(|e| e.action != "Grant Permission"));
    let gap = report.summary.gap.unwrap();
    assert!(gap.extra.contains("MANAGE_USERS"));
}

#[tokio::test]
async fn empty_probe_is_not_fatal() {
    let t = ScriptedTransport::new().reply("Check Permissions", RawReply::with_data(json!({"app": null})));
    let mut log = RunLog::new();
    let outcome = Reconciler::new(&t, RunOptions::default())
        .run(None, &[perms_task()], &mut log)
        .await;
    assert_eq!(outcome.tasks[0].summary.abort_reason, Some(AbortReason::NothingToReconcile));
    assert_eq!(log.count(EventStatus::Error), 0);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn probe_failure_is_fatal() {
    let t = ScriptedTransport::new().reply("Check Permissions", RawReply::with_errors(["Cannot query field \"app\""]));
    let mut log = RunLog::new();
    let outcome = Reconciler::new(&t, RunOptions::default())
        .run(None, &[perms_task()], &mut log)
        .await;
    assert_eq!(outcome.tasks[0].summary.abort_reason, Some(AbortReason::ProbeFailed));
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn failed_item_does_not_stop_the_others() {
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&["MANAGE_PRODUCTS"]))
        .reply(
            "Grant Permission",
            RawReply::with_data(json!({"grant": {"ok": false, "errors": [{"message": "Unknown code"}]}})),
        )
        .reply("Grant Permission", granted());
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&perms_task(), &mut log).await;

    assert_eq!(report.summary.state, TaskState::Partial);
    assert_eq!(report.summary.items.len(), 2);
    assert!(report.summary.items[0].outcome.is_failed());
    assert!(!report.summary.items[1].outcome.is_failed());
}

#[tokio::test]
async fn transport_failure_mid_task_stops_remaining_items() {
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&[]))
        .reply("Grant Permission", granted())
        .fail("Grant Permission", TransportError::Status { status: 502, body: "bad gateway".into() });
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&perms_task(), &mut log).await;

    assert_eq!(report.summary.state, TaskState::Aborted);
    assert_eq!(report.summary.items.len(), 1);
    let grants = t.sent_labels().iter().filter(|l| *l == "Grant Permission").count();
    assert_eq!(grants, 2);
}

#[tokio::test]
async fn dry_run_simulates_without_sending_mutations() {
    let t = ScriptedTransport::new().reply("Check Permissions", permissions(&["MANAGE_PRODUCTS"]));
    let mut log = RunLog::new();
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let outcome = Reconciler::new(&t, options).run(None, &[perms_task()], &mut log).await;

    assert_eq!(outcome.tasks[0].summary.state, TaskState::Simulated);
    assert_eq!(log.count(EventStatus::Simulated), 2);
    assert_eq!(t.sent_labels(), vec!["Check Permissions"]);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn denied_probe_simulates_then_instructs_with_placeholders() {
    let mut task = perms_task();
    task.remediation = Some(RemediationTemplate {
        steps: vec!["Open app {{app_id}} and enable {{items_list}}".into()],
        operation: Some("mutation UpdateAppPermissions($id: ID!, $p: [PermissionEnum!]!) { appUpdate(id: $id, input: {permissions: $p}) { errors { message } } }".into()),
        variables: json!({"id": "{{app_id}}", "p": "{{items}}"}),
        privileged: true,
    });
    task.discover = vec![DiscoverSpec {
        name: "app_id".into(),
        label: "Find App ID".into(),
        operation: "query { apps(first: 20) { edges { node { id name } } } }".into(),
        data_key: "apps".into(),
        records_path: Some("edges".into()),
        value_field: "id".into(),
        match_field: None,
        match_any: vec![],
        privileged: false,
    }];
    let t = ScriptedTransport::new()
        .reply("Find App ID", RawReply::with_errors(["You need one of the following permissions: MANAGE_APPS"]))
        .reply("Check Permissions", RawReply::with_errors(["Unauthorized request"]));
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&task, &mut log).await;

    assert_eq!(report.summary.state, TaskState::Instructed);
    assert_eq!(log.count(EventStatus::Simulated), 3);
    assert_eq!(report.plans.len(), 1);
    let plan = &report.plans[0];
    assert_eq!(plan.mutation.operation_name, "UpdateAppPermissions");
    assert_eq!(plan.mutation.placeholders, vec!["<APP_ID>"]);
    assert_eq!(plan.denied_items.len(), 3);
    assert_eq!(plan.human_steps[0], "Open app <APP_ID> and enable AUTHENTICATED_APP, MANAGE_PRODUCTS, MANAGE_ORDERS");
}

#[tokio::test]
async fn discovered_value_fills_the_plan() {
    let mut task = perms_task();
    task.action = None;
    task.remediation = Some(RemediationTemplate {
        steps: vec![],
        operation: Some("mutation UpdateAppPermissions($id: ID!) { appUpdate(id: $id) { errors { message } } }".into()),
        variables: json!({"id": "{{app_id}}"}),
        privileged: true,
    });
    task.discover = vec![DiscoverSpec {
        name: "app_id".into(),
        label: "Find App ID".into(),
        operation: "query { apps(first: 20) { edges { node { id name } } } }".into(),
        data_key: "apps".into(),
        records_path: Some("edges".into()),
        value_field: "id".into(),
        match_field: Some("name".into()),
        match_any: vec!["restaurant".into()],
        privileged: false,
    }];
    let t = ScriptedTransport::new()
        .reply(
            "Find App ID",
            RawReply::with_data(json!({"apps": {"edges": [{"node": {"id": "QXBwOjc=", "name": "Restaurant Bot"}}]}})),
        )
        .reply("Check Permissions", permissions(&["MANAGE_PRODUCTS"]));
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&task, &mut log).await;

    assert_eq!(report.summary.state, TaskState::Instructed);
    assert_eq!(report.plans[0].mutation.variables, json!({"id": "QXBwOjc="}));
    assert!(report.plans[0].mutation.placeholders.is_empty());
}

#[tokio::test]
async fn failed_preflight_skips_every_task() {
    let t = ScriptedTransport::new().fail("Test Connection", TransportError::Network("connection refused".into()));
    let preflight = QuerySpec {
        label: "Test Connection".into(),
        operation: "query { shop { name } }".into(),
        data_key: "shop".into(),
        privileged: false,
    };
    let mut log = RunLog::new();
    let outcome = Reconciler::new(&t, RunOptions::default())
        .run(Some(&preflight), &[perms_task()], &mut log)
        .await;
    assert!(outcome.preflight_failed);
    assert!(outcome.tasks.is_empty());
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(t.sent_labels(), vec!["Test Connection"]);
}

#[tokio::test]
async fn cancellation_is_checked_before_each_task() {
    let t = ScriptedTransport::new();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut log = RunLog::new();
    let outcome = Reconciler::new(&t, RunOptions::default())
        .with_cancel(cancel)
        .run(None, &[perms_task()], &mut log)
        .await;
    assert!(outcome.cancelled);
    assert!(outcome.tasks.is_empty());
    assert_eq!(outcome.exit_code(), 130);
    assert!(t.sent().is_empty());
}

#[tokio::test]
async fn http_timeout_ends_the_run_non_zero() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(vec![perms_task()]);
    cfg.endpoint.url = server.uri();
    cfg.endpoint.timeout_ms = 100;
    let transport = http_transport(&cfg, CredentialBundle::new().with_header("Authorization", "Bearer t")).unwrap();
    let store = FsArtifactStore::new(ArtifactPaths::in_dir(dir.path()));

    let res = run_session(&cfg, &transport, &store, RunOptions::default(), &[], CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(res.outcome.tasks[0].summary.state, TaskState::Aborted);
    assert_eq!(res.log.count(EventStatus::Error), 1);
    assert_eq!(res.outcome.exit_code(), 1);
    assert!(!dir.path().join("remediation.md").exists());
}

#[tokio::test]
async fn failed_item_keeps_the_task_partial_even_with_denials() {
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&[]))
        .reply(
            "Grant Permission",
            RawReply::with_data(json!({"grant": {"ok": false, "errors": [{"message": "Unknown code"}]}})),
        )
        .reply("Grant Permission", granted())
        .reply("Grant Permission", RawReply::with_errors([DENIED]));
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&perms_task(), &mut log).await;

    assert_eq!(report.summary.state, TaskState::Partial);
    let statuses: Vec<_> = report.summary.items.iter().map(|r| (r.item.as_str(), r.outcome.status())).collect();
    assert_eq!(
        statuses,
        vec![
            ("AUTHENTICATED_APP", EventStatus::Error),
            ("MANAGE_PRODUCTS", EventStatus::Success),
            ("MANAGE_ORDERS", EventStatus::Warning),
        ]
    );
    assert_eq!(report.plans.len(), 1);
    assert_eq!(report.plans[0].denied_items, vec!["MANAGE_ORDERS"]);
    assert!(!report.summary.is_fatal());
}

#[tokio::test]
async fn executed_then_denied_items_are_reported_separately() {
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&["MANAGE_PRODUCTS"]))
        .reply("Grant Permission", granted())
        .reply("Grant Permission", RawReply::with_errors([DENIED]));
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, RunOptions::default()).reconcile(&perms_task(), &mut log).await;

    let grants: Vec<_> = log
        .events()
        .iter()
        .filter(|e| e.action == "Grant Permission")
        .map(|e| (e.status, e.message.clone()))
        .collect();
    assert_eq!(grants.len(), 2);
    assert_eq!(grants[0].0, EventStatus::Success);
    assert!(grants[0].1.contains("AUTHENTICATED_APP"));
    assert_eq!(grants[1].0, EventStatus::Warning);
    assert!(grants[1].1.contains("MANAGE_ORDERS"));

    assert_eq!(report.summary.items.len(), 2);
    assert_eq!(report.plans.len(), 1);
    assert_eq!(report.plans[0].denied_items, vec!["MANAGE_ORDERS"]);
    assert_eq!(report.summary.state, TaskState::Instructed);
}

#[tokio::test(start_paused = true)]
async fn actions_are_paced_by_the_configured_delay() {
    let delay = Duration::from_millis(500);
    let options = RunOptions {
        inter_action_delay: delay,
        ..RunOptions::default()
    };

    // three missing items: two gaps between them
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&[]))
        .reply("Grant Permission", granted());
    let start = tokio::time::Instant::now();
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, options.clone()).reconcile(&perms_task(), &mut log).await;
    assert_eq!(report.summary.items.len(), 3);
    assert_eq!(start.elapsed(), delay * 2);

    // a single missing item never waits
    let t = ScriptedTransport::new()
        .reply("Check Permissions", permissions(&["AUTHENTICATED_APP", "MANAGE_PRODUCTS"]))
        .reply("Grant Permission", granted());
    let start = tokio::time::Instant::now();
    let mut log = RunLog::new();
    let report = Reconciler::new(&t, options).reconcile(&perms_task(), &mut log).await;
    assert_eq!(report.summary.items.len(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}
