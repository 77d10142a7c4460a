use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use search_migration_core::config::MigrationConfig;
use search_migration_core::endpoint::Endpoint;
use search_migration_core::error::{MigrationError, TransportError};
use search_migration_core::history::HISTORY_PAGE_SIZE;
use search_migration_core::session::{EvolutionSessionFactory, SessionFactory};
use search_migration_core::transport::{Method, SearchRequest, SearchResponse, SearchTransport};
use serde_json::{json, Value};

const HISTORY_INDEX: &str = "opensearch_changelog";

#[derive(Default)]
struct ClusterState {
    indices: BTreeSet<String>,
    history: Vec<Value>,
    requests: Vec<SearchRequest>,
    failing_path: Option<String>,
    probe_status: Option<u16>,
    lose_create_race: bool,
}

/// In-memory stand-in for a search cluster, shared with the test through an
/// `Arc` so requests can be inspected after the session consumed the
/// transport.
#[derive(Clone)]
struct FakeCluster {
    endpoint: Endpoint,
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    fn new() -> Self {
        Self {
            endpoint: Endpoint::parse("http://localhost:9200").expect("endpoint"),
            state: Arc::new(Mutex::new(ClusterState::default())),
        }
    }

    fn fail_on(&self, path: &str) {
        self.state.lock().expect("poisoned mutex").failing_path = Some(path.to_string());
    }

    fn recover(&self) {
        self.state.lock().expect("poisoned mutex").failing_path = None;
    }

    fn answer_probe_with(&self, status: u16) {
        self.state.lock().expect("poisoned mutex").probe_status = Some(status);
    }

    /// The next index creation fails because another writer created it first.
    fn lose_create_race(&self) {
        self.state.lock().expect("poisoned mutex").lose_create_race = true;
    }

    fn seed_history(&self, doc: Value) {
        let mut state = self.state.lock().expect("poisoned mutex");
        state.indices.insert(HISTORY_INDEX.to_string());
        state.history.push(doc);
    }

    fn requests(&self) -> Vec<SearchRequest> {
        self.state.lock().expect("poisoned mutex").requests.clone()
    }

    fn script_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|request| !request.path.starts_with("/opensearch_changelog"))
            .map(|request| format!("{} {}", request.method.as_str(), request.path))
            .collect()
    }

    fn search_requests(&self) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|request| request.path.ends_with("/_search"))
            .map(|request| {
                serde_json::from_str(request.body.as_deref().unwrap_or("null"))
                    .expect("search body should be JSON")
            })
            .collect()
    }

    fn history(&self) -> Vec<Value> {
        self.state.lock().expect("poisoned mutex").history.clone()
    }
}

fn sort_key(doc: &Value) -> String {
    doc["version"].as_str().unwrap_or_default().to_string()
}

/// Honors the parts of a search the history reader relies on: a `term`
/// filter on `success`, keyword sort on `version`, `size` and `search_after`.
fn search_history(history: &[Value], query: &Value) -> Value {
    let only_successful = query["query"]["term"]["success"] == json!(true);
    let size = query["size"].as_u64().unwrap_or(10) as usize;
    let after = query["search_after"][0].as_str();

    let mut matching: Vec<&Value> = history
        .iter()
        .filter(|doc| !only_successful || doc["success"] == json!(true))
        .collect();
    matching.sort_by_key(|doc| sort_key(doc));

    let hits: Vec<Value> = matching
        .into_iter()
        .filter(|doc| after.map_or(true, |after| sort_key(doc).as_str() > after))
        .take(size)
        .map(|doc| {
            let source = match doc.get("version") {
                Some(version) => json!({ "version": version }),
                None => json!({}),
            };
            json!({ "_id": "doc", "_source": source, "sort": [sort_key(doc)] })
        })
        .collect();
    json!({ "hits": { "hits": hits } })
}

impl SearchTransport for FakeCluster {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn send(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
        let mut state = self.state.lock().expect("poisoned mutex");
        state.requests.push(request.clone());

        let respond = |status: u16, body: Value| {
            Ok(SearchResponse {
                status,
                body: body.to_string(),
            })
        };

        if state.failing_path.as_deref() == Some(request.path.as_str()) {
            return respond(400, json!({"error": "mapper_parsing_exception"}));
        }

        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Head, [index]) => {
                if let Some(status) = state.probe_status {
                    return respond(status, Value::Null);
                }
                let status = if state.indices.contains(*index) { 200 } else { 404 };
                respond(status, Value::Null)
            }
            (Method::Post, [_, "_search"]) => {
                let query: Value = serde_json::from_str(request.body.as_deref().unwrap_or("{}"))
                    .expect("search body should be JSON");
                respond(200, search_history(&state.history, &query))
            }
            (Method::Post, [_, "_doc?refresh=true"]) => {
                let doc: Value = serde_json::from_str(request.body.as_deref().unwrap_or("null"))
                    .expect("history document should be JSON");
                state.history.push(doc);
                respond(201, json!({ "result": "created" }))
            }
            (Method::Put, [index]) if *index == HISTORY_INDEX && state.lose_create_race => {
                state.lose_create_race = false;
                state.indices.insert(index.to_string());
                respond(
                    400,
                    json!({"error": {"type": "resource_already_exists_exception"}, "status": 400}),
                )
            }
            (Method::Put, [index]) => {
                state.indices.insert(index.to_string());
                respond(200, json!({ "acknowledged": true }))
            }
            _ => respond(200, json!({ "acknowledged": true })),
        }
    }
}

fn write_script(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).expect("script dir should be created");
    fs::write(dir.join(name), content).expect("script should be written");
}

fn config_for(locations: &[&str]) -> MigrationConfig {
    MigrationConfig {
        locations: locations.iter().map(|value| value.to_string()).collect(),
        ..MigrationConfig::default()
    }
}

#[test]
fn applies_scripts_across_locations_in_version_order() {
    let root = tempfile::tempdir().expect("tempdir");
    let base = root.path().join("opensearch_migration/base");
    let dev = root.path().join("opensearch_migration/dev");
    write_script(&base, "V1__create_template.http", "PUT /_index_template/cicd-${env}\n\n{}");
    write_script(&base, "V1.10__late.http", "PUT /late-${env}\n");
    write_script(&dev, "V1.2__dev_index.http", "PUT /dev-index\n");
    write_script(&dev, "README.md", "not a script");

    let cluster = FakeCluster::new();
    let factory = EvolutionSessionFactory::new(root.path());
    let mut session = factory
        .configure(
            config_for(&[
                "classpath:opensearch_migration/base",
                "classpath:opensearch_migration/dev",
            ]),
            Box::new(cluster.clone()),
        )
        .expect("session should be configured");

    let report = session.run().expect("migration should succeed");

    assert_eq!(report.applied, vec!["1", "1.2", "1.10"]);
    assert_eq!(
        cluster.script_requests(),
        vec![
            "PUT /_index_template/cicd-dev",
            "PUT /dev-index",
            "PUT /late-dev",
        ]
    );

    let history = cluster.history();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|doc| doc["success"] == json!(true)));
    assert_eq!(history[0]["script"], "V1__create_template.http");
    assert_eq!(history[0]["description"], "create template");
}

#[test]
fn rerun_against_fully_applied_history_is_a_noop() {
    let root = tempfile::tempdir().expect("tempdir");
    let scripts = root.path().join("scripts");
    write_script(&scripts, "V1__one.http", "PUT /one\n");
    write_script(&scripts, "V2__two.http", "PUT /two\n");

    let cluster = FakeCluster::new();
    let factory = EvolutionSessionFactory::new(root.path());

    let first = factory
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("first run should succeed");
    assert_eq!(first.applied.len(), 2);

    let second = factory
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("second run should succeed");

    assert!(second.applied.is_empty());
    assert_eq!(second.already_applied, 2);
    assert_eq!(cluster.script_requests().len(), 2);
    assert_eq!(cluster.history().len(), 2);
}

#[test]
fn disabled_session_sends_no_requests() {
    let cluster = FakeCluster::new();
    let factory = EvolutionSessionFactory::new(".");
    let config = MigrationConfig {
        enabled: false,
        ..MigrationConfig::default()
    };

    let report = factory
        .configure(config, Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("disabled run should succeed");

    assert!(!report.enabled);
    assert!(cluster.requests().is_empty());
}

#[test]
fn failed_script_is_recorded_and_stops_the_run() {
    let root = tempfile::tempdir().expect("tempdir");
    let scripts = root.path().join("scripts");
    write_script(&scripts, "V1__ok.http", "PUT /ok\n");
    write_script(&scripts, "V2__broken.http", "PUT /broken\n");
    write_script(&scripts, "V3__never.http", "PUT /never\n");

    let cluster = FakeCluster::new();
    cluster.fail_on("/broken");
    let factory = EvolutionSessionFactory::new(root.path());

    let error = factory
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect_err("broken script should fail the run");

    match error {
        MigrationError::ScriptFailed { script, status, .. } => {
            assert_eq!(script, "V2__broken.http");
            assert_eq!(status, 400);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(cluster.script_requests(), vec!["PUT /ok", "PUT /broken"]);
    let history = cluster.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["success"], json!(false));
}

#[test]
fn duplicate_versions_across_locations_are_rejected() {
    let root = tempfile::tempdir().expect("tempdir");
    write_script(&root.path().join("a"), "V1__first.http", "PUT /a\n");
    write_script(&root.path().join("b"), "V1.0__second.http", "PUT /b\n");

    let cluster = FakeCluster::new();
    let error = EvolutionSessionFactory::new(root.path())
        .configure(config_for(&["a", "b"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect_err("duplicate versions should fail");

    assert!(matches!(error, MigrationError::DuplicateVersion { .. }));
    assert!(cluster.requests().is_empty());
}

#[test]
fn missing_locations_are_skipped() {
    let root = tempfile::tempdir().expect("tempdir");
    write_script(&root.path().join("present"), "V1__only.http", "PUT /only\n");

    let cluster = FakeCluster::new();
    let report = EvolutionSessionFactory::new(root.path())
        .configure(config_for(&["absent", "present"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("run should succeed");

    assert_eq!(report.applied, vec!["1"]);
}

#[test]
fn failed_script_is_retried_on_the_next_run() {
    let root = tempfile::tempdir().expect("tempdir");
    let scripts = root.path().join("scripts");
    write_script(&scripts, "V1__ok.http", "PUT /ok\n");
    write_script(&scripts, "V2__flaky.http", "PUT /flaky\n");
    write_script(&scripts, "V3__after.http", "PUT /after\n");

    let cluster = FakeCluster::new();
    cluster.fail_on("/flaky");
    let factory = EvolutionSessionFactory::new(root.path());
    factory
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect_err("first run should fail on the flaky script");

    cluster.recover();
    let report = factory
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("second run should succeed");

    assert_eq!(report.applied, vec!["2", "3"]);
    assert_eq!(report.already_applied, 1);
    assert_eq!(
        cluster.script_requests(),
        vec!["PUT /ok", "PUT /flaky", "PUT /flaky", "PUT /after"]
    );
    let outcomes: Vec<(String, bool)> = cluster
        .history()
        .iter()
        .map(|doc| {
            (
                doc["version"].as_str().expect("version").to_string(),
                doc["success"].as_bool().expect("success"),
            )
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("1".to_string(), true),
            ("2".to_string(), false),
            ("2".to_string(), true),
            ("3".to_string(), true),
        ]
    );
}

#[test]
fn scripts_behind_latest_applied_are_skipped_without_out_of_order() {
    let root = tempfile::tempdir().expect("tempdir");
    let scripts = root.path().join("scripts");
    write_script(&scripts, "V1__one.http", "PUT /one\n");
    write_script(&scripts, "V3__three.http", "PUT /three\n");

    let cluster = FakeCluster::new();
    let factory = EvolutionSessionFactory::new(root.path());
    factory
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("first run should succeed");

    write_script(&scripts, "V2__two.http", "PUT /two\n");
    let config = MigrationConfig {
        out_of_order: false,
        ..config_for(&["scripts"])
    };
    let report = factory
        .configure(config, Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("second run should succeed");

    assert_eq!(report.skipped, vec!["2"]);
    assert!(report.applied.is_empty());
    assert_eq!(report.already_applied, 2);
    assert_eq!(cluster.script_requests(), vec!["PUT /one", "PUT /three"]);
}

#[test]
fn validation_rejects_applied_versions_without_local_script() {
    let root = tempfile::tempdir().expect("tempdir");
    write_script(&root.path().join("scripts"), "V1__one.http", "PUT /one\n");

    let cluster = FakeCluster::new();
    cluster.seed_history(json!({ "version": "5", "script": "V5__gone.http", "success": true }));
    let config = MigrationConfig {
        validate_on_migrate: true,
        ..config_for(&["scripts"])
    };

    let error = EvolutionSessionFactory::new(root.path())
        .configure(config, Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect_err("validation should fail");

    match error {
        MigrationError::Validation(message) => assert!(message.contains('5')),
        other => panic!("unexpected error: {other}"),
    }
    assert!(cluster.script_requests().is_empty());
}

#[test]
fn unexpected_history_probe_status_fails_the_run() {
    let root = tempfile::tempdir().expect("tempdir");
    write_script(&root.path().join("scripts"), "V1__one.http", "PUT /one\n");

    let cluster = FakeCluster::new();
    cluster.answer_probe_with(503);

    let error = EvolutionSessionFactory::new(root.path())
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect_err("probe failure should fail the run");

    match error {
        MigrationError::History { index, message } => {
            assert_eq!(index, HISTORY_INDEX);
            assert!(message.contains("503"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cluster.requests().len(), 1);
}

#[test]
fn concurrently_created_history_index_is_accepted() {
    let root = tempfile::tempdir().expect("tempdir");
    write_script(&root.path().join("scripts"), "V1__one.http", "PUT /one\n");

    let cluster = FakeCluster::new();
    cluster.lose_create_race();

    let report = EvolutionSessionFactory::new(root.path())
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("run should succeed");

    assert_eq!(report.applied, vec!["1"]);
}

#[test]
fn history_reads_only_successful_versions() {
    let root = tempfile::tempdir().expect("tempdir");
    write_script(&root.path().join("scripts"), "V1__one.http", "PUT /one\n");

    let cluster = FakeCluster::new();
    cluster.seed_history(json!({ "version": "1", "success": false }));

    let report = EvolutionSessionFactory::new(root.path())
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("run should succeed");

    assert_eq!(report.applied, vec!["1"]);
    let search = &cluster.search_requests()[0];
    assert_eq!(search["query"], json!({ "term": { "success": true } }));
    assert_eq!(search["_source"], json!(["version"]));
}

#[test]
fn foreign_history_documents_are_ignored() {
    let root = tempfile::tempdir().expect("tempdir");
    let scripts = root.path().join("scripts");
    write_script(&scripts, "V1__one.http", "PUT /one\n");
    write_script(&scripts, "V2__two.http", "PUT /two\n");

    let cluster = FakeCluster::new();
    cluster.seed_history(json!({ "note": "added by hand", "success": true }));
    cluster.seed_history(json!({ "version": "not-a-version", "success": true }));
    cluster.seed_history(json!({ "version": "1", "success": true }));

    let report = EvolutionSessionFactory::new(root.path())
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("run should succeed");

    assert_eq!(report.applied, vec!["2"]);
    assert_eq!(report.already_applied, 1);
}

#[test]
fn large_history_is_read_page_by_page() {
    let root = tempfile::tempdir().expect("tempdir");
    let scripts = root.path().join("scripts");
    write_script(&scripts, "V1.1500__late.http", "PUT /late\n");
    write_script(&scripts, "V9__new.http", "PUT /new\n");

    let cluster = FakeCluster::new();
    for minor in 1..=HISTORY_PAGE_SIZE + 600 {
        cluster.seed_history(json!({ "version": format!("1.{minor}"), "success": true }));
    }
    for _ in 0..50 {
        cluster.seed_history(json!({ "version": "9", "success": false }));
    }

    let report = EvolutionSessionFactory::new(root.path())
        .configure(config_for(&["scripts"]), Box::new(cluster.clone()))
        .expect("session")
        .run()
        .expect("run should succeed");

    assert_eq!(report.applied, vec!["9"]);
    assert_eq!(report.already_applied, 1);
    assert_eq!(cluster.script_requests(), vec!["PUT /new"]);

    let searches = cluster.search_requests();
    assert_eq!(searches.len(), 2);
    assert!(searches[0].get("search_after").is_none());
    assert!(searches[1]["search_after"].is_array());
}
