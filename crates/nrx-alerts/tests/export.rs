use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use nrx_alerts::{
    AlertsError, AlertsResult, Condition, DetailEnricher, LocalStore, OutputMode, Policy,
    RunConfig, Scraper, TemplateScraper, fetch_conditions, fetch_detail, fetch_policies, run,
};
use nrx_graphql::{GraphqlClient, GraphqlClientBuilder, GraphqlClientError, RetryPolicy};

const FAST_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_millis(1));
const CSV_HEADER_LINE: &str = "conditionId,conditionName,policyId,policyName,entityGuid,nrqlQuery\n";

type Pages = Vec<(Option<&'static str>, Value)>;

/// Fake NerdGraph: routes on the query text, then on the cursor or
/// condition id.
#[derive(Default)]
struct NerdGraph {
    policy_pages: Pages,
    condition_pages: Pages,
    details: HashMap<String, ResponseTemplate>,
    detail_calls: Arc<AtomicUsize>,
}

impl NerdGraph {
    fn policies(mut self, cursor: Option<&'static str>, policies: Value, next: Value) -> Self {
        self.policy_pages.push((
            cursor,
            json!({"data": {"actor": {"account": {"alerts": {"policiesSearch": {
                "policies": policies,
                "nextCursor": next,
            }}}}}}),
        ));
        self
    }

    fn entities(mut self, cursor: Option<&'static str>, entities: Value, next: Value) -> Self {
        self.condition_pages.push((
            cursor,
            json!({"data": {"actor": {"entitySearch": {"results": {
                "entities": entities,
                "nextCursor": next,
            }}}}}),
        ));
        self
    }

    fn detail(self, id: &str, query: &str) -> Self {
        self.detail_json(
            id,
            json!({"data": {"actor": {"account": {"alerts": {"nrqlCondition": {
                "id": id,
                "name": "ignored",
                "nrql": {"query": query},
                "enabled": true,
                "type": "STATIC",
            }}}}}}),
        )
    }

    fn not_found(self, id: &str) -> Self {
        self.detail_error(id, "Not Found")
    }

    fn detail_error(self, id: &str, message: &str) -> Self {
        self.detail_json(
            id,
            json!({
                "data": {"actor": {"account": {"alerts": {"nrqlCondition": null}}}},
                "errors": [{"message": message, "path": ["actor", "account", "alerts", "nrqlCondition"]}],
            }),
        )
    }

    fn detail_json(self, id: &str, body: Value) -> Self {
        self.detail_reply(id, ResponseTemplate::new(200).set_body_json(body))
    }

    fn detail_reply(mut self, id: &str, reply: ResponseTemplate) -> Self {
        self.details.insert(id.to_string(), reply);
        self
    }

    fn page(pages: &Pages, cursor: Option<&str>) -> Value {
        pages
            .iter()
            .find(|(key, _)| *key == cursor)
            .map(|(_, page)| page.clone())
            .unwrap_or_else(|| json!({"errors": [{"message": "unknown cursor"}]}))
    }
}

impl Respond for NerdGraph {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("json body");
        let query = body["query"].as_str().expect("query text");
        let variables = &body["variables"];
        let cursor = variables.get("cursor").and_then(Value::as_str);

        let reply = if query.contains("policiesSearch") {
            Self::page(&self.policy_pages, cursor)
        } else if query.contains("entitySearch") {
            Self::page(&self.condition_pages, cursor)
        } else if query.contains("nrqlCondition") {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            let id = variables["conditionId"].as_str().expect("condition id");
            return self.details.get(id).cloned().unwrap_or_else(|| {
                ResponseTemplate::new(200)
                    .set_body_json(json!({"errors": [{"message": "Not Found"}]}))
            });
        } else {
            json!({"errors": [{"message": "unexpected query"}]})
        };
        ResponseTemplate::new(200).set_body_json(reply)
    }
}

fn entity(guid: &str, name: &str, id: &str, policy_id: &str) -> Value {
    json!({
        "guid": guid,
        "accountId": 7,
        "type": "CONDITION",
        "name": name,
        "tags": [
            {"key": "id", "values": [id]},
            {"key": "policyId", "values": [policy_id]},
        ],
    })
}

fn policy(id: &str, name: &str) -> Value {
    json!({"id": id, "name": name, "accountId": 7, "incidentPreference": "PER_POLICY"})
}

async fn serve(graph: NerdGraph) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(graph)
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer, output_dir: &Path, mode: OutputMode) -> RunConfig {
    let mut config = RunConfig::new(7, "test-key");
    config.endpoint = server.uri();
    config.output_dir = output_dir.to_path_buf();
    config.mode = mode;
    config.retry = FAST_RETRY;
    config
}

fn client(server: &MockServer) -> GraphqlClient {
    config(server, Path::new("."), OutputMode::Csv)
        .client_builder()
        .expect("builder")
        .build()
        .expect("client")
}

fn tf_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".tf"))
        .collect();
    names.sort();
    names
}

fn single_policy_graph() -> NerdGraph {
    NerdGraph::default()
        .policies(None, json!([policy("42", "P")]), Value::Null)
        .entities(None, json!([entity("G1", "C", "100", "42")]), Value::Null)
        .detail("100", "SELECT 1")
}

#[tokio::test]
async fn single_policy_single_condition_csv() {
    let server = serve(single_policy_graph()).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let summary = run(
        &config(&server, dir.path(), OutputMode::Csv),
        Arc::new(TemplateScraper),
    )
    .await
    .expect("run");

    assert_eq!(summary.collect.enrich.enriched, 1);
    let csv = std::fs::read_to_string(dir.path().join("alerts_7.csv")).expect("csv");
    assert_eq!(csv, format!("{CSV_HEADER_LINE}100,C,42,P,G1,SELECT 1\n"));
    assert!(tf_files(dir.path()).is_empty());
}

#[tokio::test]
async fn single_policy_terraform() {
    let server = serve(single_policy_graph()).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let summary = run(
        &config(&server, dir.path(), OutputMode::Terraform),
        Arc::new(TemplateScraper),
    )
    .await
    .expect("run");

    assert_eq!(tf_files(dir.path()), vec!["policy_42.tf".to_string()]);
    let stats = summary.terraform.expect("terraform stats");
    assert_eq!(stats.snippets, 1);

    let text = std::fs::read_to_string(dir.path().join("policy_42.tf")).expect("tf");
    assert!(text.starts_with(
        "resource \"newrelic_alert_policy\" \"policy_42\" {\n  account_id = 7\n  policy_id = 42\n  \
         name = \"P\"\n  incident_preference = \"PER_POLICY\"\n}\n\n"
    ));
    assert!(text.contains("resource \"newrelic_nrql_alert_condition\" \"condition_100\""));
    assert!(text.contains("query = \"SELECT 1\""));
    assert!(text.ends_with("}\n\n\n"));
}

#[tokio::test]
async fn policy_pagination_follows_cursor() {
    let graph = NerdGraph::default()
        .policies(None, json!([policy("1", "one")]), json!("abc"))
        .policies(Some("abc"), json!([policy("2", "two")]), Value::Null);
    let server = serve(graph).await;

    let mut store = LocalStore::new(7);
    let stats = fetch_policies(&client(&server), &mut store, None).await;

    assert_eq!(stats.pages, 2);
    assert_eq!(store.policy_ids(), &[1, 2]);
}

#[tokio::test]
async fn orphan_condition_is_dropped() {
    let graph = NerdGraph::default()
        .policies(None, json!([policy("10", "ten")]), Value::Null)
        .entities(None, json!([entity("G5", "orphan", "5", "999")]), Value::Null);
    let server = serve(graph).await;
    let client = client(&server);

    let mut store = LocalStore::new(7);
    fetch_policies(&client, &mut store, None).await;
    let stats = fetch_conditions(&client, &mut store, None).await;

    assert_eq!(stats.orphaned, 1);
    assert_eq!(stats.linked, 0);
    assert!(store.conditions().is_empty());
    assert!(store.policy(10).expect("policy").condition_ids.is_empty());
}

#[tokio::test]
async fn malformed_tags_are_rejected() {
    let three_tags = json!({
        "guid": "G1", "accountId": 7, "type": "CONDITION", "name": "three",
        "tags": [
            {"key": "id", "values": ["1"]},
            {"key": "policyId", "values": ["10"]},
            {"key": "extra", "values": ["x"]},
        ],
    });
    let two_values = json!({
        "guid": "G2", "accountId": 7, "type": "CONDITION", "name": "two values",
        "tags": [
            {"key": "id", "values": ["2", "3"]},
            {"key": "policyId", "values": ["10"]},
        ],
    });
    let graph = NerdGraph::default()
        .policies(None, json!([policy("10", "ten")]), Value::Null)
        .entities(None, json!([three_tags, two_values]), Value::Null);
    let server = serve(graph).await;
    let client = client(&server);

    let mut store = LocalStore::new(7);
    fetch_policies(&client, &mut store, None).await;
    let stats = fetch_conditions(&client, &mut store, None).await;

    assert_eq!(stats.invalid, 2);
    assert!(store.conditions().is_empty());
}

#[tokio::test]
async fn not_found_detail_leaves_query_empty() {
    let graph = NerdGraph::default()
        .policies(None, json!([policy("1", "P")]), Value::Null)
        .entities(
            None,
            json!([entity("G1", "first", "1", "1"), entity("G2", "second", "2", "1")]),
            Value::Null,
        )
        .not_found("1")
        .detail("2", "SELECT 2");
    let detail_calls = Arc::clone(&graph.detail_calls);
    let server = serve(graph).await;
    let client = client(&server);

    let mut store = LocalStore::new(7);
    fetch_policies(&client, &mut store, None).await;
    fetch_conditions(&client, &mut store, None).await;

    let builder = config(&server, Path::new("."), OutputMode::Csv)
        .client_builder()
        .expect("builder");
    let stats = DetailEnricher::new(builder)
        .run(&mut store)
        .await
        .expect("enrich");

    assert_eq!(stats.requested, 2);
    assert_eq!(stats.enriched, 1);
    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.workers_finished, 8);
    assert_eq!(detail_calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.condition(1).expect("condition").query, "");
    assert_eq!(store.condition(2).expect("condition").query, "SELECT 2");

    let mut out = Vec::new();
    nrx_alerts::write_csv_to(&store, &mut out).expect("csv");
    let csv = String::from_utf8(out).expect("utf8");
    assert!(csv.contains("\n1,first,1,P,G1,\n"));
}

#[tokio::test]
async fn failed_detail_lookups_are_skipped() {
    let graph = NerdGraph::default()
        .policies(None, json!([policy("1", "P")]), Value::Null)
        .entities(
            None,
            json!([
                entity("G1", "boom", "1", "1"),
                entity("G2", "down", "2", "1"),
                entity("G3", "ok", "3", "1"),
                entity("G4", "missing", "4", "1"),
            ]),
            Value::Null,
        )
        .detail_error("1", "boom")
        .detail_reply("2", ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .detail("3", "SELECT 3")
        .not_found("4");
    let server = serve(graph).await;
    let client = client(&server);

    let mut store = LocalStore::new(7);
    fetch_policies(&client, &mut store, None).await;
    fetch_conditions(&client, &mut store, None).await;

    let builder = config(&server, Path::new("."), OutputMode::Csv)
        .client_builder()
        .expect("builder");
    let stats = DetailEnricher::new(builder)
        .run(&mut store)
        .await
        .expect("enrich");

    assert_eq!(stats.requested, 4);
    assert_eq!(stats.enriched, 1);
    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.unknown, 0);
    assert_eq!(stats.workers_finished, 8);
    for id in [1, 2, 4] {
        assert_eq!(store.condition(id).expect("condition").query, "", "condition {id}");
    }
    assert_eq!(store.condition(3).expect("condition").query, "SELECT 3");
}

#[tokio::test]
async fn unreachable_detail_lookup_is_retries_exhausted() {
    let client = GraphqlClientBuilder::new("http://127.0.0.1:9/graphql")
        .with_retry_policy(FAST_RETRY)
        .build()
        .expect("client");

    let err = fetch_detail(&client, 7, 100)
        .await
        .expect_err("nothing listening");
    assert!(matches!(
        err,
        GraphqlClientError::RetriesExhausted { attempts: 3, .. }
    ));
}

#[tokio::test]
async fn null_fields_do_not_drop_pages() {
    let graph = NerdGraph::default()
        .policies(
            None,
            json!([
                {"id": "1", "name": "ok", "accountId": 7, "incidentPreference": "PER_POLICY"},
                {"id": "2", "name": null, "accountId": null, "incidentPreference": null},
            ]),
            json!("abc"),
        )
        .policies(Some("abc"), json!([{"id": "3"}]), Value::Null)
        .entities(
            None,
            json!([
                entity("G1", "named", "10", "1"),
                {
                    "guid": "G2", "accountId": 7, "type": "CONDITION", "name": null,
                    "tags": [
                        {"key": "id", "values": ["20"]},
                        {"key": "policyId", "values": ["2"]},
                    ],
                },
                {"guid": "G3", "accountId": 7, "type": "CONDITION", "name": "untagged", "tags": null},
            ]),
            json!("next"),
        )
        .entities(Some("next"), json!([entity("G4", "late", "30", "3")]), Value::Null);
    let server = serve(graph).await;
    let client = client(&server);

    let mut store = LocalStore::new(7);
    let policies = fetch_policies(&client, &mut store, None).await;
    assert_eq!(policies.pages, 2);
    assert_eq!(store.policy_ids(), &[1, 2, 3]);
    assert_eq!(store.policy(2).expect("policy").name, "");

    let conditions = fetch_conditions(&client, &mut store, None).await;
    assert_eq!(conditions.pages, 2);
    assert_eq!(conditions.linked, 3);
    assert_eq!(conditions.invalid, 1);
    assert_eq!(store.policy(2).expect("policy").condition_ids, vec![20]);
    assert_eq!(store.policy(3).expect("policy").condition_ids, vec![30]);
}

#[tokio::test]
async fn zero_policies_write_header_only() {
    let graph = NerdGraph::default()
        .policies(None, json!([]), Value::Null)
        .entities(None, json!([]), Value::Null);
    let server = serve(graph).await;

    let csv_dir = tempfile::tempdir().expect("tempdir");
    run(
        &config(&server, csv_dir.path(), OutputMode::Csv),
        Arc::new(TemplateScraper),
    )
    .await
    .expect("csv run");
    let csv = std::fs::read_to_string(csv_dir.path().join("alerts_7.csv")).expect("csv");
    assert_eq!(csv, CSV_HEADER_LINE);

    let tf_dir = tempfile::tempdir().expect("tempdir");
    let summary = run(
        &config(&server, tf_dir.path(), OutputMode::Terraform),
        Arc::new(TemplateScraper),
    )
    .await
    .expect("terraform run");
    assert!(summary.files.is_empty());
    assert!(tf_files(tf_dir.path()).is_empty());
}

#[tokio::test]
async fn policy_without_conditions_still_gets_a_file() {
    let graph = NerdGraph::default()
        .policies(None, json!([policy("3", "empty"), policy("4", "full")]), Value::Null)
        .entities(None, json!([entity("G9", "c", "9", "4")]), Value::Null)
        .detail("9", "SELECT 9");
    let server = serve(graph).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let mut config = config(&server, dir.path(), OutputMode::Terraform);
    config.scrape_concurrency = 4;
    run(&config, Arc::new(TemplateScraper)).await.expect("run");

    assert_eq!(
        tf_files(dir.path()),
        vec!["policy_3.tf".to_string(), "policy_4.tf".to_string()]
    );
    let empty = std::fs::read_to_string(dir.path().join("policy_3.tf")).expect("tf");
    assert!(empty.ends_with("incident_preference = \"PER_POLICY\"\n}\n\n\n"));
    assert!(!empty.contains("newrelic_nrql_alert_condition"));
}

#[tokio::test]
async fn written_files_follow_policy_order() {
    let graph = NerdGraph::default()
        .policies(
            None,
            json!([policy("100", "a"), policy("9", "b"), policy("2", "c"), policy("10", "d")]),
            Value::Null,
        )
        .entities(None, json!([]), Value::Null);
    let server = serve(graph).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let mut config = config(&server, dir.path(), OutputMode::Terraform);
    config.scrape_concurrency = 4;
    let summary = run(&config, Arc::new(TemplateScraper)).await.expect("run");

    let names: Vec<String> = summary
        .files
        .iter()
        .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
        .collect();
    assert_eq!(
        names,
        vec!["policy_2.tf", "policy_9.tf", "policy_10.tf", "policy_100.tf"]
    );
}

#[tokio::test]
async fn csv_output_is_deterministic() {
    let graph = NerdGraph::default()
        .policies(None, json!([policy("20", "b"), policy("3", "a")]), json!(2))
        .policies(Some("2"), json!([policy("100", "c")]), Value::Null)
        .entities(
            None,
            json!([
                entity("G7", "x", "7", "100"),
                entity("G5", "y", "50", "3"),
                entity("G6", "z", "6", "3"),
                entity("G8", "w", "8", "20"),
            ]),
            Value::Null,
        )
        .detail("7", "SELECT 7")
        .detail("50", "SELECT 50")
        .detail("6", "SELECT 6")
        .detail("8", "SELECT 8");
    let server = serve(graph).await;

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let dir = tempfile::tempdir().expect("tempdir");
        run(
            &config(&server, dir.path(), OutputMode::Csv),
            Arc::new(TemplateScraper),
        )
        .await
        .expect("run");
        outputs.push(std::fs::read_to_string(dir.path().join("alerts_7.csv")).expect("csv"));
    }

    assert_eq!(outputs[0], outputs[1]);
    let ids: Vec<&str> = outputs[0]
        .lines()
        .skip(1)
        .filter_map(|line| line.split(',').next())
        .collect();
    assert_eq!(ids, vec!["6", "50", "8", "7"]);
}

struct LockedOut;

#[async_trait]
impl Scraper for LockedOut {
    async fn login(&self) -> AlertsResult<()> {
        Err(AlertsError::Scraper("bad credentials".into()))
    }

    async fn scrape_condition(&self, _: &Policy, _: &Condition) -> AlertsResult<String> {
        unreachable!("scrape after failed login")
    }

    async fn logout(&self) -> AlertsResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_login_aborts_before_writing() {
    let server = serve(single_policy_graph()).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let err = run(
        &config(&server, dir.path(), OutputMode::Terraform),
        Arc::new(LockedOut),
    )
    .await
    .expect_err("login failure");

    assert!(matches!(err, AlertsError::Scraper(_)));
    assert!(tf_files(dir.path()).is_empty());
}

/// Fails every condition whose name starts with `bad`.
#[derive(Default)]
struct Picky {
    logouts: AtomicUsize,
}

#[async_trait]
impl Scraper for Picky {
    async fn login(&self) -> AlertsResult<()> {
        Ok(())
    }

    async fn scrape_condition(&self, policy: &Policy, condition: &Condition) -> AlertsResult<String> {
        if condition.name.starts_with("bad") {
            return Err(AlertsError::Scraper(format!("no page for {}", condition.id)));
        }
        Ok(format!("# {} in {}\n", condition.id, policy.id))
    }

    async fn logout(&self) -> AlertsResult<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn scrape_failure_omits_snippet() {
    let graph = NerdGraph::default()
        .policies(None, json!([policy("42", "P")]), Value::Null)
        .entities(
            None,
            json!([entity("G1", "good", "1", "42"), entity("G2", "bad", "2", "42")]),
            Value::Null,
        )
        .detail("1", "SELECT 1")
        .detail("2", "SELECT 2");
    let server = serve(graph).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let scraper = Arc::new(Picky::default());

    let summary = run(
        &config(&server, dir.path(), OutputMode::Terraform),
        Arc::clone(&scraper) as Arc<dyn Scraper>,
    )
    .await
    .expect("run");

    let stats = summary.terraform.expect("terraform stats");
    assert_eq!(stats.snippets, 1);
    assert_eq!(stats.failed_snippets, 1);
    assert_eq!(scraper.logouts.load(Ordering::SeqCst), 1);

    let text = std::fs::read_to_string(dir.path().join("policy_42.tf")).expect("tf");
    assert!(text.ends_with("}\n\n# 1 in 42\n\n"));
}

#[tokio::test]
async fn exhausted_retries_yield_empty_inventory() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut store = LocalStore::new(7);
    let stats = fetch_policies(&client(&server), &mut store, None).await;

    assert_eq!(stats.pages, 0);
    assert!(store.policies().is_empty());
    assert!(store.policy_ids().is_empty());
}
