use fcli_config::BackendConfig;
use fcli_connectors::{HttpRequestHelper, RequestHelpers};
use fcli_core::{ProductKind, ResultIndicator};
use fcli_runtime::{
    parse_str, ActionError, ActionRunner, CollectingSink, OutputRecord, ProgressReporter,
};
use httpmock::prelude::*;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

fn helpers(name: &str, config: BackendConfig) -> RequestHelpers {
    RequestHelpers::new().with(Arc::new(HttpRequestHelper::from_config(name, &config).unwrap()))
}

fn runner_for(helpers: RequestHelpers) -> (ActionRunner, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let runner = ActionRunner::new(helpers).unwrap().with_sink(sink.clone());
    (runner, sink)
}

fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[derive(Debug, Default)]
struct RecordingProgress {
    messages: Mutex<Vec<String>>,
}

impl ProgressReporter for RecordingProgress {
    fn progress(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("WARN {}", message));
    }
}

const RELEASE_SUMMARY: &str = r#"
name: release-summary
parameters:
  - name: release
steps:
  - type: request
    name: rel
    target: fod
    uri: /api/v3/releases/lookup
    query:
      filters: releaseName:${params.release}
  - type: write_output
    output: main
    record:
      id: ${rel.id}
      name: ${rel.name}
outputs:
  main: ${record}
"#;

#[tokio::test]
async fn single_request_feeds_one_output_record() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/fod/api/v3/releases/lookup")
            .query_param("filters", "releaseName:APP:1.0")
            .header("Authorization", "Bearer tok");
        then.status(200)
            .json_body(json!({"id": 42, "name": "1.0", "applicationName": "APP"}));
    });

    let config = BackendConfig::new(server.url("/fod"))
        .with_product(ProductKind::Fod)
        .with_token("tok");
    let (runner, sink) = runner_for(helpers("fod", config));
    let document = parse_str(RELEASE_SUMMARY, None).unwrap();
    let summary = runner
        .run(&document, params(&[("release", json!("APP:1.0"))]))
        .await
        .unwrap();

    mock.assert();
    assert_eq!(
        sink.records(),
        vec![OutputRecord {
            output: "main".into(),
            record: json!({"id": 42, "name": "1.0"}),
            result: None,
        }]
    );
    assert_eq!(summary.records, 1);
    assert_eq!(summary.exit_code(), 0);
}

const VERSIONS: &str = r#"
name: versions
config:
  default_target: ssc
steps:
  - type: request
    name: versions
    uri: /api/v1/projectVersions/${id}
    for_each:
      items: ${[1, 2, 3]}
      as: id
    output: versions
  - type: write_output
    output: summary
    record:
      versions: ${versions}
outputs:
  versions: ${record}
  summary: ${record}
"#;

fn mock_bulk_with_failure(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path("/ssc/api/v1/bulk");
        then.status(200).json_body(json!({"data": [
            {"request": {}, "responses": [{"body": {"data": {"id": 1}, "responseCode": 200}}]},
            {"request": {}, "responses": [{"body": {"message": "boom", "responseCode": 500}}]},
            {"request": {}, "responses": [{"body": {"data": {"id": 3}, "responseCode": 200}}]}
        ]}));
    })
}

#[tokio::test]
async fn bulk_partial_failure_is_isolated_to_its_record() {
    let server = MockServer::start();
    let bulk = mock_bulk_with_failure(&server);

    let (runner, sink) = runner_for(helpers("ssc", BackendConfig::new(server.url("/ssc"))));
    let document = parse_str(VERSIONS, None).unwrap();
    let summary = runner.run(&document, Map::new()).await.unwrap();

    bulk.assert_hits(1);
    let records = sink.by_output("versions");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].record, json!({"id": 1}));
    assert_eq!(records[0].result, Some(ResultIndicator::success()));
    assert_eq!(records[1].result, Some(ResultIndicator::failed()));
    assert_eq!(records[1].record["item"], json!(2));
    assert_eq!(records[1].record["error"]["status"], json!(500));
    assert_eq!(records[1].record["error"]["message"], json!("boom"));
    assert_eq!(records[2].record, json!({"id": 3}));

    let summary_record = &sink.by_output("summary")[0];
    assert_eq!(summary_record.record, json!({"versions": [{"id": 1}, null, {"id": 3}]}));

    assert_eq!(summary.failed_items, 1);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn strict_runs_fail_on_per_item_failures() {
    let server = MockServer::start();
    mock_bulk_with_failure(&server);

    let (runner, _sink) = runner_for(helpers("ssc", BackendConfig::new(server.url("/ssc"))));
    let document = parse_str(VERSIONS, None).unwrap();
    let summary = runner.with_strict(true).run(&document, Map::new()).await.unwrap();
    assert_eq!(summary.exit_code(), fcli_runtime::EXIT_STRICT_FAILURES);
}

#[tokio::test]
async fn bulk_and_sequential_dispatch_bind_the_same_results() {
    let bulk_server = MockServer::start();
    mock_bulk_with_failure(&bulk_server);
    let (bulk_runner, bulk_sink) = runner_for(helpers("ssc", BackendConfig::new(bulk_server.url("/ssc"))));

    let seq_server = MockServer::start();
    for id in [1, 3] {
        seq_server.mock(|when, then| {
            when.method(GET).path(format!("/ssc/api/v1/projectVersions/{}", id));
            then.status(200).json_body(json!({"data": {"id": id}, "responseCode": 200}));
        });
    }
    seq_server.mock(|when, then| {
        when.method(GET).path("/ssc/api/v1/projectVersions/2");
        then.status(500).json_body(json!({"message": "boom", "responseCode": 500}));
    });
    let seq_config = BackendConfig::new(seq_server.url("/ssc")).with_bulk(false);
    let (seq_runner, seq_sink) = runner_for(helpers("ssc", seq_config));

    let document = parse_str(VERSIONS, None).unwrap();
    bulk_runner.run(&document, Map::new()).await.unwrap();
    seq_runner.run(&document, Map::new()).await.unwrap();

    let strip = |records: Vec<OutputRecord>| {
        records
            .into_iter()
            .map(|mut r| {
                // failure bodies differ in transport detail, the rest must match
                if let Some(error) = r.record.get_mut("error") {
                    error["body"] = Value::Null;
                }
                r
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(bulk_sink.records()), strip(seq_sink.records()));
}

#[tokio::test]
async fn transport_failures_are_fatal_with_step_location() {
    let config = BackendConfig::new("http://127.0.0.1:1").with_product(ProductKind::Fod);
    let (runner, sink) = runner_for(helpers("fod", config));
    let document = parse_str(RELEASE_SUMMARY, None).unwrap();
    let err = runner
        .run(&document, params(&[("release", json!("x"))]))
        .await
        .unwrap_err();

    assert!(err.is_transport(), "{}", err);
    assert!(matches!(err, ActionError::Step { index: 0, .. }));
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn tolerated_transport_failure_fails_the_remaining_items() {
    let config = BackendConfig::new("http://127.0.0.1:1")
        .with_product(ProductKind::Ssc)
        .with_bulk(false);
    let (runner, sink) = runner_for(helpers("ssc", config));
    let document = parse_str(
        r#"
name: tolerant
steps:
  - type: request
    name: versions
    target: ssc
    uri: /api/v1/projectVersions/${id}
    for_each:
      items: [1, 2]
      as: id
    output: versions
    continue_on_error: true
outputs:
  versions: ${record}
"#,
        None,
    )
    .unwrap();
    let summary = runner.run(&document, Map::new()).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.result == Some(ResultIndicator::failed())));
    assert_eq!(records[1].record["item"], json!(2));
    assert_eq!(records[1].record["error"]["status"], Value::Null);
    assert_eq!(summary.failed_items, 2);
}

#[tokio::test]
async fn request_failures_reach_on_fail_or_abort() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fod/api/v3/releases/lookup");
        then.status(404).json_body(json!({"message": "no such release"}));
    });
    let config = BackendConfig::new(server.url("/fod")).with_product(ProductKind::Fod);

    let (runner, _) = runner_for(helpers("fod", config.clone()));
    let err = runner
        .run(
            &parse_str(RELEASE_SUMMARY, None).unwrap(),
            params(&[("release", json!("x"))]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), ActionError::Request(m) if m.contains("no such release")));

    let (runner, sink) = runner_for(helpers("fod", config));
    let handled = parse_str(
        r#"
name: handled
steps:
  - type: request
    name: rel
    target: fod
    uri: /api/v3/releases/lookup
    on_fail:
      - type: write_output
        output: main
        record: ${rel_error.status}
        result: MISSING
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    let summary = runner.run(&handled, Map::new()).await.unwrap();
    assert_eq!(summary.failed_items, 0);
    assert_eq!(sink.records()[0].record, json!(404));
    assert_eq!(sink.records()[0].result, Some(ResultIndicator::new("MISSING")));
}

const RELEASE_LOOP: &str = r#"
name: release-loop
steps:
  - type: for_each
    items: [1, 2, 3]
    as: id
    steps:
      - type: request
        name: rel
        target: fod
        uri: /api/v3/releases/${id}
        OUTPUT
outputs:
  main: ${record}
"#;

#[tokio::test]
async fn failed_request_inside_a_loop_stops_the_run() {
    let server = MockServer::start();
    let found: Vec<_> = [1, 3]
        .into_iter()
        .map(|id| {
            server.mock(|when, then| {
                when.method(GET).path(format!("/fod/api/v3/releases/{}", id));
                then.status(200).json_body(json!({"id": id}));
            })
        })
        .collect();
    server.mock(|when, then| {
        when.method(GET).path("/fod/api/v3/releases/2");
        then.status(404).json_body(json!({"message": "no such release"}));
    });
    let config = BackendConfig::new(server.url("/fod")).with_product(ProductKind::Fod);

    // Without an output or on_fail handler the failure is fatal, even inside a loop.
    let (runner, _) = runner_for(helpers("fod", config.clone()));
    let document = parse_str(&RELEASE_LOOP.replace("OUTPUT", ""), None).unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    match &err {
        ActionError::Step { index, name, source } => {
            assert_eq!((*index, name.as_str()), (0, "for_each"));
            assert!(matches!(source.as_ref(), ActionError::Step { name, .. } if name == "rel"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(err.root_cause(), ActionError::Request(m) if m.contains("no such release")));
    found[0].assert_hits(1);
    found[1].assert_hits(0);

    // With an output the failure becomes a FAILED record and the loop carries on.
    let (runner, sink) = runner_for(helpers("fod", config));
    let document = parse_str(&RELEASE_LOOP.replace("OUTPUT", "output: main"), None).unwrap();
    let summary = runner.run(&document, Map::new()).await.unwrap();
    assert_eq!(summary.failed_items, 1);
    let results: Vec<_> = sink
        .records()
        .iter()
        .map(|r| r.result.as_ref().map(|i| i.as_str().to_string()))
        .collect();
    assert_eq!(
        results,
        vec![Some("SUCCESS".into()), Some("FAILED".into()), Some("SUCCESS".into())]
    );
    found[1].assert_hits(1);
}

#[tokio::test]
async fn for_each_scopes_do_not_leak() {
    let (runner, sink) = runner_for(RequestHelpers::new());
    let document = parse_str(
        r#"
name: scopes
steps:
  - type: set_variable
    name: outer
    value: keep
  - type: for_each
    items: [1, 2, 3]
    as: n
    accumulate: total
    steps:
      - type: set_variable
        name: outer
        value: changed-${n}
      - type: set_variable
        name: total..
        value: ${n}
  - type: write_output
    output: main
    record:
      outer: ${outer}
      total: ${total}
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    runner.run(&document, Map::new()).await.unwrap();
    assert_eq!(sink.records()[0].record, json!({"outer": "keep", "total": [1, 2, 3]}));
}

#[tokio::test]
async fn variables_can_be_set_and_removed() {
    let (runner, sink) = runner_for(RequestHelpers::new());
    let document = parse_str(
        r#"
name: vars
steps:
  - type: set_variable
    name: greeting..
    value: hello
  - type: set_variable
    name: greeting..
    value: world
  - type: write_output
    output: main
    record: ${greeting}
  - type: remove_variable
    name: greeting
  - type: write_output
    output: main
    record: ${greeting}
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    assert_eq!(sink.records()[0].record, json!(["hello", "world"]));
    match &err {
        ActionError::Step { index, name, source } => {
            assert_eq!(*index, 4);
            assert_eq!(name, "write_output");
            assert!(matches!(source.as_ref(), ActionError::Evaluation { expression, .. } if expression == "${greeting}"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn loops_break_and_conditionals_branch() {
    let (runner, sink) = runner_for(RequestHelpers::new());
    let document = parse_str(
        r#"
name: flow
steps:
  - type: for_each
    items: ${[1, 2, 3, 4]}
    as: n
    break_if: ${n > 2}
    steps:
      - type: conditional
        condition: ${n % 2 == 0}
        steps:
          - type: write_output
            output: main
            record: even ${n}
        else:
          - type: write_output
            output: main
            record: odd ${n}
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    runner.run(&document, Map::new()).await.unwrap();
    let records: Vec<Value> = sink.records().into_iter().map(|r| r.record).collect();
    assert_eq!(records, vec![json!("odd 1"), json!("even 2")]);
}

#[tokio::test]
async fn checks_logs_and_exit() {
    let progress = Arc::new(RecordingProgress::default());
    let (runner, sink) = runner_for(RequestHelpers::new());
    let runner = runner.with_progress(progress.clone());
    let document = parse_str(
        r#"
name: checks
steps:
  - type: log
    level: progress
    message: "Checking\tthings"
  - type: check
    display_name: no criticals
    fail_if: ${1 > 0}
  - type: check
    name: sane
    pass_if: true
  - type: write_output
    output: main
    record: ${check_status}
  - type: exit
    code: 3
  - type: throw
    message: unreachable
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    let summary = runner.run(&document, Map::new()).await.unwrap();

    assert_eq!(summary.exit, Some(3));
    assert_eq!(summary.exit_code(), 3);
    assert_eq!(summary.failed_checks().count(), 1);
    assert_eq!(
        sink.records()[0].record,
        json!({"no criticals": "FAIL", "sane": "PASS"})
    );
    let messages = progress.messages.lock().unwrap().clone();
    assert_eq!(messages[0], "Checking\tthings");
    assert!(messages.contains(&"FAIL: no criticals".to_string()));
}

#[tokio::test]
async fn exit_codes_outside_i32_are_rejected() {
    let (runner, _) = runner_for(RequestHelpers::new());
    let document = parse_str(
        "name: leave\nsteps:\n  - type: exit\n    code: ${4294967296 + 7}\n",
        None,
    )
    .unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    match err.root_cause() {
        ActionError::Evaluation { expression, source } => {
            assert_eq!(expression, "${4294967296 + 7}");
            assert!(source.to_string().contains("out of range"), "{}", source);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn evaluation_errors_carry_step_and_expression() {
    let (runner, _) = runner_for(RequestHelpers::new());
    let document = parse_str(
        r#"
name: broken
parameters:
  - name: opt
    type: object
    required: false
steps:
  - type: log
    message: ok
  - type: set_variable
    name: x
    value: ${params.opt.name}
"#,
        None,
    )
    .unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    match &err {
        ActionError::Step { index, source, .. } => {
            assert_eq!(*index, 1);
            assert!(matches!(source.as_ref(), ActionError::Evaluation { expression, .. } if expression == "${params.opt.name}"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn thrown_errors_and_tolerant_steps() {
    let (runner, sink) = runner_for(RequestHelpers::new());
    let document = parse_str(
        r#"
name: throws
steps:
  - type: throw
    message: ignored
    continue_on_error: true
  - type: write_output
    output: main
    record: after
  - type: throw
    message: "stop: ${txt.repeat('!', 2)}"
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    assert!(matches!(err.root_cause(), ActionError::Thrown(m) if m == "stop: !!"));
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test]
async fn missing_backends_fail_before_the_first_step() {
    let (runner, sink) = runner_for(RequestHelpers::new());
    let document = parse_str(
        r#"
name: needs-backend
steps:
  - type: write_output
    output: main
    record: too early
  - type: request
    target: ssc
    uri: /api/v1/projects
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    assert!(matches!(err, ActionError::Configuration(_)));
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn interrupt_stops_the_run() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(200).delay(std::time::Duration::from_secs(5)).json_body(json!({}));
    });
    let config = BackendConfig::new(server.url("/fod")).with_product(ProductKind::Fod);
    let (runner, _) = runner_for(helpers("fod", config));
    let document = parse_str(RELEASE_SUMMARY, None).unwrap();
    let err = runner
        .run_until(
            &document,
            params(&[("release", json!("x"))]),
            tokio::time::sleep(std::time::Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(err.is_interrupted());
}

const PAGED_VERSIONS: &str = r#"
name: paged-versions
steps:
  - type: request
    name: pvs
    target: ssc
    uri: /api/v1/projectVersions
    paged: true
    query:
      limit: 2
    log_progress:
      page_post_process: Processed ${totalPvCount} of ${pvs_raw.count} versions
    records:
      as: pv
      embed:
        artifacts:
          uri: /api/v1/projectVersions/${pv.id}/artifacts
      steps:
        - type: write_output
          output: main
          record:
            id: ${pv.id}
            artifacts: ${pv.artifacts.size()}
outputs:
  main: ${record}
"#;

#[tokio::test]
async fn paged_requests_embed_data_per_record() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/ssc/api/v1/projectVersions")
            .query_param("start", "0")
            .query_param("limit", "2");
        then.status(200).json_body(json!({"data": [{"id": 1}, {"id": 2}], "count": 3}));
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/ssc/api/v1/projectVersions")
            .query_param("start", "2")
            .query_param("limit", "2");
        then.status(200).json_body(json!({"data": [{"id": 3}], "count": 3}));
    });
    // the two records of the first page share one bulk round-trip
    let bulk = server.mock(|when, then| {
        when.method(POST).path("/ssc/api/v1/bulk");
        then.status(200).json_body(json!({"data": [
            {"request": {}, "responses": [{"body": {"data": [{"name": "a.fpr"}], "responseCode": 200}}]},
            {"request": {}, "responses": [{"body": {"data": [{"name": "b.fpr"}, {"name": "c.fpr"}], "responseCode": 200}}]}
        ]}));
    });
    let single = server.mock(|when, then| {
        when.method(GET).path("/ssc/api/v1/projectVersions/3/artifacts");
        then.status(200).json_body(json!({"data": [], "count": 0}));
    });

    let progress = Arc::new(RecordingProgress::default());
    let (runner, sink) = runner_for(helpers("ssc", BackendConfig::new(server.url("/ssc"))));
    let runner = runner.with_progress(progress.clone());
    let document = parse_str(PAGED_VERSIONS, None).unwrap();
    let summary = runner.run(&document, Map::new()).await.unwrap();

    first.assert();
    second.assert();
    bulk.assert();
    single.assert();
    assert_eq!(summary.failed_items, 0);
    let records: Vec<_> = sink.records().into_iter().map(|r| r.record).collect();
    assert_eq!(
        records,
        vec![
            json!({"id": 1, "artifacts": 1}),
            json!({"id": 2, "artifacts": 2}),
            json!({"id": 3, "artifacts": 0}),
        ]
    );
    assert_eq!(
        *progress.messages.lock().unwrap(),
        vec!["Processed 2 of 3 versions".to_string(), "Processed 3 of 3 versions".to_string()]
    );
}

#[tokio::test]
async fn records_are_selected_counted_and_cut_short() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fod/api/v3/releases");
        then.status(200).json_body(json!({"items": [
            {"id": 1, "active": true},
            {"id": 2, "active": false},
            {"id": 3, "active": true},
            {"id": 4, "active": true}
        ], "totalCount": 4}));
    });
    let config = BackendConfig::new(server.url("/fod")).with_product(ProductKind::Fod);
    let (runner, sink) = runner_for(helpers("fod", config));
    let document = parse_str(
        r#"
name: releases
steps:
  - type: request
    target: fod
    uri: /api/v3/releases
    records:
      as: rel
      if: ${rel.active}
      break_if: ${rel.id > 3}
      steps:
        - type: write_output
          output: main
          record: ${rel.id}
  - type: write_output
    output: main
    record: ${totalRelCount}
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    runner.run(&document, Map::new()).await.unwrap();

    let records: Vec<_> = sink.records().into_iter().map(|r| r.record).collect();
    assert_eq!(records, vec![json!(1), json!(3), json!(4)]);
}

const EMBED_OWNERS: &str = r#"
name: owners
steps:
  - type: request
    target: fod
    uri: /api/v3/applications
    TOLERANCE
    records:
      as: app
      embed:
        owner:
          uri: /api/v3/users/${app.ownerId}
      steps:
        - type: write_output
          output: main
          record: ${app}
outputs:
  main: ${record}
"#;

#[tokio::test]
async fn failed_embeds_are_fatal_unless_tolerated() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fod/api/v3/applications");
        then.status(200)
            .json_body(json!({"items": [{"id": 1, "ownerId": 7}, {"id": 2, "ownerId": 8}], "totalCount": 2}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/fod/api/v3/users/7");
        then.status(200).json_body(json!({"userName": "ann"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/fod/api/v3/users/8");
        then.status(404).json_body(json!({"message": "no such user"}));
    });
    let config = BackendConfig::new(server.url("/fod")).with_product(ProductKind::Fod);

    let (runner, sink) = runner_for(helpers("fod", config.clone()));
    let document = parse_str(&EMBED_OWNERS.replace("TOLERANCE", ""), None).unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    assert!(matches!(err.root_cause(), ActionError::Request(m) if m.contains("'owner'") && m.contains("no such user")));
    assert!(sink.records().is_empty());

    let (runner, sink) = runner_for(helpers("fod", config));
    let document = parse_str(&EMBED_OWNERS.replace("TOLERANCE", "continue_on_error: true"), None).unwrap();
    let summary = runner.run(&document, Map::new()).await.unwrap();
    assert_eq!(summary.failed_items, 1);
    let records = sink.records();
    assert_eq!(records[0].record, json!({"id": 1, "ownerId": 7, "owner": {"userName": "ann"}}));
    assert_eq!(records[1].record["owner"], json!(null));
    assert_eq!(records[1].record["owner_error"]["status"], json!(404));
}
