use fcli_config::BackendConfig;
use fcli_connectors::{HttpRequestHelper, RequestHelpers};
use fcli_runtime::{build_registry, parse_str, ActionError, ActionRunner, CollectingSink};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const GREET: &str = r#"
name: greet
parameters:
  - name: who
  - name: punctuation
    required: false
    defaultValue: "!"
steps:
  - type: write_output
    output: greetings
    record:
      text: Hello ${params.who}${params.punctuation}
outputs:
  greetings: ${record}
"#;

const PARENT: &str = r#"
name: parent
parameters:
  - name: names
    type: array
steps:
  - type: for_each
    items: ${params.names}
    as: name
    steps:
      - type: invoke_sub_action
        action: greet
        parameters:
          who: ${name}
  - type: write_output
    output: done
    record: ${txt.join(',', params.names)}
outputs:
  done: ${record}
"#;

fn write_actions(dir: &TempDir) {
    fs::write(dir.path().join("greet.yaml"), GREET).unwrap();
    fs::write(dir.path().join("parent.yaml"), PARENT).unwrap();
    fs::write(
        dir.path().join("forever.yaml"),
        r#"
name: forever
steps:
  - type: invoke_sub_action
    action: forever
"#,
    )
    .unwrap();
}

#[tokio::test]
async fn sub_actions_share_the_output_pipeline() {
    let dir = TempDir::new().unwrap();
    write_actions(&dir);
    let sink = Arc::new(CollectingSink::new());
    let runner = ActionRunner::new(RequestHelpers::new())
        .unwrap()
        .with_sink(sink.clone())
        .with_actions_dir(dir.path());

    let document = runner.load("parent").unwrap();
    let mut params = Map::new();
    params.insert("names".into(), json!("ann, bo"));
    let summary = runner.run(&document, params).await.unwrap();

    let greetings: Vec<Value> = sink.by_output("greetings").into_iter().map(|r| r.record).collect();
    assert_eq!(greetings, vec![json!({"text": "Hello ann!"}), json!({"text": "Hello bo!"})]);
    assert_eq!(sink.by_output("done")[0].record, json!("ann,bo"));
    assert_eq!(summary.records, 3);
}

#[tokio::test]
async fn sub_action_nesting_is_bounded() {
    let dir = TempDir::new().unwrap();
    write_actions(&dir);
    let runner = ActionRunner::new(RequestHelpers::new())
        .unwrap()
        .with_actions_dir(dir.path())
        .with_max_depth(3);

    let document = runner.load("forever").unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    assert!(
        matches!(err.root_cause(), ActionError::Configuration(m) if m.contains("maximum nesting depth of 3")),
        "{}",
        err
    );
}

#[tokio::test]
async fn sub_actions_reject_bad_parameters() {
    let dir = TempDir::new().unwrap();
    write_actions(&dir);
    let runner = ActionRunner::new(RequestHelpers::new())
        .unwrap()
        .with_actions_dir(dir.path());

    let document = parse_str(
        r#"
name: caller
steps:
  - type: invoke_sub_action
    action: greet
    parameters:
      whom: nobody
"#,
        Some(&dir.path().join("caller.yaml")),
    )
    .unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    assert!(matches!(err.root_cause(), ActionError::Configuration(m) if m.contains("whom")));
}

#[tokio::test]
async fn missing_sub_actions_are_reported() {
    let runner = ActionRunner::new(RequestHelpers::new()).unwrap();
    let document = parse_str(
        r#"
name: caller
steps:
  - type: invoke_sub_action
    action: does-not-exist
"#,
        None,
    )
    .unwrap();
    let err = runner.run(&document, Map::new()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "steps[0] (invoke_sub_action): Configuration error: action 'does-not-exist' not found"
    );
}

fn product_helpers() -> RequestHelpers {
    let mut helpers = RequestHelpers::new();
    for (name, url) in [
        ("ssc", "https://ssc.example.com/ssc"),
        ("sc-sast", "https://sast.example.com/scancentral-ctrl"),
        ("fod", "https://api.ams.fortify.com"),
    ] {
        let helper = HttpRequestHelper::from_config(name, &BackendConfig::new(url)).unwrap();
        helpers.register(Arc::new(helper));
    }
    helpers
}

#[test]
fn function_names_are_unique_across_products() {
    let registry = build_registry(&product_helpers()).unwrap();
    let names: HashSet<String> = registry.iter().map(|f| f.qualified_name()).collect();
    assert_eq!(names.len(), registry.len());

    assert!(registry.get("ssc", "issueBrowserUrl").is_some());
    assert!(registry.get("sc_sast", "baseUrl").is_some());
    assert!(registry.get("fod", "browserUrl").is_some());
    assert!(registry.get("txt", "join").is_some());
}

#[tokio::test]
async fn product_functions_are_callable_from_actions() {
    let sink = Arc::new(CollectingSink::new());
    let runner = ActionRunner::new(product_helpers()).unwrap().with_sink(sink.clone());
    let document = parse_str(
        r#"
name: links
steps:
  - type: write_output
    output: main
    record:
      sast: ${sc_sast.baseUrl()}
      fod: ${fod.browserUrl('Applications')}
outputs:
  main: ${record}
"#,
        None,
    )
    .unwrap();
    runner.run(&document, Map::new()).await.unwrap();
    let record = &sink.records()[0].record;
    assert_eq!(record["sast"], json!("https://sast.example.com/scancentral-ctrl"));
    assert!(record["fod"].as_str().unwrap().starts_with("https://ams.fortify.com"));
}
