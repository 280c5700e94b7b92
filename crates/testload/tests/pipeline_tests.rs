//! Pipeline scenarios against in-memory fakes
//!
//! Covers the full transcode → stage → load path and how each failing stage
//! affects the staging object and the load submission.

mod common;

use common::{test_config, write_input, MemoryStore, ScriptedWarehouse};
use std::path::Path;
use testload::pipeline::Pipeline;
use testload::warehouse::{JobStatus, WriteDisposition};
use testload::Error;

const STAGE_KEY: &str = "acme/widgets/main/42-test-abc123";

#[tokio::test]
async fn test_pipeline_end_to_end() {
    let config = test_config();
    let store = MemoryStore::default();
    let warehouse = ScriptedWarehouse::succeeding(2);
    let input = write_input(concat!(
        r#"{"Action":"pass","Package":"pkg","Elapsed":0.5}"#,
        "\n\n",
        r#"{"Time":"2024-03-01T10:00:00.5Z","Action":"fail","Package":"pkg","Test":"TestX","Elapsed":1}"#,
        "\n",
    ));

    let result = Pipeline::new(&config, &store, &warehouse)
        .run(input.path())
        .await
        .unwrap();

    assert_eq!(result.stats.records, 2);
    assert_eq!(result.stats.failed_tests, 1);
    assert_eq!(result.staged.key, STAGE_KEY);
    assert_eq!(result.staged.uri, format!("gs://results/{STAGE_KEY}"));
    assert_eq!(result.load.job_id, "testload_job");
    assert_eq!(result.load.output_rows, Some(2));

    let staged = store.object(STAGE_KEY).unwrap();
    let lines: Vec<&str> = staged.lines().collect();
    assert_eq!(
        lines,
        vec![
            r#"{"Time":"0001-01-01T00:00:00Z","Action":"pass","Package":"pkg","Test":"","Elapsed":0.5,"Output":"","Repo":"acme/widgets","Branch":"main","Commit":"abc123","Run":"42","Stage":"test"}"#,
            r#"{"Time":"2024-03-01T10:00:00.5Z","Action":"fail","Package":"pkg","Test":"TestX","Elapsed":1,"Output":"","Repo":"acme/widgets","Branch":"main","Commit":"abc123","Run":"42","Stage":"test"}"#,
        ]
    );
    assert_eq!(result.staged.size, staged.len() as u64);

    let submissions = warehouse.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].source_uri, result.staged.uri);
    assert_eq!(submissions[0].destination.to_string(), "proj.ci.go_tests");
    assert_eq!(submissions[0].write_disposition, WriteDisposition::Append);
    assert!(submissions[0].autodetect);
}

#[tokio::test]
async fn test_empty_input_loads_empty_object() {
    let config = test_config();
    let store = MemoryStore::default();
    let warehouse = ScriptedWarehouse::succeeding(0);
    let input = write_input("");

    let result = Pipeline::new(&config, &store, &warehouse)
        .run(input.path())
        .await
        .unwrap();

    assert_eq!(result.stats.records, 0);
    assert_eq!(store.object(STAGE_KEY).unwrap(), "");
    assert_eq!(warehouse.submissions().len(), 1);
}

#[tokio::test]
async fn test_decode_failure_finalizes_partial_object_without_load() {
    let config = test_config();
    let store = MemoryStore::default();
    let warehouse = ScriptedWarehouse::succeeding(1);
    let input = write_input(concat!(
        r#"{"Action":"run","Package":"pkg","Test":"TestA"}"#,
        "\n",
        "not json\n",
        r#"{"Action":"pass","Package":"pkg","Test":"TestA"}"#,
        "\n",
    ));

    let err = Pipeline::new(&config, &store, &warehouse)
        .run(input.path())
        .await
        .unwrap_err();

    match err {
        Error::Decode { line, raw, .. } => {
            assert_eq!(line, 2);
            assert_eq!(raw, "not json");
        },
        other => panic!("expected decode error, got {other:?}"),
    }

    let staged = store.object(STAGE_KEY).unwrap();
    assert_eq!(staged.lines().count(), 1);
    assert!(staged.contains(r#""Test":"TestA""#));
    assert!(warehouse.submissions().is_empty());
}

#[tokio::test]
async fn test_denied_bucket_fails_before_transcoding() {
    let config = test_config();
    let store = MemoryStore::denied();
    let warehouse = ScriptedWarehouse::succeeding(1);
    let input = write_input("{\"Action\":\"pass\",\"Package\":\"pkg\"}\n");

    let err = Pipeline::new(&config, &store, &warehouse)
        .run(input.path())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "storage");
    assert!(err.to_string().contains("403"));
    assert_eq!(store.len(), 0);
    assert!(warehouse.submissions().is_empty());
}

#[tokio::test]
async fn test_missing_input_is_input_error() {
    let config = test_config();
    let store = MemoryStore::default();
    let warehouse = ScriptedWarehouse::succeeding(1);

    let err = Pipeline::new(&config, &store, &warehouse)
        .run(Path::new("/nonexistent/test-results.json"))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "input");
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn test_failed_load_job_reports_service_message() {
    let config = test_config();
    let store = MemoryStore::default();
    let warehouse = ScriptedWarehouse::new(vec![JobStatus::failed(
        "invalid: Provided Schema does not match Table proj:ci.go_tests",
    )]);
    let input = write_input("{\"Action\":\"pass\",\"Package\":\"pkg\"}\n");

    let err = Pipeline::new(&config, &store, &warehouse)
        .run(input.path())
        .await
        .unwrap_err();

    match &err {
        Error::Load { job_id, message } => {
            assert_eq!(job_id, "testload_job");
            assert!(message.contains("Provided Schema does not match"));
        },
        other => panic!("expected load error, got {other:?}"),
    }
    assert!(err.to_string().contains("testload_job"));

    // The data stays staged for inspection
    assert!(store.object(STAGE_KEY).is_some());
}
