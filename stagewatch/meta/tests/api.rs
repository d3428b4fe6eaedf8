#[cfg(test)]
mod api {
    use std::io::Write;

    use stagewatch::api::{load_events, parse_events, resolve_run_id, snapshot_of, LoadError};
    use stagewatch::prelude::*;

    const ARRAY: &str = r#"[
        {"id": "e1", "pipeline_run_id": "run-1", "stage": "parsing_jd", "status": "completed"},
        {"id": "e2", "pipeline_run_id": "run-1", "stage": "parsing_cv", "status": "started"}
    ]"#;

    #[test]
    fn parses_array_and_ndjson() {
        let from_array = parse_events(ARRAY).unwrap();

        let ndjson = r#"
{"id": "e1", "pipeline_run_id": "run-1", "stage": "parsing_jd", "status": "completed"}

{"id": "e2", "run_id": "run-1", "stage": "parsing_cv", "status": "started"}
"#;
        let from_lines = parse_events(ndjson).unwrap();

        let ids = |events: &[StageEvent]| -> Vec<String> {
            events.iter().map(|event| event.id.clone()).collect()
        };
        assert_eq!(ids(&from_array), vec!["e1", "e2"]);
        assert_eq!(ids(&from_lines), ids(&from_array));
    }

    #[test]
    fn reports_the_failing_line() {
        let ndjson = "{\"id\": \"e1\", \"run_id\": \"run-1\", \"stage\": \"parsing_jd\", \"status\": \"started\"}\nnot json\n";

        match parse_events(ndjson) {
            Err(LoadError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ARRAY.as_bytes()).unwrap();

        let events = load_events(file.path()).unwrap();
        let snapshot = snapshot_of(default_stage_table(), events, None).unwrap();

        assert_eq!(snapshot.run_id.as_deref(), Some("run-1"));
        assert_eq!(snapshot.status, PipelineStatus::Processing);
        assert_eq!(snapshot.progress, 5);
        assert_eq!(snapshot.label, "Reading your CV");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_events(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn several_runs_need_an_explicit_run_id() {
        let mut events = parse_events(ARRAY).unwrap();
        let mut other = events[0].clone();
        other.id = "x1".to_string();
        other.run_id = "run-2".to_string();
        events.push(other);

        assert!(matches!(
            resolve_run_id(&events, None),
            Err(LoadError::AmbiguousRun(runs)) if runs == vec!["run-1", "run-2"]
        ));

        let snapshot = snapshot_of(default_stage_table(), events, Some("run-2")).unwrap();
        assert_eq!(snapshot.progress, 5);
        assert_eq!(snapshot.label, "Reading job description");
    }

    #[test]
    fn no_events_and_no_run_is_connecting() {
        let snapshot = snapshot_of(default_stage_table(), Vec::new(), None).unwrap();
        assert_eq!(snapshot.run_id, None);
        assert_eq!(snapshot.status, PipelineStatus::Connecting);
        assert_eq!(snapshot.label, "Starting analysis...");
    }
}
