use serde_json::json;
use todo_decomposer_lib::config::AppConfig;
use todo_decomposer_lib::decomposition::{DecomposeFuture, DecompositionClient};
use todo_decomposer_lib::errors::AppError;
use todo_decomposer_lib::models::{Decomposition, Issue, Progression, Todo};
use todo_decomposer_lib::workbench::{Workbench, DRAFT_KEY};

enum StubClient {
    Returns(Todo),
    Fails(&'static str),
}

impl DecompositionClient for StubClient {
    fn decompose<'a>(&'a self, _resource: &'a str) -> DecomposeFuture<'a> {
        Box::pin(async move {
            match self {
                Self::Returns(todo) => Ok(Decomposition {
                    model: "stub-model".to_string(),
                    todo: todo.clone(),
                }),
                Self::Fails(reason) => Err(AppError::Decomposition(reason.to_string())),
            }
        })
    }
}

fn sample_todo() -> Todo {
    let issue = |title: &str, hours: f64| Issue {
        title: Some(title.to_string()),
        description: Some(format!("handle {}", title)),
        progression: Progression::NotStarted,
        estimated_working_hours: Some(hours),
    };
    Todo {
        title: Some("Office move".to_string()),
        summary: Some("Move the team to the new floor".to_string()),
        issues: vec![issue("pack", 4.0), issue("book movers", -1.0), issue("update seating", 2.0)],
        created_at: None,
    }
}

fn config_in(dir: &std::path::Path) -> AppConfig {
    AppConfig::default()
        .with_overrides(json!({ "dataDir": dir.to_string_lossy() }))
        .expect("config")
}

#[tokio::test]
async fn disassemble_appends_sanitized_todo_and_clears_draft() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workbench = Workbench::open(&config_in(dir.path()), StubClient::Returns(sample_todo()))
        .await
        .expect("open");

    workbench.save_draft("we are moving offices").expect("save draft");
    assert_eq!(workbench.draft().expect("draft"), "we are moving offices");

    let response = workbench.disassemble("we are moving offices").await.expect("disassemble");
    assert_eq!(response.model, "stub-model");
    assert_eq!(response.index, 0);

    let snapshot = workbench.model().snapshot().expect("snapshot");
    let todo = &snapshot.todos[0];
    assert!(todo.created_at.is_some());
    assert_eq!(todo.issues[1].estimated_working_hours, None);
    assert_eq!(workbench.draft().expect("draft"), "");
    assert_eq!(workbench.scratch().get(DRAFT_KEY).expect("raw draft"), json!({}));
}

#[tokio::test]
async fn failed_disassemble_leaves_state_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workbench = Workbench::open(&config_in(dir.path()), StubClient::Fails("quota"))
        .await
        .expect("open");
    workbench.save_draft("keep me").expect("save draft");

    let error = workbench.disassemble("keep me").await.expect_err("fails");
    assert!(matches!(error, AppError::Decomposition(_)));
    assert!(workbench.model().is_empty().expect("empty"));
    assert_eq!(workbench.model().version().expect("version"), 0);
    assert_eq!(workbench.draft().expect("draft"), "keep me");
}

#[tokio::test]
async fn issue_edits_and_archive_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workbench = Workbench::open(&config_in(dir.path()), StubClient::Returns(sample_todo()))
        .await
        .expect("open");
    workbench.disassemble("move").await.expect("first");
    workbench.disassemble("move again").await.expect("second");

    assert!(workbench.remove_issue(0, 1).expect("remove"));
    assert!(workbench.set_issue_progression(0, 0, "2").expect("done 0"));
    assert!(workbench.set_issue_progression(0, 1, "2").expect("done 1"));
    let version = workbench.model().version().expect("version");
    assert!(matches!(
        workbench.set_issue_progression(0, 0, "abc"),
        Err(AppError::InvalidProgressionValue(_))
    ));
    assert!(!workbench.set_issue_progression(5, 0, "1").expect("stale address"));
    assert_eq!(workbench.model().version().expect("version"), version);
    let edited = workbench.model().issue(0, 1).expect("issue").expect("present");
    assert_eq!(edited.progression, Progression::Done);

    let first = workbench.archive_todo(0).await.expect("archive first").expect("id");
    let second = workbench.archive_todo(1).await.expect("archive second").expect("id");
    assert!(second > first);
    assert_eq!(workbench.archive_todo(7).await.expect("missing"), None);

    let records = workbench.records().list().await.expect("records");
    assert_eq!(records.len(), 2);
    assert!(records[0].completed);
    assert!(!records[1].completed);
    assert_eq!(records[0].title, "Office move");

    let snapshot = workbench.model().snapshot().expect("snapshot");
    assert_eq!(snapshot.todos[0].issues.len(), 2);
    assert_eq!(snapshot.todos[1].issues.len(), 3);
}

#[tokio::test]
async fn bootstrap_opens_stores_under_data_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());
    let workbench = todo_decomposer_lib::bootstrap(&config, StubClient::Fails("unused"))
        .await
        .expect("bootstrap");

    assert!(workbench.records().is_initialized().await);
    assert!(config.database_path().exists());
    assert!(config.scratch_path().exists());

    workbench.records().reset_database().await.expect("reset");
    assert!(matches!(
        workbench.archive_todo(0).await,
        Ok(None)
    ));
    assert!(matches!(
        workbench.records().list().await,
        Err(AppError::NotInitialized(_))
    ));
}
