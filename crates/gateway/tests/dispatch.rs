mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use fg_domain::config::{Config, WindowLimit};
use fg_domain::error::ErrorCode;

use common::{data, Harness, Script, ScriptedProvider, PROJECT};

fn plain() -> Harness {
    Harness::new(Config::default(), Vec::new())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn roundtrip_start_preview_commit_writes_files() {
    let h = plain();
    h.write("src/app.py", "print('v1')\n");

    let started = h
        .call("files", "roundtrip_start", json!({"projectId": PROJECT, "paths": ["src/app.py"]}))
        .await;
    let manifest_id = data(&started)["manifestId"].as_str().unwrap().to_owned();
    assert_eq!(data(&started)["state"], "started");

    let change = json!([{"operation": "replace", "path": "src/app.py", "content": "print('v2')\n"}]);
    let preview = h
        .call(
            "files",
            "roundtrip_preview",
            json!({"manifestId": manifest_id, "changes": change}),
        )
        .await;
    assert_eq!(data(&preview)["clean"], true);
    assert_eq!(h.read("src/app.py"), "print('v1')\n", "preview never writes");

    let commit = h
        .call(
            "files",
            "roundtrip_commit",
            json!({"manifestId": manifest_id, "changes": change, "mode": "replace"}),
        )
        .await;
    assert_eq!(data(&commit)["state"], "committed");
    assert_eq!(h.read("src/app.py"), "print('v2')\n");

    let read = h
        .call("files", "read", json!({"projectId": PROJECT, "path": "src/app.py"}))
        .await;
    assert_eq!(data(&read)["content"], "print('v2')\n");

    let status = h
        .call("files", "roundtrip_status", json!({"manifestId": manifest_id}))
        .await;
    assert_eq!(data(&status)["state"], "committed");
}

#[tokio::test]
async fn commit_after_external_edit_is_a_conflict() {
    let h = plain();
    h.write("notes.md", "one\n");

    let started = h
        .call("files", "roundtrip_start", json!({"projectId": PROJECT, "paths": ["notes.md"]}))
        .await;
    let manifest_id = data(&started)["manifestId"].as_str().unwrap().to_owned();

    h.write("notes.md", "edited elsewhere\n");

    let commit = h
        .call(
            "files",
            "roundtrip_commit",
            json!({
                "manifestId": manifest_id,
                "changes": [{"operation": "replace", "path": "notes.md", "content": "two\n"}],
                "mode": "replace",
            }),
        )
        .await;
    assert_eq!(commit.error_code, Some(ErrorCode::Conflict));
    let message = commit.response.error.as_deref().unwrap();
    assert!(message.starts_with("conflict: "), "{message}");
    assert!(message.contains("notes.md"), "{message}");
    assert_eq!(h.read("notes.md"), "edited elsewhere\n");

    let status = h
        .call("files", "roundtrip_status", json!({"manifestId": manifest_id}))
        .await;
    assert_eq!(data(&status)["state"], "aborted");
}

#[tokio::test]
async fn traversal_paths_are_rejected() {
    let h = plain();
    let read = h
        .call("files", "read", json!({"projectId": PROJECT, "path": "../../etc/passwd"}))
        .await;
    assert_eq!(read.error_code, Some(ErrorCode::InvalidInput));
}

#[tokio::test]
async fn list_counts_entries() {
    let h = plain();
    h.write("a.txt", "a");
    h.write("b.txt", "b");
    let listed = h.call("files", "list", json!({"projectId": PROJECT})).await;
    assert_eq!(listed.response.count, Some(2));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Code
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn run_falls_back_past_an_unavailable_provider() {
    let h = Harness::new(
        Config::default(),
        vec![
            ScriptedProvider::shared("primary", 1, Script::Unavailable),
            ScriptedProvider::shared("secondary", 2, Script::Prints("hello\n")),
        ],
    );
    let run = h
        .call("code", "run", json!({"language": "python", "code": "print('hello')"}))
        .await;
    let result = data(&run);
    assert_eq!(result["provider"], "secondary");
    assert_eq!(result["stdout"], "hello\n");
    assert_eq!(result["exitCode"], 0);
}

#[tokio::test]
async fn run_that_times_out_reports_timeout() {
    let h = Harness::new(
        Config::default(),
        vec![ScriptedProvider::shared("only", 1, Script::TimesOut)],
    );
    let run = h
        .call("code", "run", json!({"language": "python", "code": "while True: pass"}))
        .await;
    assert_eq!(run.error_code, Some(ErrorCode::Timeout));
    assert!(run.response.error.as_deref().unwrap().starts_with("timeout: "));
}

#[tokio::test]
async fn hung_sandbox_is_stopped_at_the_requested_timeout() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let h = Harness::new(
        Config::default(),
        vec![ScriptedProvider::shared("stuck", 1, Script::Hangs(cancelled.clone()))],
    );

    let started = Instant::now();
    let run = h
        .call(
            "code",
            "run",
            json!({"language": "python", "code": "import time; time.sleep(10)", "timeout": 1}),
        )
        .await;
    let elapsed = started.elapsed();

    assert_eq!(run.error_code, Some(ErrorCode::Timeout));
    assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cancelled.load(Ordering::SeqCst), "sandbox left running");
}

#[tokio::test]
async fn run_with_every_provider_down_is_unavailable() {
    let h = Harness::new(
        Config::default(),
        vec![
            ScriptedProvider::shared("a", 1, Script::Unavailable),
            ScriptedProvider::shared("b", 2, Script::Unavailable),
        ],
    );
    let run = h
        .call("code", "run", json!({"language": "bash", "code": "echo hi"}))
        .await;
    assert_eq!(run.error_code, Some(ErrorCode::ProviderUnavailable));
}

#[tokio::test]
async fn unknown_language_is_not_found() {
    let h = Harness::new(
        Config::default(),
        vec![ScriptedProvider::shared("only", 1, Script::Prints(""))],
    );
    let run = h
        .call("code", "run", json!({"language": "cobol", "code": "DISPLAY 'HI'."}))
        .await;
    assert_eq!(run.error_code, Some(ErrorCode::NotFound));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limits and switches
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn tight_code_budget() -> Config {
    let mut config = Config::default();
    config.rate_limits.classes = HashMap::from([(
        "code".to_string(),
        WindowLimit {
            limit: 1,
            window_secs: 60,
        },
    )]);
    config
}

#[tokio::test]
async fn exhausted_class_does_not_throttle_other_classes() {
    let h = Harness::new(
        tight_code_budget(),
        vec![ScriptedProvider::shared("only", 1, Script::Prints("ok"))],
    );

    let first = h.call("code", "languages", json!({})).await;
    assert!(first.is_ok());

    let second = h.call("code", "languages", json!({})).await;
    assert_eq!(second.error_code, Some(ErrorCode::RateLimited));
    let retry = second.retry_after_secs.unwrap();
    assert!((1..=60).contains(&retry), "retry after {retry}");

    let other_caller = h.call_as("someone-else", "code", "languages", json!({})).await;
    assert!(other_caller.is_ok());

    let memories = h.call("memories", "list", json!({})).await;
    assert!(memories.is_ok());
}

#[tokio::test]
async fn disabled_domain_is_refused_without_consuming_budget() {
    let mut config = tight_code_budget();
    config.domains.code = false;
    let h = Harness::new(config, Vec::new());

    for _ in 0..3 {
        let run = h.call("code", "languages", json!({})).await;
        assert_eq!(run.error_code, Some(ErrorCode::Disabled));
    }
    assert_eq!(h.state.dispatcher.rate_limiter().bucket_count(), 0);
}

#[tokio::test]
async fn unknown_domain_and_command_are_not_found() {
    let h = plain();
    let domain = h.call("weather", "get", json!({})).await;
    assert_eq!(domain.error_code, Some(ErrorCode::NotFound));

    let cmd = h.call("memories", "explode", json!({})).await;
    assert_eq!(cmd.error_code, Some(ErrorCode::NotFound));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records, search, hydration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn crud_lifecycle() {
    let h = plain();

    let created = h
        .call("memories", "create", json!({"title": "Deploy", "content": "uses blue/green"}))
        .await;
    let id = data(&created)["id"].as_str().unwrap().to_owned();

    let updated = h
        .call("memories", "update", json!({"id": id, "tags": ["ops"]}))
        .await;
    assert_eq!(data(&updated)["tags"], json!(["ops"]));

    let got = h.call("memories", "get", json!({"id": id})).await;
    assert_eq!(data(&got)["title"], "Deploy");

    let deleted = h.call("memories", "delete", json!({"id": id})).await;
    assert_eq!(data(&deleted)["deleted"], true);

    let gone = h.call("memories", "get", json!({"id": id})).await;
    assert_eq!(gone.error_code, Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn conversations_append_messages() {
    let h = plain();
    let created = h
        .call("conversations", "create", json!({"title": "standup", "content": {}}))
        .await;
    let id = data(&created)["id"].as_str().unwrap().to_owned();

    let appended = h
        .call(
            "conversations",
            "append",
            json!({"id": id, "role": "user", "content": "what shipped?"}),
        )
        .await;
    assert!(appended.is_ok());

    let full = h
        .state
        .dispatcher
        .dispatch(
            "conversations",
            fg_domain::envelope::RequestEnvelope::new("get", json!({"id": id}))
                .with_detail(fg_domain::envelope::Detail::Full),
            "tester",
        )
        .await;
    assert_eq!(data(&full)["messages"][0]["content"], "what shipped?");
}

#[tokio::test]
async fn search_and_hydrate_a_project() {
    let h = plain();

    let project = h
        .call("projects", "create", json!({"title": "Atlas", "content": "map service"}))
        .await;
    let project_id = data(&project)["id"].as_str().unwrap().to_owned();

    h.call(
        "memories",
        "create",
        json!({"title": "Tiles", "content": "Atlas renders vector tiles", "projectId": project_id}),
    )
    .await;
    h.call(
        "knowledge",
        "create",
        json!({"title": "Projection", "content": "web mercator", "projectId": project_id}),
    )
    .await;
    h.call("memories", "create", json!({"title": "Unrelated", "content": "lunch order"}))
        .await;

    let found = h.call("search", "query", json!({"query": "TILES"})).await;
    assert_eq!(found.response.count, Some(1));
    assert_eq!(data(&found)[0]["domain"], "memories");

    let empty = h.call("search", "query", json!({"query": "   "})).await;
    assert_eq!(empty.error_code, Some(ErrorCode::InvalidInput));

    let hydrated = h
        .call("hydration", "hydrate", json!({"projectId": project_id}))
        .await;
    let bundle = data(&hydrated);
    assert_eq!(bundle["project"]["title"], "Atlas");
    assert_eq!(bundle["memories"].as_array().unwrap().len(), 1);
    assert_eq!(bundle["knowledge"].as_array().unwrap().len(), 1);

    let missing = h
        .call("hydration", "hydrate", json!({"projectId": "nope"}))
        .await;
    assert_eq!(missing.error_code, Some(ErrorCode::NotFound));
}
