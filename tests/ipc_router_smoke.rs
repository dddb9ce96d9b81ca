
use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("tutorsync-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health
        .get("workspacePath")
        .map(|v| v.is_null())
        .unwrap_or(false));

    // Store-backed methods refuse to run without a workspace.
    let resp = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_workspace")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    assert_eq!(listed.get("students"), Some(&json!([])));

    let tutors = request_ok(&mut stdin, &mut reader, "5", "staff.listTutors", json!({}));
    assert_eq!(tutors.get("tutors"), Some(&json!([])));

    let resp = request(&mut stdin, &mut reader, "6", "nope.method", json!({}));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );
}
