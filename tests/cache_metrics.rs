mod common;

use std::collections::HashSet;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use serial_test::serial;

use coursehub::cache::SideEffectPolicy;

use common::{Harness, get, post};

#[tokio::test]
#[serial]
async fn cache_and_sync_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let h = Harness::build(SideEffectPolicy::LogAndContinue, false);
    let token = h.admin_token();
    let (public, admin) = (h.public(), h.admin());

    // miss, then hit
    get(&public, "/categories", None).await;
    get(&public, "/categories", None).await;

    // invalidation plus a search sync
    let category = post(&admin, "/admin/categories", Some(&token), json!({"name": "Infra"})).await;
    let category_id = category.body["data"]["category"]["id"].as_i64().unwrap();
    post(
        &admin,
        "/admin/courses",
        Some(&token),
        json!({"categoryId": category_id, "name": "Terraform"}),
    )
    .await;

    // side-effect failure under log_and_continue
    let failing = Harness::build(SideEffectPolicy::LogAndContinue, true);
    let failing_token = failing.admin_token();
    let created = post(
        &failing.admin(),
        "/admin/categories",
        Some(&failing_token),
        json!({"name": "Infra"}),
    )
    .await;
    let failing_category = created.body["data"]["category"]["id"].as_i64().unwrap();
    post(
        &failing.admin(),
        "/admin/courses",
        Some(&failing_token),
        json!({"categoryId": failing_category, "name": "Ansible"}),
    )
    .await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "coursehub_cache_hit_total",
        "coursehub_cache_miss_total",
        "coursehub_cache_invalidation_total",
        "coursehub_cache_invalidation_ms",
        "coursehub_search_sync_total",
        "coursehub_side_effect_failure_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
