use crate::fixtures::test_app::TestApp;
use serde_json::Value;
use speechtotext_transcription::testing::{Counters, ScriptedProvider};

#[tokio::test]
async fn banner_and_health() {
    let app = TestApp::spawn().await;

    let resp = app.get("/").send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "running");

    let resp = app.get("/health").send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn ready_flips_after_warm_up() {
    let app = TestApp::spawn().await;

    let resp = app.get("/ready").send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);

    app.warm_up().await;

    let resp = app.get("/ready").send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["ready"], true);
    assert_eq!(json["models_loaded"], 1);
    assert_eq!(Counters::get(&app.counters.recognizer_loads), 1);
}

#[tokio::test]
async fn failed_warm_up_stays_unready() {
    let app =
        TestApp::spawn_with(ScriptedProvider::hello_world().with_failing_recognizer_loads(1)).await;
    app.warm_up().await;

    let resp = app.get("/ready").send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "unavailable");
}

#[tokio::test]
async fn models_lists_supported_sizes() {
    let app = TestApp::spawn().await;

    let resp = app.get("/models").send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    let models: Vec<&str> = json["models"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    assert_eq!(models, vec!["tiny", "base", "small", "medium", "large"]);
}
