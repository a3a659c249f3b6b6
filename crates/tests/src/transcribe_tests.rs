use std::time::Duration;

use crate::fixtures::callback_receiver::CallbackReceiver;
use crate::fixtures::test_app::TestApp;
use serde_json::{Value, json};
use speechtotext_transcription::Segment;
use speechtotext_transcription::testing::{
    Counters, DiarizerScript, RecognizerScript, ScriptedProvider, turn,
};
use uuid::Uuid;

#[tokio::test]
async fn sync_transcription_returns_full_result() {
    let app = TestApp::spawn().await;
    let job_id = Uuid::new_v4();

    let resp = app
        .post("/transcribe")
        .json(&json!({
            "job_id": job_id,
            "s3_url": app.audio_uri(),
            "model": "small",
            "compute_type": "int8",
            "sync": true,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["job_id"], job_id.to_string());
    assert_eq!(json["status"], "completed");
    assert_eq!(json["transcript_text"], "hello world");
    assert_eq!(json["language_detected"], "en");
    assert_eq!(json["model_used"], "small");
    assert_eq!(json["compute_type_used"], "int8");
    assert_eq!(json["segments"].as_array().unwrap().len(), 1);
    assert_eq!(json["word_segments"].as_array().unwrap().len(), 2);
    assert!(json["processing_time"].as_f64().unwrap() >= 0.0);
    assert!(
        json["transcript_url"]
            .as_str()
            .unwrap()
            .ends_with(&format!("/speechtotext/transcripts/{job_id}.txt"))
    );

    assert_eq!(
        app.store.get_text(&format!("transcripts/{job_id}.txt")).unwrap(),
        "hello world"
    );
}

#[tokio::test]
async fn sync_transcription_with_diarization() {
    let provider = ScriptedProvider::new(
        vec![
            Segment::new(0.0, 2.0, "hi there"),
            Segment::new(2.0, 4.0, "hello back"),
        ],
        Some("en"),
    )
    .with_diarizer(DiarizerScript::Turns(vec![
        turn(0.0, 2.0, "SPEAKER_00"),
        turn(2.0, 4.0, "SPEAKER_01"),
    ]));
    let app = TestApp::spawn_with(provider).await;

    let resp = app
        .post("/transcribe")
        .json(&json!({
            "job_id": Uuid::new_v4(),
            "s3_url": app.audio_uri(),
            "diarize": true,
            "sync": true,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["segments"][0]["speaker"], "SPEAKER_00");
    assert_eq!(json["segments"][1]["speaker"], "SPEAKER_01");
    assert_eq!(json["speakers"].as_array().unwrap().len(), 2);
    assert_eq!(json["speakers"][1]["segments_count"], 1);
}

#[tokio::test]
async fn sync_recognition_failure_reports_failed_status() {
    let provider = ScriptedProvider::hello_world()
        .with_recognizer(RecognizerScript::Fail("decoder crashed".into()));
    let app = TestApp::spawn_with(provider).await;

    let resp = app
        .post("/transcribe")
        .json(&json!({
            "job_id": Uuid::new_v4(),
            "s3_url": app.audio_uri(),
            "sync": true,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error_code"], "RECOGNITION_ERROR");
    assert!(json["error_message"].as_str().unwrap().contains("decoder crashed"));
    assert!(json.get("transcript_text").is_none());
}

#[tokio::test]
async fn sync_missing_audio_reports_storage_error() {
    let app = TestApp::spawn().await;

    let resp = app
        .post("/transcribe")
        .json(&json!({
            "job_id": Uuid::new_v4(),
            "s3_url": "s3://speechtotext/audio/does-not-exist.wav",
            "sync": true,
        }))
        .send()
        .await
        .unwrap();

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error_code"], "STORAGE_ERROR");
    assert_eq!(Counters::get(&app.counters.transcribe_calls), 0);
}

#[tokio::test]
async fn async_transcription_acknowledges_then_calls_back() {
    let app = TestApp::spawn().await;
    let receiver = CallbackReceiver::spawn().await;
    let job_id = Uuid::new_v4();

    let resp = app
        .post("/transcribe")
        .json(&json!({
            "job_id": job_id,
            "s3_url": app.audio_uri(),
            "callback_url": receiver.base_url,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 202);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["job_id"], job_id.to_string());
    assert_eq!(ack["status"], "processing");
    assert!(ack.get("transcript_text").is_none());

    let (path_id, body) = receiver.next(Duration::from_secs(5)).await;
    assert_eq!(path_id, job_id.to_string());
    assert_eq!(body["job_id"], job_id.to_string());
    assert_eq!(body["status"], "completed");
    assert_eq!(body["transcript_text"], "hello world");
    assert_eq!(body["language_detected"], "en");

    let bundle: Value =
        serde_json::from_str(body["timestamps_json"].as_str().unwrap()).unwrap();
    assert_eq!(bundle["segments"][0]["text"], "hello world");
    assert_eq!(bundle["word_segments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn async_failure_is_delivered_through_callback() {
    let provider = ScriptedProvider::hello_world().with_recognizer(RecognizerScript::Panic);
    let app = TestApp::spawn_with(provider).await;
    let receiver = CallbackReceiver::spawn().await;

    let resp = app
        .post("/transcribe")
        .json(&json!({
            "job_id": Uuid::new_v4(),
            "s3_url": app.audio_uri(),
            "callback_url": receiver.base_url,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);

    let (_, body) = receiver.next(Duration::from_secs(5)).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error_code"], "RECOGNITION_ERROR");
    assert!(body["transcript_text"].is_null());
    assert_eq!(receiver.received().len(), 1);
}

#[tokio::test]
async fn async_without_callback_still_runs() {
    let app = TestApp::spawn().await;
    let job_id = Uuid::new_v4();

    let resp = app
        .post("/transcribe")
        .json(&json!({ "job_id": job_id, "s3_url": app.audio_uri() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);

    app.wait_idle(Duration::from_secs(5)).await;
    assert!(app.store.get_text(&format!("transcripts/{job_id}.txt")).is_some());
}

#[tokio::test]
async fn duplicate_job_id_conflicts_while_running() {
    let provider = ScriptedProvider::hello_world().with_load_delay(Duration::from_millis(300));
    let app = TestApp::spawn_with(provider).await;
    let body = json!({ "job_id": Uuid::new_v4(), "s3_url": app.audio_uri() });

    let first = app.post("/transcribe").json(&body).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 202);

    let second = app.post("/transcribe").json(&body).send().await.unwrap();
    assert_eq!(second.status().as_u16(), 409);
    let json: Value = second.json().await.unwrap();
    assert_eq!(json["error"], "conflict");

    app.wait_idle(Duration::from_secs(5)).await;
    let third = app.post("/transcribe").json(&body).send().await.unwrap();
    assert_eq!(third.status().as_u16(), 202);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let app = TestApp::spawn().await;

    let cases = [
        json!({ "job_id": Uuid::new_v4(), "s3_url": "" }),
        json!({ "job_id": Uuid::new_v4(), "s3_url": app.audio_uri(), "batch_size": 0 }),
        json!({ "job_id": Uuid::new_v4(), "s3_url": app.audio_uri(), "batch_size": 65 }),
        json!({ "job_id": Uuid::new_v4(), "s3_url": app.audio_uri(), "callback_url": "nope" }),
        json!({ "job_id": Uuid::new_v4(), "s3_url": app.audio_uri(), "model": "gigantic" }),
        json!({ "job_id": "not-a-uuid", "s3_url": app.audio_uri() }),
    ];

    for case in cases {
        let resp = app.post("/transcribe").json(&case).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 422, "case: {case}");
    }
    assert_eq!(Counters::get(&app.counters.transcribe_calls), 0);
}

#[tokio::test]
async fn concurrent_jobs_share_one_model() {
    let app = TestApp::spawn_with(
        ScriptedProvider::hello_world().with_load_delay(Duration::from_millis(100)),
    )
    .await;

    let requests = (0..4).map(|_| {
        app.post("/transcribe")
            .json(&json!({
                "job_id": Uuid::new_v4(),
                "s3_url": app.audio_uri(),
                "sync": true,
            }))
            .send()
    });
    let responses = futures::future::join_all(requests).await;

    for resp in responses {
        let json: Value = tokio_test::assert_ok!(resp).json().await.unwrap();
        assert_eq!(json["status"], "completed");
    }
    assert_eq!(Counters::get(&app.counters.recognizer_loads), 1);
    assert_eq!(Counters::get(&app.counters.transcribe_calls), 4);
}
