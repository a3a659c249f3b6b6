use std::sync::Arc;
use std::time::Duration;

use speechtotext_transcription::testing::{Counters, ScriptedProvider};
use speechtotext_transcription::{
    Aligner, ComputeType, ModelCache, ModelKey, ModelSize, PipelineError,
};

fn base_key() -> ModelKey {
    ModelKey::Recognition {
        size: ModelSize::Base,
        compute_type: ComputeType::Float16,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_constructs_once() {
    let provider = ScriptedProvider::hello_world().with_load_delay(Duration::from_millis(100));
    let counters = provider.counters();
    let cache = Arc::new(ModelCache::new(Arc::new(provider), None));

    let acquisitions = (0..8).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.acquire(base_key()).await })
    });
    let handles: Vec<_> = futures::future::join_all(acquisitions)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(Counters::get(&counters.recognizer_loads), 1);
    assert!(handles.windows(2).all(|w| w[0].same_instance(&w[1])));
    assert_eq!(cache.loaded_count(), 1);
}

#[tokio::test]
async fn test_distinct_configurations_get_distinct_models() {
    let provider = ScriptedProvider::hello_world();
    let counters = provider.counters();
    let cache = ModelCache::new(Arc::new(provider), None);

    let base = cache.acquire(base_key()).await.unwrap();
    let small = cache
        .acquire(ModelKey::Recognition {
            size: ModelSize::Small,
            compute_type: ComputeType::Int8,
        })
        .await
        .unwrap();
    let de = cache.aligner("de").await.unwrap();
    let en = cache.aligner("en").await.unwrap();

    assert!(!base.same_instance(&small));
    assert!(!Arc::ptr_eq(&de, &en));
    assert_eq!(de.language(), "de");
    assert_eq!(Counters::get(&counters.recognizer_loads), 2);
    assert_eq!(Counters::get(&counters.aligner_loads), 2);
    assert_eq!(cache.loaded_count(), 4);
}

#[tokio::test]
async fn test_failed_construction_is_retried() {
    let provider = ScriptedProvider::hello_world().with_failing_recognizer_loads(1);
    let counters = provider.counters();
    let cache = ModelCache::new(Arc::new(provider), None);

    let err = cache.acquire(base_key()).await.unwrap_err();
    assert!(matches!(err, PipelineError::ModelUnavailable(_)));
    assert!(!cache.is_ready());
    assert!(!cache.is_loaded(&base_key()));

    cache.acquire(base_key()).await.unwrap();
    assert_eq!(Counters::get(&counters.recognizer_loads), 2);
    assert!(cache.is_loaded(&base_key()));
}

#[tokio::test]
async fn test_diarization_requires_token() {
    let provider = ScriptedProvider::hello_world();
    let counters = provider.counters();

    let cache = ModelCache::new(Arc::new(provider), Some("   ".into()));
    let err = cache.diarizer().await.err().unwrap();
    assert!(matches!(err, PipelineError::ModelUnavailable(_)));
    assert_eq!(Counters::get(&counters.diarizer_loads), 0);

    let provider = ScriptedProvider::hello_world();
    let counters = provider.counters();
    let cache = ModelCache::new(Arc::new(provider), Some("hf_secret".into()));
    cache.diarizer().await.unwrap();
    cache.diarizer().await.unwrap();
    assert_eq!(Counters::get(&counters.diarizer_loads), 1);
}

#[tokio::test]
async fn test_warm_up_readiness_and_clear() {
    let provider = ScriptedProvider::hello_world();
    let counters = provider.counters();
    let cache = ModelCache::new(Arc::new(provider), None);
    assert!(!cache.is_ready());

    cache.warm_up(ModelSize::Base, ComputeType::Float16).await.unwrap();
    assert!(cache.is_ready());
    assert!(cache.is_loaded(&base_key()));

    cache.clear();
    assert!(!cache.is_ready());
    assert_eq!(Counters::get(&counters.releases), 1);

    // Usable again after a clear
    cache.recognizer(ModelSize::Base, ComputeType::Float16).await.unwrap();
    assert_eq!(Counters::get(&counters.recognizer_loads), 2);
}
