use crisp_core::EngineError;
use crisp_processing::ProcessingEngine;

#[tokio::test]
async fn test_over_release_never_goes_negative() {
    let engine = ProcessingEngine::default();
    let pool = engine.pool();

    let lease = pool.acquire(2).await.unwrap();
    assert_eq!(pool.usage_count(2), Some(1));

    pool.release(lease);
    pool.release_scale(2);
    pool.release_scale(2);
    assert_eq!(pool.usage_count(2), Some(0));
    assert!(!pool.in_use());
}

#[tokio::test]
async fn test_aggressive_cleanup_refuses_while_in_use() {
    let engine = ProcessingEngine::default();
    let pool = engine.pool();

    let busy = pool.acquire(3).await.unwrap();
    let idle = pool.acquire(2).await.unwrap();
    drop(idle);

    let err = pool.aggressive_cleanup().unwrap_err();
    assert!(matches!(err, EngineError::ResourceBusy(_)));
    assert_eq!(pool.usage_count(3), Some(1));

    drop(busy);
    assert_eq!(pool.aggressive_cleanup().unwrap(), 2);
    assert!(pool.status().is_empty());
}

#[tokio::test]
async fn test_teardown_disposes_everything() {
    let engine = ProcessingEngine::default();
    engine.init();
    let _held = engine.pool().acquire(4).await.unwrap();
    let _other = engine.pool().acquire(2).await.unwrap();

    engine.dispose().await;

    assert!(engine.pool().status().is_empty());
}

#[tokio::test]
async fn test_unsupported_scale_rejected() {
    let engine = ProcessingEngine::default();
    let err = engine.pool().acquire(5).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}
