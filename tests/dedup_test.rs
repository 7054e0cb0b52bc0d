//! Tests for content-hash keys and the result cache.

use evalgate::scheduler::{CacheKey, ResultCache};
use evalgate::EvalResult;
use serde_json::json;

#[test]
fn test_cache_key_deterministic() {
    let payload = json!({"image": "abc", "rubric": ["clarity", "accuracy"]});
    assert_eq!(CacheKey::of(&payload), CacheKey::of(&payload.clone()));
}

#[test]
fn test_cache_key_ignores_field_order() {
    let a: serde_json::Value =
        serde_json::from_str(r#"{"model": "m1", "input": {"x": 1, "y": 2}}"#).unwrap();
    let b: serde_json::Value =
        serde_json::from_str(r#"{"input": {"y": 2, "x": 1}, "model": "m1"}"#).unwrap();
    assert_eq!(CacheKey::of(&a), CacheKey::of(&b));
}

#[test]
fn test_cache_key_trims_string_whitespace() {
    assert_eq!(
        CacheKey::of(&json!({"text": "  hello "})),
        CacheKey::of(&json!({"text": "hello"}))
    );
}

#[test]
fn test_cache_key_differs_by_content() {
    assert_ne!(CacheKey::of(&json!({"n": 1})), CacheKey::of(&json!({"n": 2})));
    assert_ne!(CacheKey::of(&json!({"n": 1})), CacheKey::of(&json!({"n": "1"})));
    assert_ne!(CacheKey::of(&json!([1, 2])), CacheKey::of(&json!([2, 1])));
}

#[test]
fn test_cache_key_display() {
    let key = CacheKey::of(&json!({"n": 1}));
    let full = key.to_string();
    assert_eq!(full.len(), 64);
    assert!(full.starts_with(&key.short()));
    assert_eq!(key.short().len(), 12);
}

#[test]
fn test_store_lookup_clear() {
    let cache = ResultCache::new();
    let key = CacheKey::of(&json!({"n": 1}));
    assert!(cache.lookup(&key).is_none());

    let result = EvalResult::new("test").with_score(0.5).with_issue("blurry");
    cache.store(key, result.clone());
    assert_eq!(cache.lookup(&key), Some(result));
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.lookup(&key).is_none());
}

#[test]
fn test_store_overwrites_same_key() {
    let cache = ResultCache::new();
    let key = CacheKey::of(&json!({"n": 1}));
    cache.store(key, EvalResult::new("a"));
    cache.store(key, EvalResult::new("b"));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.lookup(&key).map(|r| r.provider), Some("b".to_string()));
}
