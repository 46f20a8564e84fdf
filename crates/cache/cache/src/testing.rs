use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;
use crate::store::DistributedStore;

const HOUR: Duration = Duration::from_secs(3600);

fn test_key(id: &str) -> String {
    format!("conformance:{id}")
}

/// Run the distributed store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if the backend fails an operation outright.
pub async fn run_store_conformance_tests(store: &dyn DistributedStore) -> Result<(), CacheError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_overwrite(store).await?;
    test_set_if_absent_new(store).await?;
    test_set_if_absent_existing(store).await?;
    test_delete(store).await?;
    test_keys_matching(store).await?;
    test_ping(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn DistributedStore) -> Result<(), CacheError> {
    let val = store.get(&test_key("missing")).await?;
    assert!(val.is_none(), "get on missing key should return None");
    Ok(())
}

async fn test_set_and_get(store: &dyn DistributedStore) -> Result<(), CacheError> {
    let key = test_key("set-get");
    store.set_with_ttl(&key, "hello", HOUR).await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("hello"));
    Ok(())
}

async fn test_overwrite(store: &dyn DistributedStore) -> Result<(), CacheError> {
    let key = test_key("overwrite");
    store.set_with_ttl(&key, "v1", HOUR).await?;
    store.set_with_ttl(&key, "v2", HOUR).await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v2"), "set should overwrite");
    Ok(())
}

async fn test_set_if_absent_new(store: &dyn DistributedStore) -> Result<(), CacheError> {
    let key = test_key("nx-new");
    let created = store.set_if_absent(&key, "v1", HOUR).await?;
    assert!(created, "set_if_absent on new key should return true");
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"));
    Ok(())
}

async fn test_set_if_absent_existing(store: &dyn DistributedStore) -> Result<(), CacheError> {
    let key = test_key("nx-existing");
    store.set_with_ttl(&key, "v1", HOUR).await?;
    let created = store.set_if_absent(&key, "v2", HOUR).await?;
    assert!(
        !created,
        "set_if_absent on existing key should return false"
    );
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"), "original value should remain");
    Ok(())
}

async fn test_delete(store: &dyn DistributedStore) -> Result<(), CacheError> {
    let key = test_key("to-delete");
    store.set_with_ttl(&key, "bye", HOUR).await?;
    let existed = store.delete(&key).await?;
    assert!(existed, "delete should return true for existing key");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get after delete should return None");

    let existed = store.delete(&key).await?;
    assert!(!existed, "delete on missing key should return false");
    Ok(())
}

async fn test_keys_matching(store: &dyn DistributedStore) -> Result<(), CacheError> {
    store.set_with_ttl(&test_key("scan:agent:1:a"), "1", HOUR).await?;
    store.set_with_ttl(&test_key("scan:agent:1:b"), "2", HOUR).await?;
    store.set_with_ttl(&test_key("scan:agent:2:a"), "3", HOUR).await?;

    let mut keys = store.keys_matching(&test_key("scan:agent:1:*")).await?;
    keys.sort();
    assert_eq!(
        keys,
        vec![test_key("scan:agent:1:a"), test_key("scan:agent:1:b")],
        "only keys matching the glob should be listed"
    );

    let none = store.keys_matching(&test_key("scan:nothing:*")).await?;
    assert!(none.is_empty());
    Ok(())
}

async fn test_ping(store: &dyn DistributedStore) -> Result<(), CacheError> {
    store.ping().await
}

/// A distributed store whose every operation fails with a connection error.
///
/// Useful for exercising degraded-mode behavior of callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableStore;

impl UnreachableStore {
    fn refused() -> CacheError {
        CacheError::Connection("connection refused".to_owned())
    }
}

#[async_trait]
impl DistributedStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(Self::refused())
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(Self::refused())
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Err(Self::refused())
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(Self::refused())
    }

    async fn keys_matching(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        Err(Self::refused())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(Self::refused())
    }
}
