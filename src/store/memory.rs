use super::{Op, Store};
use crate::core::error::Error;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Default)]
struct Inner {
    sets: HashMap<String, HashSet<String>>,
    indexes: HashMap<String, HashMap<String, i64>>,
    locks: HashMap<String, Instant>,
    /// batches touching any of these keys fail without applying
    failing_keys: HashSet<String>,
    failing_index_writes: bool,
    /// batches wait this long before applying
    exec_latency: Option<Duration>,
}

/// In-process store with the same semantics as the Postgres one. A single
/// mutex makes every call atomic.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn fail_exec_on(&self, key: &str) {
        self.inner.lock().await.failing_keys.insert(key.to_string());
    }

    pub(crate) async fn fail_index_writes(&self) {
        self.inner.lock().await.failing_index_writes = true;
    }

    pub(crate) async fn slow_exec(&self, latency: Duration) {
        self.inner.lock().await.exec_latency = Some(latency);
    }

    pub(crate) async fn heal(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing_keys.clear();
        inner.failing_index_writes = false;
    }

    pub(crate) async fn set_add(&self, key: &str, member: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
    }

    pub(crate) async fn is_locked(&self, key: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .locks
            .get(key)
            .is_some_and(|expiry| *expiry > Instant::now())
    }
}

fn op_key(op: &Op) -> &str {
    match op {
        Op::SetAdd { key, .. }
        | Op::SetRemove { key, .. }
        | Op::IndexAdd { key, .. }
        | Op::IndexRemove { key, .. }
        | Op::Unlock { key } => key,
    }
}

impl Inner {
    fn apply(&mut self, op: Op) -> u64 {
        let changed = match op {
            Op::SetAdd { key, member } => self.sets.entry(key).or_default().insert(member),
            Op::SetRemove { key, member } => self
                .sets
                .get_mut(&key)
                .is_some_and(|set| set.remove(&member)),
            Op::IndexAdd { key, member, score } => {
                self.indexes.entry(key).or_default().insert(member, score);
                true
            }
            Op::IndexRemove { key, member } => self
                .indexes
                .get_mut(&key)
                .is_some_and(|index| index.remove(&member).is_some()),
            Op::Unlock { key } => self.locks.remove(&key).is_some(),
        };

        u64::from(changed)
    }
}

impl Store for MemoryStore {
    async fn set_pop(&self, key: &str) -> Result<Option<String>, Error> {
        let mut inner = self.inner.lock().await;

        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(None);
        };

        let member = set.iter().next().cloned();
        if let Some(member) = &member {
            set.remove(member);
        }

        Ok(member)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, Error> {
        let inner = self.inner.lock().await;
        Ok(inner.sets.get(key).is_some_and(|set| set.contains(member)))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn index_add(&self, key: &str, member: &str, score: i64) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;

        if inner.failing_index_writes {
            return Err(Error::Store("index write rejected".to_string()));
        }

        inner.apply(Op::index_add(key, member, score));
        Ok(())
    }

    async fn index_score(&self, key: &str, member: &str) -> Result<Option<i64>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner
            .indexes
            .get(key)
            .and_then(|index| index.get(member).copied()))
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool, Error> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        if inner.locks.get(key).is_some_and(|expiry| *expiry > now) {
            return Ok(false);
        }

        inner.locks.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn unlock(&self, key: &str) -> Result<(), Error> {
        self.inner.lock().await.locks.remove(key);
        Ok(())
    }

    async fn exec(&self, ops: Vec<Op>) -> Result<Vec<u64>, Error> {
        let latency = self.inner.lock().await.exec_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock().await;

        if let Some(op) = ops
            .iter()
            .find(|op| inner.failing_keys.contains(op_key(op)))
        {
            return Err(Error::Store(format!(
                "transaction aborted on key {}",
                op_key(op)
            )));
        }

        if inner.failing_index_writes && ops.iter().any(|op| matches!(op, Op::IndexAdd { .. })) {
            return Err(Error::Store("index write rejected".to_string()));
        }

        Ok(ops.into_iter().map(|op| inner.apply(op)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pop_drains_set() {
        let store = MemoryStore::new();
        store.set_add("pool", "a").await;
        store.set_add("pool", "b").await;

        let first = store.set_pop("pool").await.unwrap().unwrap();
        let second = store.set_pop("pool").await.unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(store.set_pop("pool").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_after_ttl() {
        let store = MemoryStore::new();

        assert!(store.try_lock("lock:a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.try_lock("lock:a", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(store.try_lock("lock:a", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_exec_applies_nothing() {
        let store = MemoryStore::new();
        store.fail_exec_on("assigned").await;

        let result = store
            .exec(vec![Op::set_add("pool", "a"), Op::set_add("assigned", "a")])
            .await;

        assert!(result.is_err());
        assert!(!store.set_is_member("pool", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_exec_reports_changes_per_op() {
        let store = MemoryStore::new();
        store.set_add("pool", "a").await;

        let affected = store
            .exec(vec![
                Op::set_remove("pool", "a"),
                Op::set_remove("assigned", "a"),
                Op::index_remove("keepalive", "a"),
            ])
            .await
            .unwrap();

        assert_eq!(affected, vec![1, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_exec_applies_after_latency() {
        let store = MemoryStore::new();
        store.slow_exec(Duration::from_secs(5)).await;

        let start = Instant::now();
        store.exec(vec![Op::set_add("pool", "a")]).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(store.set_is_member("pool", "a").await.unwrap());
    }
}
