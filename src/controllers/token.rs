use crate::core::config::LeaseSettings;
use crate::core::error::Error;
use crate::store::{Op, Store};
use crate::types::token::{Reconciliation, Sweep, SweepCounts};
use chrono::Utc;
use std::collections::HashMap;
use tracing::instrument;

pub(crate) const POOL_KEY: &str = "token_pool";
pub(crate) const ASSIGNED_KEY: &str = "assigned_tokens";
pub(crate) const KEEPALIVE_KEY: &str = "keepalive_tokens";
const LOCK_PREFIX: &str = "lock";

pub(crate) fn lock_key(token: &str) -> String {
    format!("{LOCK_PREFIX}:{token}")
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Owns every state transition of a pooled token.
///
/// A token is Available while it is a member of `token_pool`, Assigned while
/// it is a member of `assigned_tokens`, and deleted once it is in neither.
/// `keepalive_tokens` holds one deadline per live token. There is no
/// in-process locking: each operation relies on the store's atomic pop,
/// expiring lock and batch primitives.
#[derive(Clone)]
pub(crate) struct TokenController<S: Store> {
    store: S,
    settings: LeaseSettings,
}

impl<S: Store> std::fmt::Debug for TokenController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenController")
            .field("settings", &self.settings)
            .finish()
    }
}

impl<S: Store> TokenController<S> {
    pub(crate) fn new(store: S, settings: LeaseSettings) -> Self {
        Self { store, settings }
    }

    pub(crate) async fn generate(&self) -> Result<String, Error> {
        let token = uuid::Uuid::new_v4().to_string();
        self.save(&token).await?;

        Ok(token)
    }

    /// Add `token` to the pool with its deadline set to now.
    #[instrument(skip(self))]
    pub(crate) async fn save(&self, token: &str) -> Result<(), Error> {
        self.store
            .exec(vec![
                Op::set_add(POOL_KEY, token),
                Op::index_add(KEEPALIVE_KEY, token, now()),
            ])
            .await?;

        tracing::debug!("token added to pool");
        Ok(())
    }

    #[instrument(skip(self))]
    pub(crate) async fn assign(&self) -> Result<String, Error> {
        let Some(token) = self.store.set_pop(POOL_KEY).await? else {
            return Err(Error::NoAvailableTokens);
        };

        let lock = lock_key(&token);

        // the token has already left the pool here; reconciliation cannot see it
        if !self.store.try_lock(&lock, self.settings.lock_ttl).await? {
            tracing::warn!(token = %token, "token popped from pool is already locked");
            return Err(Error::TokenAlreadyInUse);
        }

        let publish = vec![
            Op::set_add(ASSIGNED_KEY, &token),
            Op::index_add(KEEPALIVE_KEY, &token, now() + self.settings.lease_window),
            Op::Unlock { key: lock.clone() },
        ];

        if let Err(e) = self.store.exec(publish).await {
            self.release_lock(&lock).await;
            tracing::error!(token = %token, "failed to publish assignment: {}", e);
            return Err(e);
        }

        tracing::debug!(token = %token, "token assigned");
        Ok(token)
    }

    /// Compensates a failed hand-off. If this also fails the lock still
    /// lapses after its TTL.
    async fn release_lock(&self, lock: &str) {
        if let Err(e) = self.store.unlock(lock).await {
            tracing::error!(lock, "failed to release assignment lock: {}", e);
        }
    }

    #[instrument(skip(self))]
    pub(crate) async fn renew(&self, token: &str) -> Result<(), Error> {
        let in_pool = self.store.set_is_member(POOL_KEY, token).await?;
        let in_assigned = self.store.set_is_member(ASSIGNED_KEY, token).await?;

        if !in_pool && !in_assigned {
            return Err(Error::TokenNotFound);
        }

        self.store
            .index_add(KEEPALIVE_KEY, token, now() + self.settings.lease_window)
            .await
            .map_err(|e| {
                tracing::error!("failed to write keepalive deadline: {}", e);
                Error::FailedKeepAlive
            })
    }

    /// Move an assigned token back to the pool. Its deadline is pushed a
    /// full lease window ahead so it is not purged straight away.
    #[instrument(skip(self))]
    pub(crate) async fn release(&self, token: &str) -> Result<(), Error> {
        if !self.store.set_is_member(ASSIGNED_KEY, token).await? {
            return Err(Error::TokenNotAssigned);
        }

        self.store
            .exec(vec![
                Op::set_remove(ASSIGNED_KEY, token),
                Op::set_add(POOL_KEY, token),
                Op::index_add(KEEPALIVE_KEY, token, now() + self.settings.lease_window),
            ])
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub(crate) async fn delete(&self, token: &str) -> Result<(), Error> {
        let affected = self
            .store
            .exec(vec![
                Op::set_remove(POOL_KEY, token),
                Op::set_remove(ASSIGNED_KEY, token),
                Op::index_remove(KEEPALIVE_KEY, token),
            ])
            .await?;

        if affected.iter().all(|&n| n == 0) {
            return Err(Error::TokenNotFound);
        }

        Ok(())
    }

    pub(crate) async fn list_available(&self) -> Result<Vec<String>, Error> {
        self.store.set_members(POOL_KEY).await
    }

    /// Remaining lease seconds per assigned token, floored at -1. A missing
    /// deadline also reads as -1.
    pub(crate) async fn list_assigned(&self) -> Result<HashMap<String, i64>, Error> {
        let tokens = self.store.set_members(ASSIGNED_KEY).await?;
        let now = now();

        let mut remaining = HashMap::with_capacity(tokens.len());
        for token in tokens {
            let seconds = match self.store.index_score(KEEPALIVE_KEY, &token).await? {
                Some(deadline) => (deadline - now).max(-1),
                None => -1,
            };
            remaining.insert(token, seconds);
        }

        Ok(remaining)
    }

    /// One reconciliation pass: both sweeps run concurrently and each commits
    /// its own batch, so one failing leaves the other's counts intact.
    #[instrument(skip(self))]
    pub(crate) async fn reconcile(&self) -> Reconciliation {
        let now = now();
        let release_before = now - self.settings.release_grace;
        let delete_before = now - self.settings.deletion_threshold;

        tracing::debug!(now, "starting token reconciliation");

        let (assigned, pool) = tokio::join!(
            self.sweep_assigned(release_before, delete_before),
            self.sweep_pool(delete_before),
        );

        let mut reconciliation = Reconciliation::default();
        reconciliation.record(Sweep::Assigned, assigned);
        reconciliation.record(Sweep::Pool, pool);

        reconciliation
    }

    async fn sweep_assigned(
        &self,
        release_before: i64,
        delete_before: i64,
    ) -> Result<SweepCounts, Error> {
        let tokens = self.store.set_members(ASSIGNED_KEY).await?;
        tracing::debug!("found {} assigned tokens", tokens.len());

        let mut counts = SweepCounts::default();
        let mut ops = Vec::new();

        for token in tokens {
            let deadline = match self.store.index_score(KEEPALIVE_KEY, &token).await {
                Ok(deadline) => deadline,
                Err(e) => {
                    tracing::warn!(token = %token, "failed to read deadline, skipping: {}", e);
                    continue;
                }
            };

            match deadline {
                None => {
                    tracing::debug!(token = %token, "assigned token has no deadline, deleting");
                    ops.push(Op::set_remove(ASSIGNED_KEY, &token));
                    ops.push(Op::index_remove(KEEPALIVE_KEY, &token));
                    counts.deleted += 1;
                }
                // inactivity counts from the last assignment or renewal
                Some(deadline) if deadline - self.settings.lease_window <= delete_before => {
                    tracing::debug!(token = %token, deadline, "assigned token abandoned, deleting");
                    ops.push(Op::set_remove(ASSIGNED_KEY, &token));
                    ops.push(Op::index_remove(KEEPALIVE_KEY, &token));
                    counts.deleted += 1;
                }
                // deadline left as is so repeated expiry converges on deletion
                Some(deadline) if deadline <= release_before => {
                    tracing::debug!(token = %token, deadline, "lease expired, returning token to pool");
                    ops.push(Op::set_remove(ASSIGNED_KEY, &token));
                    ops.push(Op::set_add(POOL_KEY, &token));
                    counts.released += 1;
                }
                Some(_) => {}
            }
        }

        if !ops.is_empty() {
            self.store.exec(ops).await?;
        }

        Ok(counts)
    }

    async fn sweep_pool(&self, delete_before: i64) -> Result<SweepCounts, Error> {
        let tokens = self.store.set_members(POOL_KEY).await?;

        let mut counts = SweepCounts::default();
        let mut ops = Vec::new();

        for token in tokens {
            let deadline = self.store.index_score(KEEPALIVE_KEY, &token).await?;

            if deadline.is_none_or(|deadline| deadline <= delete_before) {
                tracing::debug!(token = %token, ?deadline, "pooled token inactive, deleting");
                ops.push(Op::set_remove(POOL_KEY, &token));
                ops.push(Op::index_remove(KEEPALIVE_KEY, &token));
                counts.deleted += 1;
            }
        }

        if !ops.is_empty() {
            self.store.exec(ops).await?;
        }

        Ok(counts)
    }
}
