//! Backing-store contract for the token pool.
//!
//! Everything the lease engine needs from storage: unordered named sets,
//! a score-indexed set (scores are epoch seconds), a set-if-absent lock with
//! expiry, and an all-or-nothing batch of set/index mutations. No state is
//! cached in process; every call goes to the store.

use crate::core::error::Error;
use std::future::Future;
use std::time::Duration;

#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod postgres;

/// A single mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
    IndexAdd { key: String, member: String, score: i64 },
    IndexRemove { key: String, member: String },
    /// Drop a lock taken with [`Store::try_lock`] as part of the batch.
    Unlock { key: String },
}

impl Op {
    pub(crate) fn set_add(key: &str, member: &str) -> Self {
        Op::SetAdd {
            key: key.to_string(),
            member: member.to_string(),
        }
    }

    pub(crate) fn set_remove(key: &str, member: &str) -> Self {
        Op::SetRemove {
            key: key.to_string(),
            member: member.to_string(),
        }
    }

    pub(crate) fn index_add(key: &str, member: &str, score: i64) -> Self {
        Op::IndexAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        }
    }

    pub(crate) fn index_remove(key: &str, member: &str) -> Self {
        Op::IndexRemove {
            key: key.to_string(),
            member: member.to_string(),
        }
    }
}

pub(crate) trait Store: Clone + Send + Sync + 'static {
    /// Remove and return one arbitrary member of the set, if any.
    fn set_pop(&self, key: &str) -> impl Future<Output = Result<Option<String>, Error>> + Send;

    fn set_is_member(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    fn set_members(&self, key: &str) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Insert or overwrite the member's score.
    fn index_add(
        &self,
        key: &str,
        member: &str,
        score: i64,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn index_score(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<Option<i64>, Error>> + Send;

    /// Set `key` only if it is absent or its previous holder expired.
    /// Returns whether the lock was taken.
    fn try_lock(&self, key: &str, ttl: Duration)
    -> impl Future<Output = Result<bool, Error>> + Send;

    fn unlock(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Apply every op or none of them. Returns, per op, how many entries it
    /// changed.
    fn exec(&self, ops: Vec<Op>) -> impl Future<Output = Result<Vec<u64>, Error>> + Send;
}
