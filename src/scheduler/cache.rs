//! Time-boxed memoization of due-set queries, cleared on every mutation.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::query::QueryKind;
use crate::models::ReviewPlan;

pub const DEFAULT_TTL_SECS: i64 = 30;

struct CacheEntry {
    stored_at: DateTime<Utc>,
    plans: Vec<ReviewPlan>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKind, CacheEntry>,
    // Bumped on every clear; a load that started before a clear is not stored.
    generation: u64,
}

/// Time-boxed memoization of due-set query results, keyed by query kind.
pub struct QueryCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the live entry for `kind`, or runs `load` and stores its result.
    ///
    /// Entry age is measured against `as_of`. The lock is not held while
    /// `load` runs, so callers may take other locks inside it. Errors from
    /// `load` are returned and nothing is stored.
    pub fn get_or_load<E>(
        &self,
        kind: QueryKind,
        as_of: DateTime<Utc>,
        load: impl FnOnce() -> Result<Vec<ReviewPlan>, E>,
    ) -> Result<Vec<ReviewPlan>, E> {
        let generation = {
            let state = self.state.lock();
            if let Some(entry) = state.entries.get(&kind) {
                if self.is_live(entry, as_of) {
                    tracing::debug!(query = kind.as_str(), "cache hit");
                    return Ok(entry.plans.clone());
                }
            }
            state.generation
        };

        tracing::debug!(query = kind.as_str(), "cache miss");
        let plans = load()?;

        let mut state = self.state.lock();
        if state.generation == generation {
            state.entries.insert(
                kind,
                CacheEntry {
                    stored_at: as_of,
                    plans: plans.clone(),
                },
            );
        }
        Ok(plans)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.generation = state.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_live(&self, entry: &CacheEntry, as_of: DateTime<Utc>) -> bool {
        as_of >= entry.stored_at && as_of - entry.stored_at < self.ttl
    }
}
