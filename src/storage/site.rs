// Versioned site storage.
//
// Each site owns a lazily populated lock table, a committed version history
// per item (parallel vectors of strictly increasing commit timestamps and
// values), an uncommitted write buffer, and the breakpoint record of its
// fail/recover history. Sites never reference transactions; they identify
// them by opaque id.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{SiteId, Timestamp, TransactionId};
use crate::storage::catalog::DataItem;
use crate::storage::lock::{FifoLock, LockGrant, LockMode};

/// Site availability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteStatus {
    Running,
    Failed,
}

/// Outcome of a read attempt at one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteRead {
    /// The read succeeded with this value.
    Value(i64),
    /// The item is locked; the caller must wait for these transactions.
    Blocked(HashSet<TransactionId>),
    /// The requested snapshot cannot be served by this site.
    Unavailable,
    /// The replicated copy has not been written since the site recovered;
    /// the caller should try another replica.
    Uninitialized,
}

/// Outcome of a write attempt at one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteWrite {
    Written,
    Blocked(HashSet<TransactionId>),
}

/// A single storage site.
pub struct Site {
    id: SiteId,
    status: SiteStatus,
    lock_table: HashMap<String, FifoLock>,
    /// Per-item commit timestamps, strictly increasing.
    commit_times: HashMap<String, Vec<Timestamp>>,
    /// Values parallel to `commit_times`.
    commit_values: HashMap<String, Vec<i64>>,
    /// Pending writes: item -> (owning transaction, value). The lock
    /// discipline admits at most one pending writer per item.
    pending: HashMap<String, (TransactionId, i64)>,
    /// Birth time followed by every fail and recover time. An even index
    /// starts a running segment, an odd index a failed one.
    breakpoints: Vec<Timestamp>,
}

impl Site {
    pub fn new(id: SiteId, birth: Timestamp) -> Self {
        Self {
            id,
            status: SiteStatus::Running,
            lock_table: HashMap::new(),
            commit_times: HashMap::new(),
            commit_values: HashMap::new(),
            pending: HashMap::new(),
            breakpoints: vec![birth],
        }
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn status(&self) -> SiteStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SiteStatus::Running
    }

    /// Timestamp of the most recent breakpoint (birth, fail, or recover).
    pub fn last_event(&self) -> Timestamp {
        *self.breakpoints.last().expect("breakpoints start at birth")
    }

    /// The site stops serving. Locks and pending writes are kept until
    /// `recover` so the breakpoint record alone decides validation.
    pub fn fail(&mut self, now: Timestamp) {
        self.status = SiteStatus::Failed;
        self.breakpoints.push(now);
        debug!(site = self.id, at = now, "site failed");
    }

    /// The site resumes serving. Locks and uncommitted writes do not
    /// survive the outage; committed history does.
    pub fn recover(&mut self, now: Timestamp) {
        self.status = SiteStatus::Running;
        self.lock_table = HashMap::new();
        self.pending = HashMap::new();
        self.breakpoints.push(now);
        debug!(site = self.id, at = now, "site recovered");
    }

    /// True when the site has been up continuously since `ts`. Used by
    /// commit-time validation of read/write transactions.
    pub fn available_since(&self, ts: Timestamp) -> bool {
        debug_assert!(self.is_running());
        ts > self.last_event()
    }

    /// Multiversion read for read-only transactions: the greatest version
    /// committed strictly before `ts`.
    ///
    /// Replicated copies are additionally subject to the availability rule:
    /// the site must have been running at `ts`, and the version must not
    /// predate the breakpoint governing `ts` (a copy stays stale after
    /// recovery until a post-recovery commit lands). Single-site items skip
    /// the rule — there is no fresher replica to prefer.
    pub fn snapshot_read(&self, item: &DataItem, ts: Timestamp) -> SiteRead {
        debug_assert!(self.is_running());
        let Some(times) = self.commit_times.get(&item.name) else {
            return SiteRead::Unavailable;
        };
        let i = times.partition_point(|&t| t < ts);
        if i == 0 {
            return SiteRead::Unavailable;
        }
        let i = i - 1;
        let value = self.commit_values[&item.name][i];
        if !item.is_replicated() {
            return SiteRead::Value(value);
        }
        let j = self.breakpoints.partition_point(|&b| b < ts);
        debug_assert!(j > 0, "snapshots postdate site birth");
        let j = j - 1;
        if j % 2 == 1 || times[i] < self.breakpoints[j] {
            return SiteRead::Unavailable;
        }
        SiteRead::Value(value)
    }

    /// Locked read for read/write transactions.
    ///
    /// Returns the transaction's own pending value when it has one buffered
    /// here, otherwise the latest committed value.
    pub fn read(
        &mut self,
        t: TransactionId,
        item: &DataItem,
        aborted: &HashSet<TransactionId>,
    ) -> SiteRead {
        debug_assert!(self.is_running());
        if !self.initialized(item) {
            return SiteRead::Uninitialized;
        }
        match self.acquire(t, &item.name, LockMode::Read, aborted) {
            LockGrant::Granted => {
                if let Some(&(owner, value)) = self.pending.get(&item.name) {
                    debug_assert_eq!(owner, t, "pending writer must hold the lock");
                    SiteRead::Value(value)
                } else {
                    let value = self
                        .latest_committed(&item.name)
                        .expect("initialized item has committed history");
                    SiteRead::Value(value)
                }
            }
            LockGrant::Wait(blockers) => SiteRead::Blocked(blockers),
        }
    }

    /// Locked write for read/write transactions. The value is buffered
    /// until the owner commits or aborts.
    ///
    /// Initialization state does not matter here: a write to a
    /// never-initialized replicated copy is the path that re-initializes
    /// it, and it contends on the lock like any other write — a second
    /// writer arriving before the first commits must wait for it.
    pub fn write(
        &mut self,
        t: TransactionId,
        item: &DataItem,
        value: i64,
        aborted: &HashSet<TransactionId>,
    ) -> SiteWrite {
        debug_assert!(self.is_running());
        match self.acquire(t, &item.name, LockMode::Write, aborted) {
            LockGrant::Granted => {
                self.pending.insert(item.name.clone(), (t, value));
                SiteWrite::Written
            }
            LockGrant::Wait(blockers) => SiteWrite::Blocked(blockers),
        }
    }

    /// Archives `t`'s pending writes at `now` and releases its locks.
    pub fn commit(&mut self, t: TransactionId, now: Timestamp) {
        self.clean(t, Some(now));
    }

    /// Discards `t`'s pending writes and releases its locks.
    pub fn abort(&mut self, t: TransactionId) {
        self.clean(t, None);
    }

    /// Installs a committed version directly; used to seed initial values
    /// at catalog construction.
    pub fn install(&mut self, name: &str, ts: Timestamp, value: i64) {
        self.archive(name, ts, value);
    }

    /// Latest committed value of an item, if any version exists here.
    pub fn latest_committed(&self, name: &str) -> Option<i64> {
        self.commit_values.get(name).and_then(|v| v.last().copied())
    }

    /// Every item with committed history here, with its latest value.
    pub fn committed_snapshot(&self) -> Vec<(String, i64)> {
        self.commit_values
            .iter()
            .filter_map(|(name, values)| values.last().map(|&v| (name.clone(), v)))
            .collect()
    }

    fn clean(&mut self, t: TransactionId, archive_at: Option<Timestamp>) {
        debug_assert!(self.is_running());
        let mine: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, &(owner, _))| owner == t)
            .map(|(name, _)| name.clone())
            .collect();
        for name in mine {
            let (_, value) = self.pending.remove(&name).expect("collected above");
            if let Some(ts) = archive_at {
                self.archive(&name, ts, value);
            }
        }
        for lock in self.lock_table.values_mut() {
            lock.release(t);
        }
    }

    fn archive(&mut self, name: &str, ts: Timestamp, value: i64) {
        let times = self.commit_times.entry(name.to_string()).or_default();
        if let Some(&last) = times.last() {
            assert!(last < ts, "history timestamps must strictly increase");
        }
        times.push(ts);
        self.commit_values.entry(name.to_string()).or_default().push(value);
    }

    fn acquire(
        &mut self,
        t: TransactionId,
        name: &str,
        mode: LockMode,
        aborted: &HashSet<TransactionId>,
    ) -> LockGrant {
        self.lock_table
            .entry(name.to_string())
            .or_default()
            .acquire(t, mode, aborted)
    }

    /// Whether the copy is usable by read/write transactions: it has a
    /// pending write, or is the single authoritative copy, or some version
    /// was committed at or after the most recent breakpoint.
    fn initialized(&self, item: &DataItem) -> bool {
        if self.pending.contains_key(&item.name) {
            return true;
        }
        if !item.is_replicated() {
            return true;
        }
        match self.commit_times.get(&item.name) {
            None => false,
            Some(times) => {
                let last = self.last_event();
                times.partition_point(|&t| t < last) < times.len()
            }
        }
    }
}
