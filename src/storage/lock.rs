// Per-item FIFO lock.
//
// One lock exists per data item per site, created lazily by the site's lock
// table. Read locks are shared, write locks are exclusive, and waiters are
// served strictly first-in-first-out past the first conflict: once a writer
// queues behind readers, later readers queue behind the writer instead of
// joining the read share.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::common::TransactionId;

/// Lock mode requested by or granted to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Shared read lock.
    Read,
    /// Exclusive write lock.
    Write,
}

/// Result of a lock acquisition attempt.
///
/// A refused acquisition is not an error: the caller receives the non-empty
/// set of transactions it must wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockGrant {
    Granted,
    Wait(HashSet<TransactionId>),
}

impl LockGrant {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockGrant::Granted)
    }
}

/// First-in-first-out lock over a single data item.
///
/// Invariants: the mode is `None` iff the holder set is empty; a write lock
/// has at most one holder; a transaction appears at most once across the
/// holder set and the queue.
#[derive(Debug, Default)]
pub struct FifoLock {
    mode: Option<LockMode>,
    holders: HashSet<TransactionId>,
    queue: VecDeque<TransactionId>,
}

impl FifoLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to acquire the lock for `t` in `mode`.
    ///
    /// `aborted` is the set of transactions that have reached the aborted
    /// state; abort is asynchronous with respect to lock queues, so any
    /// prefix of aborted waiters is discarded here before the request is
    /// evaluated.
    ///
    /// Grant rules:
    /// - a holder whose current mode satisfies the request is re-granted;
    /// - a sole read holder requesting write is upgraded (leaving the queue
    ///   head if it was queued there);
    /// - a holder refused an upgrade waits for the other holders and is
    ///   *not* enqueued — it already holds the lock;
    /// - a non-holder joins a read share, or takes a free lock, only when
    ///   the queue is empty or it sits at the queue head;
    /// - everything else enqueues at the tail and waits for
    ///   `(holders ∪ queue) \ {t}`.
    pub fn acquire(
        &mut self,
        t: TransactionId,
        mode: LockMode,
        aborted: &HashSet<TransactionId>,
    ) -> LockGrant {
        self.compact_queue(aborted);

        if self.holders.contains(&t) {
            if self.mode_accepts(mode) {
                return LockGrant::Granted;
            }
            // read -> write upgrade, granted only to a sole holder
            if self.holders.len() == 1 {
                if self.queue.front() == Some(&t) {
                    self.queue.pop_front();
                }
                self.mode = Some(LockMode::Write);
                return LockGrant::Granted;
            }
            let mut blockers = self.holders.clone();
            blockers.remove(&t);
            debug_assert!(!blockers.is_empty());
            return LockGrant::Wait(blockers);
        }

        // read sharing
        if self.mode == Some(LockMode::Read) && mode == LockMode::Read && self.admits(t) {
            self.holders.insert(t);
            return LockGrant::Granted;
        }

        // free lock
        if self.mode.is_none() {
            debug_assert!(self.holders.is_empty());
            if self.admits(t) {
                self.mode = Some(mode);
                self.holders.insert(t);
                return LockGrant::Granted;
            }
        }

        debug_assert!(!self.queue.contains(&t));
        self.queue.push_back(t);
        let mut blockers: HashSet<TransactionId> = self
            .holders
            .iter()
            .chain(self.queue.iter())
            .copied()
            .collect();
        blockers.remove(&t);
        debug_assert!(!blockers.is_empty());
        LockGrant::Wait(blockers)
    }

    /// Releases `t`'s hold. Resets the mode once the holder set empties;
    /// queued waiters are left in place for their next attempt.
    pub fn release(&mut self, t: TransactionId) {
        self.holders.remove(&t);
        if self.holders.is_empty() {
            self.mode = None;
        }
    }

    pub fn mode(&self) -> Option<LockMode> {
        self.mode
    }

    pub fn holders(&self) -> &HashSet<TransactionId> {
        &self.holders
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// True when `t` may bypass the queue: nobody is waiting, or `t` itself
    /// is at the head (which is then consumed).
    fn admits(&mut self, t: TransactionId) -> bool {
        match self.queue.front() {
            None => true,
            Some(&head) if head == t => {
                self.queue.pop_front();
                true
            }
            Some(_) => false,
        }
    }

    /// Whether the currently held mode satisfies a request from a holder.
    /// A held write lock satisfies any request.
    fn mode_accepts(&self, mode: LockMode) -> bool {
        self.mode == Some(mode) || self.mode == Some(LockMode::Write)
    }

    fn compact_queue(&mut self, aborted: &HashSet<TransactionId>) {
        while let Some(head) = self.queue.front() {
            if aborted.contains(head) {
                self.queue.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> HashSet<TransactionId> {
        HashSet::new()
    }

    fn wait_set(grant: LockGrant) -> HashSet<TransactionId> {
        match grant {
            LockGrant::Wait(set) => set,
            LockGrant::Granted => panic!("expected a wait set"),
        }
    }

    #[test]
    fn test_read_share_then_fifo() {
        let mut lk = FifoLock::new();
        let ab = none();

        assert!(lk.acquire(1, LockMode::Read, &ab).is_granted());
        assert!(lk.acquire(2, LockMode::Read, &ab).is_granted());
        assert!(lk.acquire(3, LockMode::Read, &ab).is_granted());

        // writer queues behind the read share
        let blockers = wait_set(lk.acquire(4, LockMode::Write, &ab));
        assert_eq!(blockers, [1, 2, 3].into_iter().collect());

        // later reader may not jump the queued writer
        let blockers = wait_set(lk.acquire(5, LockMode::Read, &ab));
        assert_eq!(blockers, [1, 2, 3, 4].into_iter().collect());

        // upgrade refused while other readers hold; not enqueued
        let blockers = wait_set(lk.acquire(1, LockMode::Write, &ab));
        assert_eq!(blockers, [2, 3].into_iter().collect());
        assert_eq!(lk.queue_len(), 2);

        // held read lock keeps being re-granted
        assert!(lk.acquire(1, LockMode::Read, &ab).is_granted());
        assert!(lk.acquire(2, LockMode::Read, &ab).is_granted());
        assert!(lk.acquire(3, LockMode::Read, &ab).is_granted());

        lk.release(2);
        assert!(lk.acquire(1, LockMode::Read, &ab).is_granted());
        assert!(lk.acquire(3, LockMode::Read, &ab).is_granted());
        assert!(!lk.acquire(1, LockMode::Write, &ab).is_granted());

        // once sole holder, the upgrade goes through even with a queue
        lk.release(3);
        assert!(lk.acquire(1, LockMode::Read, &ab).is_granted());
        assert!(lk.acquire(1, LockMode::Write, &ab).is_granted());
        assert_eq!(lk.mode(), Some(LockMode::Write));

        // release hands the lock to the queue in FIFO order
        lk.release(1);
        assert!(lk.acquire(4, LockMode::Write, &ab).is_granted());
        lk.release(4);
        assert!(lk.acquire(5, LockMode::Read, &ab).is_granted());
    }

    #[test]
    fn test_aborted_queue_head_is_discarded() {
        let mut lk = FifoLock::new();
        let ab = none();

        assert!(lk.acquire(1, LockMode::Read, &ab).is_granted());
        assert!(!lk.acquire(2, LockMode::Write, &ab).is_granted());
        assert!(!lk.acquire(3, LockMode::Read, &ab).is_granted());

        // once the queued writer aborts, the queued reader is admitted
        let ab: HashSet<TransactionId> = [2].into_iter().collect();
        assert!(lk.acquire(3, LockMode::Read, &ab).is_granted());
        assert_eq!(lk.queue_len(), 0);
    }

    #[test]
    fn test_write_is_exclusive() {
        let mut lk = FifoLock::new();
        let ab = none();

        assert!(lk.acquire(1, LockMode::Write, &ab).is_granted());
        let blockers = wait_set(lk.acquire(2, LockMode::Write, &ab));
        assert_eq!(blockers, [1].into_iter().collect());

        // a write holder may read and re-write freely
        assert!(lk.acquire(1, LockMode::Read, &ab).is_granted());
        assert!(lk.acquire(1, LockMode::Write, &ab).is_granted());

        lk.release(1);
        assert_eq!(lk.mode(), None);
        assert!(lk.acquire(2, LockMode::Write, &ab).is_granted());
    }

    #[test]
    fn test_blocker_set_excludes_requester() {
        let mut lk = FifoLock::new();
        let ab = none();

        assert!(lk.acquire(1, LockMode::Write, &ab).is_granted());
        let blockers = wait_set(lk.acquire(2, LockMode::Read, &ab));
        assert!(!blockers.contains(&2));
        let blockers = wait_set(lk.acquire(3, LockMode::Read, &ab));
        assert!(!blockers.contains(&3));
        assert_eq!(blockers, [1, 2].into_iter().collect());
    }
}
