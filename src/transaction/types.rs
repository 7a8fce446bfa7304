// Core transaction types.
//
// Transactions come in two variants, modelled as a tagged kind rather than
// trait objects: read/write transactions participate in locking and the
// wait-for graph, read-only transactions read a multiversion snapshot fixed
// at their creation tick. Every queued operation carries a globally unique
// id; the scheduler dispatches in ascending id order.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{OperationId, SiteId, Timestamp, TransactionId};

/// Transaction lifecycle state.
///
/// ```text
/// Created -> Ready -> Running -> Committed
///              ^         |
///              |         v
///              +------ Blocked        Running/Blocked -> Aborted
/// ```
///
/// `Created` transactions become `Ready` only at the end of the tick in
/// which they appeared, so a transaction never executes on its birth tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Created,
    Ready,
    Running,
    Blocked,
    Committed,
    Aborted,
}

impl TransactionStatus {
    /// Returns true once the transaction can never execute again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Aborted)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Created => "created",
            TransactionStatus::Ready => "ready",
            TransactionStatus::Running => "running",
            TransactionStatus::Blocked => "blocked",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Transaction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    ReadWrite,
    ReadOnly,
}

/// A deferred call queued against a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    Read { item: String },
    Write { item: String, value: i64 },
    Commit,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OpKind,
}

/// What an executed operation left behind, kept in operation order for the
/// commit-time report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A successful read: the value and where/when it was served.
    Value {
        value: i64,
        site: SiteId,
        tick: Timestamp,
    },
    /// A write or commit completed; nothing to report.
    Completed,
}

/// A transaction and everything it owns: its operation queue and cursor,
/// its recorded observations, its wait-for-graph edges (read/write only),
/// and the log of `(site, tick)` accesses used by commit-time validation.
#[derive(Debug)]
pub struct Transaction {
    pub id: TransactionId,
    pub name: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// Creation tick; doubles as the snapshot timestamp for read-only
    /// transactions and as the age used for deadlock victim selection.
    pub birth: Timestamp,
    ops: Vec<Operation>,
    cursor: usize,
    pub observations: Vec<Observation>,
    /// Transactions this one waits for.
    pub wait_for: HashSet<TransactionId>,
    /// Transactions waiting for this one.
    pub waited_by: HashSet<TransactionId>,
    /// Every successful site access, for commit-time validation.
    pub accessed: Vec<(SiteId, Timestamp)>,
}

impl Transaction {
    pub fn new(id: TransactionId, name: &str, kind: TransactionKind, birth: Timestamp) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            status: TransactionStatus::Created,
            birth,
            ops: Vec::new(),
            cursor: 0,
            observations: Vec::new(),
            wait_for: HashSet::new(),
            waited_by: HashSet::new(),
            accessed: Vec::new(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.kind == TransactionKind::ReadOnly
    }

    pub fn enqueue(&mut self, op: Operation) {
        self.ops.push(op);
    }

    /// The operation the scheduler would dispatch next, if any.
    pub fn next_op(&self) -> Option<&Operation> {
        self.ops.get(self.cursor)
    }

    /// Records the outcome of the current operation and moves the cursor.
    /// Called only when the operation actually advanced; a blocked or
    /// unservable operation leaves the cursor in place for retry.
    pub fn advance(&mut self, observation: Observation) {
        self.observations.push(observation);
        self.cursor += 1;
    }

    pub fn set_status(&mut self, status: TransactionStatus) {
        debug!(txn = %self.name, from = %self.status, to = %status, "transaction status change");
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(TransactionStatus::Committed.is_terminal());
        assert!(TransactionStatus::Aborted.is_terminal());
        assert!(!TransactionStatus::Running.is_terminal());
        assert!(!TransactionStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_cursor_advances_only_on_completion() {
        let mut t = Transaction::new(0, "T1", TransactionKind::ReadWrite, 1);
        t.enqueue(Operation {
            id: 1,
            kind: OpKind::Read {
                item: "x1".to_string(),
            },
        });
        t.enqueue(Operation { id: 2, kind: OpKind::Commit });

        assert_eq!(t.next_op().map(|op| op.id), Some(1));
        // a blocked attempt leaves the cursor in place
        assert_eq!(t.next_op().map(|op| op.id), Some(1));

        t.advance(Observation::Value {
            value: 10,
            site: 2,
            tick: 3,
        });
        assert_eq!(t.next_op().map(|op| op.id), Some(2));
        t.advance(Observation::Completed);
        assert!(t.next_op().is_none());
    }
}
