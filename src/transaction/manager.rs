// Transaction manager.
//
// Owns the logical clock, the ten sites, the data-item catalog, and every
// transaction ever created. Execution is single-threaded and discrete-time:
// each external input line advances the clock once and drives one `tick()`,
// which dispatches at most one operation per eligible transaction in global
// FIFO order (ascending operation id), gives same-tick woken transactions
// one extra dispatch, and finishes with a deadlock sweep.
//
// User-visible report lines (commit/abort reports and their read values)
// are appended to an ordered output buffer the driver drains, keeping the
// emission order testable.

use std::collections::{HashMap, HashSet};
use std::mem;

use tracing::{debug, info};

use crate::common::{OperationId, SiteId, Timestamp, TransactionId, SITE_COUNT};
use crate::error::{DbError, Result};
use crate::storage::{Catalog, DataItem, Site, SiteRead, SiteWrite};
use crate::transaction::deadlock;
use crate::transaction::types::{
    Observation, OpKind, Operation, Transaction, TransactionKind, TransactionStatus,
};

pub struct TransactionManager {
    now: Timestamp,
    next_op_id: OperationId,
    sites: Vec<Site>,
    catalog: Catalog,
    txns: Vec<Transaction>,
    by_name: HashMap<String, TransactionId>,
    out: Vec<String>,
    show_read_origin: bool,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::with_read_origin(false)
    }

    pub fn with_read_origin(show_read_origin: bool) -> Self {
        let mut sites: Vec<Site> = (1..=SITE_COUNT).map(|i| Site::new(i, 0)).collect();
        let catalog = Catalog::bootstrap(&mut sites, 0);
        Self {
            now: 0,
            next_op_id: 0,
            sites,
            catalog,
            txns: Vec::new(),
            by_name: HashMap::new(),
            out: Vec::new(),
            show_read_origin,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Advances the logical clock; called once per external input line,
    /// before the line's commands are applied.
    pub fn advance_clock(&mut self) {
        self.now += 1;
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn site(&self, id: SiteId) -> Option<&Site> {
        (1..=SITE_COUNT).contains(&id).then(|| &self.sites[id - 1])
    }

    pub fn transaction(&self, name: &str) -> Option<&Transaction> {
        self.by_name.get(name).map(|&id| &self.txns[id])
    }

    /// Appends a user-visible output line.
    pub fn emit(&mut self, line: impl Into<String>) {
        self.out.push(line.into());
    }

    /// Takes every output line emitted so far, in order.
    pub fn drain_output(&mut self) -> Vec<String> {
        mem::take(&mut self.out)
    }

    // ========================================================================
    // Command intake
    // ========================================================================

    /// Creates a transaction. It becomes eligible to run on the tick after
    /// the one it was created in.
    pub fn begin(&mut self, name: &str, kind: TransactionKind) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(DbError::DuplicateTransaction(name.to_string()));
        }
        let id = self.txns.len();
        debug!(txn = name, ?kind, at = self.now, "begin transaction");
        self.txns.push(Transaction::new(id, name, kind, self.now));
        self.by_name.insert(name.to_string(), id);
        Ok(())
    }

    pub fn queue_read(&mut self, txn: &str, item: &str) -> Result<()> {
        let tid = self.lookup(txn)?;
        self.lookup_item(item)?;
        let op = self.next_operation_id();
        self.txns[tid].enqueue(Operation {
            id: op,
            kind: OpKind::Read {
                item: item.to_string(),
            },
        });
        Ok(())
    }

    pub fn queue_write(&mut self, txn: &str, item: &str, value: i64) -> Result<()> {
        let tid = self.lookup(txn)?;
        self.lookup_item(item)?;
        if self.txns[tid].is_read_only() {
            return Err(DbError::ReadOnlyWrite(txn.to_string()));
        }
        let op = self.next_operation_id();
        self.txns[tid].enqueue(Operation {
            id: op,
            kind: OpKind::Write {
                item: item.to_string(),
                value,
            },
        });
        Ok(())
    }

    pub fn queue_commit(&mut self, txn: &str) -> Result<()> {
        let tid = self.lookup(txn)?;
        let op = self.next_operation_id();
        self.txns[tid].enqueue(Operation {
            id: op,
            kind: OpKind::Commit,
        });
        Ok(())
    }

    pub fn fail_site(&mut self, id: SiteId) -> Result<()> {
        if !(1..=SITE_COUNT).contains(&id) {
            return Err(DbError::NoSuchSite(id));
        }
        self.sites[id - 1].fail(self.now);
        Ok(())
    }

    pub fn recover_site(&mut self, id: SiteId) -> Result<()> {
        if !(1..=SITE_COUNT).contains(&id) {
            return Err(DbError::NoSuchSite(id));
        }
        self.sites[id - 1].recover(self.now);
        Ok(())
    }

    // ========================================================================
    // Tick pipeline
    // ========================================================================

    /// Runs one scheduling round:
    ///
    /// 1. snapshot the transactions created this tick (they stay out);
    /// 2. promote ready transactions to running;
    /// 3. dispatch one operation per running transaction, in ascending
    ///    operation-id order across all of them;
    /// 4. transactions that were blocked at tick start and became ready
    ///    during step 3 get one extra dispatch, again in id order;
    /// 5. promote the step-1 snapshot to ready;
    /// 6. deadlock sweep.
    pub fn tick(&mut self) {
        let created: Vec<TransactionId> = self.with_status(TransactionStatus::Created);
        let blocked_at_start: Vec<TransactionId> = self.with_status(TransactionStatus::Blocked);

        for tid in self.with_status(TransactionStatus::Ready) {
            self.txns[tid].set_status(TransactionStatus::Running);
        }

        let mut runnable: Vec<(OperationId, TransactionId)> = self
            .txns
            .iter()
            .filter(|t| t.status == TransactionStatus::Running)
            .filter_map(|t| t.next_op().map(|op| (op.id, t.id)))
            .collect();
        runnable.sort_unstable();
        for (_, tid) in runnable {
            self.step(tid);
        }

        let mut waked: Vec<(OperationId, TransactionId)> = blocked_at_start
            .into_iter()
            .filter(|&tid| self.txns[tid].status == TransactionStatus::Ready)
            .filter_map(|tid| self.txns[tid].next_op().map(|op| (op.id, tid)))
            .collect();
        waked.sort_unstable();
        for (_, tid) in waked {
            self.txns[tid].set_status(TransactionStatus::Running);
            self.step(tid);
        }

        for tid in created {
            if self.txns[tid].status == TransactionStatus::Created {
                self.txns[tid].set_status(TransactionStatus::Ready);
            }
        }

        self.detect_deadlocks();
    }

    /// Executes exactly one operation for `tid`. The cursor advances iff
    /// the operation completed; a blocked or unservable operation is
    /// retried on a later tick.
    fn step(&mut self, tid: TransactionId) {
        debug_assert_eq!(self.txns[tid].status, TransactionStatus::Running);
        let Some(op) = self.txns[tid].next_op().cloned() else {
            return;
        };
        let outcome = match op.kind {
            OpKind::Read { item } => {
                if self.txns[tid].is_read_only() {
                    self.snapshot_read(tid, &item)
                } else {
                    self.locked_read(tid, &item)
                }
            }
            OpKind::Write { item, value } => self.replicated_write(tid, &item, value),
            OpKind::Commit => Some(self.finish(tid)),
        };
        if let Some(observation) = outcome {
            self.txns[tid].advance(observation);
        }
    }

    // ========================================================================
    // Operation execution
    // ========================================================================

    /// Read/write read: the first running site decides the outcome. Copies
    /// that are down or uninitialized fall through to the next replica; a
    /// lock conflict blocks the transaction; if no copy responds the
    /// transaction parks in ready and retries later.
    fn locked_read(&mut self, tid: TransactionId, item_name: &str) -> Option<Observation> {
        let item = self.item(item_name);
        let aborted = self.aborted_set();
        for &sid in &item.sites {
            if !self.sites[sid - 1].is_running() {
                continue;
            }
            match self.sites[sid - 1].read(tid, &item, &aborted) {
                SiteRead::Value(value) => {
                    self.txns[tid].accessed.push((sid, self.now));
                    info!(
                        txn = %self.txns[tid].name,
                        item = item_name,
                        value,
                        site = sid,
                        tick = self.now,
                        "read"
                    );
                    return Some(Observation::Value {
                        value,
                        site: sid,
                        tick: self.now,
                    });
                }
                SiteRead::Blocked(blockers) => {
                    info!(
                        txn = %self.txns[tid].name,
                        item = item_name,
                        "read blocked by lock conflict"
                    );
                    self.block_on(tid, blockers);
                    return None;
                }
                SiteRead::Uninitialized | SiteRead::Unavailable => continue,
            }
        }
        // every copy is down or unusable; retry when a site recovers
        self.txns[tid].set_status(TransactionStatus::Ready);
        None
    }

    /// Read-only read against the snapshot fixed at creation time.
    fn snapshot_read(&mut self, tid: TransactionId, item_name: &str) -> Option<Observation> {
        let item = self.item(item_name);
        let ts = self.txns[tid].birth;
        for &sid in &item.sites {
            let site = &self.sites[sid - 1];
            if !site.is_running() {
                continue;
            }
            if let SiteRead::Value(value) = site.snapshot_read(&item, ts) {
                info!(
                    txn = %self.txns[tid].name,
                    item = item_name,
                    value,
                    site = sid,
                    snapshot = ts,
                    "snapshot read"
                );
                return Some(Observation::Value {
                    value,
                    site: sid,
                    tick: self.now,
                });
            }
        }
        self.txns[tid].set_status(TransactionStatus::Ready);
        None
    }

    /// Available-copies write: every running replica is written. One
    /// blocking replica blocks the whole operation (locks already taken
    /// stay held and are released at commit/abort). With no replica up the
    /// operation completes as a no-op.
    fn replicated_write(
        &mut self,
        tid: TransactionId,
        item_name: &str,
        value: i64,
    ) -> Option<Observation> {
        let item = self.item(item_name);
        let aborted = self.aborted_set();
        let mut wrote = false;
        let mut blockers: Option<HashSet<TransactionId>> = None;
        for &sid in &item.sites {
            if !self.sites[sid - 1].is_running() {
                continue;
            }
            match self.sites[sid - 1].write(tid, &item, value, &aborted) {
                SiteWrite::Written => {
                    wrote = true;
                    self.txns[tid].accessed.push((sid, self.now));
                }
                SiteWrite::Blocked(set) => {
                    blockers = Some(set);
                    break;
                }
            }
        }
        if let Some(blockers) = blockers {
            info!(
                txn = %self.txns[tid].name,
                item = item_name,
                "write blocked by lock conflict"
            );
            self.block_on(tid, blockers);
            return None;
        }
        if wrote {
            info!(txn = %self.txns[tid].name, item = item_name, value, "write");
        } else {
            info!(txn = %self.txns[tid].name, item = item_name, "no site up, write is a no-op");
        }
        Some(Observation::Completed)
    }

    /// Commit request: read-only transactions always commit; read/write
    /// transactions first validate every recorded site access.
    fn finish(&mut self, tid: TransactionId) -> Observation {
        let committable = match self.txns[tid].kind {
            TransactionKind::ReadOnly => true,
            TransactionKind::ReadWrite => self.validate(tid),
        };
        let status = if committable {
            TransactionStatus::Committed
        } else {
            TransactionStatus::Aborted
        };
        self.txns[tid].set_status(status);
        self.settle(tid);
        Observation::Completed
    }

    /// A read/write transaction commits only if every site it touched is
    /// still running and has been up continuously since the access.
    fn validate(&self, tid: TransactionId) -> bool {
        for &(sid, ts) in &self.txns[tid].accessed {
            let site = &self.sites[sid - 1];
            if !site.is_running() || !site.available_since(ts) {
                info!(
                    txn = %self.txns[tid].name,
                    site = sid,
                    "abort at commit time because of site"
                );
                return false;
            }
        }
        true
    }

    /// Kills a deadlock victim: aborted immediately, locks released, graph
    /// edges excised.
    fn kill(&mut self, tid: TransactionId) {
        info!(txn = %self.txns[tid].name, "killed as deadlock victim");
        self.txns[tid].set_status(TransactionStatus::Aborted);
        self.settle(tid);
    }

    /// Terminal cleanup shared by commit, validation abort, and kill:
    /// commit or abort at every running accessed site, splice the
    /// transaction out of the wait-for graph (waking waiters whose last
    /// dependency this was), and emit the report lines.
    fn settle(&mut self, tid: TransactionId) {
        let committed = self.txns[tid].status == TransactionStatus::Committed;

        let mut seen = HashSet::new();
        let touched: Vec<SiteId> = self.txns[tid].accessed.iter().map(|&(s, _)| s).collect();
        for sid in touched {
            if !seen.insert(sid) || !self.sites[sid - 1].is_running() {
                continue;
            }
            if committed {
                self.sites[sid - 1].commit(tid, self.now);
            } else {
                self.sites[sid - 1].abort(tid);
            }
        }

        let wait_for = mem::take(&mut self.txns[tid].wait_for);
        for holder in wait_for {
            self.txns[holder].waited_by.remove(&tid);
        }
        let waiters = mem::take(&mut self.txns[tid].waited_by);
        for waiter in waiters {
            let t = &mut self.txns[waiter];
            t.wait_for.remove(&tid);
            if t.wait_for.is_empty() && t.status == TransactionStatus::Blocked {
                t.set_status(TransactionStatus::Ready);
            }
        }

        let mut lines = Vec::new();
        {
            let t = &self.txns[tid];
            if committed {
                lines.push(format!("{} commits", t.name));
                for observation in &t.observations {
                    if let Observation::Value { value, site, tick } = observation {
                        if self.show_read_origin {
                            lines.push(format!("{value} (site = {site}, tick = {tick})"));
                        } else {
                            lines.push(format!("{value}"));
                        }
                    }
                }
            } else {
                lines.push(format!("{} aborts", t.name));
            }
        }
        self.out.extend(lines);
    }

    fn block_on(&mut self, tid: TransactionId, blockers: HashSet<TransactionId>) {
        for &holder in &blockers {
            self.txns[holder].waited_by.insert(tid);
        }
        self.txns[tid].wait_for.extend(blockers);
        self.txns[tid].set_status(TransactionStatus::Blocked);
    }

    fn detect_deadlocks(&mut self) {
        let blocked = self.with_status(TransactionStatus::Blocked);
        if blocked.len() <= 1 {
            return;
        }
        let victims = deadlock::select_victims(&self.txns, &blocked);
        for victim in victims {
            self.kill(victim);
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn with_status(&self, status: TransactionStatus) -> Vec<TransactionId> {
        self.txns
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.id)
            .collect()
    }

    fn aborted_set(&self) -> HashSet<TransactionId> {
        self.txns
            .iter()
            .filter(|t| t.status == TransactionStatus::Aborted)
            .map(|t| t.id)
            .collect()
    }

    fn lookup(&self, txn: &str) -> Result<TransactionId> {
        self.by_name
            .get(txn)
            .copied()
            .ok_or_else(|| DbError::UnknownTransaction(txn.to_string()))
    }

    fn lookup_item(&self, item: &str) -> Result<()> {
        if self.catalog.get(item).is_some() {
            Ok(())
        } else {
            Err(DbError::UnknownItem(item.to_string()))
        }
    }

    fn item(&self, name: &str) -> DataItem {
        self.catalog.get(name).expect("queued items exist").clone()
    }

    fn next_operation_id(&mut self) -> OperationId {
        self.next_op_id += 1;
        self.next_op_id
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
