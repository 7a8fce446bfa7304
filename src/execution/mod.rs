// Drive loop over parsed command lines.
//
// Each input line is one unit of work: the logical clock advances, the
// line's transaction-queueing commands are applied, the manager runs one
// tick, and only then the line's admin commands (`fail`, `recover`,
// `dump`) execute — the tick's transaction operations observe the world as
// it was when the line arrived.

use crate::parser::{parse_line, Command, DumpTarget};
use crate::transaction::{TransactionKind, TransactionManager};
use crate::{common::SiteId, Config};

/// Whether the driver should keep feeding lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineResult {
    Continue,
    Quit,
}

/// The simulator behind the command language.
pub struct Database {
    tm: TransactionManager,
}

impl Database {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        Self {
            tm: TransactionManager::with_read_origin(config.show_read_origin),
        }
    }

    pub fn manager(&self) -> &TransactionManager {
        &self.tm
    }

    /// Output lines emitted since the last drain, in order.
    pub fn drain_output(&mut self) -> Vec<String> {
        self.tm.drain_output()
    }

    /// Executes one input line. `quit` takes effect immediately: commands
    /// already seen on the line have been applied, but no tick runs.
    pub fn execute_line(&mut self, line: &str) -> LineResult {
        self.tm.advance_clock();
        let parsed = parse_line(line);
        for diagnostic in parsed.diagnostics {
            self.tm.emit(diagnostic);
        }

        let mut deferred = Vec::new();
        for command in parsed.commands {
            match command {
                Command::Quit => return LineResult::Quit,
                Command::Begin(names) => {
                    for name in names {
                        self.apply(|tm| tm.begin(&name, TransactionKind::ReadWrite));
                    }
                }
                Command::BeginRo(names) => {
                    for name in names {
                        self.apply(|tm| tm.begin(&name, TransactionKind::ReadOnly));
                    }
                }
                Command::End(names) => {
                    for name in names {
                        self.apply(|tm| tm.queue_commit(&name));
                    }
                }
                Command::Read { txn, item } => {
                    self.apply(|tm| tm.queue_read(&txn, &item));
                }
                Command::Write { txn, item, value } => {
                    self.apply(|tm| tm.queue_write(&txn, &item, value));
                }
                admin @ (Command::Fail(_) | Command::Recover(_) | Command::Dump(_)) => {
                    deferred.push(admin);
                }
            }
        }

        self.tm.tick();

        for command in deferred {
            match command {
                Command::Fail(sites) => {
                    for site in sites {
                        self.apply(|tm| tm.fail_site(site));
                    }
                }
                Command::Recover(sites) => {
                    for site in sites {
                        self.apply(|tm| tm.recover_site(site));
                    }
                }
                Command::Dump(target) => self.dump(&target),
                _ => unreachable!("only admin commands are deferred"),
            }
        }

        LineResult::Continue
    }

    /// Runs a whole script, returning every output line in emission order.
    pub fn execute_script(&mut self, source: &str) -> Vec<String> {
        let mut lines = Vec::new();
        for line in source.lines() {
            let result = self.execute_line(line);
            lines.extend(self.drain_output());
            if result == LineResult::Quit {
                break;
            }
        }
        lines
    }

    /// Applies a manager command, reporting failures as output lines
    /// rather than stopping the run.
    fn apply<F>(&mut self, f: F)
    where
        F: FnOnce(&mut TransactionManager) -> crate::Result<()>,
    {
        if let Err(e) = f(&mut self.tm) {
            self.tm.emit(format!("Error: {e}"));
        }
    }

    // ========================================================================
    // Dump rendering
    // ========================================================================

    fn dump(&mut self, target: &DumpTarget) {
        let mut rows: Vec<(String, i64, SiteId)> = Vec::new();
        match target {
            DumpTarget::All => {
                for item in self.tm.catalog().items() {
                    for &sid in &item.sites {
                        let site = self.tm.site(sid).expect("placement is in range");
                        if let Some(value) = site.latest_committed(&item.name) {
                            rows.push((item.name.clone(), value, sid));
                        }
                    }
                }
            }
            DumpTarget::Item(name) => match self.tm.catalog().get(name) {
                Some(item) => {
                    let item = item.clone();
                    for &sid in &item.sites {
                        let site = self.tm.site(sid).expect("placement is in range");
                        if let Some(value) = site.latest_committed(&item.name) {
                            rows.push((item.name.clone(), value, sid));
                        }
                    }
                }
                None => {
                    self.tm.emit("Error: not a data item or a site to dump");
                    return;
                }
            },
            DumpTarget::Site(id) => match self.tm.site(*id) {
                Some(site) => {
                    for (name, value) in site.committed_snapshot() {
                        rows.push((name, value, *id));
                    }
                }
                None => {
                    self.tm.emit("Error: not a data item or a site to dump");
                    return;
                }
            },
        }
        self.render_dump(rows);
    }

    /// Sorted by (item, value, site); runs of one (item, value) over
    /// contiguous site indices are compressed to an `a-b` range.
    fn render_dump(&mut self, mut rows: Vec<(String, i64, SiteId)>) {
        rows.sort();
        self.tm.emit("=".repeat(80));
        let mut i = 0;
        while i < rows.len() {
            let mut j = i + 1;
            while j < rows.len()
                && rows[j].0 == rows[i].0
                && rows[j].1 == rows[i].1
                && rows[j].2 == rows[i].2 + (j - i)
            {
                j += 1;
            }
            let (name, value, first_site) = &rows[i];
            let line = if j == i + 1 {
                format!("{name}: {value} at site {first_site}")
            } else {
                format!("{name}: {value} at site {first_site}-{}", rows[j - 1].2)
            };
            self.tm.emit(line);
            i = j;
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
