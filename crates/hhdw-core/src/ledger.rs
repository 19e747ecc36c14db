//! Run ledger recorder.
//!
//! Every stage reports exactly one entry. The recorder forwards entries to the
//! store's ledger and keeps a local copy for the run summary; a ledger write
//! that fails is logged and never aborts the run.

use std::fmt::Display;
use std::sync::Mutex;

use tracing::{error, info, warn};

use hhdw_model::LedgerEntry;
use hhdw_store::RunLedger;

pub struct RunRecorder<'a, L: RunLedger + ?Sized> {
    ledger: &'a L,
    entries: Mutex<Vec<LedgerEntry>>,
}

impl<'a, L: RunLedger + ?Sized> RunRecorder<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self {
            ledger,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, entry: LedgerEntry) {
        if entry.is_error() {
            error!(process = %entry.process_name, detail = %entry.detail, "stage failed");
        } else {
            info!(process = %entry.process_name, rows = entry.row_count, "stage completed");
        }
        if let Err(e) = self.ledger.record(&entry) {
            warn!(process = %entry.process_name, error = %e, "run ledger write failed");
        }
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    pub fn ok(&self, process: impl Into<String>, detail: impl Into<String>, rows: usize) {
        self.record(LedgerEntry::ok(process, detail, rows as u64));
    }

    pub fn error(&self, process: impl Into<String>, error: &dyn Display) {
        self.record(LedgerEntry::error(process, error.to_string()));
    }

    /// Entries recorded so far, in recording order.
    pub fn into_entries(self) -> Vec<LedgerEntry> {
        match self.entries.into_inner() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
