//! Data model for the home-care data warehouse pipeline.
//!
//! - **record**: raw, text-only rows as produced by ingestion
//! - **keys**: folded natural keys and surrogate ids
//! - **dimension**: dimension kinds, tracked attributes and versions
//! - **fact**: append-only fact events and date keys
//! - **matching**: reference-catalog match candidates
//! - **ledger**: run ledger entries
//! - **redact**: masking of row-level values in log output
//! - **text**: accent and whitespace folding shared by every stage

pub mod dimension;
pub mod error;
pub mod fact;
pub mod keys;
pub mod ledger;
pub mod matching;
pub mod record;
pub mod redact;
pub mod text;

pub use dimension::{Attributes, DimensionKind, DimensionVersion, Versioning};
pub use error::{ModelError, Result};
pub use fact::{DateKey, EquipmentEvent, FactEvent, FactKind, ServiceRequestEvent};
pub use keys::{NaturalKey, SurrogateId};
pub use ledger::{LedgerEntry, RunStatus};
pub use matching::{MatchCandidate, MatchMethod};
pub use record::{RawRecord, SourceTable};
pub use redact::{REDACTED_VALUE, Redacted, log_data_enabled, redact_value, set_log_data};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_entry_serializes() {
        let entry = LedgerEntry::ok("dim_equipment", "upsert_scd2", 3);
        let json = serde_json::to_string(&entry).expect("serialize entry");
        let round: LedgerEntry = serde_json::from_str(&json).expect("deserialize entry");
        assert_eq!(round.process_name, "dim_equipment");
        assert_eq!(round.status, RunStatus::Ok);
        assert_eq!(round.row_count, 3);
    }
}
