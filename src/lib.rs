// glauth-mirror - replays LDIF change records onto a glauth-compatible
// SQL directory backend.
//
// Raw `(dn, attribute-map)` entries from an LDIF reader go through an
// ordered processing pipeline into typed Records, which the dispatch
// layer applies as relational mutations - one transaction per file.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod mappings;
pub mod ops;
pub mod patterns;
pub mod pipeline;
pub mod record;

// Re-export commonly used types
pub use audit::{AuditEvent, AuditLogger, SECURITY_TARGET};
pub use config::AuxiliaryData;
pub use db::{setup_database, Group, IncludeGroup, User};
pub use error::{Error, Result};
pub use ops::{apply_records, Dispatcher, EntityOps, GroupOps, UserOps};
pub use pipeline::{process_entry, RawEntry};
pub use record::{AttrMap, AttrValue, EntityKind, OperationType, Record};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
