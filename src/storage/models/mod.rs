pub mod audit;

pub use audit::{truncate_chars, AuditRecord, AuditStats, AuditStatus, MAX_ERROR_LEN};
