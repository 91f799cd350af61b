//! Anonymous usage reporting
//!
//! Collection is best-effort: every lookup that can fail degrades to an
//! "unknown" value, and submission failures are logged and dropped.

pub mod machine_id;
pub mod report;

pub use machine_id::machine_uuid;
pub use report::{HttpTelemetrySink, Location, TelemetrySink, UsageRecord, collect_record, submit_usage};
