//! Logging conventions for labnote.
//!
//! All crates log through `tracing` with the same structured fields so that
//! an export can be followed from extraction to the last upsert. Field names
//! are written inline at each call site; this table is the reference.
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `subsystem` | Originating subsystem: `export`, `db`, `cli` |
//! | `component` | Part of the subsystem: `table`, `validation`, `wizard`, `upsert`, `pool` |
//! | `op` | Logical operation: `extract`, `validate`, `insert_site`, `upsert_batch` |
//! | `animal_id` | Target animal of an export |
//! | `site_id` | Site being created or checked |
//! | `position` | 1-based table row |
//! | `row_count` | Rows or records involved |
//! | `new_site_count` | New sites routed to the wizard |
//! | `duration_ms` | Wall-clock duration in milliseconds |
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | A write failed, the export was aborted |
//! | WARN  | Batch rejected by validation, user-visible guidance issued |
//! | INFO  | Pipeline milestones (extracted, validated, committed) |
//! | DEBUG | Decision points, wizard transitions, query results |
//! | TRACE | Per-row iteration |
