//! AIOS Housekeeping - atomic JSON/text persistence, root cleanup, archiving
//!
//! Every write that replaces an existing file goes through `store`, so a
//! failed validation or a crash mid-write never leaves a truncated file.

pub mod archive;
pub mod cleanup;
pub mod error;
pub mod store;

pub use archive::{archive, restore, ArchiveEntry, ArchiveManifest, ArchiveOptions, MANIFEST_FILE};
pub use cleanup::{Cleaner, CleanupPlan, CleanupReport, PlannedMove};
pub use error::{StoreError, StoreResult};
pub use store::{
    prune_backups, read_json, update_json, write_bytes_atomic, write_json_atomic,
    write_json_str_atomic, write_text_atomic, BackupPolicy,
};
