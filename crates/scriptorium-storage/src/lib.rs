//! Local filesystem FileStore, in-memory tabular+vector MetadataEngine, and
//! the transaction coordinator that binds the two into all-or-nothing
//! publish/delete operations.

mod local_file_store;
mod metadata;
mod transaction;

pub use local_file_store::LocalFileStore;
pub use metadata::{project, MetadataEngine, ScoredEntry, SharedMetadataEngine};
pub use transaction::{md5_hex, run_transaction, Transaction};
