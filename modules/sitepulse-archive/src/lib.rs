pub mod crypto;
pub mod diff;
pub mod snapshots;
pub mod store;

pub use crypto::SnapshotCipher;
pub use diff::{ChangeEntry, ChangeSet, ChangeType};
pub use snapshots::{SnapshotMeta, SnapshotStore};
pub use store::{BlobStore, MemoryStore, SledStore};
