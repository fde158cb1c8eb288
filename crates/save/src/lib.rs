//! Durable storage for the allocation engine.
//!
//! [`FileStore`] keeps every persisted row in one checksummed file that is
//! replaced atomically on each committed batch.

pub mod atomic_write;
pub mod crash_recovery;
pub mod file_header;
pub mod file_store;

pub use atomic_write::atomic_write;
pub use crash_recovery::{clean_stale_tmp, CrashRecovery};
pub use file_header::{FileHeader, FLAG_COMPRESSED, HEADER_FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use file_store::{decode_snapshot, encode_snapshot, FileStore};
