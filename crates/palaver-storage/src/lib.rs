// Conversation store backends
//
// Two independently-owned stores: the sender-keyed directory (store A) and
// the conversation-keyed archive (store B). Each is an enum over a
// PostgreSQL backend and an in-memory twin; the broker only sees the traits
// from palaver-core.

pub mod archive;
pub mod directory;
pub mod memory;

pub use archive::ArchiveStore;
pub use directory::DirectoryStore;
pub use memory::{InMemoryArchive, InMemoryDirectory};
