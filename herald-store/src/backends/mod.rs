//! Backing store implementations
//!
//! - `memory`: in-memory storage for tests and development
//! - `test`: memory storage plus synchronisation and outage simulation
//! - `file`: one file per record, for production use

pub mod file;
pub mod memory;

pub use file::FileBackingStore;
pub use memory::MemoryBackingStore;
pub use test::TestBackingStore;
