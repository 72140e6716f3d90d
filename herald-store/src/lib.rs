//! Durable record collections
//!
//! A collection is a [`BackingStore`] of one [`Record`] type. The delivery
//! engine and the notifier each own one collection; nothing else is shared.

pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;
pub mod types;

pub use backends::{FileBackingStore, MemoryBackingStore, TestBackingStore};
pub use config::{FileConfig, MemoryConfig, StoreConfig};
pub use error::{Result, SerializationError, StoreError, ValidationError};
pub use r#trait::{BackingStore, Filter, Modify, Mutation, Record};
pub use types::RecordId;
