//! Session storage for parsed roster batches.

pub mod memory;
pub mod traits;

pub use memory::MemoryBatchStore;
pub use traits::{BatchStore, SessionId};
