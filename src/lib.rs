// Export public modules
pub mod common;
pub mod index;
pub mod query;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use storage::buffer::{BufferPoolError, BufferPoolManager, ParallelBufferPoolManager};
pub use storage::disk::{DiskManager, LogManager};
pub use storage::page::PageError;
pub use index::hash::{ExtendibleHashTable, HashTableError};
pub use transaction::{LockManager, TransactionManager, TransactionRegistry};
