pub mod lock_manager;
pub mod manager;
pub mod registry;
pub mod transaction;

pub use lock_manager::{LockManager, LockMode};
pub use manager::TransactionManager;
pub use registry::TransactionRegistry;
pub use transaction::{
    IndexWriteOp, IndexWriteRecord, IsolationLevel, Transaction, TransactionState,
};
