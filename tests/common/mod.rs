use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use tarndb::index::hash::ExtendibleHashTable;
use tarndb::storage::buffer::BufferPoolManager;
use tarndb::storage::disk::DiskManager;
use tarndb::transaction::{LockManager, TransactionManager, TransactionRegistry};

// Route core debug logging through the test harness when RUST_LOG is set
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, path)?);
    Ok((buffer_pool, file))
}

// Create a shared disk manager for sharded pools
#[allow(dead_code)]
pub fn create_test_disk_manager() -> Result<(Arc<DiskManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);
    Ok((disk_manager, file))
}

// Create an extendible hash table over its own buffer pool
#[allow(dead_code)]
pub fn create_test_hash_table(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, Arc<ExtendibleHashTable>, NamedTempFile)> {
    let (buffer_pool, file) = create_test_buffer_pool(pool_size)?;
    let table = Arc::new(ExtendibleHashTable::new(buffer_pool.clone())?);
    Ok((buffer_pool, table, file))
}

// Wire up a registry, lock manager and transaction manager
#[allow(dead_code)]
pub fn create_lock_environment() -> (Arc<LockManager>, Arc<TransactionManager>) {
    let registry = Arc::new(TransactionRegistry::new());
    let lock_manager = Arc::new(LockManager::new(registry.clone()));
    let txn_manager = Arc::new(TransactionManager::new(registry, lock_manager.clone()));
    (lock_manager, txn_manager)
}
