use anyhow::Result;

use tarndb::common::types::Rid;
use tarndb::storage::page::BUCKET_ARRAY_SIZE;
use tarndb::transaction::IsolationLevel;

mod common;
use common::{create_lock_environment, create_test_hash_table, init_test_logging};

fn rid_for(key: u64) -> Rid {
    Rid::new((key / 100) as u32, (key % 100) as u32)
}

#[test]
fn test_insert_and_get() -> Result<()> {
    let (_pool, table, _temp_file) = create_test_hash_table(16)?;

    assert!(table.insert(None, 1, Rid::new(1, 1))?);
    assert!(table.insert(None, 2, Rid::new(1, 2))?);

    assert_eq!(table.get_value(1)?, vec![Rid::new(1, 1)]);
    assert_eq!(table.get_value(2)?, vec![Rid::new(1, 2)]);
    assert!(table.get_value(3)?.is_empty());

    Ok(())
}

#[test]
fn test_duplicate_pair_rejected_but_same_key_allowed() -> Result<()> {
    let (_pool, table, _temp_file) = create_test_hash_table(16)?;

    assert!(table.insert(None, 7, Rid::new(0, 1))?);
    assert!(!table.insert(None, 7, Rid::new(0, 1))?);
    assert!(table.insert(None, 7, Rid::new(0, 2))?);

    let mut values = table.get_value(7)?;
    values.sort();
    assert_eq!(values, vec![Rid::new(0, 1), Rid::new(0, 2)]);

    Ok(())
}

#[test]
fn test_remove() -> Result<()> {
    let (_pool, table, _temp_file) = create_test_hash_table(16)?;

    assert!(table.insert(None, 5, Rid::new(2, 0))?);
    assert!(table.remove(None, 5, Rid::new(2, 0))?);
    assert!(table.get_value(5)?.is_empty());

    // Removing an absent pair reports failure.
    assert!(!table.remove(None, 5, Rid::new(2, 0))?);
    assert!(!table.remove(None, 99, Rid::new(0, 0))?);

    Ok(())
}

#[test]
fn test_split_grows_directory_and_keeps_keys() -> Result<()> {
    init_test_logging();
    let (_pool, table, _temp_file) = create_test_hash_table(64)?;
    assert_eq!(table.global_depth()?, 1);

    // More keys than two buckets can hold: at least one split must happen.
    let key_count = (2 * BUCKET_ARRAY_SIZE + 200) as u64;
    for key in 0..key_count {
        assert!(table.insert(None, key, rid_for(key))?, "insert of {} failed", key);
    }

    assert!(table.global_depth()? > 1);
    table.verify_integrity()?;

    for key in 0..key_count {
        assert_eq!(table.get_value(key)?, vec![rid_for(key)], "key {} lost", key);
    }

    Ok(())
}

#[test]
fn test_merge_shrinks_directory() -> Result<()> {
    let (_pool, table, _temp_file) = create_test_hash_table(64)?;

    let key_count = (2 * BUCKET_ARRAY_SIZE + 200) as u64;
    for key in 0..key_count {
        table.insert(None, key, rid_for(key))?;
    }
    let peak_depth = table.global_depth()?;
    assert!(peak_depth > 1);

    for key in 0..key_count {
        assert!(table.remove(None, key, rid_for(key))?, "remove of {} failed", key);
    }

    for key in 0..key_count {
        assert!(table.get_value(key)?.is_empty());
    }
    assert!(table.global_depth()? < peak_depth);
    table.verify_integrity()?;

    Ok(())
}

#[test]
fn test_interleaved_inserts_and_removes_keep_integrity() -> Result<()> {
    use rand::prelude::*;

    let (_pool, table, _temp_file) = create_test_hash_table(64)?;
    let mut rng = StdRng::seed_from_u64(0xDB);

    let mut live: Vec<u64> = Vec::new();
    for round in 0..2000u64 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let key = round;
            if table.insert(None, key, rid_for(key))? {
                live.push(key);
            }
        } else {
            let idx = rng.gen_range(0..live.len());
            let key = live.swap_remove(idx);
            assert!(table.remove(None, key, rid_for(key))?);
        }
    }

    table.verify_integrity()?;
    for &key in &live {
        assert_eq!(table.get_value(key)?, vec![rid_for(key)]);
    }

    Ok(())
}

#[test]
fn test_concurrent_inserts_then_reads() -> Result<()> {
    use std::thread;

    let (_pool, table, _temp_file) = create_test_hash_table(128)?;

    let threads = 4u64;
    let per_thread = 400u64;

    let mut handles = Vec::new();
    for t in 0..threads {
        let table = table.clone();
        handles.push(thread::spawn(move || {
            let base = t * per_thread;
            for key in base..base + per_thread {
                assert!(table.insert(None, key, rid_for(key)).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    table.verify_integrity()?;

    let mut handles = Vec::new();
    for t in 0..threads {
        let table = table.clone();
        handles.push(thread::spawn(move || {
            let base = t * per_thread;
            for key in base..base + per_thread {
                assert_eq!(table.get_value(key).unwrap(), vec![rid_for(key)]);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    Ok(())
}

#[test]
fn test_aborted_transaction_rolls_back_index_writes() -> Result<()> {
    let (_pool, table, _temp_file) = create_test_hash_table(32)?;
    let (_lock_manager, txn_manager) = create_lock_environment();

    // A committed insert stays.
    let committed = txn_manager.begin(IsolationLevel::RepeatableRead);
    assert!(table.insert(Some(&committed), 1, Rid::new(9, 1))?);
    txn_manager.commit(&committed);

    // An aborted transaction's insert and delete are both undone.
    let aborted = txn_manager.begin(IsolationLevel::RepeatableRead);
    assert!(table.insert(Some(&aborted), 2, Rid::new(9, 2))?);
    assert!(table.remove(Some(&aborted), 1, Rid::new(9, 1))?);
    assert!(table.get_value(1)?.is_empty());

    txn_manager.abort(&aborted, Some(&table))?;
    assert_eq!(aborted.state(), tarndb::transaction::TransactionState::Aborted);

    assert_eq!(table.get_value(1)?, vec![Rid::new(9, 1)]);
    assert!(table.get_value(2)?.is_empty());

    Ok(())
}
