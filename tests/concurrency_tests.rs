//! Concurrent access tests.
//!
//! - Parallel writers on independent streams
//! - Writers racing on one stream
//! - Queries running against a buffered writer
//! - Racing registrations and shutdown

use decaystore::{
    CountOperator, Decay, StoreError, StreamConfig, StreamId, SumOperator, SummaryStore,
    WindowOperator,
};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn operators() -> Vec<Arc<dyn WindowOperator>> {
    vec![Arc::new(CountOperator::new()), Arc::new(SumOperator::new())]
}

fn full_count(store: &SummaryStore, stream: StreamId) -> f64 {
    store
        .query(stream, 0, i64::MAX, 0, &[])
        .unwrap()
        .as_estimate()
        .unwrap()
        .value
}

// ============================================================================
// Parallel Writers
// ============================================================================

#[test]
fn test_parallel_writers_on_separate_streams() {
    let store = Arc::new(SummaryStore::builder().flush_workers(4).build().unwrap());
    let num_threads = 8;
    let values_per_thread = 5_000;
    for id in 0..num_threads {
        store
            .register_with_config(
                id,
                Decay::exponential(2.0).build().unwrap(),
                operators(),
                &StreamConfig::new().ingest_buffer_size(256),
            )
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(num_threads as usize));
    let mut handles = vec![];
    for id in 0..num_threads {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for t in 0..values_per_thread {
                store.append(id, t, 1.0).unwrap();
            }
            store.flush(id).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for id in 0..num_threads {
        assert_eq!(
            store.stream_statistics(id).unwrap().num_values(),
            values_per_thread as u64
        );
        assert_eq!(full_count(&store, id), values_per_thread as f64);
    }
}

#[test]
fn test_racing_writers_on_one_stream() {
    let store = Arc::new(SummaryStore::new().unwrap());
    store
        .register_with_config(
            0,
            Decay::exponential(2.0).build().unwrap(),
            operators(),
            &StreamConfig::new().ingest_buffer_size(64),
        )
        .unwrap();

    let num_threads = 4;
    let next_timestamp = Arc::new(AtomicI64::new(0));
    let accepted = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(num_threads));
    let mut handles = vec![];
    for _ in 0..num_threads {
        let store = Arc::clone(&store);
        let next_timestamp = Arc::clone(&next_timestamp);
        let accepted = Arc::clone(&accepted);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..2_000 {
                let t = next_timestamp.fetch_add(1, Ordering::SeqCst);
                // a thread that lost the race for its slot is rejected cleanly
                match store.append(0, t, 1.0) {
                    Ok(()) => {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(StoreError::Ordering { .. }) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    store.flush(0).unwrap();

    let accepted = accepted.load(Ordering::SeqCst);
    assert!(accepted > 0);
    assert_eq!(
        store.stream_statistics(0).unwrap().num_values(),
        accepted as u64
    );
    assert_eq!(full_count(&store, 0), accepted as f64);
}

// ============================================================================
// Readers and Writers
// ============================================================================

#[test]
fn test_queries_during_buffered_ingest() {
    let store = Arc::new(SummaryStore::new().unwrap());
    store
        .register_with_config(
            0,
            Decay::exponential(2.0).build().unwrap(),
            operators(),
            &StreamConfig::new()
                .ingest_buffer_size(128)
                .batch_partition(true),
        )
        .unwrap();
    let total = 20_000;

    let barrier = Arc::new(Barrier::new(3));
    let writer = {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for t in 0..total {
                store.append(0, t, 1.0).unwrap();
            }
            store.flush(0).unwrap();
        })
    };
    let mut readers = vec![];
    for _ in 0..2 {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        readers.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..200 {
                // applied values never exceed what was appended
                let count = full_count(&store, 0);
                assert!((0.0..=total as f64).contains(&count), "count {count}");
                let stats = store.stream_statistics(0).unwrap();
                assert!(stats.num_values() <= total as u64);
            }
        }));
    }
    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(full_count(&store, 0), total as f64);
}

// ============================================================================
// Registration and Shutdown
// ============================================================================

#[test]
fn test_racing_registrations() {
    let store = Arc::new(SummaryStore::new().unwrap());
    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));
    let registered = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];
    for _ in 0..num_threads {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        let registered = Arc::clone(&registered);
        handles.push(thread::spawn(move || {
            barrier.wait();
            match store.register(42, Decay::exponential(2.0).build().unwrap(), operators()) {
                Ok(()) => {
                    registered.fetch_add(1, Ordering::SeqCst);
                }
                Err(StoreError::StreamExists(42)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(registered.load(Ordering::SeqCst), 1);
    assert_eq!(store.stream_ids(), vec![42]);
}

#[test]
fn test_close_flushes_and_rejects_later_calls() {
    let store = SummaryStore::new().unwrap();
    store
        .register_with_config(
            0,
            Decay::exponential(2.0).build().unwrap(),
            operators(),
            &StreamConfig::new().ingest_buffer_size(1_000),
        )
        .unwrap();
    for t in 0..100 {
        store.append(0, t, 1.0).unwrap();
    }
    store.close().unwrap();
    // closing twice is harmless
    store.close().unwrap();

    assert!(matches!(store.append(0, 100, 1.0), Err(StoreError::Closed)));
    assert!(matches!(store.query(0, 0, 99, 0, &[]), Err(StoreError::Closed)));
    assert!(matches!(
        store.register(1, Decay::exponential(2.0).build().unwrap(), operators()),
        Err(StoreError::Closed)
    ));
}

#[test]
fn test_drop_without_close() {
    let store = SummaryStore::builder().flush_workers(3).build().unwrap();
    store
        .register_with_config(
            0,
            Decay::constant(8).build().unwrap(),
            operators(),
            &StreamConfig::new().ingest_buffer_size(64),
        )
        .unwrap();
    for t in 0..1_000 {
        store.append(0, t, 1.0).unwrap();
    }
    // drop drains the buffers and joins the flush workers
    drop(store);
}
