#![no_main]

use l2_cache::{CacheError, ElementType, EvictionCapture, RowStore};
use libfuzzer_sys::fuzz_target;

const STRIDE: usize = 8;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // first two bytes pick the store capacity and capture size
    let capacity = data[0] as usize * 4;
    let mut capture = EvictionCapture::new(data[1] as usize, STRIDE, ElementType::U8)
        .expect("valid capture");
    let mut store = RowStore::new(capacity);

    for op in data[2..].chunks_exact(3) {
        let key = (op[0] % 32) as i64;
        let len = op[1] as usize % 24;
        let row = vec![op[2]; len];

        match op[2] % 4 {
            0 => {
                let before = store.peek(key).map(|r| r.to_vec());
                if let Some(row) = store.get(key) {
                    assert_eq!(Some(row.to_vec()), before);
                }
            }
            1 => {
                // uncaptured put
                let _ = store.put(key, &row, None);
            }
            2 => capture.reset(),
            _ => {
                let used = store.used();
                let items = store.len();
                let captured = capture.len();

                match store.put(key, &row, Some(&capture)) {
                    Ok(evicted) => {
                        assert_eq!(capture.len(), captured + evicted);
                        assert_eq!(store.peek(key), Some(&row[..]));
                    }
                    Err(CacheError::AllocationFailure) => {
                        assert!(len > capacity);
                        assert_eq!(store.used(), used);
                    }
                    Err(_) => {
                        // rejected puts leave everything untouched
                        assert_eq!(store.used(), used);
                        assert_eq!(store.len(), items);
                        assert_eq!(capture.len(), captured);
                    }
                }
            }
        }

        assert!(store.used() <= store.capacity());
        assert!(capture.len() <= capture.capacity());
    }

    let snapshot = capture.snapshot();
    for (key, row) in snapshot.iter() {
        assert!(key >= 0);
        assert_eq!(row.len(), STRIDE);
    }
});
