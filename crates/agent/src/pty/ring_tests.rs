// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

#[test]
fn empty_ring() {
    let ring = OutputRing::new(16);
    assert!(ring.is_empty());
    assert_eq!(ring.snapshot(), Vec::<u8>::new());
}

#[test]
fn sequential_writes() {
    let mut ring = OutputRing::new(16);
    ring.write(b"hello");
    ring.write(b" world");
    assert_eq!(ring.snapshot(), b"hello world".to_vec());
    assert_eq!(ring.len(), 11);
    assert_eq!(ring.total_written(), 11);
}

#[test]
fn wrap_discards_oldest() {
    let mut ring = OutputRing::new(8);
    ring.write(b"abcdef");
    ring.write(b"ghij");
    // 10 bytes total through an 8-byte ring: "ab" is gone.
    assert_eq!(ring.snapshot(), b"cdefghij".to_vec());
    assert_eq!(ring.len(), 8);
    assert_eq!(ring.total_written(), 10);
}

#[test]
fn exact_capacity_write() {
    let mut ring = OutputRing::new(4);
    ring.write(b"abcd");
    assert_eq!(ring.snapshot(), b"abcd".to_vec());
}

#[test]
fn overwrite_full_buffer() {
    let mut ring = OutputRing::new(4);
    ring.write(b"abcd");
    ring.write(b"efgh");
    assert_eq!(ring.snapshot(), b"efgh".to_vec());
}

#[test]
fn single_write_larger_than_capacity() {
    let mut ring = OutputRing::new(4);
    ring.write(b"abcdefghij");
    assert_eq!(ring.snapshot(), b"ghij".to_vec());
    assert_eq!(ring.total_written(), 10);
}

proptest! {
    /// The ring always holds exactly the suffix of everything written.
    #[test]
    fn snapshot_matches_naive_model(
        capacity in 1usize..64,
        writes in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..48), 0..16),
    ) {
        let mut ring = OutputRing::new(capacity);
        let mut model: Vec<u8> = Vec::new();
        for w in &writes {
            ring.write(w);
            model.extend_from_slice(w);
        }
        let keep = model.len().min(capacity);
        let expected = model[model.len() - keep..].to_vec();
        prop_assert_eq!(ring.snapshot(), expected);
        prop_assert_eq!(ring.total_written(), model.len() as u64);
    }
}
