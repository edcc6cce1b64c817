//! Diff Tests
//!
//! Tests verify:
//! - Set / delete staging
//! - Last write wins per key
//! - Deterministic first-write iteration order
//! - Tombstones stay distinct from empty values

use atomickv::diff::{Diff, DiffEntry};

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_diff_is_empty() {
    let diff = Diff::new();
    assert!(diff.is_empty());
    assert_eq!(diff.len(), 0);
    assert_eq!(diff.iter().count(), 0);
}

#[test]
fn test_set_and_get() {
    let mut diff = Diff::new();
    diff.set(b"key".to_vec(), b"value".to_vec());

    assert_eq!(diff.get(b"key"), Some(&DiffEntry::Set(b"value".to_vec())));
    assert_eq!(diff.len(), 1);
}

#[test]
fn test_untouched_key_is_none() {
    let mut diff = Diff::new();
    diff.delete(b"other".to_vec());

    assert_eq!(diff.get(b"key"), None);
}

#[test]
fn test_delete_records_tombstone() {
    let mut diff = Diff::new();
    diff.delete(b"key".to_vec());

    let entry = diff.get(b"key").unwrap();
    assert!(entry.is_delete());
}

#[test]
fn test_empty_value_is_not_a_tombstone() {
    let mut diff = Diff::new();
    diff.set(b"key".to_vec(), Vec::new());

    let entry = diff.get(b"key").unwrap();
    assert!(!entry.is_delete());
    assert_eq!(entry, &DiffEntry::Set(Vec::new()));
}

// =============================================================================
// Last-Write-Wins Tests
// =============================================================================

#[test]
fn test_set_overwrites_set() {
    let mut diff = Diff::new();
    diff.set(b"key".to_vec(), b"v1".to_vec());
    diff.set(b"key".to_vec(), b"v2".to_vec());

    assert_eq!(diff.len(), 1);
    assert_eq!(diff.get(b"key"), Some(&DiffEntry::Set(b"v2".to_vec())));
}

#[test]
fn test_delete_overwrites_set() {
    let mut diff = Diff::new();
    diff.set(b"key".to_vec(), b"v1".to_vec());
    diff.delete(b"key".to_vec());

    assert_eq!(diff.len(), 1);
    assert_eq!(diff.get(b"key"), Some(&DiffEntry::Delete));
}

#[test]
fn test_set_overwrites_delete() {
    let mut diff = Diff::new();
    diff.delete(b"key".to_vec());
    diff.set(b"key".to_vec(), b"back".to_vec());

    assert_eq!(diff.len(), 1);
    assert_eq!(diff.get(b"key"), Some(&DiffEntry::Set(b"back".to_vec())));
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_iteration_follows_first_write() {
    let mut diff = Diff::new();
    diff.set(b"c".to_vec(), b"1".to_vec());
    diff.set(b"a".to_vec(), b"2".to_vec());
    diff.delete(b"b".to_vec());
    // Overwrite keeps position
    diff.set(b"c".to_vec(), b"3".to_vec());

    let entries: Vec<(Vec<u8>, DiffEntry)> =
        diff.iter().map(|(k, e)| (k.to_vec(), e.clone())).collect();

    assert_eq!(
        entries,
        vec![
            (b"c".to_vec(), DiffEntry::Set(b"3".to_vec())),
            (b"a".to_vec(), DiffEntry::Set(b"2".to_vec())),
            (b"b".to_vec(), DiffEntry::Delete),
        ]
    );
}

#[test]
fn test_same_calls_give_same_order() {
    let build = || {
        let mut diff = Diff::new();
        for i in (0..50u8).rev() {
            diff.set(vec![i], vec![i]);
            if i % 3 == 0 {
                diff.delete(vec![i]);
            }
        }
        diff.iter().map(|(k, _)| k.to_vec()).collect::<Vec<_>>()
    };

    assert_eq!(build(), build());
}

#[test]
fn test_clear() {
    let mut diff = Diff::new();
    diff.set(b"a".to_vec(), b"1".to_vec());
    diff.delete(b"b".to_vec());
    diff.clear();

    assert!(diff.is_empty());
    assert_eq!(diff.get(b"a"), None);

    diff.set(b"b".to_vec(), b"2".to_vec());
    assert_eq!(diff.len(), 1);
}
