mod common;

use common::{test_schema, transaction_frame, user_bytes, user_row};
use stdb_client::protocol::{decompress_frame, NoDecompression};
use stdb_client::{
    AlgebraicValue, Change, ClientCache, Encoder, Error, ServerMessage,
};

/// Runs a pre-framed transaction through decode and cache apply, the way
/// the receive loop would.
fn apply(cache: &mut ClientCache, framed: &[u8]) -> stdb_client::Result<Vec<Change>> {
    let schema = test_schema();
    let payload = decompress_frame(framed, &NoDecompression).unwrap();
    match ServerMessage::decode(&payload).unwrap() {
        ServerMessage::TransactionUpdate { updates } => {
            cache.apply_transaction_update(&schema, &updates)
        }
        other => panic!("wrong message: {other:?}"),
    }
}

fn seeded_cache(rows: &[Vec<u8>]) -> ClientCache {
    let mut cache = ClientCache::new();
    let framed = transaction_frame("users", rows, &[]);
    apply(&mut cache, &framed).unwrap();
    cache
}

#[test]
fn update_detection_end_to_end() {
    // E5: cache holds {1, Alice} and {2, Bob}; a transaction deletes both
    // and inserts {1, Alicia}. Expect exactly one update then one delete,
    // and a cache holding only {1, Alicia}.
    let mut cache = seeded_cache(&[user_bytes(1, "Alice"), user_bytes(2, "Bob")]);

    let framed = transaction_frame(
        "users",
        &[user_bytes(1, "Alicia")],
        &[user_bytes(1, "Alice"), user_bytes(2, "Bob")],
    );
    let changes = apply(&mut cache, &framed).unwrap();

    assert_eq!(changes.len(), 2);
    assert_eq!(
        changes[0],
        Change::Update {
            table: "users".to_string(),
            old: user_row(1, "Alice"),
            new: user_row(1, "Alicia"),
        }
    );
    assert_eq!(
        changes[1],
        Change::Delete {
            table: "users".to_string(),
            row: user_row(2, "Bob"),
        }
    );

    assert_eq!(cache.count("users"), 1);
    assert_eq!(
        cache
            .find("users", &AlgebraicValue::U32(1))
            .unwrap()
            .unwrap(),
        user_row(1, "Alicia")
    );
}

#[test]
fn no_paired_delete_insert_for_updated_pk() {
    let mut cache = seeded_cache(&[user_bytes(7, "x")]);
    let framed = transaction_frame("users", &[user_bytes(7, "y")], &[user_bytes(7, "x")]);
    let changes = apply(&mut cache, &framed).unwrap();

    // Exactly one change for the PK, and it is an update.
    assert_eq!(changes.len(), 1);
    assert!(matches!(changes[0], Change::Update { .. }));
    assert_eq!(cache.count("users"), 1);
}

#[test]
fn equal_delete_insert_yields_equal_update() {
    let mut cache = seeded_cache(&[user_bytes(1, "same")]);
    let framed = transaction_frame("users", &[user_bytes(1, "same")], &[user_bytes(1, "same")]);
    let changes = apply(&mut cache, &framed).unwrap();
    match &changes[0] {
        Change::Update { old, new, .. } => assert_eq!(old, new),
        other => panic!("expected update, got {other:?}"),
    }
    assert_eq!(cache.count("users"), 1);
}

#[test]
fn empty_transaction_leaves_cache_identical() {
    let schema = test_schema();
    let mut cache = seeded_cache(&[user_bytes(1, "a"), user_bytes(2, "b")]);
    let before = {
        let mut all = cache.get_all("users");
        all.sort_by_key(|r| format!("{:?}", r.fields[0].value));
        all
    };

    let changes = cache.apply_transaction_update(&schema, &[]).unwrap();
    assert!(changes.is_empty());

    let after = {
        let mut all = cache.get_all("users");
        all.sort_by_key(|r| format!("{:?}", r.fields[0].value));
        all
    };
    assert_eq!(before, after);
}

#[test]
fn insert_count_matches_emitted_changes() {
    let rows: Vec<Vec<u8>> = (0..10).map(|i| user_bytes(i, "row")).collect();
    let mut cache = ClientCache::new();
    let framed = transaction_frame("users", &rows, &[]);
    let changes = apply(&mut cache, &framed).unwrap();
    assert_eq!(changes.len(), 10);
    assert!(changes.iter().all(|c| matches!(c, Change::Insert { .. })));
    assert_eq!(cache.count("users"), 10);
}

#[test]
fn unmatched_deletes_follow_insert_changes_in_delete_order() {
    let mut cache = seeded_cache(&[
        user_bytes(1, "a"),
        user_bytes(2, "b"),
        user_bytes(3, "c"),
    ]);

    // Delete 3, 1, 2; reinsert only 1. Expect: update(1), then deletes in
    // server delete order 3, 2.
    let framed = transaction_frame(
        "users",
        &[user_bytes(1, "a2")],
        &[user_bytes(3, "c"), user_bytes(1, "a"), user_bytes(2, "b")],
    );
    let changes = apply(&mut cache, &framed).unwrap();

    assert_eq!(changes.len(), 3);
    assert!(matches!(&changes[0], Change::Update { new, .. } if *new == user_row(1, "a2")));
    assert!(matches!(&changes[1], Change::Delete { row, .. } if *row == user_row(3, "c")));
    assert!(matches!(&changes[2], Change::Delete { row, .. } if *row == user_row(2, "b")));
}

#[test]
fn decode_error_aborts_with_earlier_tables_applied() {
    let mut cache = ClientCache::new();

    // First table update inserts a valid row; second carries a truncated
    // row that fails decode.
    let mut enc = Encoder::new();
    enc.put_u8(4);
    enc.put_u32(1);
    enc.put_u32(1);
    enc.put_u32(2);
    enc.put_str("users").unwrap();
    enc.put_u32(1);
    enc.put_u8(0);
    enc.put_raw(&common::row_list_bytes(&[user_bytes(1, "ok")]));
    enc.put_raw(&common::row_list_bytes(&[]));
    enc.put_str("users").unwrap();
    enc.put_u32(1);
    enc.put_u8(0);
    enc.put_raw(&common::row_list_bytes(&[vec![0xFF]]));
    enc.put_raw(&common::row_list_bytes(&[]));
    let framed = common::frame(enc.into_bytes());

    let err = apply(&mut cache, &framed).unwrap_err();
    assert!(matches!(err, Error::BufferTooShort { .. }));
    assert_eq!(cache.count("users"), 1);
}

#[test]
fn pk_less_table_degrades_to_set_semantics() {
    let line = |s: &str| {
        let mut enc = Encoder::new();
        enc.put_str(s).unwrap();
        enc.into_bytes()
    };

    let mut cache = ClientCache::new();
    let framed = transaction_frame("log", &[line("x"), line("y")], &[]);
    apply(&mut cache, &framed).unwrap();
    assert_eq!(cache.count("log"), 2);

    // "Updating" a PK-less row is delete+insert of different keys: the
    // scratch map never matches, so the events stay a delete and an
    // insert.
    let framed = transaction_frame("log", &[line("z")], &[line("x")]);
    let changes = apply(&mut cache, &framed).unwrap();
    assert_eq!(changes.len(), 2);
    assert!(matches!(changes[0], Change::Insert { .. }));
    assert!(matches!(changes[1], Change::Delete { .. }));
    assert_eq!(cache.count("log"), 2);
}

#[test]
fn unknown_table_update_is_tolerated() {
    let mut cache = ClientCache::new();
    let framed = transaction_frame("not_in_schema", &[user_bytes(1, "a")], &[]);
    let changes = apply(&mut cache, &framed).unwrap();
    assert!(changes.is_empty());
    assert!(cache.is_empty());
}
