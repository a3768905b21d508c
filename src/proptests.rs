use super::*;

use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

const DEPTH: usize = 3;
const TOKENS: [&str; 6] = ["ab", "cd", "ef", "gh", "ij", "kl"];

/// Walks `begin`/`advance` and checks it agrees with `len`, `value` and `key`.
fn validate_traversal<V, M: CompoundMap<V>>(m: &M) -> Vec<(Vec<u8>, Cursor)> {
    let mut seen = Vec::new();
    let mut cursors = HashSet::new();
    let mut cursor = m.begin();
    while !cursor.is_end() {
        assert!(m.value(cursor).is_ok(), "cursor from traversal must be occupied");
        assert!(cursors.insert(cursor), "traversal visited {cursor:?} twice");
        let key = m.key(cursor).expect("occupied cursor must have a key");
        assert_eq!(m.find(&key), cursor, "find must land on the traversed cursor");
        seen.push((key, cursor));
        assert!(seen.len() <= m.len(), "traversal longer than len");
        cursor = m.advance(cursor);
    }
    assert_eq!(seen.len(), m.len(), "traversal must visit exactly len entries");

    let again: Vec<Cursor> = m.iter().map(|(c, _)| c).collect();
    let first: Vec<Cursor> = seen.iter().map(|(_, c)| *c).collect();
    assert_eq!(again, first, "traversal order must be stable");
    seen
}

fn vocabulary() -> Vec<Vec<&'static str>> {
    vec![TOKENS.to_vec(); DEPTH]
}

#[derive(Clone, Debug)]
enum Op<V> {
    Insert(Vec<u8>, V),
    Remove(Vec<u8>),
    Get(Vec<u8>),
    EraseFirst,
    Copy,
    Clear,
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // Mostly well-formed keys; the rest have the wrong number of tokens.
    let token = prop::sample::select(TOKENS.to_vec());
    prop_oneof![
        20 => prop::collection::vec(token.clone(), DEPTH),
        1 => prop::collection::vec(token, 0..=DEPTH + 2),
    ]
    .prop_map(|tokens| tokens.join("-").into_bytes())
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op<u64>>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        20 => key.prop_map(Op::Get),
        3 => Just(Op::EraseFirst),
        1 => Just(Op::Copy),
        1 => Just(Op::Clear),
    ];
    prop::collection::vec(op, 0..=500)
}

fn well_formed(key: &[u8]) -> bool {
    key.split(|&b| b == b'-').count() == DEPTH
}

/// Applies `ops` to `m` and to a `BTreeMap` model side by side.
fn run_against_model<M>(mut m: M, ops: Vec<Op<u64>>) -> std::result::Result<(), TestCaseError>
where
    M: CompoundMap<u64> + Clone,
{
    let mut model: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
    for op in ops {
        match op {
            Op::Insert(key, value) => {
                let res = m.insert(&key, value);
                prop_assert_eq!(res.is_ok(), well_formed(&key));
                if let Ok(cursor) = res {
                    prop_assert_eq!(m.value(cursor), Ok(&value));
                    model.insert(key, value);
                }
            }
            Op::Remove(key) => {
                prop_assert_eq!(m.remove(&key), model.remove(&key));
            }
            Op::Get(key) => {
                prop_assert_eq!(m.get(&key).copied(), model.get(&key).copied());
                prop_assert_eq!(m.find(&key).is_end(), !model.contains_key(&key));
            }
            Op::EraseFirst => {
                let first = m.begin();
                let expected_next = m.advance(first);
                if let Ok(key) = m.key(first) {
                    model.remove(&key);
                }
                prop_assert_eq!(m.erase_at(first), expected_next);
            }
            Op::Copy => {
                let copy = m.clone();
                m.clear();
                prop_assert!(m.is_empty());
                m = copy;
            }
            Op::Clear => {
                m.clear();
                model.clear();
            }
        }
        prop_assert_eq!(m.len(), model.len());
    }

    let mut got: Vec<(Vec<u8>, u64)> = validate_traversal(&m)
        .into_iter()
        .map(|(key, cursor)| {
            let value = *m.value(cursor).expect("traversed cursor must be occupied");
            (key, value)
        })
        .collect();
    got.sort();
    let expected: Vec<(Vec<u8>, u64)> = model.into_iter().collect();
    prop_assert_eq!(got, expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_tree_equivalence(ops in ops_strategy()) {
        run_against_model(LevelTree::<u64>::with_depth(DEPTH).unwrap(), ops)?;
    }

    #[test]
    fn prop_tree_direct_equivalence(ops in ops_strategy()) {
        let codec = KeyCodec::growable(DEPTH).unwrap();
        run_against_model(LevelTree::<u64>::with_strategy(codec, AllocStrategy::Direct), ops)?;
    }

    #[test]
    fn prop_dense_equivalence(ops in ops_strategy()) {
        run_against_model(DenseLevelMap::<u64>::from_levels(vocabulary()).unwrap(), ops)?;
    }

    #[test]
    fn prop_tree_matches_dense(keys in prop::collection::vec(key_strategy(), 0..=200)) {
        let mut tree = LevelTree::<usize>::seeded(vocabulary()).unwrap();
        let mut dense = DenseLevelMap::<usize>::from_levels(vocabulary()).unwrap();
        for (i, key) in keys.iter().enumerate() {
            prop_assert_eq!(tree.insert(key, i).is_ok(), dense.insert(key, i).is_ok());
        }
        // Seeded in sorted order, both containers traverse in the same order.
        let tree_keys: Vec<Vec<u8>> = validate_traversal(&tree).into_iter().map(|(k, _)| k).collect();
        let dense_keys: Vec<Vec<u8>> = validate_traversal(&dense).into_iter().map(|(k, _)| k).collect();
        prop_assert_eq!(tree_keys, dense_keys);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_key_set() -> Vec<&'static [u8]> {
    vec![
        &b"ab-ab-ab"[..],
        b"ab-ab-kl",
        b"ab-ij-cd",
        b"gh-cd-ef",
        b"kl-kl-kl",
        b"cd-ab-ab",
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = small_key_set();
    let mut reference: Option<Vec<Vec<u8>>> = None;
    for_each_permutation(&keys, |order| {
        let mut tree = LevelTree::<u8>::seeded(vocabulary()).unwrap();
        for key in &order {
            tree.insert(key, 0).unwrap();
        }
        let traversed: Vec<Vec<u8>> = validate_traversal(&tree).into_iter().map(|(k, _)| k).collect();
        match &reference {
            Some(expected) => assert_eq!(&traversed, expected, "insert order {order:?}"),
            None => reference = Some(traversed),
        }
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys = small_key_set();
    for_each_permutation(&keys, |order| {
        let mut tree = LevelTree::<u8>::with_depth(DEPTH).unwrap();
        let mut dense = DenseLevelMap::<u8>::from_levels(vocabulary()).unwrap();
        for key in &keys {
            tree.insert(key, 1).unwrap();
            dense.insert(key, 1).unwrap();
        }
        let mut remaining: HashSet<&[u8]> = keys.iter().copied().collect();
        for key in &order {
            let tree_next = tree.advance(tree.find(key));
            assert_eq!(tree.erase(key), tree_next);
            let dense_next = dense.advance(dense.find(key));
            assert_eq!(dense.erase(key), dense_next);
            remaining.remove(key);

            assert_eq!(validate_traversal(&tree).len(), remaining.len());
            assert_eq!(validate_traversal(&dense).len(), remaining.len());
        }
        assert!(tree.begin().is_end());
        assert!(dense.begin().is_end());
    });
}
