//! Keyed child storage backing a mask node.
//!
//! Struct children sit in a hybrid store: field IDs are small and dense by
//! IDL convention, so the common case is a direct slot index with no
//! hashing, and everything else overflows into an ordered map. Index and
//! map children use ordered maps outright so that enumeration, and the
//! serialized form derived from it, is deterministic.

use ordermap::OrderMap;

use super::Mask;

/// Field IDs in `0..FIELD_SLOTS` live in the inline slot vector; the rest
/// (including negative IDs) land in the overflow map.
pub(crate) const FIELD_SLOTS: usize = 64;

/// Hybrid store for struct children, keyed by field ID.
#[derive(Clone, Debug, Default)]
pub(crate) struct FieldStore {
    dense: Vec<Option<Box<Mask>>>,
    occupied: usize,
    sparse: OrderMap<i32, Box<Mask>>,
}

impl FieldStore {
    pub fn get(&self, id: i32) -> Option<&Mask> {
        if (0..FIELD_SLOTS as i32).contains(&id) {
            self.dense.get(id as usize).and_then(Option::as_deref)
        } else {
            self.sparse.get(&id).map(|child| &**child)
        }
    }

    pub fn get_or_insert(&mut self, id: i32) -> &mut Mask {
        if (0..FIELD_SLOTS as i32).contains(&id) {
            let at = id as usize;
            if self.dense.len() <= at {
                self.dense.resize_with(at + 1, || None);
            }
            let slot = &mut self.dense[at];
            if slot.is_none() {
                self.occupied += 1;
            }
            slot.get_or_insert_with(|| Box::new(Mask::new()))
        } else {
            self.sparse.entry(id).or_insert_with(|| Box::new(Mask::new()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0 && self.sparse.is_empty()
    }

    /// Present children: dense slots in ID order, then overflow in
    /// insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Mask)> {
        let dense = self
            .dense
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_deref().map(|child| (id as i32, child)));
        let sparse = self.sparse.iter().map(|(id, child)| (*id, &**child));
        dense.chain(sparse)
    }

    /// Drop every child; containers keep their capacity.
    pub fn clear(&mut self) {
        for slot in &mut self.dense {
            *slot = None;
        }
        self.occupied = 0;
        self.sparse.clear();
    }

    /// Move every child out into `sink`, leaving the store empty.
    pub fn drain<F: FnMut(Box<Mask>)>(&mut self, sink: &mut F) {
        for slot in &mut self.dense {
            if let Some(child) = slot.take() {
                sink(child);
            }
        }
        self.occupied = 0;
        for (_, child) in self.sparse.drain(..) {
            sink(child);
        }
    }
}

/// Ordered store for list/set indices and integer map keys.
#[derive(Clone, Debug, Default)]
pub(crate) struct IntStore(OrderMap<i64, Box<Mask>>);

impl IntStore {
    pub fn get(&self, key: i64) -> Option<&Mask> {
        self.0.get(&key).map(|child| &**child)
    }

    pub fn get_or_insert(&mut self, key: i64) -> &mut Mask {
        self.0.entry(key).or_insert_with(|| Box::new(Mask::new()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &Mask)> {
        self.0.iter().map(|(key, child)| (*key, &**child))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn drain<F: FnMut(Box<Mask>)>(&mut self, sink: &mut F) {
        for (_, child) in self.0.drain(..) {
            sink(child);
        }
    }
}

/// Ordered store for string map keys.
#[derive(Clone, Debug, Default)]
pub(crate) struct StrStore(OrderMap<String, Box<Mask>>);

impl StrStore {
    pub fn get(&self, key: &str) -> Option<&Mask> {
        self.0.get(key).map(|child| &**child)
    }

    /// Allocates the owned key only on first insertion.
    pub fn get_or_insert(&mut self, key: &str) -> &mut Mask {
        let at = match self.0.get_index_of(key) {
            Some(at) => at,
            None => {
                let (at, _) = self.0.insert_full(key.to_owned(), Box::new(Mask::new()));
                at
            }
        };
        &mut self.0[at]
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mask)> {
        self.0.iter().map(|(key, child)| (key.as_str(), &**child))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn drain<F: FnMut(Box<Mask>)>(&mut self, sink: &mut F) {
        for (_, child) in self.0.drain(..) {
            sink(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::MaskKind;

    #[test]
    fn dense_and_sparse_ids_share_one_surface() {
        let mut store = FieldStore::default();
        assert!(store.is_empty());

        store.get_or_insert(0).kind = MaskKind::Scalar;
        store.get_or_insert(63).kind = MaskKind::Scalar;
        store.get_or_insert(64).kind = MaskKind::Scalar;
        store.get_or_insert(-5).kind = MaskKind::Scalar;

        for id in [0, 63, 64, -5] {
            assert!(store.get(id).is_some(), "id {} missing", id);
        }
        assert!(store.get(1).is_none());
        assert!(store.get(65).is_none());
        assert!(!store.is_empty());
    }

    #[test]
    fn get_or_insert_is_idempotent() {
        let mut store = FieldStore::default();
        store.get_or_insert(7).kind = MaskKind::Struct;
        assert_eq!(store.get_or_insert(7).kind, MaskKind::Struct);
        assert_eq!(store.iter().count(), 1);
    }

    #[test]
    fn iteration_yields_dense_then_overflow() {
        let mut store = FieldStore::default();
        store.get_or_insert(200);
        store.get_or_insert(3);
        store.get_or_insert(1);
        store.get_or_insert(-1);

        let ids: Vec<i32> = store.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3, 200, -1]);
    }

    #[test]
    fn clear_and_drain_empty_the_store() {
        let mut store = FieldStore::default();
        store.get_or_insert(2);
        store.get_or_insert(90);
        store.clear();
        assert!(store.is_empty());
        assert!(store.get(2).is_none());

        store.get_or_insert(2);
        store.get_or_insert(90);
        let mut seen = 0;
        store.drain(&mut |_child| seen += 1);
        assert_eq!(seen, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn ordered_stores_keep_insertion_order() {
        let mut ints = IntStore::default();
        ints.get_or_insert(9);
        ints.get_or_insert(-2);
        ints.get_or_insert(4);
        let keys: Vec<i64> = ints.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![9, -2, 4]);

        let mut strs = StrStore::default();
        strs.get_or_insert("b");
        strs.get_or_insert("a");
        strs.get_or_insert("b");
        let keys: Vec<&str> = strs.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
