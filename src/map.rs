//! Cursor protocol shared by both containers.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::alloc::NodeRef;
use crate::error::Result;

/// Position of an entry in a [`CompoundMap`].
///
/// A cursor is a plain value: it stays valid across inserts and erases of
/// other entries, and it does not borrow the container. Only `clear` and
/// dropping the container invalidate it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cursor {
    /// Leaf holding the entry; `NULL` for containers without nodes.
    node: NodeRef,
    slot: usize,
}

impl Cursor {
    /// Past-the-end position, also returned by failed lookups.
    pub const END: Cursor = Cursor {
        node: NodeRef::NULL,
        slot: usize::MAX,
    };

    #[inline]
    pub fn is_end(self) -> bool {
        self.slot == usize::MAX
    }

    #[inline]
    pub(crate) fn new(node: NodeRef, slot: usize) -> Self {
        Self { node, slot }
    }

    #[inline]
    pub(crate) fn node(self) -> NodeRef {
        self.node
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.slot
    }
}

/// Map from compound keys to values with cursor-based traversal.
///
/// Misses are not errors: `find` and `erase` return [`Cursor::END`] when the
/// key does not parse or is not present. Dereferencing an end cursor, or one
/// whose entry has been erased, fails with [`Error::MissingValue`].
///
/// [`Error::MissingValue`]: crate::Error::MissingValue
pub trait CompoundMap<V> {
    /// Insert or overwrite the value under `key`.
    fn insert(&mut self, key: &[u8], value: V) -> Result<Cursor>;

    fn find(&self, key: &[u8]) -> Cursor;

    /// Remove the entry under `key` and return a cursor to the entry after it.
    fn erase(&mut self, key: &[u8]) -> Cursor;

    /// Remove the entry at `cursor` and return a cursor to the entry after it.
    /// Erasing at the end, or at an empty slot, returns the end cursor.
    fn erase_at(&mut self, cursor: Cursor) -> Cursor;

    /// First entry in traversal order.
    fn begin(&self) -> Cursor;

    #[inline]
    fn end(&self) -> Cursor {
        Cursor::END
    }

    /// Entry following `cursor` in traversal order.
    fn advance(&self, cursor: Cursor) -> Cursor;

    fn value(&self, cursor: Cursor) -> Result<&V>;

    fn value_mut(&mut self, cursor: Cursor) -> Result<&mut V>;

    /// Compound key of the entry at `cursor`.
    fn key(&self, cursor: Cursor) -> Result<Vec<u8>>;

    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    fn clear(&mut self);

    fn get(&self, key: &[u8]) -> Option<&V> {
        self.value(self.find(key)).ok()
    }

    fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let cursor = self.find(key);
        self.value_mut(cursor).ok()
    }

    fn contains_key(&self, key: &[u8]) -> bool {
        !self.find(key).is_end()
    }

    /// Remove the entry under `key`, returning its value.
    fn remove(&mut self, key: &[u8]) -> Option<V>
    where
        V: Default,
    {
        let cursor = self.find(key);
        let value = std::mem::take(self.value_mut(cursor).ok()?);
        self.erase_at(cursor);
        Some(value)
    }

    /// Entries in traversal order.
    fn iter(&self) -> Iter<'_, V, Self>
    where
        Self: Sized,
    {
        Iter {
            map: self,
            cursor: self.begin(),
            remaining: self.len(),
            _value: PhantomData,
        }
    }
}

/// Iterator over `(cursor, value)` pairs of a [`CompoundMap`].
pub struct Iter<'a, V, M> {
    map: &'a M,
    cursor: Cursor,
    remaining: usize,
    _value: PhantomData<&'a V>,
}

impl<'a, V: 'a, M: CompoundMap<V>> Iterator for Iter<'a, V, M> {
    type Item = (Cursor, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_end() {
            return None;
        }
        let map = self.map;
        let at = self.cursor;
        let value = map.value(at).ok()?;
        self.cursor = map.advance(at);
        self.remaining = self.remaining.saturating_sub(1);
        Some((at, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, V: 'a, M: CompoundMap<V>> ExactSizeIterator for Iter<'a, V, M> {}

impl<'a, V: 'a, M: CompoundMap<V>> FusedIterator for Iter<'a, V, M> {}
