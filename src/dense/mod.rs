//! Dense, fully preallocated level map.
//!
//! When every level's vocabulary is closed, the whole key space can be laid
//! out flat. A parsed key becomes one slot number by mixed-radix encoding,
//! first level most significant:
//!
//! ```text
//! slot = ((p[0] * n[1] + p[1]) * n[2] + p[2]) * n[3] + p[3]
//! ```
//!
//! where `n[l]` is the vocabulary size of level `l`. Values and one occupancy
//! bit per slot are allocated up front; lookups are a parse plus an index.
//! Traversal scans the occupancy bits, so stepping over a sparse region costs
//! time proportional to its size.

use bit_vec::BitVec;
use smallvec::SmallVec;
use tracing::debug;

use crate::alloc::NodeRef;
use crate::bits::{next_set_bit, try_zeroed};
use crate::codec::{CodecConfig, KeyCodec, ParsedKey, Vocabulary, MAX_DEPTH};
use crate::error::{Error, Result};
use crate::map::{CompoundMap, Cursor};

/// Flat map over a closed compound key space.
///
/// # Example
/// ```
/// use level_tree::{CompoundMap, DenseLevelMap};
///
/// let mut map = DenseLevelMap::from_levels([["eu", "us"], ["api", "db"]]).unwrap();
/// assert_eq!(map.slot_count(), 4);
///
/// map.insert(b"us-db", 7).unwrap();
/// assert_eq!(map.get(b"us-db"), Some(&7));
/// assert!(map.insert(b"ap-db", 1).is_err());
/// ```
#[derive(Clone)]
pub struct DenseLevelMap<V> {
    codec: KeyCodec,
    /// Vocabulary size per level.
    radix: SmallVec<[usize; MAX_DEPTH]>,
    values: Vec<V>,
    occupied: BitVec,
    len: usize,
}

impl<V: Default> DenseLevelMap<V> {
    /// Map over a fixed codec, with every slot allocated.
    pub fn new(codec: KeyCodec) -> Result<Self> {
        if codec.vocabulary() != Vocabulary::Fixed {
            return Err(Error::GrowableVocabulary);
        }

        let radix: SmallVec<[usize; MAX_DEPTH]> =
            (0..codec.depth()).map(|level| codec.level_len(level)).collect();
        let slots = radix
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or(Error::AllocationFailure {
                requested: usize::MAX,
            })?;

        // Bits first: for zero-sized values they are the only real allocation.
        let occupied = try_zeroed(slots)?;
        let mut values = Vec::new();
        values
            .try_reserve_exact(slots)
            .map_err(|_| Error::alloc::<V>(slots))?;
        values.resize_with(slots, V::default);

        debug!(depth = codec.depth(), slots, "allocated dense level map");
        Ok(Self {
            codec,
            radix,
            values,
            occupied,
            len: 0,
        })
    }

    /// Map over one closed token list per level.
    pub fn from_levels<I, L, T>(levels: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        KeyCodec::fixed(levels).and_then(Self::new)
    }

    pub fn from_levels_with_config<I, L, T>(levels: I, config: CodecConfig) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        KeyCodec::fixed_with_config(levels, config).and_then(Self::new)
    }
}

impl<V> DenseLevelMap<V> {
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Size of the key space, occupied or not.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.values.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.values.capacity() * std::mem::size_of::<V>()
            + self.occupied.capacity() / 8
            + self.codec.memory_usage()
    }

    #[inline]
    fn slot_of(&self, parsed: &[usize]) -> usize {
        parsed
            .iter()
            .zip(&self.radix)
            .fold(0, |slot, (&idx, &n)| slot * n + idx)
    }

    fn decode(&self, mut slot: usize) -> ParsedKey {
        let mut parsed = ParsedKey::from_elem(0, self.radix.len());
        for (level, &n) in self.radix.iter().enumerate().rev() {
            parsed[level] = slot % n;
            slot /= n;
        }
        parsed
    }

    #[inline]
    fn is_occupied(&self, slot: usize) -> bool {
        self.occupied.get(slot).unwrap_or(false)
    }

    #[inline]
    fn cursor_at(slot: Option<usize>) -> Cursor {
        slot.map_or(Cursor::END, |slot| Cursor::new(NodeRef::NULL, slot))
    }
}

impl<V: Default> CompoundMap<V> for DenseLevelMap<V> {
    fn insert(&mut self, key: &[u8], value: V) -> Result<Cursor> {
        let parsed = self.codec.parse(key)?;
        let slot = self.slot_of(&parsed);
        self.values[slot] = value;
        if !self.is_occupied(slot) {
            self.occupied.set(slot, true);
            self.len += 1;
        }
        Ok(Cursor::new(NodeRef::NULL, slot))
    }

    fn find(&self, key: &[u8]) -> Cursor {
        match self.codec.parse(key) {
            Ok(parsed) => {
                let slot = self.slot_of(&parsed);
                Self::cursor_at(self.is_occupied(slot).then_some(slot))
            }
            Err(_) => Cursor::END,
        }
    }

    fn erase(&mut self, key: &[u8]) -> Cursor {
        match self.codec.parse(key) {
            Ok(parsed) => {
                let slot = self.slot_of(&parsed);
                self.erase_at(Cursor::new(NodeRef::NULL, slot))
            }
            Err(_) => Cursor::END,
        }
    }

    fn erase_at(&mut self, cursor: Cursor) -> Cursor {
        let slot = cursor.slot();
        if cursor.is_end() || !self.is_occupied(slot) {
            return Cursor::END;
        }
        let next = self.advance(cursor);
        self.occupied.set(slot, false);
        self.values[slot] = V::default();
        self.len -= 1;
        next
    }

    fn begin(&self) -> Cursor {
        Self::cursor_at(next_set_bit(&self.occupied, 0))
    }

    fn advance(&self, cursor: Cursor) -> Cursor {
        if cursor.is_end() {
            return Cursor::END;
        }
        Self::cursor_at(next_set_bit(&self.occupied, cursor.slot() + 1))
    }

    fn value(&self, cursor: Cursor) -> Result<&V> {
        let slot = cursor.slot();
        if !self.is_occupied(slot) {
            return Err(Error::MissingValue);
        }
        self.values.get(slot).ok_or(Error::MissingValue)
    }

    fn value_mut(&mut self, cursor: Cursor) -> Result<&mut V> {
        let slot = cursor.slot();
        if !self.is_occupied(slot) {
            return Err(Error::MissingValue);
        }
        self.values.get_mut(slot).ok_or(Error::MissingValue)
    }

    fn key(&self, cursor: Cursor) -> Result<Vec<u8>> {
        let slot = cursor.slot();
        if !self.is_occupied(slot) {
            return Err(Error::MissingValue);
        }
        self.codec.assemble(&self.decode(slot))
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        debug!(len = self.len, "clearing dense level map");
        let mut slot = next_set_bit(&self.occupied, 0);
        while let Some(s) = slot {
            self.values[s] = V::default();
            slot = next_set_bit(&self.occupied, s + 1);
        }
        self.occupied.clear();
        self.len = 0;
    }
}

impl<V> std::fmt::Debug for DenseLevelMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseLevelMap")
            .field("radix", &self.radix)
            .field("len", &self.len)
            .finish()
    }
}
