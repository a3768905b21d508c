//! Per-level token dictionaries.
//!
//! Each key level maps token text to a dense index. Two flavours exist:
//!
//! - [`LevelDictionary`]: growable, indices assigned in insertion order.
//! - [`StaticLevelVocabulary`]: fixed at construction, indices are sorted
//!   positions.
//!
//! Both keep their token bytes in a private [`StringArena`] and answer the
//! reverse mapping (index to token) in O(1).

mod fixed;

pub use fixed::StaticLevelVocabulary;

use std::hash::BuildHasher;

use hashbrown::{DefaultHashBuilder, HashTable};

use crate::arena::{ArenaConfig, ArenaStr, StringArena};
use crate::error::{Error, Result};

/// Growable token dictionary for one key level.
///
/// Indices are dense and handed out in insertion order. There is no removal,
/// so an index is never reused.
#[derive(Clone)]
pub struct LevelDictionary {
    arena: StringArena,
    /// index -> token text
    tokens: Vec<ArenaStr>,
    /// Indices into `tokens`, hashed by the token text they refer to.
    table: HashTable<u32>,
    hasher: DefaultHashBuilder,
}

impl LevelDictionary {
    pub fn new() -> Self {
        Self::from_arena(StringArena::new())
    }

    pub fn with_config(config: ArenaConfig) -> Result<Self> {
        Ok(Self::from_arena(StringArena::with_config(config)?))
    }

    /// Build a dictionary pre-populated with `tokens`, in order.
    ///
    /// A token that appears twice keeps the index of its first occurrence.
    pub fn from_tokens<I, T>(tokens: I, config: ArenaConfig) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut dict = Self::with_config(config)?;
        for token in tokens {
            dict.lookup_or_insert(token.as_ref())?;
        }
        Ok(dict)
    }

    fn from_arena(arena: StringArena) -> Self {
        Self {
            arena,
            tokens: Vec::new(),
            table: HashTable::new(),
            hasher: DefaultHashBuilder::default(),
        }
    }

    /// Index of `token`, if it has been registered.
    pub fn lookup(&self, token: &[u8]) -> Option<usize> {
        let hash = self.hasher.hash_one(token);
        self.table
            .find(hash, |&idx| self.arena.get(self.tokens[idx as usize]) == token)
            .map(|&idx| idx as usize)
    }

    /// Index of `token`, registering it with the next free index if needed.
    pub fn lookup_or_insert(&mut self, token: &[u8]) -> Result<usize> {
        let hash = self.hasher.hash_one(token);
        let Self {
            arena,
            tokens,
            table,
            hasher,
        } = self;

        if let Some(&idx) = table.find(hash, |&idx| arena.get(tokens[idx as usize]) == token) {
            return Ok(idx as usize);
        }

        let index = tokens.len();
        if index >= u32::MAX as usize {
            return Err(Error::alloc::<u32>(index + 1));
        }

        // Reserve everything first so a failure leaves the dictionary untouched.
        tokens
            .try_reserve(1)
            .map_err(|_| Error::alloc::<ArenaStr>(index + 1))?;
        table
            .try_reserve(1, |&idx| hasher.hash_one(arena.get(tokens[idx as usize])))
            .map_err(|_| Error::alloc::<u32>(index + 1))?;
        let stored = arena.allocate(token)?;

        tokens.push(stored);
        table.insert_unique(hash, index as u32, |&idx| {
            hasher.hash_one(arena.get(tokens[idx as usize]))
        });
        Ok(index)
    }

    /// Forget every token with an index of `len` or above.
    ///
    /// Their bytes stay in the arena until it is dropped; only the index
    /// mapping is rolled back, so the next registration reuses `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.tokens.len() {
            return;
        }
        self.table.retain(|idx| (*idx as usize) < len);
        self.tokens.truncate(len);
    }

    /// Token text registered under `index`.
    pub fn token(&self, index: usize) -> Option<&[u8]> {
        self.tokens.get(index).map(|&s| self.arena.get(s))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.arena.memory_usage()
            + self.tokens.capacity() * std::mem::size_of::<ArenaStr>()
            + self.table.capacity() * (std::mem::size_of::<u32>() + 1)
    }
}

impl Default for LevelDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LevelDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelDictionary")
            .field("len", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_indices() {
        let mut dict = LevelDictionary::new();
        assert_eq!(dict.lookup_or_insert(b"zeta").unwrap(), 0);
        assert_eq!(dict.lookup_or_insert(b"alpha").unwrap(), 1);
        assert_eq!(dict.lookup_or_insert(b"mid").unwrap(), 2);
        assert_eq!(dict.lookup_or_insert(b"alpha").unwrap(), 1);
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn test_lookup_missing() {
        let mut dict = LevelDictionary::new();
        dict.lookup_or_insert(b"aaa").unwrap();
        assert_eq!(dict.lookup(b"aaa"), Some(0));
        assert_eq!(dict.lookup(b"aab"), None);
        assert_eq!(dict.lookup(b"aa"), None);
        assert_eq!(dict.lookup(b""), None);
    }

    #[test]
    fn test_reverse_lookup() {
        let dict = LevelDictionary::from_tokens(["one", "two", "three"], ArenaConfig::default())
            .unwrap();
        assert_eq!(dict.token(0), Some(&b"one"[..]));
        assert_eq!(dict.token(2), Some(&b"three"[..]));
        assert_eq!(dict.token(3), None);
    }

    #[test]
    fn test_seed_duplicates_keep_first_index() {
        let dict =
            LevelDictionary::from_tokens(["a", "b", "a", "c"], ArenaConfig::default()).unwrap();
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.lookup(b"a"), Some(0));
        assert_eq!(dict.lookup(b"c"), Some(2));
    }

    #[test]
    fn test_many_tokens_across_blocks() {
        let config = ArenaConfig {
            alignment: 1,
            block_size: 32,
            growth_factor: 1.5,
            block_limit: 256,
        };
        let mut dict = LevelDictionary::with_config(config).unwrap();
        for i in 0..2000 {
            let token = format!("token{i}");
            assert_eq!(dict.lookup_or_insert(token.as_bytes()).unwrap(), i);
        }
        for i in (0..2000).rev() {
            let token = format!("token{i}");
            assert_eq!(dict.lookup(token.as_bytes()), Some(i));
            assert_eq!(dict.token(i), Some(token.as_bytes()));
        }
    }

    #[test]
    fn test_token_too_large_for_arena() {
        let config = ArenaConfig {
            alignment: 1,
            block_size: 8,
            growth_factor: 2.0,
            block_limit: 16,
        };
        let mut dict = LevelDictionary::with_config(config).unwrap();
        dict.lookup_or_insert(b"ok").unwrap();
        let err = dict.lookup_or_insert(&[b'x'; 32]).unwrap_err();
        assert!(matches!(err, Error::AllocationFailure { .. }));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.lookup(&[b'x'; 32]), None);
    }

    #[test]
    fn test_truncate_forgets_newer_tokens() {
        let mut dict = LevelDictionary::from_tokens(["a", "b", "c"], ArenaConfig::default())
            .unwrap();
        dict.truncate(1);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.lookup(b"a"), Some(0));
        assert_eq!(dict.lookup(b"b"), None);
        assert_eq!(dict.token(2), None);
        assert_eq!(dict.lookup_or_insert(b"c").unwrap(), 1);

        dict.truncate(5);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut dict = LevelDictionary::new();
        dict.lookup_or_insert(b"first").unwrap();
        let copy = dict.clone();
        dict.lookup_or_insert(b"second").unwrap();
        assert_eq!(copy.len(), 1);
        assert_eq!(copy.lookup(b"second"), None);
        assert_eq!(copy.lookup(b"first"), Some(0));
    }
}
