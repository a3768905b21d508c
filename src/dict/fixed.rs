use crate::arena::{ArenaConfig, ArenaStr, StringArena};
use crate::error::{Error, Result};

/// Closed token vocabulary for one key level.
///
/// Tokens are sorted and de-duplicated once, at construction; a token's index
/// is its position in that order. Lookup is a binary search over the arena
/// bytes and nothing can be added afterwards.
#[derive(Clone)]
pub struct StaticLevelVocabulary {
    arena: StringArena,
    /// Sorted by token text.
    tokens: Vec<ArenaStr>,
}

impl StaticLevelVocabulary {
    pub fn new<I, T>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Self::with_config(tokens, ArenaConfig::default())
    }

    pub fn with_config<I, T>(tokens: I, config: ArenaConfig) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut sorted: Vec<T> = tokens.into_iter().collect();
        sorted.sort_unstable_by(|a, b| a.as_ref().cmp(b.as_ref()));
        sorted.dedup_by(|a, b| a.as_ref() == b.as_ref());

        let mut arena = StringArena::with_config(config)?;
        let mut handles = Vec::new();
        handles
            .try_reserve_exact(sorted.len())
            .map_err(|_| Error::alloc::<ArenaStr>(sorted.len()))?;
        for token in &sorted {
            handles.push(arena.allocate(token.as_ref())?);
        }

        Ok(Self {
            arena,
            tokens: handles,
        })
    }

    /// Sorted position of `token`, if it is part of the vocabulary.
    pub fn lookup(&self, token: &[u8]) -> Option<usize> {
        self.tokens
            .binary_search_by(|&s| self.arena.get(s).cmp(token))
            .ok()
    }

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
        self.arena.memory_usage() + self.tokens.capacity() * std::mem::size_of::<ArenaStr>()
    }
}

impl std::fmt::Debug for StaticLevelVocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tokens.iter().map(|&s| String::from_utf8_lossy(self.arena.get(s))))
            .finish()
    }
}
