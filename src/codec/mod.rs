//! Compound key codec.
//!
//! A compound key is `depth` tokens joined by a single delimiter byte, e.g.
//! `aaa-bbb-ccc-ddd`. The codec splits a key, checks the token count and
//! resolves every token to its level's dense index. The result is a
//! [`ParsedKey`], which is what the containers actually index by.
//!
//! Whether unseen tokens can be registered is a property of the codec as a
//! whole ([`Vocabulary`]): growable codecs keep a [`LevelDictionary`] per
//! level, fixed ones a [`StaticLevelVocabulary`].

use smallvec::SmallVec;

use crate::arena::ArenaConfig;
use crate::dict::{LevelDictionary, StaticLevelVocabulary};
use crate::error::{Error, Result};

/// Smallest supported key depth.
pub const MIN_DEPTH: usize = 2;
/// Largest supported key depth.
pub const MAX_DEPTH: usize = 7;
pub const DEFAULT_DELIMITER: u8 = b'-';

/// One dense index per level, first level first.
pub type ParsedKey = SmallVec<[usize; MAX_DEPTH]>;

type Tokens<'k> = SmallVec<[&'k [u8]; MAX_DEPTH]>;

/// Token count of every level at some point in time.
pub(crate) type LevelMarks = SmallVec<[usize; MAX_DEPTH]>;

/// Whether a codec may register tokens it has not seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    /// Unseen tokens get the next free index on the write path.
    Growable,
    /// The token set is closed; indices are sorted positions.
    Fixed,
}

#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Byte separating the tokens of a key.
    pub delimiter: u8,
    /// Configuration of every per-level token arena.
    pub arena: ArenaConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            arena: ArenaConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
enum Level {
    Growable(LevelDictionary),
    Fixed(StaticLevelVocabulary),
}

impl Level {
    fn lookup(&self, token: &[u8]) -> Option<usize> {
        match self {
            Level::Growable(dict) => dict.lookup(token),
            Level::Fixed(vocab) => vocab.lookup(token),
        }
    }

    fn token(&self, index: usize) -> Option<&[u8]> {
        match self {
            Level::Growable(dict) => dict.token(index),
            Level::Fixed(vocab) => vocab.token(index),
        }
    }

    fn len(&self) -> usize {
        match self {
            Level::Growable(dict) => dict.len(),
            Level::Fixed(vocab) => vocab.len(),
        }
    }

    fn memory_usage(&self) -> usize {
        match self {
            Level::Growable(dict) => dict.memory_usage(),
            Level::Fixed(vocab) => vocab.memory_usage(),
        }
    }
}

/// Splits compound keys and maps their tokens to per-level indices.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    levels: Vec<Level>,
    delimiter: u8,
    vocabulary: Vocabulary,
}

impl KeyCodec {
    /// Growable codec with empty dictionaries and the default delimiter.
    pub fn growable(depth: usize) -> Result<Self> {
        Self::growable_with_config(depth, CodecConfig::default())
    }

    pub fn growable_with_config(depth: usize, config: CodecConfig) -> Result<Self> {
        check_depth(depth)?;
        let levels = (0..depth)
            .map(|_| LevelDictionary::with_config(config.arena.clone()).map(Level::Growable))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            levels,
            delimiter: config.delimiter,
            vocabulary: Vocabulary::Growable,
        })
    }

    /// Growable codec whose dictionaries start out with the given tokens.
    ///
    /// There is one token list per level, so the number of lists is the
    /// depth. Seeded tokens are indexed in the order given.
    pub fn seeded<I, L, T>(levels: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Self::seeded_with_config(levels, CodecConfig::default())
    }

    pub fn seeded_with_config<I, L, T>(levels: I, config: CodecConfig) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let levels = levels
            .into_iter()
            .map(|tokens| {
                LevelDictionary::from_tokens(tokens, config.arena.clone()).map(Level::Growable)
            })
            .collect::<Result<Vec<_>>>()?;
        check_depth(levels.len())?;
        Ok(Self {
            levels,
            delimiter: config.delimiter,
            vocabulary: Vocabulary::Growable,
        })
    }

    /// Fixed codec over closed, per-level vocabularies.
    pub fn fixed<I, L, T>(levels: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Self::fixed_with_config(levels, CodecConfig::default())
    }

    pub fn fixed_with_config<I, L, T>(levels: I, config: CodecConfig) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let levels = levels
            .into_iter()
            .map(|tokens| {
                StaticLevelVocabulary::with_config(tokens, config.arena.clone()).map(Level::Fixed)
            })
            .collect::<Result<Vec<_>>>()?;
        check_depth(levels.len())?;
        Ok(Self {
            levels,
            delimiter: config.delimiter,
            vocabulary: Vocabulary::Fixed,
        })
    }

    /// Resolve `key` without registering anything.
    pub fn parse(&self, key: &[u8]) -> Result<ParsedKey> {
        let tokens = self.split(key)?;
        tokens
            .iter()
            .zip(&self.levels)
            .enumerate()
            .map(|(level, (token, dict))| {
                dict.lookup(token).ok_or(Error::UnknownToken { level })
            })
            .collect()
    }

    /// Resolve `key`, registering unseen tokens on a growable codec.
    ///
    /// A fixed codec resolves read-only, as [`parse`](Self::parse) does. The
    /// token count is checked first, so a key of the wrong arity never grows
    /// a dictionary. If any level fails, tokens registered at the earlier
    /// levels are forgotten again.
    pub fn parse_and_register(&mut self, key: &[u8]) -> Result<ParsedKey> {
        let tokens = self.split(key)?;
        let marks = self.marks();
        let result = self.register_tokens(&tokens);
        if result.is_err() {
            self.rollback(&marks);
        }
        result
    }

    /// Per-level token counts, to hand back to [`rollback`](Self::rollback).
    pub(crate) fn marks(&self) -> LevelMarks {
        self.levels.iter().map(Level::len).collect()
    }

    /// Forget tokens registered since `marks` was taken.
    pub(crate) fn rollback(&mut self, marks: &[usize]) {
        for (level, &len) in self.levels.iter_mut().zip(marks) {
            if let Level::Growable(dict) = level {
                dict.truncate(len);
            }
        }
    }

    fn register_tokens(&mut self, tokens: &[&[u8]]) -> Result<ParsedKey> {
        let mut parsed = ParsedKey::new();
        for (level, (token, dict)) in tokens.iter().zip(&mut self.levels).enumerate() {
            let index = match dict {
                Level::Growable(dict) => dict.lookup_or_insert(token)?,
                Level::Fixed(vocab) => vocab
                    .lookup(token)
                    .ok_or(Error::UnknownToken { level })?,
            };
            parsed.push(index);
        }
        Ok(parsed)
    }

    /// Join the tokens behind `parsed` back into a compound key.
    pub fn assemble(&self, parsed: &[usize]) -> Result<Vec<u8>> {
        if parsed.len() != self.depth() {
            return Err(Error::WrongArity {
                expected: self.depth(),
                found: parsed.len(),
            });
        }

        let mut key = Vec::new();
        for (level, (&index, dict)) in parsed.iter().zip(&self.levels).enumerate() {
            let token = dict.token(index).ok_or(Error::UnknownIndex { level, index })?;
            if level > 0 {
                key.push(self.delimiter);
            }
            key.extend_from_slice(token);
        }
        Ok(key)
    }

    /// Token registered under `index` at `level`.
    pub fn token(&self, level: usize, index: usize) -> Option<&[u8]> {
        self.levels.get(level)?.token(index)
    }

    /// Number of tokens currently known at `level`.
    ///
    /// # Panics
    /// Panics if `level >= self.depth()`.
    pub fn level_len(&self, level: usize) -> usize {
        self.levels[level].len()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    #[inline]
    pub fn vocabulary(&self) -> Vocabulary {
        self.vocabulary
    }

    pub fn memory_usage(&self) -> usize {
        self.levels.iter().map(Level::memory_usage).sum::<usize>()
            + self.levels.capacity() * std::mem::size_of::<Level>()
    }

    fn split<'k>(&self, key: &'k [u8]) -> Result<Tokens<'k>> {
        let expected = self.depth();
        let mut tokens = Tokens::new();
        let mut found = 0;
        for token in key.split(|&b| b == self.delimiter) {
            if found < expected {
                tokens.push(token);
            }
            found += 1;
        }
        if found != expected {
            return Err(Error::WrongArity { expected, found });
        }
        Ok(tokens)
    }
}

fn check_depth(depth: usize) -> Result<()> {
    if (MIN_DEPTH..=MAX_DEPTH).contains(&depth) {
        Ok(())
    } else {
        Err(Error::UnsupportedDepth(depth))
    }
}
