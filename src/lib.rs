//! # level-tree
//!
//! Fixed-depth maps keyed by compound strings such as `aaa-bbb-ccc-ddd`.
//!
//! Every token of a key selects one level of the map. Tokens are interned per
//! level into dense integer indices by a [`KeyCodec`], and the containers index
//! by those integers only:
//!
//! - [`LevelTree`]: sparse tree whose nodes are created the first time a key
//!   routes through them. Works with growable vocabularies.
//! - [`DenseLevelMap`]: one flat slot array covering the whole key space of a
//!   closed vocabulary, addressed by mixed-radix encoding.
//!
//! Both implement [`CompoundMap`], a cursor-based API where misses return
//! [`Cursor::END`] instead of an error.
//!
//! ## Example
//!
//! ```rust
//! use level_tree::{CompoundMap, LevelTree};
//!
//! let mut tree: LevelTree<u64> = LevelTree::with_depth(4).unwrap();
//! tree.insert(b"aaa-bbb-ccc-ddd", 777).unwrap();
//! tree.insert(b"aaa-bbb-ccc-dde", 778).unwrap();
//!
//! let it = tree.find(b"aaa-bbb-ccc-ddd");
//! assert_eq!(tree.value(it), Ok(&777));
//! assert!(tree.find(b"aaa-bbb-cca-ddd").is_end());
//!
//! let next = tree.erase_at(it);
//! assert_eq!(tree.key(next).unwrap(), b"aaa-bbb-ccc-dde");
//! assert_eq!(tree.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod alloc;
pub mod arena;
mod bits;
pub mod codec;
pub mod dense;
pub mod dict;
mod error;
mod map;
pub mod tree;

pub use alloc::{AllocStrategy, NodeAllocator, NodePool, NodeRef};
pub use arena::{ArenaConfig, ArenaStr, StringArena};
pub use codec::{CodecConfig, KeyCodec, ParsedKey, Vocabulary};
pub use dense::DenseLevelMap;
pub use dict::{LevelDictionary, StaticLevelVocabulary};
pub use error::{Error, Result};
pub use map::{CompoundMap, Cursor, Iter};
pub use tree::{LevelTree, TreeStats};

#[cfg(test)]
mod proptests;
