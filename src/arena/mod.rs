//! Bump arena for interned token text.
//!
//! Arenas copy bytes into large blocks and hand back compact handles. This
//! keeps token storage out of the per-entry path:
//! - One allocation per block instead of one per token
//! - 12-byte handles instead of owned strings in the lookup tables
//! - Blocks never move, so handles stay valid as the arena grows
//!
//! Individual strings cannot be freed. [`StringArena::clear`] drops every
//! block at once and invalidates all handles issued before it.

use tracing::debug;

use crate::error::{Error, Result};

const DEFAULT_BLOCK_SIZE: usize = 1024;
const DEFAULT_ALIGNMENT: usize = 32;
const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

/// Offsets inside a block are stored as `u32`; keep blocks below 2^31.
const MAX_BLOCK_LIMIT: usize = 1 << 31;

const SUPPORTED_ALIGNMENTS: [usize; 7] = [1, 4, 8, 16, 32, 64, 128];

/// Growth and alignment parameters of a [`StringArena`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaConfig {
    /// Every allocation advances the bump offset by a multiple of this.
    pub alignment: usize,
    /// Size of the first block.
    pub block_size: usize,
    /// Each new block is this many times larger than the previous one.
    pub growth_factor: f64,
    /// No block is ever larger than this many bytes.
    pub block_limit: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            block_size: DEFAULT_BLOCK_SIZE,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            block_limit: i32::MAX as usize,
        }
    }
}

impl ArenaConfig {
    /// Check the configuration once, before any block is allocated.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_ALIGNMENTS.contains(&self.alignment) {
            return Err(Error::UnsupportedAlignment(self.alignment));
        }
        if self.block_limit >= MAX_BLOCK_LIMIT {
            return Err(Error::InvalidArenaConfig("block limit must be below 2^31"));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidArenaConfig("block size must be non-zero"));
        }
        if self.block_size > self.block_limit {
            return Err(Error::InvalidArenaConfig("block size exceeds block limit"));
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err(Error::InvalidArenaConfig("growth factor must be at least 1"));
        }
        Ok(())
    }
}

/// Handle to bytes stored in a [`StringArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArenaStr {
    block: u32,
    offset: u32,
    len: u32,
}

impl ArenaStr {
    /// Length of the stored bytes, excluding the terminator.
    #[inline]
    pub fn len(self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Append-only byte arena.
///
/// Every allocation is copied into the current block followed by a NUL byte.
/// When the block runs out a new one is allocated, sized
/// `max(needed, previous * growth_factor)` and capped at `block_limit`.
#[derive(Clone)]
pub struct StringArena {
    blocks: Vec<Box<[u8]>>,
    /// Bump offset into the last block.
    used: usize,
    /// Size of the last block allocated, the base for the next one.
    last_block_size: usize,
    total_allocated: usize,
    config: ArenaConfig,
}

impl StringArena {
    /// Create an arena with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(ArenaConfig::default())
    }

    /// Create an arena after validating `config`.
    pub fn with_config(config: ArenaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: ArenaConfig) -> Self {
        Self {
            blocks: Vec::new(),
            used: 0,
            last_block_size: 0,
            total_allocated: 0,
            config,
        }
    }

    /// Copy `bytes` into the arena.
    ///
    /// Fails with [`Error::AllocationFailure`] if the bytes plus terminator do
    /// not fit in a block of `block_limit` bytes, or if the system allocator
    /// refuses a new block. The arena is unchanged on failure.
    pub fn allocate(&mut self, bytes: &[u8]) -> Result<ArenaStr> {
        let needed = bytes.len() + 1;
        if needed > self.remaining() {
            self.grow(needed)?;
        }

        let block_idx = self.blocks.len() - 1;
        let offset = self.used;
        let block = &mut self.blocks[block_idx];
        block[offset..offset + bytes.len()].copy_from_slice(bytes);
        block[offset + bytes.len()] = 0;
        self.used = align_up(offset + needed, self.config.alignment).min(block.len());

        Ok(ArenaStr {
            block: block_idx as u32,
            offset: offset as u32,
            len: bytes.len() as u32,
        })
    }

    /// Bytes behind a handle.
    ///
    /// # Panics
    /// Panics if the handle was issued by another arena or before `clear`.
    #[inline]
    pub fn get(&self, s: ArenaStr) -> &[u8] {
        let start = s.offset as usize;
        &self.blocks[s.block as usize][start..start + s.len as usize]
    }

    /// Drop every block. All handles issued so far become invalid.
    pub fn clear(&mut self) {
        self.blocks = Vec::new();
        self.used = 0;
        self.last_block_size = 0;
        self.total_allocated = 0;
    }

    /// Number of blocks currently owned.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total bytes across all blocks.
    pub fn allocated_bytes(&self) -> usize {
        self.total_allocated
    }

    /// Heap bytes held by the arena, including the block table.
    pub fn memory_usage(&self) -> usize {
        self.total_allocated + self.blocks.capacity() * std::mem::size_of::<Box<[u8]>>()
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.blocks.last().map_or(0, |b| b.len() - self.used)
    }

    fn grow(&mut self, needed: usize) -> Result<()> {
        let limit = self.config.block_limit;
        if needed > limit {
            return Err(Error::AllocationFailure { requested: needed });
        }

        let base = if self.blocks.is_empty() {
            self.config.block_size
        } else {
            (self.last_block_size as f64 * self.config.growth_factor) as usize
        };
        let size = base.max(needed).min(limit);

        let mut block = Vec::new();
        block
            .try_reserve_exact(size)
            .map_err(|_| Error::AllocationFailure { requested: size })?;
        block.resize(size, 0u8);
        self.blocks
            .try_reserve(1)
            .map_err(|_| Error::alloc::<Box<[u8]>>(1))?;
        self.blocks.push(block.into_boxed_slice());

        self.used = 0;
        self.last_block_size = size;
        self.total_allocated += size;
        debug!(
            block = self.blocks.len(),
            size,
            total = self.total_allocated,
            "allocated arena block"
        );
        Ok(())
    }
}

impl Default for StringArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StringArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringArena")
            .field("blocks", &self.blocks.len())
            .field("allocated", &self.total_allocated)
            .field("config", &self.config)
            .finish()
    }
}

#[inline]
fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}
