//! Branch and leaf nodes of a [`LevelTree`](super::LevelTree).

use bit_vec::BitVec;

use crate::alloc::NodeRef;
use crate::bits::{next_set_bit, try_zeroed};
use crate::error::{Error, Result};

/// Inner node: one child reference per token index of the next level.
#[derive(Debug)]
pub(crate) struct Branch {
    /// `NULL` for children of the root.
    pub parent: NodeRef,
    /// Index of this node in its parent's child list.
    pub self_index: usize,
    /// Absent children are `NULL`.
    pub children: Vec<NodeRef>,
}

impl Branch {
    pub fn new(parent: NodeRef, self_index: usize) -> Self {
        Self {
            parent,
            self_index,
            children: Vec::new(),
        }
    }

    /// Branch with room for `width` children.
    pub fn with_width(parent: NodeRef, self_index: usize, width: usize) -> Result<Self> {
        let mut children = Vec::new();
        children
            .try_reserve_exact(width)
            .map_err(|_| Error::alloc::<NodeRef>(width))?;
        children.resize(width, NodeRef::NULL);
        Ok(Self {
            parent,
            self_index,
            children,
        })
    }

    #[inline]
    pub fn child(&self, idx: usize) -> NodeRef {
        self.children.get(idx).copied().unwrap_or(NodeRef::NULL)
    }

    /// Make sure `idx` is addressable, growing the list with `NULL`s.
    pub fn reserve_child(&mut self, idx: usize) -> Result<()> {
        if idx < self.children.len() {
            return Ok(());
        }
        let additional = idx + 1 - self.children.len();
        self.children
            .try_reserve(additional)
            .map_err(|_| Error::alloc::<NodeRef>(idx + 1))?;
        self.children.resize(idx + 1, NodeRef::NULL);
        Ok(())
    }

    /// Attach a child at an index made addressable by `reserve_child`.
    #[inline]
    pub fn set_child(&mut self, idx: usize, child: NodeRef) {
        self.children[idx] = child;
    }

    /// Materialized children from `from` onwards, with their indices.
    pub fn children_from(&self, from: usize) -> impl Iterator<Item = (usize, NodeRef)> + '_ {
        self.children
            .iter()
            .enumerate()
            .skip(from)
            .filter(|(_, c)| !c.is_null())
            .map(|(i, &c)| (i, c))
    }

    pub fn heap_bytes(&self) -> usize {
        self.children.capacity() * std::mem::size_of::<NodeRef>()
    }
}

/// Last level: a value and an occupancy bit per token index.
#[derive(Debug)]
pub(crate) struct Leaf<V> {
    pub parent: NodeRef,
    pub self_index: usize,
    values: Vec<V>,
    occupied: BitVec,
}

impl<V: Default> Leaf<V> {
    /// Leaf with `width` empty slots.
    pub fn with_width(parent: NodeRef, self_index: usize, width: usize) -> Result<Self> {
        let occupied = try_zeroed(width)?;
        let mut values = Vec::new();
        values
            .try_reserve_exact(width)
            .map_err(|_| Error::alloc::<V>(width))?;
        values.resize_with(width, V::default);
        Ok(Self {
            parent,
            self_index,
            values,
            occupied,
        })
    }

    /// Store `value` at `idx`, growing past the initial width if needed.
    /// Returns whether the slot was already occupied.
    pub fn set(&mut self, idx: usize, value: V) -> Result<bool> {
        if idx >= self.values.len() {
            let additional = idx + 1 - self.values.len();
            self.values
                .try_reserve(additional)
                .map_err(|_| Error::alloc::<V>(idx + 1))?;
            self.values.resize_with(idx + 1, V::default);
            self.occupied.grow(idx + 1 - self.occupied.len(), false);
        }
        self.values[idx] = value;
        let existed = self.is_occupied(idx);
        self.occupied.set(idx, true);
        Ok(existed)
    }

    /// Clear the slot and hand back what it held.
    pub fn take(&mut self, idx: usize) -> Option<V> {
        if !self.is_occupied(idx) {
            return None;
        }
        self.occupied.set(idx, false);
        Some(std::mem::take(&mut self.values[idx]))
    }
}

impl<V> Leaf<V> {
    #[inline]
    pub fn is_occupied(&self, idx: usize) -> bool {
        self.occupied.get(idx).unwrap_or(false)
    }

    pub fn get(&self, idx: usize) -> Option<&V> {
        if self.is_occupied(idx) {
            self.values.get(idx)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut V> {
        if self.is_occupied(idx) {
            self.values.get_mut(idx)
        } else {
            None
        }
    }

    #[inline]
    pub fn first_occupied(&self) -> Option<usize> {
        next_set_bit(&self.occupied, 0)
    }

    #[inline]
    pub fn next_occupied(&self, after: usize) -> Option<usize> {
        next_set_bit(&self.occupied, after + 1)
    }

    pub fn heap_bytes(&self) -> usize {
        self.values.capacity() * std::mem::size_of::<V>() + self.occupied.capacity() / 8
    }
}

impl<V: Clone> Leaf<V> {
    /// Deep copy attached to a different parent.
    pub fn try_clone_with_parent(&self, parent: NodeRef) -> Result<Self> {
        let mut values = Vec::new();
        values
            .try_reserve_exact(self.values.len())
            .map_err(|_| Error::alloc::<V>(self.values.len()))?;
        values.extend_from_slice(&self.values);
        Ok(Self {
            parent,
            self_index: self.self_index,
            values,
            occupied: self.occupied.clone(),
        })
    }
}
