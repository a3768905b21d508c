//! Node allocation strategies.
//!
//! Tree nodes live in per-level allocators and refer to each other through
//! 32-bit [`NodeRef`] indices instead of pointers. A parent link is then just
//! another index, and a whole level can be dropped or copied without chasing
//! raw back-pointers.
//!
//! Two strategies implement [`NodeAllocator`]:
//!
//! - [`PooledAllocator`]: nodes stored inline in one vector, vacated slots kept
//!   on a free list and reused by the next `create`.
//! - [`DirectAllocator`]: every node boxed individually and freed as soon as
//!   it is destroyed.
//!
//! [`NodePool`] picks one at runtime from an [`AllocStrategy`].

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::error::{Error, Result};

/// A 32-bit reference to a node in an allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NodeRef(u32);

impl NodeRef {
    pub const NULL: NodeRef = NodeRef(u32::MAX);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    fn new(idx: usize) -> Self {
        debug_assert!(idx < u32::MAX as usize);
        NodeRef(idx as u32)
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        NodeRef::NULL
    }
}

/// Allocation strategy for the nodes of one tree level.
pub trait NodeAllocator<T> {
    /// Store `node` and return its reference. The node is fully built before
    /// any caller can observe the reference.
    fn create(&mut self, node: T) -> Result<NodeRef>;

    /// Remove a node and hand it back. Destroying [`NodeRef::NULL`] or an
    /// already destroyed node does nothing and returns `None`.
    fn destroy(&mut self, node: NodeRef) -> Option<T>;

    fn get(&self, node: NodeRef) -> Option<&T>;

    fn get_mut(&mut self, node: NodeRef) -> Option<&mut T>;

    /// Number of nodes currently alive.
    fn live(&self) -> usize;

    /// Destroy every node at once.
    fn clear(&mut self);

    /// Heap bytes held by the allocator itself, not counting heap data owned
    /// by the nodes.
    fn memory_usage(&self) -> usize;

    /// Like [`create`](Self::create), but the node is destroyed again when the
    /// returned handle is dropped, unless it is [`released`](OwnedNode::release).
    fn create_owned(&mut self, node: T) -> Result<OwnedNode<'_, T, Self>>
    where
        Self: Sized,
    {
        let id = self.create(node)?;
        Ok(OwnedNode {
            alloc: self,
            id,
            _node: PhantomData,
        })
    }
}

/// Exclusively owned node that is destroyed on drop.
pub struct OwnedNode<'a, T, A: NodeAllocator<T>> {
    alloc: &'a mut A,
    id: NodeRef,
    _node: PhantomData<T>,
}

impl<T, A: NodeAllocator<T>> OwnedNode<'_, T, A> {
    #[inline]
    pub fn id(&self) -> NodeRef {
        self.id
    }

    /// Give up ownership and keep the node alive in its allocator.
    pub fn release(mut self) -> NodeRef {
        std::mem::replace(&mut self.id, NodeRef::NULL)
    }
}

impl<T, A: NodeAllocator<T>> Deref for OwnedNode<'_, T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.alloc.get(self.id) {
            Some(node) => node,
            None => unreachable!("owned node {:?} missing from its allocator", self.id),
        }
    }
}

impl<T, A: NodeAllocator<T>> DerefMut for OwnedNode<'_, T, A> {
    fn deref_mut(&mut self) -> &mut T {
        let id = self.id;
        match self.alloc.get_mut(id) {
            Some(node) => node,
            None => unreachable!("owned node {id:?} missing from its allocator"),
        }
    }
}

impl<T, A: NodeAllocator<T>> Drop for OwnedNode<'_, T, A> {
    fn drop(&mut self) {
        self.alloc.destroy(self.id);
    }
}

/// Nodes stored inline; destroyed slots are reused.
#[derive(Clone, Debug)]
pub struct PooledAllocator<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> PooledAllocator<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Default for PooledAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeAllocator<T> for PooledAllocator<T> {
    fn create(&mut self, node: T) -> Result<NodeRef> {
        let id = match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(node);
                NodeRef(idx)
            }
            None => {
                let idx = next_index(&mut self.slots)?;
                self.slots.push(Some(node));
                NodeRef::new(idx)
            }
        };
        self.live += 1;
        Ok(id)
    }

    fn destroy(&mut self, node: NodeRef) -> Option<T> {
        let value = self.slots.get_mut(node.index())?.take()?;
        self.free.push(node.0);
        self.live -= 1;
        Some(value)
    }

    #[inline]
    fn get(&self, node: NodeRef) -> Option<&T> {
        self.slots.get(node.index())?.as_ref()
    }

    #[inline]
    fn get_mut(&mut self, node: NodeRef) -> Option<&mut T> {
        self.slots.get_mut(node.index())?.as_mut()
    }

    fn live(&self) -> usize {
        self.live
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }

    fn memory_usage(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<Option<T>>()
            + self.free.capacity() * std::mem::size_of::<u32>()
    }
}

/// Every node gets its own heap allocation.
#[derive(Clone, Debug)]
pub struct DirectAllocator<T> {
    nodes: Vec<Option<Box<T>>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> DirectAllocator<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Default for DirectAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeAllocator<T> for DirectAllocator<T> {
    fn create(&mut self, node: T) -> Result<NodeRef> {
        let id = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = Some(Box::new(node));
                NodeRef(idx)
            }
            None => {
                let idx = next_index(&mut self.nodes)?;
                self.nodes.push(Some(Box::new(node)));
                NodeRef::new(idx)
            }
        };
        self.live += 1;
        Ok(id)
    }

    fn destroy(&mut self, node: NodeRef) -> Option<T> {
        let boxed = self.nodes.get_mut(node.index())?.take()?;
        self.free.push(node.0);
        self.live -= 1;
        Some(*boxed)
    }

    #[inline]
    fn get(&self, node: NodeRef) -> Option<&T> {
        self.nodes.get(node.index())?.as_deref()
    }

    #[inline]
    fn get_mut(&mut self, node: NodeRef) -> Option<&mut T> {
        self.nodes.get_mut(node.index())?.as_deref_mut()
    }

    fn live(&self) -> usize {
        self.live
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.live = 0;
    }

    fn memory_usage(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<Option<Box<T>>>()
            + self.live * std::mem::size_of::<T>()
            + self.free.capacity() * std::mem::size_of::<u32>()
    }
}

/// Reserve room for one more slot and return its index.
fn next_index<S>(slots: &mut Vec<S>) -> Result<usize> {
    let idx = slots.len();
    if idx >= u32::MAX as usize {
        return Err(Error::alloc::<S>(idx + 1));
    }
    slots
        .try_reserve(1)
        .map_err(|_| Error::alloc::<S>(idx + 1))?;
    Ok(idx)
}

/// Which [`NodeAllocator`] a container uses for its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocStrategy {
    #[default]
    Pooled,
    Direct,
}

/// Allocator chosen at runtime from an [`AllocStrategy`].
#[derive(Clone, Debug)]
pub enum NodePool<T> {
    Pooled(PooledAllocator<T>),
    Direct(DirectAllocator<T>),
}

impl<T> NodePool<T> {
    pub fn new(strategy: AllocStrategy) -> Self {
        match strategy {
            AllocStrategy::Pooled => NodePool::Pooled(PooledAllocator::new()),
            AllocStrategy::Direct => NodePool::Direct(DirectAllocator::new()),
        }
    }

    pub fn strategy(&self) -> AllocStrategy {
        match self {
            NodePool::Pooled(_) => AllocStrategy::Pooled,
            NodePool::Direct(_) => AllocStrategy::Direct,
        }
    }
}

impl<T> NodeAllocator<T> for NodePool<T> {
    fn create(&mut self, node: T) -> Result<NodeRef> {
        match self {
            NodePool::Pooled(a) => a.create(node),
            NodePool::Direct(a) => a.create(node),
        }
    }

    fn destroy(&mut self, node: NodeRef) -> Option<T> {
        match self {
            NodePool::Pooled(a) => a.destroy(node),
            NodePool::Direct(a) => a.destroy(node),
        }
    }

    #[inline]
    fn get(&self, node: NodeRef) -> Option<&T> {
        match self {
            NodePool::Pooled(a) => a.get(node),
            NodePool::Direct(a) => a.get(node),
        }
    }

    #[inline]
    fn get_mut(&mut self, node: NodeRef) -> Option<&mut T> {
        match self {
            NodePool::Pooled(a) => a.get_mut(node),
            NodePool::Direct(a) => a.get_mut(node),
        }
    }

    fn live(&self) -> usize {
        match self {
            NodePool::Pooled(a) => a.live(),
            NodePool::Direct(a) => a.live(),
        }
    }

    fn clear(&mut self) {
        match self {
            NodePool::Pooled(a) => a.clear(),
            NodePool::Direct(a) => a.clear(),
        }
    }

    fn memory_usage(&self) -> usize {
        match self {
            NodePool::Pooled(a) => a.memory_usage(),
            NodePool::Direct(a) => a.memory_usage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    /// Counts how many times it has been dropped.
    struct DestroyCheck(Rc<Cell<usize>>);

    impl Drop for DestroyCheck {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn both<T>() -> [NodePool<T>; 2] {
        [
            NodePool::new(AllocStrategy::Pooled),
            NodePool::new(AllocStrategy::Direct),
        ]
    }

    #[test]
    fn test_create_get_destroy() {
        for mut pool in both::<String>() {
            let a = pool.create("a".to_string()).unwrap();
            let b = pool.create("b".to_string()).unwrap();
            assert_ne!(a, b);
            assert_eq!(pool.get(a).map(String::as_str), Some("a"));
            pool.get_mut(b).unwrap().push('!');
            assert_eq!(pool.get(b).map(String::as_str), Some("b!"));
            assert_eq!(pool.live(), 2);

            assert_eq!(pool.destroy(a).as_deref(), Some("a"));
            assert_eq!(pool.get(a), None);
            assert_eq!(pool.live(), 1);
        }
    }

    #[test]
    fn test_destroy_null_and_twice() {
        for mut pool in both::<u64>() {
            assert_eq!(pool.destroy(NodeRef::NULL), None);
            let id = pool.create(7).unwrap();
            assert_eq!(pool.destroy(id), Some(7));
            assert_eq!(pool.destroy(id), None);
            assert_eq!(pool.live(), 0);
            assert_eq!(pool.get(NodeRef::NULL), None);
        }
    }

    #[test]
    fn test_pooled_reuses_slots() {
        let mut pool = PooledAllocator::with_capacity(4);
        let ids: Vec<_> = (0..4).map(|i| pool.create(i).unwrap()).collect();
        pool.destroy(ids[1]);
        pool.destroy(ids[2]);
        let reused = pool.create(10).unwrap();
        assert!(reused == ids[1] || reused == ids[2]);
        assert_eq!(pool.get(reused), Some(&10));
        assert_eq!(pool.slots.len(), 4);
    }

    #[test]
    fn test_nodes_dropped_on_destroy_and_clear() {
        let drops = Rc::new(Cell::new(0));
        for mut pool in both::<DestroyCheck>() {
            drops.set(0);
            let first = pool.create(DestroyCheck(drops.clone())).unwrap();
            pool.create(DestroyCheck(drops.clone())).unwrap();
            pool.create(DestroyCheck(drops.clone())).unwrap();

            drop(pool.destroy(first));
            assert_eq!(drops.get(), 1);
            pool.clear();
            assert_eq!(drops.get(), 3);
            assert_eq!(pool.live(), 0);
        }
    }

    #[test]
    fn test_owned_node_destroyed_on_drop() {
        let drops = Rc::new(Cell::new(0));
        for mut pool in both::<DestroyCheck>() {
            drops.set(0);
            let id = {
                let owned = pool.create_owned(DestroyCheck(drops.clone())).unwrap();
                owned.id()
            };
            assert_eq!(drops.get(), 1);
            assert!(pool.get(id).is_none());
            assert_eq!(pool.live(), 0);
        }
    }

    #[test]
    fn test_owned_node_release() {
        for mut pool in both::<Vec<u8>>() {
            let mut owned = pool.create_owned(vec![1, 2]).unwrap();
            owned.push(3);
            assert_eq!(owned.len(), 3);
            let id = owned.release();
            assert_eq!(pool.get(id).map(Vec::as_slice), Some(&[1u8, 2, 3][..]));
            assert_eq!(pool.live(), 1);
        }
    }

    #[test]
    fn test_strategy_and_accounting() {
        for (strategy, mut pool) in [AllocStrategy::Pooled, AllocStrategy::Direct]
            .into_iter()
            .zip(both::<[u64; 4]>())
        {
            assert_eq!(pool.strategy(), strategy);
            let before = pool.memory_usage();
            for _ in 0..100 {
                pool.create([0; 4]).unwrap();
            }
            assert!(pool.memory_usage() > before);
        }
    }
}
