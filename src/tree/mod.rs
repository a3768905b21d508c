//! Sparse, lazily materialized level tree.
//!
//! Every level of a compound key selects a child: the root and the inner
//! levels are [`Branch`] nodes holding one child reference per token index,
//! the last level is a [`Leaf`] holding the values. A node only exists once a
//! key routed through it has been inserted.
//!
//! ```text
//! depth 4:  root --parsed[0]--> branch(level 1) --parsed[1]--> branch(level 2)
//!                --parsed[2]--> leaf(level 3), slot parsed[3]
//! ```
//!
//! Nodes of each level live in their own [`NodePool`]; children are
//! [`NodeRef`] indices into the next level's pool and every node remembers its
//! parent and its index in the parent. Traversal walks up through those links,
//! so a [`Cursor`] is just `(leaf, slot)`.
//!
//! Erasing never frees nodes. A node whose subtree has been emptied stays
//! around until [`clear`](CompoundMap::clear) and is skipped by traversal.

mod node;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::alloc::{AllocStrategy, NodeAllocator, NodePool, NodeRef};
use crate::codec::{KeyCodec, ParsedKey, MAX_DEPTH};
use crate::error::{Error, Result};
use crate::map::{CompoundMap, Cursor};

use node::{Branch, Leaf};

/// Nodes created by one insert: `(parent level, parent, index in parent, node)`.
type Created = SmallVec<[(usize, NodeRef, usize, NodeRef); MAX_DEPTH]>;

/// Node and memory counters of a [`LevelTree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Occupied entries.
    pub len: usize,
    /// Materialized inner nodes, the root excluded.
    pub branch_nodes: usize,
    pub leaf_nodes: usize,
    /// Heap bytes held by the node pools and the nodes themselves.
    pub node_bytes: usize,
    /// Heap bytes held by the key codec's dictionaries.
    pub codec_bytes: usize,
}

/// Sparse map from compound keys to values.
///
/// # Example
/// ```
/// use level_tree::{CompoundMap, LevelTree};
///
/// let mut tree = LevelTree::with_depth(3).unwrap();
/// tree.insert(b"eu-west-api", 1).unwrap();
/// tree.insert(b"eu-west-db", 2).unwrap();
///
/// assert_eq!(tree.get(b"eu-west-db"), Some(&2));
/// assert_eq!(tree.len(), 2);
/// ```
pub struct LevelTree<V> {
    codec: KeyCodec,
    root: Branch,
    /// Pools for levels `1..depth - 1`; `branches[i]` holds level `i + 1`.
    branches: Vec<NodePool<Branch>>,
    leaves: NodePool<Leaf<V>>,
    strategy: AllocStrategy,
    len: usize,
}

impl<V: Default> LevelTree<V> {
    /// Tree over `codec`, with pooled node allocation.
    pub fn new(codec: KeyCodec) -> Self {
        Self::with_strategy(codec, AllocStrategy::default())
    }

    pub fn with_strategy(codec: KeyCodec, strategy: AllocStrategy) -> Self {
        let branches = (0..codec.depth() - 2)
            .map(|_| NodePool::new(strategy))
            .collect();
        Self {
            codec,
            root: Branch::new(NodeRef::NULL, 0),
            branches,
            leaves: NodePool::new(strategy),
            strategy,
            len: 0,
        }
    }

    /// Tree over an empty growable vocabulary of `depth` levels.
    pub fn with_depth(depth: usize) -> Result<Self> {
        KeyCodec::growable(depth).map(Self::new)
    }

    /// Tree over a growable vocabulary seeded with one token list per level.
    pub fn seeded<I, L, T>(levels: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        KeyCodec::seeded(levels).map(Self::new)
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn strategy(&self) -> AllocStrategy {
        self.strategy
    }

    /// Memory and node counters.
    pub fn memory_stats(&self) -> TreeStats {
        let pools = self.branches.iter().map(|p| p.memory_usage()).sum::<usize>()
            + self.branches.capacity() * std::mem::size_of::<NodePool<Branch>>()
            + self.leaves.memory_usage();
        TreeStats {
            len: self.len,
            branch_nodes: self.branches.iter().map(|p| p.live()).sum(),
            leaf_nodes: self.leaves.live(),
            node_bytes: pools + self.subtree_heap_bytes(0, NodeRef::NULL),
            codec_bytes: self.codec.memory_usage(),
        }
    }

    #[inline]
    fn leaf_level(&self) -> usize {
        self.codec.depth() - 1
    }

    /// Branch at `level`; level 0 is the root and ignores `node`.
    fn branch(&self, level: usize, node: NodeRef) -> Option<&Branch> {
        if level == 0 {
            Some(&self.root)
        } else {
            self.branches[level - 1].get(node)
        }
    }

    fn branch_mut(&mut self, level: usize, node: NodeRef) -> Option<&mut Branch> {
        if level == 0 {
            Some(&mut self.root)
        } else {
            self.branches[level - 1].get_mut(node)
        }
    }

    /// Leaf and slot addressed by `parsed`, if the path is materialized.
    fn locate(&self, parsed: &[usize]) -> Option<Cursor> {
        let leaf_level = self.leaf_level();
        let mut node = NodeRef::NULL;
        for (level, &idx) in parsed[..leaf_level].iter().enumerate() {
            node = self.branch(level, node)?.child(idx);
            if node.is_null() {
                return None;
            }
        }
        Some(Cursor::new(node, parsed[leaf_level]))
    }

    /// Walk the path of `parsed`, creating missing nodes, and return the leaf.
    ///
    /// Every node created is logged in `created`, in creation order, so a
    /// failed insert can take them out again with [`Self::detach`].
    fn materialize(&mut self, parsed: &[usize], created: &mut Created) -> Result<NodeRef> {
        let leaf_level = self.leaf_level();
        let mut node = NodeRef::NULL;
        for (level, &idx) in parsed[..leaf_level].iter().enumerate() {
            let branch = self.branch_mut(level, node).ok_or(Error::MissingValue)?;
            let existing = branch.child(idx);
            if !existing.is_null() {
                node = existing;
                continue;
            }
            // A created child must always be attachable.
            branch.reserve_child(idx)?;

            let child_level = level + 1;
            let width = self.codec.level_len(child_level);
            let child = if child_level == leaf_level {
                self.leaves.create(Leaf::with_width(node, idx, width)?)?
            } else {
                self.branches[child_level - 1].create(Branch::with_width(node, idx, width)?)?
            };
            self.branch_mut(level, node)
                .ok_or(Error::MissingValue)?
                .set_child(idx, child);
            created.push((level, node, idx, child));
            trace!(level = child_level, index = idx, width, "materialized node");
            node = child;
        }
        Ok(node)
    }

    /// Undo `materialize`: unlink and destroy the logged nodes, newest first.
    fn detach(&mut self, created: &Created) {
        let leaf_level = self.leaf_level();
        for &(level, parent, idx, child) in created.iter().rev() {
            if let Some(branch) = self.branch_mut(level, parent) {
                branch.set_child(idx, NodeRef::NULL);
            }
            if level + 1 == leaf_level {
                self.leaves.destroy(child);
            } else {
                self.branches[level].destroy(child);
            }
        }
        if !created.is_empty() {
            trace!(nodes = created.len(), "detached nodes of failed insert");
        }
    }

    /// Attach `value` under `parsed`, materializing the path as needed.
    fn insert_parsed(
        &mut self,
        parsed: &[usize],
        value: V,
        created: &mut Created,
    ) -> Result<Cursor> {
        let leaf = self.materialize(parsed, created)?;
        let slot = parsed[self.leaf_level()];
        let existed = self
            .leaves
            .get_mut(leaf)
            .ok_or(Error::MissingValue)?
            .set(slot, value)?;
        if !existed {
            self.len += 1;
        }
        Ok(Cursor::new(leaf, slot))
    }

    /// First occupied entry in the subtree of `node`.
    fn first_in(&self, level: usize, node: NodeRef) -> Option<Cursor> {
        if level == self.leaf_level() {
            let leaf = self.leaves.get(node)?;
            return leaf.first_occupied().map(|slot| Cursor::new(node, slot));
        }
        self.first_in_children(level, node, 0)
    }

    /// First occupied entry under the children of `node` from index `from` on.
    fn first_in_children(&self, level: usize, node: NodeRef, from: usize) -> Option<Cursor> {
        self.branch(level, node)?
            .children_from(from)
            .find_map(|(_, child)| self.first_in(level + 1, child))
    }

    fn subtree_heap_bytes(&self, level: usize, node: NodeRef) -> usize {
        if level == self.leaf_level() {
            return self.leaves.get(node).map_or(0, Leaf::heap_bytes);
        }
        self.branch(level, node).map_or(0, |branch| {
            branch.heap_bytes()
                + branch
                    .children_from(0)
                    .map(|(_, child)| self.subtree_heap_bytes(level + 1, child))
                    .sum::<usize>()
        })
    }
}

impl<V: Default + Clone> LevelTree<V> {
    /// Deep copy sharing no allocation with `self`.
    ///
    /// Nodes are rebuilt top-down in fresh allocators, so the copy holds live
    /// nodes only, compactly numbered.
    pub fn try_clone(&self) -> Result<Self> {
        let mut branches: Vec<NodePool<Branch>> = (0..self.branches.len())
            .map(|_| NodePool::new(self.strategy))
            .collect();
        let mut leaves = NodePool::new(self.strategy);
        let children = self.copy_children(
            0,
            &self.root.children,
            NodeRef::NULL,
            &mut branches,
            &mut leaves,
        )?;

        let copy = Self {
            codec: self.codec.clone(),
            root: Branch {
                parent: NodeRef::NULL,
                self_index: 0,
                children,
            },
            branches,
            leaves,
            strategy: self.strategy,
            len: self.len,
        };
        debug!(
            len = copy.len,
            leaves = copy.leaves.live(),
            "copied level tree"
        );
        Ok(copy)
    }

    /// Copy the children of a node at `level` into `branches` (the pools of
    /// `level + 1` onwards) and `leaves`, attached to `parent`.
    fn copy_children(
        &self,
        level: usize,
        children: &[NodeRef],
        parent: NodeRef,
        branches: &mut [NodePool<Branch>],
        leaves: &mut NodePool<Leaf<V>>,
    ) -> Result<Vec<NodeRef>> {
        let mut copied = Vec::new();
        copied
            .try_reserve_exact(children.len())
            .map_err(|_| Error::alloc::<NodeRef>(children.len()))?;

        let child_level = level + 1;
        for (idx, &child) in children.iter().enumerate() {
            if child.is_null() {
                copied.push(NodeRef::NULL);
                continue;
            }
            let id = match branches.split_first_mut() {
                None => {
                    let leaf = self.leaves.get(child).ok_or(Error::MissingValue)?;
                    leaves.create(leaf.try_clone_with_parent(parent)?)?
                }
                Some((pool, rest)) => {
                    let src = self.branches[child_level - 1]
                        .get(child)
                        .ok_or(Error::MissingValue)?;
                    let mut owned = pool.create_owned(Branch::new(parent, idx))?;
                    let grandchildren =
                        self.copy_children(child_level, &src.children, owned.id(), rest, leaves)?;
                    owned.children = grandchildren;
                    owned.release()
                }
            };
            copied.push(id);
        }
        Ok(copied)
    }
}

impl<V: Default> CompoundMap<V> for LevelTree<V> {
    fn insert(&mut self, key: &[u8], value: V) -> Result<Cursor> {
        let marks = self.codec.marks();
        let parsed = self.codec.parse_and_register(key)?;
        let mut created = Created::new();
        let result = self.insert_parsed(&parsed, value, &mut created);
        if result.is_err() {
            self.detach(&created);
            self.codec.rollback(&marks);
        }
        result
    }

    fn find(&self, key: &[u8]) -> Cursor {
        let Ok(parsed) = self.codec.parse(key) else {
            return Cursor::END;
        };
        match self.locate(&parsed) {
            Some(cursor) if self.value(cursor).is_ok() => cursor,
            _ => Cursor::END,
        }
    }

    fn erase(&mut self, key: &[u8]) -> Cursor {
        let Ok(parsed) = self.codec.parse(key) else {
            return Cursor::END;
        };
        match self.locate(&parsed) {
            Some(cursor) => self.erase_at(cursor),
            None => Cursor::END,
        }
    }

    fn erase_at(&mut self, cursor: Cursor) -> Cursor {
        if self.value(cursor).is_err() {
            return Cursor::END;
        }
        let next = self.advance(cursor);
        if let Some(leaf) = self.leaves.get_mut(cursor.node()) {
            leaf.take(cursor.slot());
            self.len -= 1;
        }
        next
    }

    fn begin(&self) -> Cursor {
        self.first_in(0, NodeRef::NULL).unwrap_or(Cursor::END)
    }

    fn advance(&self, cursor: Cursor) -> Cursor {
        if cursor.is_end() {
            return Cursor::END;
        }
        let Some(leaf) = self.leaves.get(cursor.node()) else {
            return Cursor::END;
        };
        if let Some(slot) = leaf.next_occupied(cursor.slot()) {
            return Cursor::new(cursor.node(), slot);
        }

        // Leaf exhausted: climb until some ancestor has a later non-empty child.
        let mut level = self.leaf_level();
        let mut parent = leaf.parent;
        let mut after = leaf.self_index;
        loop {
            level -= 1;
            if let Some(found) = self.first_in_children(level, parent, after + 1) {
                return found;
            }
            if level == 0 {
                return Cursor::END;
            }
            let Some(branch) = self.branch(level, parent) else {
                return Cursor::END;
            };
            after = branch.self_index;
            parent = branch.parent;
        }
    }

    fn value(&self, cursor: Cursor) -> Result<&V> {
        self.leaves
            .get(cursor.node())
            .and_then(|leaf| leaf.get(cursor.slot()))
            .ok_or(Error::MissingValue)
    }

    fn value_mut(&mut self, cursor: Cursor) -> Result<&mut V> {
        self.leaves
            .get_mut(cursor.node())
            .and_then(|leaf| leaf.get_mut(cursor.slot()))
            .ok_or(Error::MissingValue)
    }

    fn key(&self, cursor: Cursor) -> Result<Vec<u8>> {
        let leaf = self
            .leaves
            .get(cursor.node())
            .filter(|leaf| leaf.is_occupied(cursor.slot()))
            .ok_or(Error::MissingValue)?;

        let leaf_level = self.leaf_level();
        let mut parsed = ParsedKey::from_elem(0, self.codec.depth());
        parsed[leaf_level] = cursor.slot();
        parsed[leaf_level - 1] = leaf.self_index;
        let mut node = leaf.parent;
        for level in (1..leaf_level).rev() {
            let branch = self.branches[level - 1]
                .get(node)
                .ok_or(Error::MissingValue)?;
            parsed[level - 1] = branch.self_index;
            node = branch.parent;
        }
        self.codec.assemble(&parsed)
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        debug!(
            len = self.len,
            leaves = self.leaves.live(),
            "clearing level tree"
        );
        self.root = Branch::new(NodeRef::NULL, 0);
        for pool in &mut self.branches {
            pool.clear();
        }
        self.leaves.clear();
        self.len = 0;
    }
}

impl<V: Default + Clone> Clone for LevelTree<V> {
    /// # Panics
    /// Panics if memory for the copy cannot be allocated; use
    /// [`LevelTree::try_clone`] to handle that case.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(copy) => copy,
            Err(e) => panic!("failed to clone level tree: {e}"),
        }
    }
}

impl<V> std::fmt::Debug for LevelTree<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelTree")
            .field("depth", &self.codec.depth())
            .field("len", &self.len)
            .field("strategy", &self.strategy)
            .finish()
    }
}
