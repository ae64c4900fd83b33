use ahash::RandomState;
use alloc::{boxed::Box, vec::Vec};
use ordered_float::{FloatCore, OrderedFloat};
use rand::{RngCore, SeedableRng, rngs::SmallRng};

use core::cmp::Ordering;

/// A node in the treap arena.
///
/// Duplicate keys collapse into one node with a multiplicity counter;
/// `size` caches the live key count of the whole subtree (multiplicities
/// included), which is what makes rank queries logarithmic.
#[derive(Debug, Clone)]
struct Node<T> {
    /// The stored key, NaN-total-ordered
    key: OrderedFloat<T>,
    /// Heap priority drawn at insertion
    priority: u64,
    /// Number of live duplicates collapsed into this node
    count: u32,
    /// Arena index of the left child (nil if none)
    left: usize,
    /// Arena index of the right child (nil if none)
    right: usize,
    /// Live keys in this subtree: count + left size + right size
    size: usize,
}

/// An order-statistic tree: a randomized treap with subtree-size tracking.
///
/// Supports insert, remove-by-key, count-less-than queries and rank
/// selection, all in expected O(log n). Balance comes from random node
/// priorities (heap-ordered) layered over the BST key order, so there is no
/// rebalancing bookkeeping; the expected-case bound is the contract.
///
/// Nodes live in a pre-allocated arena recycled through an index free list,
/// so a tree sized for a sliding window never allocates per step.
#[derive(Debug)]
pub struct Treap<T> {
    /// Pre-allocated node storage; slot liveness is tracked by the free list
    nodes: Box<[Node<T>]>,
    /// Stack of recyclable arena indices
    free_list: Box<[usize]>,
    /// Next free slot in `free_list` (stack top)
    free_top: usize,
    /// Arena index of the root node, `nil` when empty
    root: usize,
    /// Sentinel index meaning "no node" (one past the arena)
    nil: usize,
    /// Live keys including duplicates
    len: usize,
    /// Priority source, seeded per instance
    rng: SmallRng,
}

impl<T: FloatCore + Copy> Treap<T> {
    /// Creates a tree holding at most `capacity` distinct keys.
    ///
    /// The capacity is clamped to at least 1.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of distinct keys
    ///
    /// # Returns
    ///
    /// * `Self` - The order-statistic tree
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let blank = Node {
            key: OrderedFloat(T::zero()),
            priority: 0,
            count: 0,
            left: capacity,
            right: capacity,
            size: 0,
        };
        let seed = RandomState::new().hash_one(capacity as u64);
        Self {
            nodes: vec![blank; capacity].into_boxed_slice(),
            free_list: (0..capacity).collect::<Vec<_>>().into_boxed_slice(),
            free_top: capacity,
            root: capacity,
            nil: capacity,
            len: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Returns the number of live keys, duplicates included
    ///
    /// # Returns
    ///
    /// * `usize` - The number of live keys
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the tree holds no keys
    ///
    /// # Returns
    ///
    /// * `bool` - True if the tree holds no keys
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the maximum number of distinct keys the arena can hold
    ///
    /// # Returns
    ///
    /// * `usize` - The arena capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.free_list.len()
    }

    /// Inserts a key, collapsing duplicates into a multiplicity bump.
    ///
    /// # Arguments
    ///
    /// * `value` - The key to insert
    ///
    /// # Returns
    ///
    /// * `bool` - False only when the key is new and the arena is out of slots
    pub fn insert(&mut self, value: T) -> bool {
        let key = OrderedFloat(value);
        let root = self.root;
        match self.insert_at(root, key) {
            Some(new_root) => {
                self.root = new_root;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    /// Removes one instance of a key.
    ///
    /// # Arguments
    ///
    /// * `value` - The key to remove
    ///
    /// # Returns
    ///
    /// * `bool` - False if the key is not present
    pub fn remove(&mut self, value: T) -> bool {
        let key = OrderedFloat(value);
        if !self.contains(key) {
            return false;
        }
        let root = self.root;
        self.root = self.remove_at(root, key);
        self.len -= 1;
        true
    }

    /// Counts live keys strictly less than `value`.
    ///
    /// # Arguments
    ///
    /// * `value` - The probe key
    ///
    /// # Returns
    ///
    /// * `usize` - The number of live keys strictly less than the probe
    pub fn count_less_than(&self, value: T) -> usize {
        let key = OrderedFloat(value);
        let mut acc = 0;
        let mut cur = self.root;
        while cur != self.nil {
            let node = &self.nodes[cur];
            match key.cmp(&node.key) {
                Ordering::Greater => {
                    acc += self.size_of(node.left) + node.count as usize;
                    cur = node.right;
                }
                Ordering::Equal => {
                    acc += self.size_of(node.left);
                    break;
                }
                Ordering::Less => cur = node.left,
            }
        }
        acc
    }

    /// Counts live keys less than or equal to `value`.
    ///
    /// # Arguments
    ///
    /// * `value` - The probe key
    ///
    /// # Returns
    ///
    /// * `usize` - The number of live keys less than or equal to the probe
    pub fn count_less_or_equal(&self, value: T) -> usize {
        let key = OrderedFloat(value);
        let mut acc = 0;
        let mut cur = self.root;
        while cur != self.nil {
            let node = &self.nodes[cur];
            match key.cmp(&node.key) {
                Ordering::Greater => {
                    acc += self.size_of(node.left) + node.count as usize;
                    cur = node.right;
                }
                Ordering::Equal => {
                    acc += self.size_of(node.left) + node.count as usize;
                    break;
                }
                Ordering::Less => cur = node.left,
            }
        }
        acc
    }

    /// Returns the `rank`-th smallest live key, 1-indexed.
    ///
    /// Out-of-range ranks clamp to `[1, len]`.
    ///
    /// # Arguments
    ///
    /// * `rank` - The 1-indexed rank to select
    ///
    /// # Returns
    ///
    /// * `Option<T>` - The selected key, or `None` when the tree is empty
    pub fn select_by_rank(&self, rank: usize) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let mut remaining = rank.clamp(1, self.len);
        let mut cur = self.root;
        while cur != self.nil {
            let node = &self.nodes[cur];
            let left = self.size_of(node.left);
            if remaining <= left {
                cur = node.left;
            } else if remaining <= left + node.count as usize {
                return Some(node.key.into_inner());
            } else {
                remaining -= left + node.count as usize;
                cur = node.right;
            }
        }
        None
    }

    /// Removes every key, recycling the whole arena.
    pub fn clear(&mut self) {
        self.root = self.nil;
        self.len = 0;
        for (idx, slot) in self.free_list.iter_mut().enumerate() {
            *slot = idx;
        }
        self.free_top = self.capacity();
    }

    #[inline]
    fn size_of(&self, idx: usize) -> usize {
        if idx == self.nil { 0 } else { self.nodes[idx].size }
    }

    #[inline]
    fn refresh_size(&mut self, idx: usize) {
        let left = self.size_of(self.nodes[idx].left);
        let right = self.size_of(self.nodes[idx].right);
        self.nodes[idx].size = self.nodes[idx].count as usize + left + right;
    }

    #[inline]
    fn allocate(&mut self) -> Option<usize> {
        if self.free_top == 0 {
            None
        } else {
            self.free_top -= 1;
            Some(self.free_list[self.free_top])
        }
    }

    #[inline]
    fn recycle(&mut self, idx: usize) {
        debug_assert!(idx < self.capacity());
        self.free_list[self.free_top] = idx;
        self.free_top += 1;
    }

    fn contains(&self, key: OrderedFloat<T>) -> bool {
        let mut cur = self.root;
        while cur != self.nil {
            let node = &self.nodes[cur];
            match key.cmp(&node.key) {
                Ordering::Equal => return true,
                Ordering::Less => cur = node.left,
                Ordering::Greater => cur = node.right,
            }
        }
        false
    }

    // Rotations hand back the new subtree root with sizes already refreshed.
    fn rotate_right(&mut self, node: usize) -> usize {
        let pivot = self.nodes[node].left;
        self.nodes[node].left = self.nodes[pivot].right;
        self.nodes[pivot].right = node;
        self.refresh_size(node);
        self.refresh_size(pivot);
        pivot
    }

    fn rotate_left(&mut self, node: usize) -> usize {
        let pivot = self.nodes[node].right;
        self.nodes[node].right = self.nodes[pivot].left;
        self.nodes[pivot].left = node;
        self.refresh_size(node);
        self.refresh_size(pivot);
        pivot
    }

    /// Inserts `key` into the subtree at `node`, returning its new root, or
    /// `None` when a fresh node is needed and the arena is exhausted.
    fn insert_at(&mut self, node: usize, key: OrderedFloat<T>) -> Option<usize> {
        if node == self.nil {
            let idx = self.allocate()?;
            self.nodes[idx] = Node {
                key,
                priority: self.rng.next_u64(),
                count: 1,
                left: self.nil,
                right: self.nil,
                size: 1,
            };
            return Some(idx);
        }

        let node = match key.cmp(&self.nodes[node].key) {
            Ordering::Equal => {
                self.nodes[node].count += 1;
                node
            }
            Ordering::Less => {
                let left = self.insert_at(self.nodes[node].left, key)?;
                self.nodes[node].left = left;
                if self.nodes[left].priority > self.nodes[node].priority {
                    self.rotate_right(node)
                } else {
                    node
                }
            }
            Ordering::Greater => {
                let right = self.insert_at(self.nodes[node].right, key)?;
                self.nodes[node].right = right;
                if self.nodes[right].priority > self.nodes[node].priority {
                    self.rotate_left(node)
                } else {
                    node
                }
            }
        };
        self.refresh_size(node);
        Some(node)
    }

    /// Removes one instance of `key` from the subtree at `node`.
    ///
    /// The caller has already established that the key is present. A node
    /// whose multiplicity drops to zero is spliced out directly when it has
    /// at most one child; otherwise the higher-priority child rotates up and
    /// removal recurses into the shrunken subtree.
    fn remove_at(&mut self, node: usize, key: OrderedFloat<T>) -> usize {
        let updated = match key.cmp(&self.nodes[node].key) {
            Ordering::Less => {
                let left = self.remove_at(self.nodes[node].left, key);
                self.nodes[node].left = left;
                node
            }
            Ordering::Greater => {
                let right = self.remove_at(self.nodes[node].right, key);
                self.nodes[node].right = right;
                node
            }
            Ordering::Equal => {
                if self.nodes[node].count > 1 {
                    self.nodes[node].count -= 1;
                    node
                } else {
                    let (left, right) = (self.nodes[node].left, self.nodes[node].right);
                    match (left == self.nil, right == self.nil) {
                        (true, true) => {
                            self.recycle(node);
                            return self.nil;
                        }
                        (false, true) => {
                            self.recycle(node);
                            return left;
                        }
                        (true, false) => {
                            self.recycle(node);
                            return right;
                        }
                        (false, false) => {
                            if self.nodes[left].priority > self.nodes[right].priority {
                                let top = self.rotate_right(node);
                                let right = self.remove_at(self.nodes[top].right, key);
                                self.nodes[top].right = right;
                                top
                            } else {
                                let top = self.rotate_left(node);
                                let left = self.remove_at(self.nodes[top].left, key);
                                self.nodes[top].left = left;
                                top
                            }
                        }
                    }
                }
            }
        };
        self.refresh_size(updated);
        updated
    }
}
