//! A concurrent binary search tree that exercises a reclamation engine.
//!
//! The tree is leaf-oriented: routers only direct the search, leaves
//! carry the keys. Inserting replaces a leaf with a fresh router over the
//! old and the new leaf; removing splices the leaf's sibling into the
//! grandparent and retires the unlinked router and leaf through the
//! engine. Nothing is ever reused in place.
//!
//! Removal freezes the doomed router first by setting a mark bit on both
//! of its child pointers. A frozen slot can no longer be CAS-ed by
//! inserts or by other removals, so by the time the splice lands, the
//! router and its leaf are unreachable from every live pointer and are
//! safe to hand to the engine. Competing operations that lose a race
//! simply re-run their search.
//!
//! The client is generic over the engine handle: anything implementing
//! [`Smr`] frames each operation with a pin and supplies allocation and
//! retirement.

#![warn(missing_docs, rust_2018_idioms)]
#![allow(dangerous_implicit_autorefs)]

use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use smr_core::{Smr, SmrGuard, Tracked};

/// The mark bit that freezes a child slot. `Tracked` allocations are at
/// least word-aligned, so the low pointer bit is free.
const MARK: usize = 1;

type NodePtr<K> = *mut Tracked<Node<K>>;

#[inline]
fn is_marked<K>(ptr: NodePtr<K>) -> bool {
    ptr as usize & MARK != 0
}

#[inline]
fn unmarked<K>(ptr: NodePtr<K>) -> NodePtr<K> {
    (ptr as usize & !MARK) as NodePtr<K>
}

#[inline]
fn marked<K>(ptr: NodePtr<K>) -> NodePtr<K> {
    (ptr as usize | MARK) as NodePtr<K>
}

/// A tree node. Routers carry both children; leaves carry none.
struct Node<K> {
    key: K,
    left: AtomicPtr<Tracked<Node<K>>>,
    right: AtomicPtr<Tracked<Node<K>>>,
}

impl<K> Node<K> {
    fn leaf(key: K) -> Self {
        Node {
            key,
            left: AtomicPtr::new(ptr::null_mut()),
            right: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn router(key: K, left: NodePtr<K>, right: NodePtr<K>) -> Self {
        Node {
            key,
            left: AtomicPtr::new(left),
            right: AtomicPtr::new(right),
        }
    }
}

/// Whether `node` is a leaf. Leafness is fixed at creation: a router is
/// born with both children and a leaf with none.
#[inline]
unsafe fn is_leaf<K>(node: NodePtr<K>) -> bool {
    (*node).left.load(Ordering::Relaxed).is_null()
}

/// A concurrent set of keys backed by a leaf-oriented BST.
pub struct Tree<K> {
    root: AtomicPtr<Tracked<Node<K>>>,
}

// Keys are read concurrently and dropped on whichever thread frees the
// node.
unsafe impl<K: Send + Sync> Send for Tree<K> {}
unsafe impl<K: Send + Sync> Sync for Tree<K> {}

impl<K> Tree<K>
where
    K: Ord + Clone + Send + Sync + 'static,
{
    /// Creates an empty tree.
    pub fn new() -> Self {
        Tree {
            root: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Inserts `key`; returns `false` if it was already present.
    pub fn insert<H: Smr>(&self, key: K, smr: &H) -> bool {
        let guard = smr.pin();
        loop {
            let root = self.root.load(Ordering::Acquire);
            if root.is_null() {
                let leaf = guard.alloc(Node::leaf(key.clone()));
                if self
                    .root
                    .compare_exchange(ptr::null_mut(), leaf, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    return true;
                }
                // Lost the race; the node was never shared.
                unsafe { drop(Box::from_raw(leaf)) };
                continue;
            }

            unsafe {
                // Walk down to a leaf, remembering the slot we came through.
                let mut link = &self.root;
                let mut raw = root;
                let mut node = unmarked(raw);
                while !is_leaf(node) {
                    link = if key < (*node).key {
                        &(*node).left
                    } else {
                        &(*node).right
                    };
                    raw = link.load(Ordering::Acquire);
                    node = unmarked(raw);
                }
                if (*node).key == key {
                    return false;
                }
                if is_marked(raw) {
                    // The slot is frozen by an in-flight removal.
                    continue;
                }

                let new_leaf = guard.alloc(Node::leaf(key.clone()));
                let (left, right, router_key) = if key < (*node).key {
                    (new_leaf, node, (*node).key.clone())
                } else {
                    (node, new_leaf, key.clone())
                };
                let router = guard.alloc(Node::router(router_key, left, right));
                if link
                    .compare_exchange(raw, router, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    return true;
                }
                drop(Box::from_raw(router));
                drop(Box::from_raw(new_leaf));
            }
        }
    }

    /// Removes `key`; returns `false` if it was not present.
    pub fn remove<H: Smr>(&self, key: &K, smr: &H) -> bool {
        let guard = smr.pin();
        loop {
            let root = self.root.load(Ordering::Acquire);
            if root.is_null() {
                return false;
            }

            unsafe {
                if is_leaf(root) {
                    if (*root).key != *key {
                        return false;
                    }
                    if self
                        .root
                        .compare_exchange(
                            root,
                            ptr::null_mut(),
                            Ordering::AcqRel,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        guard.retire(root);
                        return true;
                    }
                    continue;
                }

                // grandlink holds `parent`, whose `link` slot holds the leaf.
                let mut grandlink = &self.root;
                let mut parent = root;
                let mut link = if *key < (*parent).key {
                    &(*parent).left
                } else {
                    &(*parent).right
                };
                let mut raw = link.load(Ordering::Acquire);
                let mut node = unmarked(raw);
                while !is_leaf(node) {
                    grandlink = link;
                    parent = node;
                    link = if *key < (*parent).key {
                        &(*parent).left
                    } else {
                        &(*parent).right
                    };
                    raw = link.load(Ordering::Acquire);
                    node = unmarked(raw);
                }
                if (*node).key != *key {
                    return false;
                }

                // Freeze the leaf's edge. A slot already frozen for the
                // same leaf belongs to a competitor; only the splice below
                // decides who retires.
                if link
                    .compare_exchange(node, marked(node), Ordering::AcqRel, Ordering::Relaxed)
                    .is_err()
                    && link.load(Ordering::Acquire) != marked(node)
                {
                    continue;
                }

                // Freeze the sibling edge. Inserts may still be landing in
                // it, so chase the current value until a mark sticks.
                let sibling_slot = if ptr::eq(link, &(*parent).left) {
                    &(*parent).right
                } else {
                    &(*parent).left
                };
                let sibling = loop {
                    let s = sibling_slot.load(Ordering::Acquire);
                    if is_marked(s) {
                        break unmarked(s);
                    }
                    if sibling_slot
                        .compare_exchange(s, marked(s), Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                    {
                        break s;
                    }
                };

                // Splice the sibling up. Both of the router's slots are
                // frozen, so a successful swap makes the router and the
                // leaf unreachable and ours to retire.
                if grandlink
                    .compare_exchange(parent, sibling, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    guard.retire(parent);
                    guard.retire(node);
                    return true;
                }
            }
        }
    }

    /// Whether `key` is present.
    pub fn contains<H: Smr>(&self, key: &K, smr: &H) -> bool {
        let _guard = smr.pin();
        let mut node = unmarked(self.root.load(Ordering::Acquire));
        if node.is_null() {
            return false;
        }
        unsafe {
            while !is_leaf(node) {
                let next = if *key < (*node).key {
                    (*node).left.load(Ordering::Acquire)
                } else {
                    (*node).right.load(Ordering::Acquire)
                };
                node = unmarked(next);
            }
            (*node).key == *key
        }
    }
}

impl<K> Default for Tree<K>
where
    K: Ord + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for Tree<K> {
    fn drop(&mut self) {
        let mut stack = vec![unmarked(*self.root.get_mut())];
        while let Some(node) = stack.pop() {
            if node.is_null() {
                continue;
            }
            let node = unsafe { Box::from_raw(node) };
            stack.push(unmarked(node.left.load(Ordering::Relaxed)));
            stack.push(unmarked(node.right.load(Ordering::Relaxed)));
        }
    }
}

impl<K> fmt::Debug for Tree<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Tree { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::Tree;

    #[test]
    fn round_trip_on_ibr() {
        let collector = smr_ibr::Collector::new();
        let handle = collector.register();
        let tree = Tree::new();

        assert!(tree.insert(3u64, &handle));
        assert!(tree.insert(1, &handle));
        assert!(tree.insert(7, &handle));
        assert!(!tree.insert(3, &handle));

        assert!(tree.contains(&3, &handle));
        assert!(tree.contains(&1, &handle));
        assert!(!tree.contains(&5, &handle));

        assert!(tree.remove(&3, &handle));
        assert!(!tree.remove(&3, &handle));
        assert!(!tree.contains(&3, &handle));
        assert!(tree.contains(&7, &handle));
    }

    #[test]
    fn round_trip_on_hyaline() {
        let collector = smr_hyaline::Collector::new();
        let handle = collector.register();
        let tree = Tree::new();

        assert!(tree.insert(3u64, &handle));
        assert!(tree.insert(1, &handle));
        assert!(!tree.insert(1, &handle));

        assert!(tree.remove(&1, &handle));
        assert!(!tree.contains(&1, &handle));
        assert!(tree.contains(&3, &handle));
        assert!(tree.remove(&3, &handle));
        assert!(!tree.remove(&3, &handle));
    }

    #[test]
    fn fill_then_empty_reclaims_everything() {
        const KEYS: u64 = 1_000;

        let collector = smr_ibr::Collector::new();
        let handle = collector.register();
        let tree = Tree::new();

        for key in 0..KEYS {
            assert!(tree.insert(key, &handle));
        }
        for key in 0..KEYS {
            assert!(tree.remove(&key, &handle));
        }
        for key in 0..KEYS {
            assert!(!tree.contains(&key, &handle));
        }

        drop(handle);
        unsafe { collector.drain_all() };
        assert_eq!(collector.leaked(), 0);
    }

    #[test]
    fn every_key_allocation_is_returned() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static CREATED: AtomicUsize = AtomicUsize::new(0);
        static DROPPED: AtomicUsize = AtomicUsize::new(0);

        #[derive(PartialEq, Eq, PartialOrd, Ord)]
        struct Key(u64);

        impl Key {
            fn new(v: u64) -> Self {
                CREATED.fetch_add(1, Ordering::Relaxed);
                Key(v)
            }
        }

        impl Clone for Key {
            fn clone(&self) -> Self {
                Key::new(self.0)
            }
        }

        impl Drop for Key {
            fn drop(&mut self) {
                DROPPED.fetch_add(1, Ordering::Relaxed);
            }
        }

        let collector = smr_hyaline::Collector::new();
        {
            let handle = collector.register();
            let tree = Tree::new();
            for v in 0..100 {
                tree.insert(Key::new(v), &handle);
            }
            for v in (0..100).step_by(2) {
                tree.remove(&Key::new(v), &handle);
            }
        }
        unsafe { collector.drain_all() };
        assert_eq!(collector.leaked(), 0);
        assert_eq!(
            CREATED.load(Ordering::Relaxed),
            DROPPED.load(Ordering::Relaxed)
        );
    }

    #[test]
    fn concurrent_mixed_workload() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        const THREADS: usize = 4;
        const OPS: usize = 20_000;

        let collector = smr_ibr::Collector::new();
        let tree = Tree::new();

        crossbeam_utils::thread::scope(|scope| {
            for t in 0..THREADS {
                let collector = &collector;
                let tree = &tree;
                scope.spawn(move |_| {
                    let handle = collector.register();
                    let mut rng = SmallRng::seed_from_u64(t as u64);
                    for _ in 0..OPS {
                        let key = rng.gen_range(0..100u64);
                        if rng.gen::<bool>() {
                            tree.insert(key, &handle);
                        } else {
                            tree.remove(&key, &handle);
                        }
                    }
                });
            }
        })
        .unwrap();

        unsafe { collector.drain_all() };
        assert_eq!(collector.leaked(), 0);
    }

    #[test]
    fn concurrent_mixed_workload_on_hyaline() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        const THREADS: usize = 4;
        const OPS: usize = 20_000;

        let collector = smr_hyaline::Collector::with_config(smr_hyaline::Config {
            slots: 4,
            batch_size: 4,
        });
        let tree = Tree::new();

        crossbeam_utils::thread::scope(|scope| {
            for t in 0..THREADS {
                let collector = &collector;
                let tree = &tree;
                scope.spawn(move |_| {
                    let handle = collector.register();
                    let mut rng = SmallRng::seed_from_u64(t as u64);
                    for _ in 0..OPS {
                        let key = rng.gen_range(0..100u64);
                        if rng.gen::<bool>() {
                            tree.insert(key, &handle);
                        } else {
                            tree.remove(&key, &handle);
                        }
                    }
                });
            }
        })
        .unwrap();

        unsafe { collector.drain_all() };
        assert_eq!(collector.leaked(), 0);
        assert!(collector.stuck_slots().is_empty());
    }
}
