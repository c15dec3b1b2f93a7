//! Hash-consing node store and the memoized HashLife recursion.
//!
//! Every node is created through [`NodeStore::leaf`] or [`NodeStore::join`],
//! which return the existing instance when one with the same contents (leaf
//! bits, or child identities) is already present. Because of that, the memo
//! on each node is shared by every occurrence of the same block anywhere in
//! any universe evolved through this store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap;

use crate::rule::Rule;

use super::node::{LEAF_LEVEL, Node, NodeId, NodeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeKey {
    Leaf(u16),
    Branch([NodeId; 4]),
}

/// Point-in-time counters for a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub nodes: usize,
    pub memo_hits: u64,
    pub memo_misses: u64,
    pub collections: u64,
    pub evicted: u64,
}

/// Canonical node table plus memoized evolution for one rule.
pub struct NodeStore {
    rule: Rule,
    max_nodes: Option<usize>,
    table: RwLock<FxHashMap<NodeKey, NodeRef>>,
    /// Partial jumps: node advanced by `2^k` with `k < level - 2`.
    jumps: RwLock<FxHashMap<(NodeId, u32), NodeRef>>,
    /// Canonical empty node per level, index `level - LEAF_LEVEL`. Pinned.
    empties: Mutex<Vec<NodeRef>>,
    next_id: AtomicU64,
    memo_hits: AtomicU64,
    memo_misses: AtomicU64,
    collections: AtomicU64,
    evicted: AtomicU64,
}

impl NodeStore {
    /// Unbounded store.
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            max_nodes: None,
            table: RwLock::new(FxHashMap::default()),
            jumps: RwLock::new(FxHashMap::default()),
            empties: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            memo_hits: AtomicU64::new(0),
            memo_misses: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Store that collects unreachable nodes once it holds more than
    /// `max_nodes`.
    pub fn bounded(rule: Rule, max_nodes: usize) -> Self {
        Self {
            max_nodes: Some(max_nodes),
            ..Self::new(rule)
        }
    }

    /// Process-wide unbounded store for Conway's rule.
    pub fn global() -> Arc<NodeStore> {
        static GLOBAL: OnceLock<Arc<NodeStore>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(NodeStore::new(Rule::conway())))
            .clone()
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    pub fn max_nodes(&self) -> Option<usize> {
        self.max_nodes
    }

    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            nodes: self.len(),
            memo_hits: self.memo_hits.load(Ordering::Relaxed),
            memo_misses: self.memo_misses.load(Ordering::Relaxed),
            collections: self.collections.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Canonical construction
    // =========================================================================

    pub fn leaf(&self, bits: u16) -> NodeRef {
        self.intern(NodeKey::Leaf(bits), |id| Node::leaf(id, bits))
    }

    /// Canonical node with the given quadrants, which must share one level.
    pub fn join(&self, nw: NodeRef, ne: NodeRef, sw: NodeRef, se: NodeRef) -> NodeRef {
        let key = NodeKey::Branch([nw.id(), ne.id(), sw.id(), se.id()]);
        self.intern(key, move |id| Node::branch(id, [nw, ne, sw, se]))
    }

    fn intern(&self, key: NodeKey, build: impl FnOnce(NodeId) -> Node) -> NodeRef {
        if let Some(node) = self.read_table().get(&key) {
            return Arc::clone(node);
        }
        // Re-check under the write lock: two callers racing on the same key
        // must converge on one node.
        let mut table = self.write_table();
        Arc::clone(
            table
                .entry(key)
                .or_insert_with(|| Arc::new(build(self.allocate_id()))),
        )
    }

    fn allocate_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Canonical all-dead node of `level` (>= 2).
    pub fn empty(&self, level: u32) -> NodeRef {
        debug_assert!(level >= LEAF_LEVEL);
        let index = (level - LEAF_LEVEL) as usize;
        let mut empties = self.empties.lock().unwrap_or_else(PoisonError::into_inner);
        if empties.is_empty() {
            empties.push(self.leaf(0));
        }
        while empties.len() <= index {
            let child = Arc::clone(&empties[empties.len() - 1]);
            let next = self.join(
                Arc::clone(&child),
                Arc::clone(&child),
                Arc::clone(&child),
                child,
            );
            empties.push(next);
        }
        Arc::clone(&empties[index])
    }

    // =========================================================================
    // Sub-square helpers
    // =========================================================================

    /// Central square (one level down) of the block formed by four equal-level
    /// nodes laid out as `[a b; c d]`.
    pub(crate) fn center_of(&self, a: &NodeRef, b: &NodeRef, c: &NodeRef, d: &NodeRef) -> NodeRef {
        if a.level() == LEAF_LEVEL {
            let grid = gather8([a.bits(), b.bits(), c.bits(), d.bits()]);
            return self.leaf(center4(grid));
        }
        self.join(
            Arc::clone(a.se()),
            Arc::clone(b.sw()),
            Arc::clone(c.ne()),
            Arc::clone(d.nw()),
        )
    }

    pub(crate) fn center(&self, node: &NodeRef) -> NodeRef {
        self.center_of(node.nw(), node.ne(), node.sw(), node.se())
    }

    fn horizontal(&self, west: &NodeRef, east: &NodeRef) -> NodeRef {
        self.join(
            Arc::clone(west.ne()),
            Arc::clone(east.nw()),
            Arc::clone(west.se()),
            Arc::clone(east.sw()),
        )
    }

    fn vertical(&self, north: &NodeRef, south: &NodeRef) -> NodeRef {
        self.join(
            Arc::clone(north.sw()),
            Arc::clone(north.se()),
            Arc::clone(south.nw()),
            Arc::clone(south.ne()),
        )
    }

    /// The nine overlapping half-size squares of a node of level >= 4, row
    /// major from the north-west.
    fn nine(&self, node: &NodeRef) -> [NodeRef; 9] {
        let [nw, ne, sw, se] = node.quadrants();
        [
            Arc::clone(nw),
            self.horizontal(nw, ne),
            Arc::clone(ne),
            self.vertical(nw, sw),
            self.center(node),
            self.vertical(ne, se),
            Arc::clone(sw),
            self.horizontal(sw, se),
            Arc::clone(se),
        ]
    }

    /// Grow `node` one level, keeping it centred and padding with empty space.
    pub(crate) fn expand(&self, node: &NodeRef) -> NodeRef {
        let e = self.empty(node.level() - 1);
        let [nw, ne, sw, se] = node.quadrants();
        self.join(
            self.join(e.clone(), e.clone(), e.clone(), Arc::clone(nw)),
            self.join(e.clone(), e.clone(), Arc::clone(ne), e.clone()),
            self.join(e.clone(), Arc::clone(sw), e.clone(), e.clone()),
            self.join(Arc::clone(se), e.clone(), e.clone(), e),
        )
    }

    // =========================================================================
    // Evolution
    // =========================================================================

    /// Centre of `node` (level >= 3) advanced by `2^(level - 2)` generations.
    pub fn advance(&self, node: &NodeRef) -> NodeRef {
        debug_assert!(node.level() > LEAF_LEVEL);
        if let Some(result) = node.result.get() {
            self.memo_hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(result);
        }
        self.memo_misses.fetch_add(1, Ordering::Relaxed);

        let result = if node.is_empty() {
            self.empty(node.level() - 1)
        } else if node.level() == LEAF_LEVEL + 1 {
            self.leaf_step(node, 2)
        } else {
            let [r0, r1, r2, r3, r4, r5, r6, r7, r8] =
                self.nine(node).map(|sub| self.advance(&sub));
            let nw = self.join(r0, r1.clone(), r3.clone(), r4.clone());
            let ne = self.join(r1, r2, r4.clone(), r5.clone());
            let sw = self.join(r3, r4.clone(), r6, r7.clone());
            let se = self.join(r4, r5, r7, r8);
            self.join(
                self.advance(&nw),
                self.advance(&ne),
                self.advance(&sw),
                self.advance(&se),
            )
        };

        // Concurrent computations of the same node are idempotent; the first
        // write is the one every caller sees.
        Arc::clone(node.result.get_or_init(|| result))
    }

    /// Centre of `node` advanced by `2^k` generations, `k <= level - 2`.
    pub fn advance_by(&self, node: &NodeRef, k: u32) -> NodeRef {
        let level = node.level();
        debug_assert!(level > LEAF_LEVEL && k <= level - 2);
        if k + 2 >= level {
            return self.advance(node);
        }
        if node.is_empty() {
            return self.empty(level - 1);
        }
        if let Some(hit) = self.read_jumps().get(&(node.id(), k)) {
            self.memo_hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(hit);
        }
        self.memo_misses.fetch_add(1, Ordering::Relaxed);

        let result = if level == LEAF_LEVEL + 1 {
            self.leaf_step(node, 1 << k)
        } else {
            let [r0, r1, r2, r3, r4, r5, r6, r7, r8] =
                self.nine(node).map(|sub| self.advance_by(&sub, k));
            self.join(
                self.center_of(&r0, &r1, &r3, &r4),
                self.center_of(&r1, &r2, &r4, &r5),
                self.center_of(&r3, &r4, &r6, &r7),
                self.center_of(&r4, &r5, &r7, &r8),
            )
        };

        let mut jumps = self.write_jumps();
        Arc::clone(jumps.entry((node.id(), k)).or_insert(result))
    }

    /// Brute-force base case on an 8x8 block: `generations` (1 or 2) steps,
    /// then the exact central 4x4.
    fn leaf_step(&self, node: &NodeRef, generations: u32) -> NodeRef {
        let [nw, ne, sw, se] = node.quadrants();
        let mut grid = gather8([nw.bits(), ne.bits(), sw.bits(), se.bits()]);
        for _ in 0..generations {
            grid = step8(grid, self.rule);
        }
        self.leaf(center4(grid))
    }

    // =========================================================================
    // Bounded mode
    // =========================================================================

    /// Collect if the store is bounded and over its bound. Returns the number
    /// of evicted nodes.
    pub fn maybe_collect(&self) -> usize {
        match self.max_nodes {
            Some(max) if self.len() > max => self.collect(),
            _ => 0,
        }
    }

    /// Evict every node that nothing outside the store references.
    ///
    /// Roots held by callers (and everything reachable from them, including
    /// memoized results) stay alive through their reference counts, as do the
    /// pinned empty nodes. Partial-jump memos are dropped wholesale.
    pub fn collect(&self) -> usize {
        self.write_jumps().clear();
        let mut table = self.write_table();
        let before = table.len();
        loop {
            let len = table.len();
            table.retain(|_, node| Arc::strong_count(node) > 1);
            if table.len() == len {
                break;
            }
        }
        let evicted = before - table.len();
        drop(table);

        self.collections.fetch_add(1, Ordering::Relaxed);
        self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        tracing::debug!(
            before,
            evicted,
            remaining = before - evicted,
            "node store collected"
        );
        evicted
    }

    fn read_table(&self) -> RwLockReadGuard<'_, FxHashMap<NodeKey, NodeRef>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, FxHashMap<NodeKey, NodeRef>> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_jumps(&self) -> RwLockReadGuard<'_, FxHashMap<(NodeId, u32), NodeRef>> {
        self.jumps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jumps(&self) -> RwLockWriteGuard<'_, FxHashMap<(NodeId, u32), NodeRef>> {
        self.jumps.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("rule", &self.rule)
            .field("max_nodes", &self.max_nodes)
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Bit-level base case
// =============================================================================

/// Lay out four 4x4 leaves `[nw, ne, sw, se]` as an 8x8 grid, bit `y * 8 + x`.
fn gather8(leaves: [u16; 4]) -> u64 {
    const OFFSETS: [(u32, u32); 4] = [(0, 0), (4, 0), (0, 4), (4, 4)];
    let mut grid = 0u64;
    for (bits, (ox, oy)) in leaves.into_iter().zip(OFFSETS) {
        for y in 0..4 {
            let row = u64::from((bits >> (y * 4)) & 0xF);
            grid |= row << ((oy + y) * 8 + ox);
        }
    }
    grid
}

/// Central 4x4 of an 8x8 grid.
fn center4(grid: u64) -> u16 {
    let mut out = 0u16;
    for y in 0..4 {
        let row = ((grid >> ((y + 2) * 8 + 2)) & 0xF) as u16;
        out |= row << (y * 4);
    }
    out
}

/// One generation on an 8x8 grid with everything outside treated as dead.
/// Cells on the border row/column are unreliable; callers only keep the
/// interior.
fn step8(grid: u64, rule: Rule) -> u64 {
    let alive = |x: i32, y: i32| -> u32 {
        if (0..8).contains(&x) && (0..8).contains(&y) {
            ((grid >> (y * 8 + x)) & 1) as u32
        } else {
            0
        }
    };
    let mut next = 0u64;
    for y in 0..8i32 {
        for x in 0..8i32 {
            let mut neighbours = 0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx != 0 || dy != 0 {
                        neighbours += alive(x + dx, y + dy);
                    }
                }
            }
            if rule.next(alive(x, y) == 1, neighbours) {
                next |= 1 << (y * 8 + x);
            }
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_quadruples_share_identity() {
        let store = NodeStore::new(Rule::conway());
        let a = store.leaf(0b1010);
        let b = store.leaf(0b0110);
        let first = store.join(a.clone(), b.clone(), b.clone(), a.clone());
        let second = store.join(a.clone(), b.clone(), b.clone(), a.clone());
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&store.leaf(0b1010), &a));

        let other = store.join(b.clone(), a.clone(), b, a);
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn empty_nodes_are_canonical() {
        let store = NodeStore::new(Rule::conway());
        let e5 = store.empty(5);
        assert_eq!(e5.level(), 5);
        assert!(e5.is_empty());
        let e4 = store.empty(4);
        let rebuilt = store.join(e4.clone(), e4.clone(), e4.clone(), e4);
        assert!(Arc::ptr_eq(&e5, &rebuilt));
    }

    #[test]
    fn gather_and_center_agree_on_layout() {
        // A single cell at (2, 2) of the nw leaf lands at (0, 0) of the centre.
        let grid = gather8([1 << (2 * 4 + 2), 0, 0, 0]);
        assert_eq!(grid, 1 << (2 * 8 + 2));
        assert_eq!(center4(grid), 1);
        // (1, 0) of the se leaf is (5, 4) in the grid and (3, 2) in the centre.
        let grid = gather8([0, 0, 0, 1 << 1]);
        assert_eq!(center4(grid), 1 << (2 * 4 + 3));
    }

    #[test]
    fn blinker_in_base_case() {
        // Horizontal blinker across the middle of an 8x8 block.
        let store = NodeStore::new(Rule::conway());
        let row = 0b0111_0000u64 >> 1; // cells x = 3, 4, 5
        let grid = row << (4 * 8);
        let split = |g: u64, ox: u32, oy: u32| -> u16 {
            let mut bits = 0u16;
            for y in 0..4 {
                bits |= (((g >> ((oy + y) * 8 + ox)) & 0xF) as u16) << (y * 4);
            }
            bits
        };
        let node = store.join(
            store.leaf(split(grid, 0, 0)),
            store.leaf(split(grid, 4, 0)),
            store.leaf(split(grid, 0, 4)),
            store.leaf(split(grid, 4, 4)),
        );
        assert_eq!(gather8(node.quadrants().clone().map(|n| n.bits())), grid);

        // Period 2: after two generations the centre is unchanged.
        let two = store.advance(&node);
        assert_eq!(two.bits(), center4(grid));
        // After one it is vertical through x = 4, y = 3..=5.
        let one = store.advance_by(&node, 0);
        let vertical = (1u64 << (3 * 8 + 4)) | (1 << (4 * 8 + 4)) | (1 << (5 * 8 + 4));
        assert_eq!(one.bits(), center4(vertical));
    }

    #[test]
    fn memo_hits_are_counted() {
        let store = NodeStore::new(Rule::conway());
        let block = store.leaf(0b0110_0110 << 4);
        let e = store.empty(2);
        assert!(block.is_leaf());
        let node = store.join(e.clone(), e.clone(), e, block);
        assert!(!node.is_leaf());
        assert!(!node.has_result());
        let first = store.advance(&node);
        assert!(node.has_result());
        let misses = store.stats().memo_misses;
        let second = store.advance(&node);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.stats().memo_misses, misses);
        assert!(store.stats().memo_hits >= 1);
    }

    #[test]
    fn collect_keeps_held_roots_and_evicts_garbage() {
        let store = NodeStore::bounded(Rule::conway(), 0);
        let kept = store.join(store.leaf(1), store.leaf(2), store.leaf(3), store.leaf(4));
        {
            let _garbage = store.join(store.leaf(5), store.leaf(6), store.leaf(7), store.leaf(8));
        }
        let evicted = store.maybe_collect();
        assert_eq!(evicted, 5);

        let again = store.join(store.leaf(1), store.leaf(2), store.leaf(3), store.leaf(4));
        assert!(Arc::ptr_eq(&kept, &again));
        assert_eq!(store.stats().collections, 1);
    }
}
