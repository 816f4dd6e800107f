/*!
 * Mergeable Context Mutex
 *
 * Union-find forest of locks. Every node points at a root; locking any node
 * locks its root, so merged nodes share one critical section. Merging two
 * components re-parents every leaf of the losing root straight onto the
 * winner, keeping the forest at most one level deep.
 *
 * # Lifetime
 *
 * Nodes are reference counted. A leaf holds one reference on its current
 * root and one on every root it had before (`old_roots`): a thread that read
 * a stale root id can still lock and inspect that node safely, then move on
 * to the real root.
 *
 * # Invariants
 *
 * - `lock`/`unlock` act on the current root and re-resolve after acquiring
 * - a root never changes while the calling thread holds it
 * - forest bookkeeping (`leaves`, `old_roots`, `rank`) is only mutated by
 *   the thread holding the component's root lock
 */

use super::guard::{ContextMutexGuard, ScopedContextMutexLock};
use super::slab::NodeSlab;
use super::stats::{AtomicContextMutexStats, ContextMutexStats};
use crate::core::sync::config::{LockMode, SyncConfig};
use crate::core::sync::fast_mutex::RawFutexMutex;
use crate::core::sync::owner::LockOwner;
use crate::core::types::ContextMutexId;
use ahash::AHashSet;
use lock_api::RawMutex;
use parking_lot::Mutex;
use rand::Rng;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

// ============================================================================
// Node
// ============================================================================

#[derive(Default)]
struct Links {
    rank: u32,
    leaves: AHashSet<ContextMutexId>,
    old_roots: Vec<ContextMutexId>,
}

pub(super) struct Node<R> {
    id: ContextMutexId,
    raw: R,
    root: AtomicU32,
    priority: i32,
    ref_count: AtomicU32,
    owner: LockOwner,
    // Guarded by the component's root lock; the inner mutex is never contended
    links: Mutex<Links>,
}

impl<R: RawMutex> Node<R> {
    fn new(id: ContextMutexId, priority: i32) -> Self {
        Self {
            id,
            raw: R::INIT,
            root: AtomicU32::new(id.0),
            priority,
            ref_count: AtomicU32::new(1),
            owner: LockOwner::new(),
            links: Mutex::new(Links::default()),
        }
    }

    #[inline]
    fn root(&self) -> ContextMutexId {
        ContextMutexId(self.root.load(Ordering::Acquire))
    }

    #[inline]
    fn is_root(&self) -> bool {
        self.root() == self.id
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Owner of a forest of mergeable mutexes
///
/// The raw lock type is chosen per manager; every node in the forest uses
/// the same one.
///
/// # Example
///
/// ```
/// use gpu_runtime_sync::context::ContextMutexManager;
/// use gpu_runtime_sync::core::sync::SyncConfig;
///
/// let manager: ContextMutexManager = ContextMutexManager::new(&SyncConfig::default());
/// let a = manager.create();
/// let b = manager.create();
///
/// manager.lock(a);
/// manager.merge(a, b);
/// manager.unlock(a);
/// assert_eq!(manager.root_of(a), manager.root_of(b));
///
/// manager.release(a);
/// manager.release(b);
/// assert_eq!(manager.stats().live, 0);
/// ```
pub struct ContextMutexManager<R: RawMutex = RawFutexMutex> {
    nodes: NodeSlab<Node<R>>,
    lock_mode: LockMode,
    backoff_micros: (u64, u64),
    stats: AtomicContextMutexStats,
}

impl<R: RawMutex + Send + Sync> ContextMutexManager<R> {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            nodes: NodeSlab::new(),
            lock_mode: config.lock_mode,
            backoff_micros: config.merge_backoff_micros(),
            stats: AtomicContextMutexStats::default(),
        }
    }

    #[inline]
    pub fn allow_recursion(&self) -> bool {
        self.lock_mode.is_recursive()
    }

    /// New unmerged mutex with priority 0 and one reference
    pub fn create(&self) -> ContextMutexId {
        self.create_with_priority(0)
    }

    /// New unmerged mutex; on merge the higher priority root always wins
    pub fn create_with_priority(&self, priority: i32) -> ContextMutexId {
        let (id, _) = self.nodes.insert_with(|id| Node::new(id, priority));
        self.stats.inc_created();
        trace!(mutex = %id, priority, "created context mutex");
        id
    }

    pub fn add_ref(&self, id: ContextMutexId) {
        let prev = self.nodes.get(id).ref_count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "add_ref on released context mutex {}", id);
    }

    /// Drop a reference, destroying the node when it was the last one
    pub fn release(&self, id: ContextMutexId) {
        self.release_impl(id, false);
    }

    /// Drop a reference and unlock; the caller holds the lock
    pub fn release_and_unlock(&self, id: ContextMutexId) {
        self.release_impl(id, true);
    }

    pub fn lock(&self, id: ContextMutexId) {
        let _ = self.lock_root(id);
    }

    pub fn try_lock(&self, id: ContextMutexId) -> bool {
        self.try_lock_root(id).is_some()
    }

    pub fn unlock(&self, id: ContextMutexId) {
        let root = self.nodes.get(self.nodes.get(id).root());
        // Held by us, so the root read above is stable
        debug_assert!(root.is_root());
        if root.owner.leave() {
            // SAFETY: the owner bookkeeping confirms this thread holds the raw lock
            unsafe { root.raw.unlock() };
        }
    }

    /// Current root of `id`
    ///
    /// Unsynchronized unless the caller holds the lock.
    pub fn root_of(&self, id: ContextMutexId) -> ContextMutexId {
        self.nodes.get(id).root()
    }

    pub fn ref_count(&self, id: ContextMutexId) -> u32 {
        self.nodes.get(id).ref_count.load(Ordering::Relaxed)
    }

    pub fn priority(&self, id: ContextMutexId) -> i32 {
        self.nodes.get(id).priority
    }

    pub fn rank(&self, id: ContextMutexId) -> u32 {
        self.nodes.get(id).links.lock().rank
    }

    /// Recursion depth the calling thread holds on `id`'s root (0 if none)
    pub fn lock_level(&self, id: ContextMutexId) -> u32 {
        let root = self.nodes.get(self.nodes.get(id).root());
        if root.owner.is_held_by_current() {
            root.owner.level()
        } else {
            0
        }
    }

    pub fn is_alive(&self, id: ContextMutexId) -> bool {
        self.nodes.contains(id)
    }

    pub fn scoped_lock(&self, id: ContextMutexId) -> ScopedContextMutexLock<'_, R> {
        ScopedContextMutexLock::new(self, id)
    }

    /// Lock, then take a reference that the guard gives back on drop
    ///
    /// Keeps the node alive for the whole critical section even if every
    /// other holder releases it meanwhile.
    pub fn lock_and_add_ref(&self, id: ContextMutexId) -> ContextMutexGuard<'_, R> {
        ContextMutexGuard::new(self, id)
    }

    pub fn stats(&self) -> ContextMutexStats {
        self.stats.snapshot(self.nodes.live())
    }

    /// Join the components of `locked` and `other`
    ///
    /// The caller must hold `locked`. On return it holds the merged
    /// component, with every outstanding unlock of either side still
    /// balanced. Merging already joined mutexes is a no-op.
    ///
    /// Never blocks on `other`: when its root is busy, the caller's root is
    /// released for a short random backoff so two threads merging in
    /// opposite directions cannot deadlock.
    pub fn merge(&self, locked: ContextMutexId, other: ContextMutexId) {
        let mut locked_root = self.nodes.get(self.nodes.get(locked).root());
        debug_assert!(
            locked_root.owner.is_held_by_current(),
            "merge requires {} to be locked by the caller",
            locked
        );

        let mut retries = 0u64;
        let other_root = loop {
            if self.nodes.get(other).root() == locked_root.id {
                self.stats.add_merge_retries(retries);
                return;
            }
            if let Some(root) = self.try_lock_root(other) {
                debug_assert_ne!(root.id, locked_root.id);
                break root;
            }

            let level = locked_root.owner.take();
            // SAFETY: taken ownership above proves this thread held the raw lock
            unsafe { locked_root.raw.unlock() };
            self.backoff();
            locked_root = self.lock_root(locked);
            locked_root.owner.set_level(level);
            retries += 1;
        };
        self.stats.add_merge_retries(retries);

        let combined_level = locked_root.owner.level() + other_root.owner.level() - 1;

        let locked_key = (locked_root.priority, locked_root.links.lock().rank);
        let other_key = (other_root.priority, other_root.links.lock().rank);
        let (winner, loser) = if locked_key > other_key {
            (locked_root, other_root)
        } else {
            (other_root, locked_root)
        };

        let loser_rank = loser.links.lock().rank;
        {
            let mut links = winner.links.lock();
            links.rank = links.rank.max(loser_rank + 1);
        }

        let leaves = mem::take(&mut loser.links.lock().leaves);
        for leaf in leaves {
            self.set_new_root(&self.nodes.get(leaf), &winner);
        }
        self.set_new_root(&loser, &winner);

        loser.owner.take();
        // SAFETY: this thread locked the loser root earlier in the merge
        unsafe { loser.raw.unlock() };
        winner.owner.set_level(combined_level);

        self.stats.inc_merges();
        trace!(
            winner = %winner.id,
            loser = %loser.id,
            retries,
            "merged context mutexes"
        );
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Acquire the current root of `id`, following root changes
    fn lock_root(&self, id: ContextMutexId) -> Arc<Node<R>> {
        let mut current = self.nodes.get(id).root();
        loop {
            let node = self.nodes.get(current);
            if node.owner.is_held_by_current() {
                if self.allow_recursion() {
                    node.owner.enter();
                    return node;
                }
                debug_assert!(
                    self.lock_mode != LockMode::Checked,
                    "context mutex {} locked twice by the same thread",
                    id
                );
            }

            node.raw.lock();
            let root = node.root();
            if root == current {
                node.owner.set_locked(1);
                return node;
            }
            // SAFETY: locked just above; only the real root stays locked
            unsafe { node.raw.unlock() };
            current = root;
        }
    }

    fn try_lock_root(&self, id: ContextMutexId) -> Option<Arc<Node<R>>> {
        let mut current = self.nodes.get(id).root();
        loop {
            let node = self.nodes.get(current);
            if node.raw.try_lock() {
                let root = node.root();
                if root == current {
                    node.owner.set_locked(1);
                    return Some(node);
                }
                // SAFETY: locked just above
                unsafe { node.raw.unlock() };
                current = root;
            } else if self.allow_recursion() && node.owner.is_held_by_current() {
                node.owner.enter();
                return Some(node);
            } else {
                return None;
            }
        }
    }

    fn set_new_root(&self, node: &Node<R>, new_root: &Node<R>) {
        let old_root = node.root();
        debug_assert_ne!(old_root, new_root.id);
        debug_assert!(node.links.lock().leaves.is_empty());

        node.root.store(new_root.id.0, Ordering::Release);
        new_root.ref_count.fetch_add(1, Ordering::Relaxed);
        let inserted = new_root.links.lock().leaves.insert(node.id);
        debug_assert!(inserted);

        // The reference on the old root moves from "current" to "old"
        if old_root != node.id {
            node.links.lock().old_roots.push(old_root);
        }
    }

    fn release_impl(&self, id: ContextMutexId, need_unlock: bool) {
        let node = self.nodes.get(id);
        let prev = node.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release of context mutex {} without a reference", id);

        if prev > 1 {
            if need_unlock {
                self.unlock(id);
            }
            return;
        }
        self.destroy(node, need_unlock);
    }

    fn destroy(&self, node: Arc<Node<R>>, need_unlock: bool) {
        let id = node.id;

        if node.is_root() {
            debug_assert!(node.links.lock().leaves.is_empty());
            debug_assert!(node.links.lock().old_roots.is_empty());
            if need_unlock {
                if node.owner.leave() {
                    // SAFETY: caller held the lock per `release_and_unlock`
                    unsafe { node.raw.unlock() };
                }
            } else if !node.owner.is_held_by_current() {
                // A `release_and_unlock` that dropped the second to last
                // reference may still hold the lock; wait for its unlock
                node.raw.lock();
                // SAFETY: locked just above
                unsafe { node.raw.unlock() };
            }
            debug_assert!(!node.raw.is_locked(), "destroying locked context mutex {}", id);
            self.nodes.remove(id);
            self.stats.inc_destroyed(true);
            trace!(mutex = %id, "destroyed root context mutex");
            return;
        }

        // Detaching a leaf edits its root's bookkeeping, so hold the root
        let must_unlock = if need_unlock || self.nodes.get(node.root()).owner.is_held_by_current() {
            need_unlock
        } else {
            let _ = self.lock_root(id);
            true
        };

        let old_roots = mem::take(&mut node.links.lock().old_roots);
        for old_root in old_roots {
            self.release_impl(old_root, false);
        }

        let root_id = node.root();
        let root = self.nodes.get(root_id);
        let removed = root.links.lock().leaves.remove(&id);
        debug_assert!(removed, "{} missing from leaves of {}", id, root_id);
        drop(root);

        node.root.store(id.0, Ordering::Release);
        self.nodes.remove(id);
        self.stats.inc_destroyed(false);
        trace!(mutex = %id, root = %root_id, "destroyed leaf context mutex");

        self.release_impl(root_id, must_unlock);
    }

    fn backoff(&self) {
        let (min, max) = self.backoff_micros;
        let micros = rand::thread_rng().gen_range(min..=max);
        trace!(micros, "merge target busy, backing off");
        thread::sleep(Duration::from_micros(micros));
    }
}

impl<R: RawMutex> Drop for ContextMutexManager<R> {
    fn drop(&mut self) {
        let live = self.nodes.live();
        if live > 0 {
            warn!(live, "context mutex manager dropped with live mutexes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sync::fast_mutex::RawSpinMutex;

    fn manager(mode: LockMode) -> ContextMutexManager<RawSpinMutex> {
        ContextMutexManager::new(&SyncConfig {
            lock_mode: mode,
            ..SyncConfig::default()
        })
    }

    #[test]
    fn test_equal_rank_tie_goes_to_other() {
        let m = manager(LockMode::Checked);
        let a = m.create();
        let b = m.create();

        m.lock(a);
        m.merge(a, b);
        m.unlock(a);

        assert_eq!(m.root_of(a), b);
        assert_eq!(m.rank(b), 1);
        // a's reference + its own
        assert_eq!(m.ref_count(b), 2);

        m.release(a);
        m.release(b);
        assert_eq!(m.stats().live, 0);
    }

    #[test]
    fn test_higher_rank_wins() {
        let m = manager(LockMode::Checked);
        let a = m.create();
        let b = m.create();
        let c = m.create();

        m.lock(a);
        m.merge(a, b); // root b, rank 1
        m.unlock(a);

        m.lock(c);
        m.merge(c, a); // c rank 0 loses against b rank 1
        m.unlock(c);

        assert_eq!(m.root_of(c), b);
        assert_eq!(m.rank(b), 1);

        for id in [a, b, c] {
            m.release(id);
        }
        assert_eq!(m.stats().roots_destroyed, 1);
    }

    #[test]
    fn test_priority_beats_rank() {
        let m = manager(LockMode::Checked);
        let a = m.create();
        let b = m.create();
        let vip = m.create_with_priority(5);

        m.lock(a);
        m.merge(a, b);
        m.unlock(a);

        m.lock(a);
        m.merge(a, vip);
        m.unlock(a);

        for id in [a, b, vip] {
            assert_eq!(m.root_of(id), vip);
        }
        // max(0, 1 + 1)
        assert_eq!(m.rank(vip), 2);
        assert_eq!(m.priority(vip), 5);

        for id in [vip, b, a] {
            m.release(id);
        }
        assert_eq!(m.stats().live, 0);
    }

    #[test]
    fn test_leaf_keeps_old_root_alive() {
        let m = manager(LockMode::Checked);
        let a = m.create();
        let b = m.create();
        let c = m.create();

        m.lock(a);
        m.merge(a, b); // a -> b
        m.unlock(a);

        let d = m.create_with_priority(1);
        m.lock(d);
        m.merge(d, a); // b -> d, a -> d (old root b)
        m.unlock(d);

        // b is only referenced by itself and a's old-root list
        m.release(b);
        assert!(m.is_alive(b));
        assert_eq!(m.root_of(b), d);

        m.release(a);
        assert!(!m.is_alive(b));
        assert!(!m.is_alive(a));

        m.release(c);
        m.release(d);
        let stats = m.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.destroyed, 4);
        assert_eq!(stats.roots_destroyed, 2); // c never merged
    }

    #[test]
    fn test_try_lock_follows_root() {
        let m = manager(LockMode::Checked);
        let a = m.create();
        let b = m.create();

        m.lock(a);
        m.merge(a, b);
        assert_eq!(m.lock_level(b), 1);
        m.unlock(b);

        assert!(m.try_lock(a));
        assert!(m.is_alive(b));
        m.unlock(a);

        m.release(a);
        m.release(b);
    }

    #[test]
    fn test_release_and_unlock_destroys_locked_root() {
        let m = manager(LockMode::Checked);
        let a = m.create();
        m.lock(a);
        m.release_and_unlock(a);
        assert_eq!(m.stats().roots_destroyed, 1);
    }

    #[test]
    fn test_release_leaf_while_root_held() {
        let m = manager(LockMode::Checked);
        let a = m.create();
        let b = m.create();

        m.lock(a);
        m.merge(a, b);
        // Root held by this thread: detaching must not re-lock it
        m.release(a);
        assert_eq!(m.ref_count(b), 1);
        m.unlock(b);

        m.release(b);
        assert_eq!(m.stats().live, 0);
    }
}
