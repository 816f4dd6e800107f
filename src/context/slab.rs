/*!
 * Node Arena
 * Slot storage for context mutex nodes with id recycling
 */

use crate::core::types::ContextMutexId;
use parking_lot::RwLock;
use std::sync::Arc;

/// Arena of shared nodes addressed by [`ContextMutexId`]
///
/// # Performance
///
/// - Lookups take a read lock just long enough to clone an `Arc`
/// - Freed slots are reused LIFO, keeping the table dense
///
/// The table lock is never held while a caller blocks on a node lock.
pub(super) struct NodeSlab<T> {
    inner: RwLock<SlabInner<T>>,
}

struct SlabInner<T> {
    slots: Vec<Option<Arc<T>>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> NodeSlab<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SlabInner {
                slots: Vec::new(),
                free_list: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Store a node built from its future id
    pub fn insert_with<F>(&self, build: F) -> (ContextMutexId, Arc<T>)
    where
        F: FnOnce(ContextMutexId) -> T,
    {
        let mut inner = self.inner.write();
        let index = match inner.free_list.pop() {
            Some(index) => index,
            None => {
                inner.slots.push(None);
                (inner.slots.len() - 1) as u32
            }
        };

        let id = ContextMutexId(index);
        let node = Arc::new(build(id));
        inner.slots[id.index()] = Some(node.clone());
        inner.live += 1;
        (id, node)
    }

    /// Look up a live node
    #[track_caller]
    pub fn get(&self, id: ContextMutexId) -> Arc<T> {
        match self.inner.read().slots.get(id.index()) {
            Some(Some(node)) => node.clone(),
            _ => panic!("use of destroyed context mutex {}", id),
        }
    }

    /// Free a slot; the node itself lives on while other `Arc`s exist
    pub fn remove(&self, id: ContextMutexId) -> Option<Arc<T>> {
        let mut inner = self.inner.write();
        let node = inner.slots.get_mut(id.index())?.take()?;
        inner.free_list.push(id.0);
        inner.live -= 1;
        Some(node)
    }

    pub fn contains(&self, id: ContextMutexId) -> bool {
        matches!(self.inner.read().slots.get(id.index()), Some(Some(_)))
    }

    pub fn live(&self) -> usize {
        self.inner.read().live
    }
}
