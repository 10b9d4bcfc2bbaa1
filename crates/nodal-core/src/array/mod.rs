//! Arrays attached to a graph.
//!
//! A [`GraphArray`] stores one value per node, edge or component. It is bound
//! to a single graph for its whole life: it registers itself on construction,
//! the graph grows it whenever a transaction closes, and it deregisters when
//! it is dropped. Collaborators (layout, rendering, attributes) use these to
//! keep per-element state without the graph knowing their types.
//!
//! # Example
//!
//! ```
//! use nodal_core::array::NodeArray;
//! use nodal_core::MutableGraph;
//!
//! let mut graph = MutableGraph::new();
//! let sizes: NodeArray<f32> = NodeArray::with_default(&graph, 1.0);
//!
//! let node = graph.add_node();
//! assert_eq!(sizes.get(node), 1.0);
//!
//! sizes.set(node, 2.5);
//! assert_eq!(sizes.get(node), 2.5);
//! ```

mod lock;
mod registry;

pub use lock::{LockPolicy, Locking, Unlocked};
pub use registry::{ArrayRegistry, ResizableArray};

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use nodal_common::types::{ComponentId, EdgeId, ElementId, ElementType, NodeId};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use registry::ArrayKey;

/// Array with one value per node.
pub type NodeArray<T, L = Unlocked> = GraphArray<NodeId, T, L>;

/// Array with one value per edge.
pub type EdgeArray<T, L = Unlocked> = GraphArray<EdgeId, T, L>;

/// Array with one value per component. Needs a component-managed graph.
pub type ComponentArray<T, L = Unlocked> = GraphArray<ComponentId, T, L>;

/// Anything that owns an [`ArrayRegistry`] arrays can attach to.
pub trait ArrayHost {
    /// Returns the registry arrays attach to.
    fn array_registry(&self) -> &Arc<ArrayRegistry>;
}

/// Storage shared between an array handle and the registry.
struct ArrayStorage<T, L> {
    values: RwLock<Vec<T>>,
    default: T,
    policy: L,
    detached: AtomicBool,
}

impl<T, L> ResizableArray for ArrayStorage<T, L>
where
    T: Clone + Send + Sync + 'static,
    L: LockPolicy,
{
    fn resize(&self, capacity: usize) {
        let _guard = self.policy.acquire();
        let mut values = self.values.write();
        if capacity > values.len() {
            values.resize(capacity, self.default.clone());
        }
    }

    fn reset_slots(&self, indices: &[usize]) {
        let _guard = self.policy.acquire();
        let mut values = self.values.write();
        for &index in indices {
            if let Some(value) = values.get_mut(index) {
                value.clone_from(&self.default);
            }
        }
    }

    fn invalidate(&self) {
        self.detached.store(true, Ordering::Release);
    }
}

/// Per-element storage bound to one graph.
///
/// Slot access panics for handles outside the array: such a handle was
/// allocated in a transaction that has not closed yet, or it is stale.
pub struct GraphArray<I, T, L = Unlocked>
where
    I: ElementId,
    T: Clone + Send + Sync + 'static,
    L: LockPolicy,
{
    storage: Arc<ArrayStorage<T, L>>,
    registry: Weak<ArrayRegistry>,
    key: Option<ArrayKey>,
    _marker: PhantomData<fn() -> I>,
}

impl<I, T, L> GraphArray<I, T, L>
where
    I: ElementId,
    T: Clone + Send + Sync + 'static,
    L: LockPolicy,
{
    /// Creates an array bound to `graph` whose slots hold `T::default()`.
    #[must_use]
    pub fn new(graph: &impl ArrayHost) -> Self
    where
        T: Default,
    {
        Self::attach(graph.array_registry(), T::default())
    }

    /// Creates an array bound to `graph` whose slots hold `default`.
    ///
    /// Slots created by later transactions and slots cleared by
    /// [`reset_elements`](Self::reset_elements) also hold `default`.
    #[must_use]
    pub fn with_default(graph: &impl ArrayHost, default: T) -> Self {
        Self::attach(graph.array_registry(), default)
    }

    pub(crate) fn attach(registry: &Arc<ArrayRegistry>, default: T) -> Self {
        let capacity = registry.capacity(I::KIND);
        Self::attach_with_values(registry, vec![default.clone(); capacity], default)
    }

    fn attach_with_values(registry: &Arc<ArrayRegistry>, values: Vec<T>, default: T) -> Self {
        let storage = Arc::new(ArrayStorage {
            values: RwLock::new(values),
            default,
            policy: L::default(),
            detached: AtomicBool::new(false),
        });

        let erased: Arc<dyn ResizableArray> = storage.clone();
        let key = registry.register(I::KIND, Arc::downgrade(&erased));

        Self {
            storage,
            registry: Arc::downgrade(registry),
            key: Some(key),
            _marker: PhantomData,
        }
    }

    /// Returns a copy of the value for `id`.
    #[must_use]
    pub fn get(&self, id: I) -> T {
        let _guard = self.storage.policy.acquire();
        let values = self.storage.values.read();
        values[slot_index(id, values.len())].clone()
    }

    /// Replaces the value for `id`.
    pub fn set(&self, id: I, value: T) {
        let _guard = self.storage.policy.acquire();
        let mut values = self.storage.values.write();
        let index = slot_index(id, values.len());
        values[index] = value;
    }

    /// Calls `f` with a reference to the value for `id`.
    pub fn with<R>(&self, id: I, f: impl FnOnce(&T) -> R) -> R {
        let _guard = self.storage.policy.acquire();
        let values = self.storage.values.read();
        f(&values[slot_index(id, values.len())])
    }

    /// Calls `f` with a mutable reference to the value for `id`.
    pub fn update<R>(&self, id: I, f: impl FnOnce(&mut T) -> R) -> R {
        let _guard = self.storage.policy.acquire();
        let mut values = self.storage.values.write();
        let index = slot_index(id, values.len());
        f(&mut values[index])
    }

    /// Locks the array for reading.
    ///
    /// Do not hold the guard across the end of a transaction on the thread
    /// that owns the graph: closing the transaction resizes the array.
    pub fn read(&self) -> ArrayReadGuard<'_, I, T, L> {
        let lock = self.storage.policy.acquire();
        let values = self.storage.values.read();
        let live = self.live_len(values.len());
        ArrayReadGuard {
            values,
            live,
            _lock: lock,
            _marker: PhantomData,
        }
    }

    /// Locks the array for writing.
    ///
    /// The same caveat as [`read`](Self::read) applies.
    pub fn write(&self) -> ArrayWriteGuard<'_, I, T, L> {
        let lock = self.storage.policy.acquire();
        let values = self.storage.values.write();
        let live = self.live_len(values.len());
        ArrayWriteGuard {
            values,
            live,
            _lock: lock,
            _marker: PhantomData,
        }
    }

    /// Number of slots up to and including the highest live handle.
    fn live_len(&self, len: usize) -> usize {
        if I::KIND == ElementType::Component || !self.is_attached() {
            return len;
        }
        self.registry
            .upgrade()
            .and_then(|registry| registry.last_in_use(I::KIND))
            .map_or(0, |last| (last + 1).min(len))
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        let _guard = self.storage.policy.acquire();
        self.storage.values.read().len()
    }

    /// Returns true if the array has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value new and reset slots receive.
    #[must_use]
    pub fn default_value(&self) -> &T {
        &self.storage.default
    }

    /// Returns true while the graph this array was created for exists.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        !self.storage.detached.load(Ordering::Acquire)
    }

    /// Sets every slot to `value`.
    pub fn fill(&self, value: &T) {
        let _guard = self.storage.policy.acquire();
        self.storage.values.write().fill(value.clone());
    }

    /// Sets every slot to the value `generator` returns for its handle.
    pub fn generate(&self, mut generator: impl FnMut(I) -> T) {
        let _guard = self.storage.policy.acquire();
        let mut values = self.storage.values.write();
        for (index, value) in values.iter_mut().enumerate() {
            *value = generator(I::from_index(index));
        }
    }

    /// Sets every slot back to the default value.
    pub fn reset_elements(&self) {
        self.fill(&self.storage.default);
    }

    /// Copies out every slot.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        let _guard = self.storage.policy.acquire();
        self.storage.values.read().clone()
    }
}

impl<I, T> GraphArray<I, T, Locking>
where
    I: ElementId,
    T: Clone + Send + Sync + 'static,
{
    /// Takes the array's re-entrant lock.
    ///
    /// While the guard lives, other threads block on every slot access, so a
    /// reader can make several accesses that observe one consistent state.
    /// Slot accesses from the holding thread still succeed.
    pub fn lock(&self) -> parking_lot::ReentrantMutexGuard<'_, ()> {
        self.storage.policy.acquire()
    }
}

impl<I, T, L> Clone for GraphArray<I, T, L>
where
    I: ElementId,
    T: Clone + Send + Sync + 'static,
    L: LockPolicy,
{
    /// Creates a second array bound to the same graph, with the same values.
    fn clone(&self) -> Self {
        let values = self.to_vec();
        let default = self.storage.default.clone();

        match self.registry.upgrade().filter(|_| self.is_attached()) {
            Some(registry) => Self::attach_with_values(&registry, values, default),
            None => Self {
                storage: Arc::new(ArrayStorage {
                    values: RwLock::new(values),
                    default,
                    policy: L::default(),
                    detached: AtomicBool::new(true),
                }),
                registry: Weak::new(),
                key: None,
                _marker: PhantomData,
            },
        }
    }
}

impl<I, T, L> Drop for GraphArray<I, T, L>
where
    I: ElementId,
    T: Clone + Send + Sync + 'static,
    L: LockPolicy,
{
    fn drop(&mut self) {
        if let (Some(key), Some(registry)) = (self.key, self.registry.upgrade()) {
            registry.deregister(I::KIND, key);
        }
    }
}

impl<I, T, L> fmt::Debug for GraphArray<I, T, L>
where
    I: ElementId,
    T: Clone + Send + Sync + 'static,
    L: LockPolicy,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphArray")
            .field("kind", &I::KIND)
            .field("len", &self.len())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Read access to a whole array.
pub struct ArrayReadGuard<'a, I, T, L: LockPolicy + 'a> {
    values: RwLockReadGuard<'a, Vec<T>>,
    live: usize,
    _lock: L::Guard<'a>,
    _marker: PhantomData<fn() -> I>,
}

impl<I: ElementId, T, L: LockPolicy> ArrayReadGuard<'_, I, T, L> {
    /// Iterates `(handle, value)` pairs up to the highest live handle.
    ///
    /// Slots of released handles inside that range are included; filter
    /// against the graph if that matters.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.values[..self.live]
            .iter()
            .enumerate()
            .map(|(index, value)| (I::from_index(index), value))
    }

    /// Returns the values up to the highest live handle.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.values[..self.live]
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<I: ElementId, T, L: LockPolicy> Index<I> for ArrayReadGuard<'_, I, T, L> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        let index = slot_index(id, self.values.len());
        &self.values[index]
    }
}

/// Write access to a whole array.
pub struct ArrayWriteGuard<'a, I, T, L: LockPolicy + 'a> {
    values: RwLockWriteGuard<'a, Vec<T>>,
    live: usize,
    _lock: L::Guard<'a>,
    _marker: PhantomData<fn() -> I>,
}

impl<I: ElementId, T, L: LockPolicy> ArrayWriteGuard<'_, I, T, L> {
    /// Iterates `(handle, value)` pairs up to the highest live handle.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.values[..self.live]
            .iter()
            .enumerate()
            .map(|(index, value)| (I::from_index(index), value))
    }

    /// Iterates `(handle, value)` pairs mutably up to the highest live handle.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> + '_ {
        let live = self.live;
        self.values[..live]
            .iter_mut()
            .enumerate()
            .map(|(index, value)| (I::from_index(index), value))
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<I: ElementId, T, L: LockPolicy> Index<I> for ArrayWriteGuard<'_, I, T, L> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        let index = slot_index(id, self.values.len());
        &self.values[index]
    }
}

impl<I: ElementId, T, L: LockPolicy> IndexMut<I> for ArrayWriteGuard<'_, I, T, L> {
    fn index_mut(&mut self, id: I) -> &mut T {
        let index = slot_index(id, self.values.len());
        &mut self.values[index]
    }
}

#[inline]
fn slot_index<I: ElementId>(id: I, len: usize) -> usize {
    assert!(
        !id.is_null() && id.index() < len,
        "{} {id} is out of range for an array of {len} slots (stale handle?)",
        I::KIND
    );
    id.index()
}
