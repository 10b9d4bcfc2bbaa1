//! Registry of arrays attached to one graph.
//!
//! The graph never sees the value types of the arrays attached to it. It only
//! knows them through [`ResizableArray`], held weakly so that an array's own
//! drop is what detaches it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use nodal_common::types::ElementType;
use parking_lot::Mutex;

/// Capability the graph needs from an attached array.
pub trait ResizableArray: Send + Sync {
    /// Grows the array to hold `capacity` slots. New slots get the array's
    /// default value; existing slots are untouched.
    fn resize(&self, capacity: usize);

    /// Puts the default value back into the given slots. Called for handles
    /// that were just released, so a recycled handle starts from the default.
    fn reset_slots(&self, indices: &[usize]);

    /// Marks the array as no longer bound to a graph.
    fn invalidate(&self);
}

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ArrayKey(u64);

struct Registration {
    key: ArrayKey,
    array: Weak<dyn ResizableArray>,
}

/// Arrays and live extents of one element kind.
#[derive(Default)]
struct KindRegistry {
    arrays: Vec<Registration>,
    /// Slots every array of this kind must hold.
    capacity: usize,
    /// Highest live handle, bounding iteration.
    last_in_use: Option<usize>,
}

/// The arrays attached to one graph, grouped by element kind.
pub struct ArrayRegistry {
    component_managed: bool,
    next_key: AtomicU64,
    nodes: Mutex<KindRegistry>,
    edges: Mutex<KindRegistry>,
    components: Mutex<KindRegistry>,
}

impl ArrayRegistry {
    pub(crate) fn new(component_managed: bool) -> Arc<Self> {
        Arc::new(Self {
            component_managed,
            next_key: AtomicU64::new(0),
            nodes: Mutex::new(KindRegistry::default()),
            edges: Mutex::new(KindRegistry::default()),
            components: Mutex::new(KindRegistry::default()),
        })
    }

    fn kind(&self, kind: ElementType) -> &Mutex<KindRegistry> {
        match kind {
            ElementType::Node => &self.nodes,
            ElementType::Edge => &self.edges,
            ElementType::Component => &self.components,
        }
    }

    /// Returns true if the owning graph tracks components.
    #[must_use]
    pub fn is_component_managed(&self) -> bool {
        self.component_managed
    }

    /// Returns the number of slots arrays of `kind` currently hold.
    #[must_use]
    pub fn capacity(&self, kind: ElementType) -> usize {
        self.kind(kind).lock().capacity
    }

    /// Returns the number of live arrays of `kind`.
    #[must_use]
    pub fn array_count(&self, kind: ElementType) -> usize {
        self.kind(kind)
            .lock()
            .arrays
            .iter()
            .filter(|registration| registration.array.strong_count() > 0)
            .count()
    }

    pub(crate) fn last_in_use(&self, kind: ElementType) -> Option<usize> {
        self.kind(kind).lock().last_in_use
    }

    pub(crate) fn register(&self, kind: ElementType, array: Weak<dyn ResizableArray>) -> ArrayKey {
        assert!(
            kind != ElementType::Component || self.component_managed,
            "component arrays require a component-managed graph"
        );

        let key = ArrayKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        self.kind(kind).lock().arrays.push(Registration { key, array });
        key
    }

    pub(crate) fn deregister(&self, kind: ElementType, key: ArrayKey) {
        self.kind(kind)
            .lock()
            .arrays
            .retain(|registration| registration.key != key);
    }

    /// Records the new extents of `kind` and grows every array of that kind.
    pub(crate) fn resize(&self, kind: ElementType, capacity: usize, last_in_use: Option<usize>) {
        // Arrays are resized outside the registry lock; an array holding its
        // own lock may be asking the registry for its iteration bound.
        let arrays: Vec<Arc<dyn ResizableArray>> = {
            let mut registry = self.kind(kind).lock();
            registry.capacity = registry.capacity.max(capacity);
            registry.last_in_use = last_in_use;
            registry
                .arrays
                .retain(|registration| registration.array.strong_count() > 0);
            registry
                .arrays
                .iter()
                .filter_map(|registration| registration.array.upgrade())
                .collect()
        };

        let capacity = self.capacity(kind);
        for array in arrays {
            array.resize(capacity);
        }
    }

    /// Resets `indices` to the default value in every array of `kind`.
    pub(crate) fn reset(&self, kind: ElementType, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let arrays: Vec<Arc<dyn ResizableArray>> = self
            .kind(kind)
            .lock()
            .arrays
            .iter()
            .filter_map(|registration| registration.array.upgrade())
            .collect();
        for array in arrays {
            array.reset_slots(indices);
        }
    }

    /// Detaches every array. Called when the owning graph goes away.
    pub(crate) fn invalidate_all(&self) {
        for kind in [ElementType::Node, ElementType::Edge, ElementType::Component] {
            let arrays: Vec<Registration> = std::mem::take(&mut self.kind(kind).lock().arrays);
            for registration in arrays {
                if let Some(array) = registration.array.upgrade() {
                    array.invalidate();
                }
            }
        }
    }
}

impl std::fmt::Debug for ArrayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayRegistry")
            .field("component_managed", &self.component_managed)
            .field("node_arrays", &self.array_count(ElementType::Node))
            .field("edge_arrays", &self.array_count(ElementType::Edge))
            .field("component_arrays", &self.array_count(ElementType::Component))
            .finish()
    }
}
