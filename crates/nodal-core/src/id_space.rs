//! Recyclable handle allocation.
//!
//! Every element kind gets its own [`ElementIdSpace`]. Released handles go on
//! a free list and the lowest free value is always reused first, which keeps
//! the handle range (and so every attached array) as small as the live
//! element count allows.

use std::collections::BTreeSet;
use std::marker::PhantomData;

use nodal_common::types::ElementId;

/// Allocator for the handles of one element kind.
#[derive(Debug, Clone)]
pub struct ElementIdSpace<I: ElementId> {
    /// One past the highest handle ever allocated.
    next: usize,
    /// Released handles below `next`, lowest first.
    free: BTreeSet<usize>,
    /// In-use flag per handle below `next`.
    in_use: Vec<bool>,
    /// Number of handles currently in use.
    live: usize,
    /// Highest handle currently in use.
    last_in_use: Option<usize>,
    _marker: PhantomData<I>,
}

impl<I: ElementId> ElementIdSpace<I> {
    /// Creates an empty id space.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty id space with room for `capacity` handles.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next: 0,
            free: BTreeSet::new(),
            in_use: Vec::with_capacity(capacity),
            live: 0,
            last_in_use: None,
            _marker: PhantomData,
        }
    }

    /// Allocates the lowest free handle.
    pub fn allocate(&mut self) -> I {
        let index = if let Some(index) = self.free.pop_first() {
            index
        } else {
            let index = self.next;
            self.next += 1;
            self.in_use.push(false);
            index
        };

        self.in_use[index] = true;
        self.live += 1;
        if self.last_in_use.is_none_or(|last| index > last) {
            self.last_in_use = Some(index);
        }

        I::from_index(index)
    }

    /// Returns a handle to the free list.
    ///
    /// # Panics
    ///
    /// Panics if the handle was never allocated or is already free.
    pub fn release(&mut self, id: I) {
        assert!(!id.is_null(), "release of null {}", I::KIND);
        let index = id.index();
        assert!(
            index < self.next,
            "release of {} {id} beyond the allocated range ({})",
            I::KIND,
            self.next
        );
        assert!(self.in_use[index], "double release of {} {id}", I::KIND);

        self.in_use[index] = false;
        self.free.insert(index);
        self.live -= 1;

        if self.last_in_use == Some(index) {
            self.last_in_use = self.in_use[..index].iter().rposition(|&used| used);
        }
    }

    /// One past the highest handle ever allocated. Never shrinks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.next
    }

    /// Returns true if `id` is currently allocated.
    #[must_use]
    pub fn is_in_use(&self, id: I) -> bool {
        !id.is_null() && self.in_use.get(id.index()).copied().unwrap_or(false)
    }

    /// Returns the highest handle currently in use.
    #[must_use]
    pub fn last_in_use(&self) -> Option<I> {
        self.last_in_use.map(I::from_index)
    }

    /// Returns the number of handles currently in use.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no handle is in use.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates the handles in use, lowest first.
    pub fn iter(&self) -> impl Iterator<Item = I> + '_ {
        let end = self.last_in_use.map_or(0, |last| last + 1);
        self.in_use[..end]
            .iter()
            .enumerate()
            .filter(|(_, used)| **used)
            .map(|(index, _)| I::from_index(index))
    }

    /// Releases every handle. The capacity is kept.
    pub fn clear(&mut self) {
        self.in_use.iter_mut().for_each(|used| *used = false);
        self.free = (0..self.next).collect();
        self.live = 0;
        self.last_in_use = None;
    }
}

impl<I: ElementId> Default for ElementIdSpace<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodal_common::types::{EdgeId, NodeId};

    #[test]
    fn test_allocate_sequential() {
        let mut ids = ElementIdSpace::<NodeId>::new();

        assert_eq!(ids.allocate(), NodeId::new(0));
        assert_eq!(ids.allocate(), NodeId::new(1));
        assert_eq!(ids.allocate(), NodeId::new(2));
        assert_eq!(ids.capacity(), 3);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_lowest_free_is_reused() {
        let mut ids = ElementIdSpace::<NodeId>::new();
        for _ in 0..5 {
            ids.allocate();
        }

        ids.release(NodeId::new(3));
        ids.release(NodeId::new(1));

        assert_eq!(ids.allocate(), NodeId::new(1));
        assert_eq!(ids.allocate(), NodeId::new(3));
        assert_eq!(ids.allocate(), NodeId::new(5));
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut ids = ElementIdSpace::<EdgeId>::new();
        let a = ids.allocate();
        let b = ids.allocate();

        ids.release(b);
        ids.release(a);

        assert_eq!(ids.capacity(), 2);
        assert!(ids.is_empty());
        assert_eq!(ids.last_in_use(), None);
    }

    #[test]
    fn test_last_in_use_tracks_releases() {
        let mut ids = ElementIdSpace::<NodeId>::new();
        for _ in 0..4 {
            ids.allocate();
        }

        ids.release(NodeId::new(2));
        assert_eq!(ids.last_in_use(), Some(NodeId::new(3)));

        ids.release(NodeId::new(3));
        assert_eq!(ids.last_in_use(), Some(NodeId::new(1)));
    }

    #[test]
    fn test_is_in_use() {
        let mut ids = ElementIdSpace::<NodeId>::new();
        let a = ids.allocate();

        assert!(ids.is_in_use(a));
        assert!(!ids.is_in_use(NodeId::new(10)));
        assert!(!ids.is_in_use(NodeId::NULL));

        ids.release(a);
        assert!(!ids.is_in_use(a));
    }

    #[test]
    fn test_iter_skips_free() {
        let mut ids = ElementIdSpace::<NodeId>::new();
        for _ in 0..5 {
            ids.allocate();
        }
        ids.release(NodeId::new(0));
        ids.release(NodeId::new(4));

        let live: Vec<_> = ids.iter().collect();
        assert_eq!(live, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)]);
    }

    #[test]
    fn test_clear() {
        let mut ids = ElementIdSpace::<NodeId>::new();
        for _ in 0..3 {
            ids.allocate();
        }

        ids.clear();

        assert!(ids.is_empty());
        assert_eq!(ids.capacity(), 3);
        assert_eq!(ids.allocate(), NodeId::new(0));
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn test_double_release_panics() {
        let mut ids = ElementIdSpace::<NodeId>::new();
        let a = ids.allocate();
        ids.release(a);
        ids.release(a);
    }

    #[test]
    #[should_panic(expected = "beyond the allocated range")]
    fn test_release_out_of_range_panics() {
        let mut ids = ElementIdSpace::<NodeId>::new();
        ids.allocate();
        ids.release(NodeId::new(5));
    }
}
