//! Lock policies for attached arrays.
//!
//! Most arrays are only touched by the thread that owns the graph and use
//! [`Unlocked`]. Arrays holding continuously updated state that another
//! thread reads (node positions for a renderer, say) opt into [`Locking`],
//! which takes a re-entrant lock around every slot access.

use std::fmt;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// How an array guards access to its slots.
pub trait LockPolicy: Default + Send + Sync + 'static {
    /// Guard held for the duration of one access.
    type Guard<'a>
    where
        Self: 'a;

    /// Acquires the guard.
    fn acquire(&self) -> Self::Guard<'_>;
}

/// No extra locking on slot access.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlocked;

impl LockPolicy for Unlocked {
    type Guard<'a> = ();

    #[inline]
    fn acquire(&self) -> Self::Guard<'_> {}
}

/// A re-entrant lock taken around every slot access.
#[derive(Default)]
pub struct Locking {
    mutex: ReentrantMutex<()>,
}

impl LockPolicy for Locking {
    type Guard<'a> = ReentrantMutexGuard<'a, ()>;

    #[inline]
    fn acquire(&self) -> Self::Guard<'_> {
        self.mutex.lock()
    }
}

impl fmt::Debug for Locking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locking")
            .field("locked", &self.mutex.is_locked())
            .finish()
    }
}
