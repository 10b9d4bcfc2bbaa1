//! Hash collections.
//!
//! Fast, non-cryptographic hashing for maps keyed by element handles. Never
//! iterate these where the order is observable; use ordered collections for
//! anything that drives notification order.

use ahash::RandomState;

/// Hash map with ahash hashing.
pub type FxHashMap<K, V> = hashbrown::HashMap<K, V, RandomState>;

/// Hash set with ahash hashing.
pub type FxHashSet<K> = hashbrown::HashSet<K, RandomState>;
