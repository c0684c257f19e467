//! Frame-scoped object pools
//!
//! Everything the flusher allocates while replaying a picture (layers, clip
//! elements, meshes, command lists) comes from a pool and goes back to it
//! once the frame is done, so steady-state frames reuse the same heap
//! blocks instead of allocating.
//!
//! Two flavors:
//!
//! - [`Pool`]: slot-addressed objects that are referenced by key while live
//!   (render layers link to each other by key)
//! - [`Recycler`]: owned values handed out and taken back by value (meshes,
//!   command lists)
//!
//! Both enforce "one release per acquire": releasing a stale key is refused
//! and logged, and the counters let tests assert nothing leaked.

use std::ops::{Index, IndexMut};

use slotmap::{Key, SlotMap};

/// An object that can be reset for reuse without dropping its allocations
pub trait Poolable: Default {
    /// Forget all contents, keeping capacity
    fn clear(&mut self);
}

impl<T> Poolable for Vec<T> {
    fn clear(&mut self) {
        Vec::clear(self);
    }
}

/// Allocation counters for a pool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Objects handed out since creation
    pub acquired: u64,
    /// Objects returned since creation
    pub released: u64,
    /// Objects built fresh because the free list was empty
    pub created: u64,
}

impl PoolStats {
    /// Objects currently handed out
    pub fn outstanding(&self) -> u64 {
        self.acquired - self.released
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyed pool
// ─────────────────────────────────────────────────────────────────────────────

/// Slot-addressed pool of reusable objects
pub struct Pool<K: Key, T: Poolable> {
    live: SlotMap<K, T>,
    free: Vec<T>,
    stats: PoolStats,
}

impl<K: Key, T: Poolable> Default for Pool<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, T: Poolable> Pool<K, T> {
    pub fn new() -> Self {
        Self {
            live: SlotMap::with_key(),
            free: Vec::new(),
            stats: PoolStats::default(),
        }
    }

    /// Take a cleared object from the free list (or build one) and return
    /// its key
    pub fn acquire(&mut self) -> K {
        let value = match self.free.pop() {
            Some(value) => value,
            None => {
                self.stats.created += 1;
                T::default()
            }
        };
        self.stats.acquired += 1;
        self.live.insert(value)
    }

    /// Return an object to the free list
    ///
    /// Returns false (and touches nothing) for a key that is not live.
    pub fn release(&mut self, key: K) -> bool {
        match self.live.remove(key) {
            Some(mut value) => {
                value.clear();
                self.free.push(value);
                self.stats.released += 1;
                true
            }
            None => {
                tracing::warn!("Pool release of a stale key: {:?}", key);
                false
            }
        }
    }

    /// Release every live object
    pub fn release_all(&mut self) {
        let released = self.live.len() as u64;
        for (_, mut value) in self.live.drain() {
            value.clear();
            self.free.push(value);
        }
        self.stats.released += released;
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.live.get(key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.live.get_mut(key)
    }

    /// Live objects, in no particular order
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.live.values_mut()
    }

    pub fn contains(&self, key: K) -> bool {
        self.live.contains_key(key)
    }

    /// Number of objects currently handed out
    pub fn live(&self) -> usize {
        self.live.len()
    }

    /// Number of cleared objects waiting for reuse
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

impl<K: Key, T: Poolable> Index<K> for Pool<K, T> {
    type Output = T;

    fn index(&self, key: K) -> &T {
        &self.live[key]
    }
}

impl<K: Key, T: Poolable> IndexMut<K> for Pool<K, T> {
    fn index_mut(&mut self, key: K) -> &mut T {
        &mut self.live[key]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// By-value recycler
// ─────────────────────────────────────────────────────────────────────────────

/// Free list of owned values
pub struct Recycler<T: Poolable> {
    free: Vec<T>,
    stats: PoolStats,
    /// Upper bound on idle values kept around
    max_idle: usize,
}

impl<T: Poolable> Default for Recycler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Poolable> Recycler<T> {
    pub fn new() -> Self {
        Self::with_max_idle(1024)
    }

    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            free: Vec::new(),
            stats: PoolStats::default(),
            max_idle,
        }
    }

    pub fn acquire(&mut self) -> T {
        self.stats.acquired += 1;
        match self.free.pop() {
            Some(value) => value,
            None => {
                self.stats.created += 1;
                T::default()
            }
        }
    }

    pub fn release(&mut self, mut value: T) {
        self.stats.released += 1;
        if self.free.len() < self.max_idle {
            value.clear();
            self.free.push(value);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}
