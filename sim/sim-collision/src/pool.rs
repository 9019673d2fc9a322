//! Fixed-size object pools for per-step algorithm results.
//!
//! A pool owns one contiguous slab of `capacity` slots threaded by a free
//! list, so allocation and release are both O(1) and never touch the heap
//! while slots are available. Values are handed out as [`Pooled`] handles;
//! dropping a handle releases its slot exactly once.
//!
//! Two flavours share the same implementation and differ only in the lock
//! guarding the slab:
//!
//! - [`FixedSizePool`] uses a `RefCell` and is `!Sync`. The constraint
//!   solver owns one for its per-contact solving data.
//! - [`SyncFixedSizePool`] uses a `parking_lot::Mutex` and may be shared
//!   between threads. The narrow phase uses it so ghost queries can run
//!   concurrently with the main step.
//!
//! # Exhaustion
//!
//! When every slot is taken the pool follows its [`OverflowPolicy`]:
//! `HeapFallback` boxes the value and counts the overflow, `Fail` returns
//! [`CollisionError::PoolExhausted`]. No uninitialised value is ever exposed.
//!
//! # Example
//!
//! ```
//! use sim_collision::pool::SyncFixedSizePool;
//! use sim_types::OverflowPolicy;
//!
//! let pool = SyncFixedSizePool::new("scratch", 2, OverflowPolicy::HeapFallback);
//! {
//!     let a = pool.allocate(1_u32).unwrap();
//!     let b = pool.allocate(2_u32).unwrap();
//!     assert_eq!(a.get() + b.get(), 3);
//!     assert_eq!(pool.free_count(), 0);
//! }
//! assert_eq!(pool.free_count(), 2);
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use sim_types::{CollisionError, OverflowPolicy, Result};
use tracing::warn;

/// A slot in the slab: either part of the free list or holding a value.
#[derive(Debug)]
enum Entry<T> {
    Free { next: Option<usize> },
    Occupied(T),
}

/// Slot storage behind a pool's lock.
#[derive(Debug)]
pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<usize>,
    free_count: usize,
}

impl<T> Slab<T> {
    fn with_capacity(capacity: usize) -> Self {
        let entries = (0..capacity)
            .map(|i| Entry::Free {
                next: (i + 1 < capacity).then_some(i + 1),
            })
            .collect();
        Self {
            entries,
            free_head: (capacity > 0).then_some(0),
            free_count: capacity,
        }
    }

    /// Store `value` in the first free slot, or hand it back if none is left.
    fn insert(&mut self, value: T) -> std::result::Result<usize, T> {
        let Some(index) = self.free_head else {
            return Err(value);
        };
        let next = match self.entries[index] {
            Entry::Free { next } => next,
            Entry::Occupied(_) => unreachable!("free list points at an occupied slot"),
        };
        self.entries[index] = Entry::Occupied(value);
        self.free_head = next;
        self.free_count -= 1;
        Ok(index)
    }

    /// Take the value out of `index` and push the slot onto the free list.
    fn remove(&mut self, index: usize) -> Option<T> {
        let entry = std::mem::replace(
            &mut self.entries[index],
            Entry::Free {
                next: self.free_head,
            },
        );
        match entry {
            Entry::Occupied(value) => {
                self.free_head = Some(index);
                self.free_count += 1;
                Some(value)
            }
            free @ Entry::Free { .. } => {
                // Slot was already free: restore it untouched.
                self.entries[index] = free;
                None
            }
        }
    }

    fn get(&self, index: usize) -> &T {
        match &self.entries[index] {
            Entry::Occupied(value) => value,
            Entry::Free { .. } => unreachable!("pooled handle refers to a released slot"),
        }
    }

    fn get_mut(&mut self, index: usize) -> &mut T {
        match &mut self.entries[index] {
            Entry::Occupied(value) => value,
            Entry::Free { .. } => unreachable!("pooled handle refers to a released slot"),
        }
    }
}

/// Interior-mutability wrapper guarding a pool's slab.
///
/// Implemented for `RefCell` (single-threaded) and `parking_lot::Mutex`
/// (thread-safe). Closures passed to [`SlabLock::with_slab`] must not call
/// back into the same pool.
pub trait SlabLock<T> {
    /// Wrap a slab.
    fn wrap(slab: Slab<T>) -> Self;

    /// Run `f` with exclusive access to the slab.
    fn with_slab<R>(&self, f: impl FnOnce(&mut Slab<T>) -> R) -> R;
}

impl<T> SlabLock<T> for RefCell<Slab<T>> {
    fn wrap(slab: Slab<T>) -> Self {
        Self::new(slab)
    }

    fn with_slab<R>(&self, f: impl FnOnce(&mut Slab<T>) -> R) -> R {
        f(&mut self.borrow_mut())
    }
}

impl<T> SlabLock<T> for Mutex<Slab<T>> {
    fn wrap(slab: Slab<T>) -> Self {
        Self::new(slab)
    }

    fn with_slab<R>(&self, f: impl FnOnce(&mut Slab<T>) -> R) -> R {
        f(&mut self.lock())
    }
}

/// A fixed-capacity pool generic over its slab lock.
///
/// Use the [`FixedSizePool`] and [`SyncFixedSizePool`] aliases.
#[derive(Debug)]
pub struct Pool<T, L: SlabLock<T>> {
    name: String,
    capacity: usize,
    policy: OverflowPolicy,
    overflow_count: AtomicUsize,
    slab: L,
    _marker: PhantomData<T>,
}

/// Single-threaded pool.
pub type FixedSizePool<T> = Pool<T, RefCell<Slab<T>>>;

/// Thread-safe pool.
pub type SyncFixedSizePool<T> = Pool<T, Mutex<Slab<T>>>;

impl<T, L: SlabLock<T>> Pool<T, L> {
    /// Create a pool with `capacity` slots.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            name: name.into(),
            capacity,
            policy,
            overflow_count: AtomicUsize::new(0),
            slab: L::wrap(Slab::with_capacity(capacity)),
            _marker: PhantomData,
        }
    }

    /// Move `value` into the pool.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError::PoolExhausted`] when no slot is free and the
    /// policy is [`OverflowPolicy::Fail`].
    pub fn allocate(&self, value: T) -> Result<Pooled<'_, T, L>> {
        let slot = match self.slab.with_slab(|slab| slab.insert(value)) {
            Ok(index) => SlotRef::Slab(index),
            Err(value) => match self.policy {
                OverflowPolicy::HeapFallback => {
                    let overflows = self.overflow_count.fetch_add(1, Ordering::Relaxed) + 1;
                    if overflows.is_power_of_two() {
                        warn!(
                            pool = %self.name,
                            capacity = self.capacity,
                            overflow_count = overflows,
                            "pool exhausted, falling back to heap allocation"
                        );
                    }
                    SlotRef::Heap(Box::new(value))
                }
                OverflowPolicy::Fail => {
                    return Err(CollisionError::PoolExhausted {
                        pool: self.name.clone(),
                        capacity: self.capacity,
                    });
                }
            },
        };

        Ok(Pooled {
            pool: self,
            slot: Some(slot),
        })
    }

    /// Pool name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots in the slab.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently free.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.slab.with_slab(|slab| slab.free_count)
    }

    /// Number of slab slots currently held by live handles.
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.capacity - self.free_count()
    }

    /// Number of allocations that spilled to the heap so far.
    #[must_use]
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Overflow behavior of this pool.
    #[must_use]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

#[derive(Debug)]
enum SlotRef<T> {
    Slab(usize),
    Heap(Box<T>),
}

/// Handle to a value living in a pool.
///
/// The slot is released when the handle is dropped or consumed with
/// [`Pooled::into_inner`].
#[derive(Debug)]
pub struct Pooled<'p, T, L: SlabLock<T>> {
    pool: &'p Pool<T, L>,
    slot: Option<SlotRef<T>>,
}

impl<T, L: SlabLock<T>> Pooled<'_, T, L> {
    /// Borrow the value.
    ///
    /// For the synchronized pool the pool lock is held while `f` runs.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match &self.slot {
            Some(SlotRef::Heap(value)) => f(value),
            Some(SlotRef::Slab(index)) => self.pool.slab.with_slab(|slab| f(slab.get(*index))),
            None => unreachable!("pooled value accessed after release"),
        }
    }

    /// Mutably borrow the value.
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        match &mut self.slot {
            Some(SlotRef::Heap(value)) => f(value),
            Some(SlotRef::Slab(index)) => {
                let index = *index;
                self.pool.slab.with_slab(|slab| f(slab.get_mut(index)))
            }
            None => unreachable!("pooled value accessed after release"),
        }
    }

    /// Whether the value spilled to the heap.
    #[must_use]
    pub fn is_heap_allocated(&self) -> bool {
        matches!(self.slot, Some(SlotRef::Heap(_)))
    }

    /// Move the value out and release the slot.
    #[must_use]
    pub fn into_inner(mut self) -> T {
        match self.slot.take() {
            Some(SlotRef::Heap(value)) => *value,
            Some(SlotRef::Slab(index)) => match self.pool.slab.with_slab(|slab| slab.remove(index))
            {
                Some(value) => value,
                None => unreachable!("pooled slot released twice"),
            },
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T: Copy, L: SlabLock<T>> Pooled<'_, T, L> {
    /// Copy the value out.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(|value| *value)
    }
}

impl<T, L: SlabLock<T>> Drop for Pooled<'_, T, L> {
    fn drop(&mut self) {
        if let Some(SlotRef::Slab(index)) = self.slot.take() {
            // The value is dropped after the lock is released.
            let released = self.pool.slab.with_slab(|slab| slab.remove(index));
            drop(released);
        }
    }
}
