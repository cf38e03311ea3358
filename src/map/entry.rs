//! Per-key value slot
//!
//! Every key in a [`SyncMap`](super::SyncMap) owns one `Entry`, shared between
//! the read and dirty tiers through an `Arc`. The entry holds an atomic pointer
//! to the current value and moves through three states:
//!
//! ```text
//!            store                 delete
//!   (nil) ----------> (value) ----------------> (nil)
//!     |                  ^  \___ swap/cas ___/
//!     | rebuild dirty    |
//!     v                  | store (under lock, re-added to dirty)
//! (expunged) ------------+
//! ```
//!
//! - `nil`: the key was deleted, but the entry is still reachable from the
//!   dirty tier (or the dirty tier has not been built yet).
//! - `expunged`: the key was deleted and the entry was left out of the dirty
//!   tier. Only a locked operation may bring it back.
//! - `value`: the key is live.
//!
//! Retired values are reclaimed through epoch-based deferred destruction, so a
//! reader pinned to the epoch never observes freed memory.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use core::sync::atomic::Ordering;

/// Tag on a null pointer marking the expunged state
const EXPUNGED_TAG: usize = 1;

/// Heap cell behind the slot pointer.
///
/// The alignment keeps the low pointer bits free for the expunged tag no
/// matter how small `V` is.
#[repr(align(8))]
#[derive(Debug)]
struct Slot<V> {
    value: V,
}

impl<V> Slot<V> {
    fn boxed(value: V) -> Owned<Self> {
        Owned::new(Slot { value })
    }
}

#[inline]
fn expunged<'g, V>() -> Shared<'g, Slot<V>> {
    Shared::null().with_tag(EXPUNGED_TAG)
}

/// An atomic value slot for a single key
#[derive(Debug)]
pub(crate) struct Entry<V> {
    slot: Atomic<Slot<V>>,
}

impl<V> Entry<V> {
    pub(crate) fn new(value: V) -> Self {
        Self {
            slot: Atomic::from(Slot::boxed(value)),
        }
    }

    /// Current value, `None` when deleted or expunged.
    pub(crate) fn load<'g>(&self, guard: &'g Guard) -> Option<&'g V> {
        let p = self.slot.load(Ordering::Acquire, guard);
        // SAFETY: non-null slots are only freed through `defer_destroy` or
        // when the entry itself is dropped, and the guard keeps both at bay.
        unsafe { p.as_ref() }.map(|slot| &slot.value)
    }

    /// Returns the existing value (`true`) or installs `value` (`false`).
    ///
    /// Hands `value` back if the entry is expunged.
    pub(crate) fn try_load_or_store<'g>(
        &self,
        value: V,
        guard: &'g Guard,
    ) -> Result<(&'g V, bool), V> {
        let mut current = self.slot.load(Ordering::Acquire, guard);
        if current == expunged() {
            return Err(value);
        }
        if let Some(slot) = unsafe { current.as_ref() } {
            return Ok((&slot.value, true));
        }

        let mut new = Slot::boxed(value);
        loop {
            match self.slot.compare_exchange(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(stored) => {
                    let slot = unsafe { stored.deref() };
                    return Ok((&slot.value, false));
                }
                Err(err) => {
                    current = err.current;
                    new = err.new;
                    if current == expunged() {
                        return Err(new.into_box().value);
                    }
                    if let Some(slot) = unsafe { current.as_ref() } {
                        return Ok((&slot.value, true));
                    }
                }
            }
        }
    }

    /// Replaces the value unless the entry is expunged.
    ///
    /// On success returns the previous value, if any.
    pub(crate) fn try_swap<'g>(&self, value: V, guard: &'g Guard) -> Result<Option<&'g V>, V> {
        let mut current = self.slot.load(Ordering::Acquire, guard);
        let mut new = Slot::boxed(value);
        loop {
            if current == expunged() {
                return Err(new.into_box().value);
            }
            match self.slot.compare_exchange(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return Ok(retire(current, guard)),
                Err(err) => {
                    current = err.current;
                    new = err.new;
                }
            }
        }
    }

    /// Unconditionally replaces the value.
    ///
    /// Must be called with the map lock held, after the entry has been
    /// unexpunged.
    pub(crate) fn swap_locked<'g>(&self, value: V, guard: &'g Guard) -> Option<&'g V> {
        let previous = self.slot.swap(Slot::boxed(value), Ordering::AcqRel, guard);
        retire(previous, guard)
    }

    /// Clears the value, returning it if the entry was live.
    pub(crate) fn delete<'g>(&self, guard: &'g Guard) -> Option<&'g V> {
        let mut current = self.slot.load(Ordering::Acquire, guard);
        loop {
            if current.is_null() {
                return None;
            }
            match self.slot.compare_exchange(
                current,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return retire(current, guard),
                Err(err) => current = err.current,
            }
        }
    }

    /// Marks a deleted entry as expunged.
    ///
    /// Returns whether the entry is expunged afterwards. Must be called with
    /// the map lock held.
    pub(crate) fn try_expunge_locked(&self, guard: &Guard) -> bool {
        let mut current = self.slot.load(Ordering::Acquire, guard);
        loop {
            if current == expunged() {
                return true;
            }
            if !current.is_null() {
                return false;
            }
            match self.slot.compare_exchange(
                current,
                expunged(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return true,
                Err(err) => current = err.current,
            }
        }
    }

    /// Moves an expunged entry back to the deleted state.
    ///
    /// Returns `true` if it was expunged, in which case the caller must add
    /// the entry back to the dirty tier before releasing the lock.
    pub(crate) fn unexpunge_locked(&self, guard: &Guard) -> bool {
        self.slot
            .compare_exchange(
                expunged(),
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            )
            .is_ok()
    }
}

impl<V: PartialEq> Entry<V> {
    /// Replaces the value with `new` if it currently equals `old`.
    pub(crate) fn try_compare_and_swap(&self, old: &V, new: V, guard: &Guard) -> bool {
        let mut current = self.slot.load(Ordering::Acquire, guard);
        let mut new = Slot::boxed(new);
        loop {
            match unsafe { current.as_ref() } {
                Some(slot) if slot.value == *old => {}
                _ => return false,
            }
            match self.slot.compare_exchange(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    retire(current, guard);
                    return true;
                }
                Err(err) => {
                    current = err.current;
                    new = err.new;
                }
            }
        }
    }

    /// Clears the value if it currently equals `old`.
    pub(crate) fn try_compare_and_delete(&self, old: &V, guard: &Guard) -> bool {
        let mut current = self.slot.load(Ordering::Acquire, guard);
        loop {
            match unsafe { current.as_ref() } {
                Some(slot) if slot.value == *old => {}
                _ => return false,
            }
            match self.slot.compare_exchange(
                current,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    retire(current, guard);
                    return true;
                }
                Err(err) => current = err.current,
            }
        }
    }
}

/// Schedules a replaced slot for destruction once every pinned thread has
/// moved on. The returned reference stays valid for the guard's lifetime.
fn retire<'g, V>(previous: Shared<'g, Slot<V>>, guard: &'g Guard) -> Option<&'g V> {
    // SAFETY: `previous` was just unlinked by a successful CAS or swap, so no
    // thread can reach it after the current epoch ends.
    let slot = unsafe { previous.as_ref() }?;
    unsafe { guard.defer_destroy(previous) };
    Some(&slot.value)
}

impl<V> Drop for Entry<V> {
    fn drop(&mut self) {
        // SAFETY: we hold the last reference to this entry. Values it retired
        // earlier were handed to the collector and are not touched here.
        unsafe {
            let guard = epoch::unprotected();
            let current = self.slot.load(Ordering::Relaxed, guard);
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}
